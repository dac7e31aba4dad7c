//! txscope-server library crate
//!
//! Exposes the transaction middleware, the SQL audit sink and `build_app`
//! for hosts and integration tests. The binary entrypoint is in `main.rs`.

pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
mod routes;

use axum::{Router, middleware as axum_mw, routing::get};
use tower_http::trace::TraceLayer;

use db::Engine;
use middleware::{TxState, transaction_middleware};

/// Build the application router around the host's routes.
///
/// Every route, including `/health`, runs behind the transaction middleware
/// so handlers can extract a [`db::DbHandle`].
pub fn build_app<E: Engine>(state: TxState<E>, api: Router) -> Router {
    Router::new()
        .route("/health", get(routes::health::check::<E>))
        .merge(api)
        .layer(axum_mw::from_fn_with_state(state, transaction_middleware::<E>))
        .layer(TraceLayer::new_for_http())
}
