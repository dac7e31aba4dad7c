//! Database engine seam and the per-request handle
//!
//! The middleware only needs to open sessions and drive their lifecycle, so
//! it is written against [`Engine`] and [`Session`]. [`PgEngine`] is the
//! production implementation.

mod postgres;

pub use postgres::{PgEngine, PgSession, create_pool};

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::Extensions, http::request::Parts};
use std::sync::Arc;
use txscope_core::{DbError, SqlLogger};

use crate::error::AppError;

/// A database engine shared by all requests
#[async_trait]
pub trait Engine: Clone + Send + Sync + 'static {
    type Session: Session;

    /// Open a session holding one connection for the caller's exclusive use.
    async fn new_session(&self) -> Result<Self::Session, DbError>;

    /// Round-trip a trivial statement over an auto-commit connection.
    async fn ping(&self) -> Result<(), DbError>;

    /// Report elapsed time with every logged statement.
    fn show_exec_time(&self, show: bool);

    /// Report executed statements to the installed logger.
    fn show_sql(&self, show: bool);

    /// Replace the statement logger.
    fn set_logger(&self, logger: Arc<dyn SqlLogger>);
}

/// An explicit-transaction session owned by one request
#[async_trait]
pub trait Session: Clone + Send + Sync + 'static {
    async fn begin(&self) -> Result<(), DbError>;
    async fn commit(&self) -> Result<(), DbError>;
    async fn rollback(&self) -> Result<(), DbError>;
    async fn ping(&self) -> Result<(), DbError>;

    /// Release the connection. Safe to call more than once.
    async fn close(&self);
}

/// The database handle attached to a request
///
/// Mutating requests get their own session; everything else gets the
/// auto-commit engine. Handlers take it as an extractor.
#[derive(Clone)]
pub enum DbHandle<E: Engine> {
    Plain(E),
    Session(E::Session),
}

impl<E: Engine> DbHandle<E> {
    /// Look up the handle the middleware stored for this request.
    pub fn from_extensions(extensions: &Extensions) -> Option<&Self> {
        extensions.get::<Self>()
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, DbHandle::Session(_))
    }

    pub async fn ping(&self) -> Result<(), DbError> {
        match self {
            DbHandle::Plain(engine) => engine.ping().await,
            DbHandle::Session(session) => session.ping().await,
        }
    }
}

impl<E, S> FromRequestParts<S> for DbHandle<E>
where
    E: Engine,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_extensions(&parts.extensions)
            .cloned()
            .ok_or_else(|| AppError::Internal("No database handle attached to request".into()))
    }
}
