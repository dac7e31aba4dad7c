//! txscope-server: binary entrypoint.

use axum::Router;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use txscope_server::config::Config;
use txscope_server::db::PgEngine;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();

    // Create database pool
    let pool = txscope_server::db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    if config.kafka.brokers.is_empty() {
        tracing::warn!("KAFKA_BROKERS not set, SQL auditing disabled");
    }
    tracing::info!(policy = ?config.begin_failure, "Begin failure policy");

    let state = txscope_server::middleware::context_db(
        &config.service_name,
        PgEngine::new(pool),
        &config.kafka,
    )
    .await
    .with_begin_failure(config.begin_failure);

    // Build application
    let app = txscope_server::build_app(state, Router::new());

    // Start server
    let addr: SocketAddr = config.bind_address.parse().expect("Invalid bind address");
    tracing::info!(service = %config.service_name, "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    tracing::info!("Server shutdown complete");
}

/// Resolve once the process is asked to stop (Ctrl+C, or SIGTERM on unix).
async fn shutdown_signal() {
    let reason = wait_for_signal().await;
    tracing::info!(signal = reason, "Stopping, draining in-flight requests");
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "CTRL_C"
}
