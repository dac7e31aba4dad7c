use thiserror::Error;

/// Database engine errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Begin transaction failed: {0}")]
    Begin(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Rollback failed: {0}")]
    Rollback(String),

    #[error("Session already closed")]
    SessionClosed,
}

/// Message bus errors
#[derive(Debug, Error)]
pub enum BusError {
    #[error("No brokers configured")]
    NoBrokers,

    #[error("Producer connection failed: {0}")]
    Connect(String),

    #[error("Publish failed: {0}")]
    Publish(String),
}
