//! txscope-core: Shared types for request-scoped transactions and SQL auditing
//!
//! This crate provides the engine-agnostic pieces used by the server:
//! the statement logging capability, the positional SQL event values,
//! the audit message shape, and the error types.

pub mod audit;
pub mod error;
pub mod event;
pub mod logger;

pub use audit::AuditMessage;
pub use error::{BusError, DbError};
pub use event::LogValue;
pub use logger::{LogLevel, SqlLogger, TracingLogger};
