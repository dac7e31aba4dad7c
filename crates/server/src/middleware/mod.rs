//! HTTP middleware

pub mod transaction;

pub use transaction::{
    BeginFailurePolicy, TxState, context_db, install_audit_sink, transaction_middleware,
};
