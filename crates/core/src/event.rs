//! Positional values emitted by the engine for one statement execution.
//!
//! The engine reports `(statement, params, elapsed)` when parameters were
//! bound and `(statement, elapsed)` otherwise. Consumers interpret the list
//! by position only.

use serde_json::Value as JsonValue;
use std::time::Duration;

/// A single logged value
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    Text(String),
    Args(Vec<JsonValue>),
    Elapsed(Duration),
}

impl LogValue {
    /// Build the value list for one executed statement.
    ///
    /// `elapsed` is `None` when execution-time instrumentation is off.
    pub fn statement(sql: &str, args: Vec<JsonValue>, elapsed: Option<Duration>) -> Vec<LogValue> {
        let mut values = Vec::with_capacity(3);
        values.push(LogValue::Text(sql.to_string()));
        if !args.is_empty() {
            values.push(LogValue::Args(args));
        }
        if let Some(took) = elapsed {
            values.push(LogValue::Elapsed(took));
        }
        values
    }

    /// JSON form used on the wire. Durations become integer nanoseconds.
    pub fn to_json(&self) -> JsonValue {
        match self {
            LogValue::Text(s) => JsonValue::String(s.clone()),
            LogValue::Args(args) => JsonValue::Array(args.clone()),
            LogValue::Elapsed(d) => {
                JsonValue::Number(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX).into())
            }
        }
    }
}

impl std::fmt::Display for LogValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogValue::Text(s) => f.write_str(s),
            LogValue::Args(args) => write!(f, "{}", JsonValue::Array(args.clone())),
            LogValue::Elapsed(d) => write!(f, "{:?}", d),
        }
    }
}
