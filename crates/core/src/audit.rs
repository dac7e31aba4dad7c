//! Audit message published for every executed statement

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::event::LogValue;

/// One audited statement, tagged with the emitting service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditMessage {
    pub service: String,
    pub sql: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub args: Option<JsonValue>,
    pub took: JsonValue,
}

impl AuditMessage {
    /// Shape a message from positional statement values.
    ///
    /// Three values are `(sql, args, took)`, two are `(sql, took)`.
    /// Anything else yields `None`.
    pub fn from_values(service: &str, values: &[LogValue]) -> Option<Self> {
        match values {
            [sql, args, took] => Some(Self {
                service: service.to_string(),
                sql: sql.to_json(),
                args: Some(args.to_json()),
                took: took.to_json(),
            }),
            [sql, took] => Some(Self {
                service: service.to_string(),
                sql: sql.to_json(),
                args: None,
                took: took.to_json(),
            }),
            _ => None,
        }
    }
}
