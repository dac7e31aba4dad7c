//! Statement logging capability installed on a database engine
//!
//! Only `log_sql` carries meaning for most implementations; the leveled
//! methods and switches default to no-ops so narrow adapters stay small.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::event::LogValue;

/// Logging level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Off = 4,
}

impl LogLevel {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Off,
        }
    }
}

/// Logger accepted by the database engine
pub trait SqlLogger: Send + Sync {
    /// Receive the positional values of one executed statement.
    fn log_sql(&self, values: &[LogValue]);

    fn debug(&self, _msg: &str) {}
    fn info(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}

    fn level(&self) -> LogLevel {
        LogLevel::Debug
    }
    fn set_level(&self, _level: LogLevel) {}

    fn show_sql(&self, _show: bool) {}
    fn is_show_sql(&self) -> bool {
        true
    }
}

/// Default engine logger writing to `tracing`
pub struct TracingLogger {
    level: AtomicU8,
    show_sql: AtomicBool,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self {
            level: AtomicU8::new(LogLevel::Info as u8),
            show_sql: AtomicBool::new(false),
        }
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level()
    }

    /// Statements are traced at debug, so they need both the switch and the level.
    pub fn logs_statements(&self) -> bool {
        self.is_show_sql() && self.enabled(LogLevel::Debug)
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlLogger for TracingLogger {
    fn log_sql(&self, values: &[LogValue]) {
        if !self.logs_statements() {
            return;
        }
        let line = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" - ");
        tracing::debug!(target: "sql", "[SQL] {}", line);
    }

    fn debug(&self, msg: &str) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!(target: "sql", "{}", msg);
        }
    }

    fn info(&self, msg: &str) {
        if self.enabled(LogLevel::Info) {
            tracing::info!(target: "sql", "{}", msg);
        }
    }

    fn warn(&self, msg: &str) {
        if self.enabled(LogLevel::Warn) {
            tracing::warn!(target: "sql", "{}", msg);
        }
    }

    fn error(&self, msg: &str) {
        if self.enabled(LogLevel::Error) {
            tracing::error!(target: "sql", "{}", msg);
        }
    }

    fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    fn show_sql(&self, show: bool) {
        self.show_sql.store(show, Ordering::Relaxed);
    }

    fn is_show_sql(&self) -> bool {
        self.show_sql.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_round_trips_through_setter() {
        let logger = TracingLogger::new();
        assert_eq!(logger.level(), LogLevel::Info);

        logger.set_level(LogLevel::Error);
        assert_eq!(logger.level(), LogLevel::Error);
        assert!(!logger.enabled(LogLevel::Warn));
        assert!(logger.enabled(LogLevel::Error));
    }

    #[test]
    fn statements_need_debug_level_and_show_sql() {
        let logger = TracingLogger::new();
        logger.show_sql(true);
        assert!(!logger.logs_statements());

        logger.set_level(LogLevel::Debug);
        assert!(logger.logs_statements());

        logger.show_sql(false);
        assert!(!logger.logs_statements());
    }

    #[test]
    fn show_sql_is_off_until_enabled() {
        let logger = TracingLogger::new();
        assert!(!logger.is_show_sql());

        logger.show_sql(true);
        assert!(logger.is_show_sql());
    }
}
