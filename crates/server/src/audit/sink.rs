//! Statement logger that mirrors SQL to the audit producer

use txscope_core::{AuditMessage, LogValue, SqlLogger};

use super::producer::AuditProducer;

/// Engine logger forwarding each executed statement as an [`AuditMessage`]
///
/// Leveled logging is discarded; SQL visibility always reports on so the
/// engine keeps emitting statements.
#[derive(Clone)]
pub struct AuditSink {
    service: String,
    producer: AuditProducer,
}

impl AuditSink {
    pub fn new(service: impl Into<String>, producer: AuditProducer) -> Self {
        Self {
            service: service.into(),
            producer,
        }
    }
}

impl SqlLogger for AuditSink {
    fn log_sql(&self, values: &[LogValue]) {
        if let Some(message) = AuditMessage::from_values(&self.service, values) {
            self.producer.send(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::producer::{ProducerConfig, tests::RecordingTransport};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use txscope_core::LogLevel;

    fn sink() -> (AuditSink, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let producer =
            AuditProducer::with_transport("sqllog", transport.clone(), ProducerConfig::default());
        (AuditSink::new("svc", producer), transport)
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_statement_with_args() {
        let (sink, transport) = sink();

        sink.log_sql(&[
            LogValue::Text("SELECT 1".into()),
            LogValue::Args(vec![]),
            LogValue::Elapsed(Duration::from_millis(5)),
        ]);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(
            transport.messages(),
            vec![json!({"service": "svc", "sql": "SELECT 1", "args": [], "took": 5_000_000})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_statement_without_args() {
        let (sink, transport) = sink();

        sink.log_sql(&[
            LogValue::Text("SELECT 1".into()),
            LogValue::Elapsed(Duration::from_millis(5)),
        ]);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(
            transport.messages(),
            vec![json!({"service": "svc", "sql": "SELECT 1", "took": 5_000_000})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn drops_unexpected_arity() {
        let (sink, transport) = sink();
        let took = LogValue::Elapsed(Duration::from_millis(5));

        sink.log_sql(&[LogValue::Text("SELECT 1".into())]);
        sink.log_sql(&[
            LogValue::Text("SELECT 1".into()),
            LogValue::Args(vec![]),
            took.clone(),
            took,
        ]);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(transport.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn leveled_logging_is_inert() {
        let (sink, transport) = sink();

        sink.info("BEGIN");
        sink.error("boom");
        sink.set_level(LogLevel::Off);
        sink.show_sql(false);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(sink.is_show_sql());
        assert_eq!(sink.level(), LogLevel::Debug);
        assert!(transport.messages().is_empty());
    }
}
