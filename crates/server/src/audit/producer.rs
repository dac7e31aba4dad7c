//! Asynchronous, batching audit producer
//!
//! `send` never waits: messages go into a bounded channel and a background
//! task publishes them in batches, either every `flush_frequency` or as soon
//! as `flush_max_messages` are pending. Failed batches are logged and dropped.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use txscope_core::{AuditMessage, BusError};

use super::kafka::KafkaTransport;

/// Broker acknowledgement required before a batch counts as delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredAcks {
    None,
    /// Wait for the partition leader only
    Leader,
    All,
}

/// Batch compression codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

/// Producer tuning
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub required_acks: RequiredAcks,
    pub compression: Compression,
    pub flush_frequency: Duration,
    pub flush_max_messages: usize,
    pub channel_capacity: usize,
    pub ack_timeout: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            required_acks: RequiredAcks::Leader,
            compression: Compression::None,
            flush_frequency: Duration::from_millis(500),
            flush_max_messages: 1000,
            channel_capacity: 4096,
            ack_timeout: Duration::from_secs(10),
        }
    }
}

/// Where flushed batches go
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payloads: Vec<Vec<u8>>) -> Result<(), BusError>;
}

/// Handle used to enqueue audit messages; cheap to clone
#[derive(Clone)]
pub struct AuditProducer {
    topic: Arc<str>,
    tx: mpsc::Sender<AuditMessage>,
}

impl AuditProducer {
    /// Connect to Kafka and start the flush task.
    ///
    /// `configure` adjusts the defaults before the connection is made.
    pub async fn connect(
        brokers: &[String],
        topic: &str,
        configure: impl FnOnce(&mut ProducerConfig),
    ) -> Result<Self, BusError> {
        if brokers.is_empty() {
            return Err(BusError::NoBrokers);
        }
        let mut config = ProducerConfig::default();
        configure(&mut config);

        let transport = KafkaTransport::connect(brokers.to_vec(), &config).await?;
        tracing::info!(
            brokers = ?brokers,
            topic = %topic,
            acks = ?config.required_acks,
            compression = ?config.compression,
            flush_ms = config.flush_frequency.as_millis() as u64,
            "Audit producer connected"
        );
        Ok(Self::with_transport(topic, Arc::new(transport), config))
    }

    /// Start a producer over an existing transport.
    pub fn with_transport(topic: &str, transport: Arc<dyn Transport>, config: ProducerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let topic: Arc<str> = Arc::from(topic);
        tokio::spawn(run_flusher(rx, transport, topic.clone(), config));
        Self { topic, tx }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Enqueue a message without waiting.
    pub fn send(&self, message: AuditMessage) {
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(topic = %self.topic, "Audit queue full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(topic = %self.topic, "Audit producer stopped, dropping message");
            }
        }
    }
}

async fn run_flusher(
    mut rx: mpsc::Receiver<AuditMessage>,
    transport: Arc<dyn Transport>,
    topic: Arc<str>,
    config: ProducerConfig,
) {
    let max = config.flush_max_messages.max(1);
    let start = tokio::time::Instant::now() + config.flush_frequency;
    let mut ticker = tokio::time::interval_at(start, config.flush_frequency);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut batch: Vec<AuditMessage> = Vec::with_capacity(max);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(message) => {
                    batch.push(message);
                    if batch.len() >= max {
                        flush(transport.as_ref(), &topic, &mut batch).await;
                    }
                }
                None => {
                    flush(transport.as_ref(), &topic, &mut batch).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                flush(transport.as_ref(), &topic, &mut batch).await;
            }
        }
    }

    tracing::debug!(topic = %topic, "Audit flusher stopped");
}

async fn flush(transport: &dyn Transport, topic: &str, batch: &mut Vec<AuditMessage>) {
    if batch.is_empty() {
        return;
    }
    let count = batch.len();
    let payloads: Vec<Vec<u8>> = batch
        .drain(..)
        .filter_map(|m| match serde_json::to_vec(&m) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode audit message");
                None
            }
        })
        .collect();

    if let Err(e) = transport.publish(topic, payloads).await {
        tracing::warn!(topic = %topic, count, error = %e, "Audit batch dropped");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::{Value as JsonValue, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport that keeps every published batch
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub batches: Mutex<Vec<(String, Vec<JsonValue>)>>,
    }

    impl RecordingTransport {
        pub(crate) fn messages(&self) -> Vec<JsonValue> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .flat_map(|(_, msgs)| msgs.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn publish(&self, topic: &str, payloads: Vec<Vec<u8>>) -> Result<(), BusError> {
            let msgs = payloads
                .iter()
                .map(|p| serde_json::from_slice(p).unwrap())
                .collect();
            self.batches.lock().unwrap().push((topic.to_string(), msgs));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FailingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for FailingTransport {
        async fn publish(&self, _topic: &str, _payloads: Vec<Vec<u8>>) -> Result<(), BusError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BusError::Publish("broker down".into()))
        }
    }

    fn message(sql: &str) -> AuditMessage {
        AuditMessage {
            service: "svc".into(),
            sql: json!(sql),
            args: None,
            took: json!(1000),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_on_interval() {
        let transport = Arc::new(RecordingTransport::default());
        let producer =
            AuditProducer::with_transport("sqllog", transport.clone(), ProducerConfig::default());

        producer.send(message("SELECT 1"));
        producer.send(message("SELECT 2"));
        tokio::time::sleep(Duration::from_millis(600)).await;

        let batches = transport.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, "sqllog");
        assert_eq!(batches[0].1.len(), 2);
        assert_eq!(batches[0].1[1]["sql"], "SELECT 2");
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_when_batch_is_full() {
        let transport = Arc::new(RecordingTransport::default());
        let config = ProducerConfig {
            flush_max_messages: 2,
            flush_frequency: Duration::from_secs(3600),
            ..ProducerConfig::default()
        };
        let producer = AuditProducer::with_transport("sqllog", transport.clone(), config);

        producer.send(message("SELECT 1"));
        producer.send(message("SELECT 2"));
        producer.send(message("SELECT 3"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.batches.lock().unwrap().len(), 1);
        assert_eq!(transport.messages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_messages_flush_when_producer_dropped() {
        let transport = Arc::new(RecordingTransport::default());
        let config = ProducerConfig {
            flush_frequency: Duration::from_secs(3600),
            ..ProducerConfig::default()
        };
        let producer = AuditProducer::with_transport("sqllog", transport.clone(), config);

        producer.send(message("DELETE FROM t"));
        drop(producer);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failures_are_not_retried() {
        let transport = Arc::new(FailingTransport::default());
        let producer =
            AuditProducer::with_transport("sqllog", transport.clone(), ProducerConfig::default());

        producer.send(message("SELECT 1"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        producer.send(message("SELECT 2"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn connect_requires_brokers() {
        let result = AuditProducer::connect(&[], "sqllog", |_| {}).await;
        assert!(matches!(result, Err(BusError::NoBrokers)));
    }
}
