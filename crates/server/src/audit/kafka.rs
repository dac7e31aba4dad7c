//! Kafka transport for audit batches

use async_trait::async_trait;
use kafka::client::Compression as KafkaCompression;
use kafka::producer::{Producer, Record, RequiredAcks as KafkaAcks};
use std::sync::{Arc, Mutex};
use txscope_core::BusError;

use super::producer::{Compression, ProducerConfig, RequiredAcks, Transport};

/// Publishes batches with the blocking `kafka` client on the blocking pool
pub struct KafkaTransport {
    producer: Arc<Mutex<Producer>>,
}

impl KafkaTransport {
    /// Connect to the brokers and load cluster metadata.
    pub async fn connect(brokers: Vec<String>, config: &ProducerConfig) -> Result<Self, BusError> {
        let acks = match config.required_acks {
            RequiredAcks::None => KafkaAcks::None,
            RequiredAcks::Leader => KafkaAcks::One,
            RequiredAcks::All => KafkaAcks::All,
        };
        let compression = match config.compression {
            Compression::None => KafkaCompression::NONE,
            Compression::Gzip => KafkaCompression::GZIP,
        };
        let ack_timeout = config.ack_timeout;

        let producer = tokio::task::spawn_blocking(move || {
            Producer::from_hosts(brokers)
                .with_ack_timeout(ack_timeout)
                .with_required_acks(acks)
                .with_compression(compression)
                .create()
        })
        .await
        .map_err(|e| BusError::Connect(e.to_string()))?
        .map_err(|e| BusError::Connect(e.to_string()))?;

        Ok(Self {
            producer: Arc::new(Mutex::new(producer)),
        })
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    async fn publish(&self, topic: &str, payloads: Vec<Vec<u8>>) -> Result<(), BusError> {
        if payloads.is_empty() {
            return Ok(());
        }
        let producer = self.producer.clone();
        let topic = topic.to_string();

        tokio::task::spawn_blocking(move || {
            let records: Vec<Record<'_, (), Vec<u8>>> = payloads
                .into_iter()
                .map(|payload| Record::from_value(&topic, payload))
                .collect();

            let mut producer = producer
                .lock()
                .map_err(|_| BusError::Publish("producer lock poisoned".into()))?;
            let confirms = producer
                .send_all(&records)
                .map_err(|e| BusError::Publish(e.to_string()))?;

            for confirm in confirms {
                for partition in confirm.partition_confirms {
                    if let Err(code) = partition.offset {
                        tracing::warn!(
                            topic = %confirm.topic,
                            partition = partition.partition,
                            code = ?code,
                            "Broker rejected audit batch"
                        );
                    }
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| BusError::Publish(e.to_string()))?
    }
}
