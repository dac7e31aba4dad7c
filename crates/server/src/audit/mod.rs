//! SQL auditing to a message bus

mod kafka;
pub mod producer;
mod sink;

pub use kafka::KafkaTransport;
pub use producer::{AuditProducer, Compression, ProducerConfig, RequiredAcks, Transport};
pub use sink::AuditSink;
