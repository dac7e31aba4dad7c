//! Server configuration

use crate::middleware::BeginFailurePolicy;

/// Message bus settings for SQL auditing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub service_name: String,
    pub kafka: KafkaConfig,
    pub begin_failure: BeginFailurePolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup (used by `from_env`)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let brokers = lookup("KAFKA_BROKERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let begin_failure = match lookup("TX_BEGIN_FAILURE").as_deref() {
            Some("continue") => BeginFailurePolicy::Continue,
            Some("abort") | None => BeginFailurePolicy::Abort,
            Some(other) => {
                tracing::warn!(value = %other, "Unknown TX_BEGIN_FAILURE, using abort");
                BeginFailurePolicy::Abort
            }
        };

        Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "host=localhost user=postgres dbname=app".into()),
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".into()),
            service_name: lookup("SERVICE_NAME").unwrap_or_else(|| "txscope".into()),
            kafka: KafkaConfig {
                brokers,
                topic: lookup("KAFKA_TOPIC").unwrap_or_else(|| "sqllog".into()),
            },
            begin_failure,
        }
    }
}
