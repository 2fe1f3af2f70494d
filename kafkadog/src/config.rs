use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Debug, Clone)]
pub struct Config {
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    // Capacity of the channel merging all partition readers
    #[envconfig(from = "MESSAGE_BUFFER_SIZE", default = "256")]
    pub message_buffer_size: usize,

    #[envconfig(from = "LOG_LEVEL", default = "kafkadog=info,warn")]
    pub log_level: String,
}

#[derive(Envconfig, Debug, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "kafkadog")]
    pub kafka_client_id: String,

    // Never used to commit offsets, librdkafka just wants one on consumers
    #[envconfig(default = "kafkadog")]
    pub kafka_consumer_group: String,

    #[envconfig(default = "10000")]
    pub kafka_metadata_timeout_ms: u64, // Metadata, watermark and offset lookups

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message

    #[envconfig(default = "500")]
    pub kafka_fetch_wait_max_ms: u32,

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd
}

impl Config {
    /// Overrides the bootstrap servers when one was passed on the command line.
    pub fn with_broker(mut self, broker: Option<String>) -> Self {
        if let Some(broker) = broker {
            self.kafka.kafka_hosts = broker;
        }
        self
    }
}

impl KafkaConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.kafka_metadata_timeout_ms)
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            kafka_hosts: "localhost:9092".to_string(),
            kafka_tls: false,
            kafka_client_id: "kafkadog".to_string(),
            kafka_consumer_group: "kafkadog".to_string(),
            kafka_metadata_timeout_ms: 10000,
            kafka_message_timeout_ms: 20000,
            kafka_fetch_wait_max_ms: 500,
            kafka_compression_codec: "none".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_flag_overrides_hosts() {
        let config = Config {
            kafka: KafkaConfig::default(),
            message_buffer_size: 256,
            log_level: "info".to_string(),
        };

        let config = config.with_broker(Some("kafka:29092".to_string()));
        assert_eq!(config.kafka.kafka_hosts, "kafka:29092");

        let config = config.with_broker(None);
        assert_eq!(config.kafka.kafka_hosts, "kafka:29092");
    }

    #[test]
    fn metadata_timeout_is_in_millis() {
        let config = KafkaConfig {
            kafka_metadata_timeout_ms: 1500,
            ..KafkaConfig::default()
        };
        assert_eq!(config.metadata_timeout(), Duration::from_millis(1500));
    }
}
