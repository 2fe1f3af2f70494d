use rdkafka::ClientConfig;

use crate::config::KafkaConfig;

/// Builds rdkafka client configurations from [`KafkaConfig`].
///
/// - `for_metadata`: the shared client used for partition listing, watermark
///   and offset lookups.
/// - `for_partition_stream`: an assign-only consumer reading one partition.
/// - `for_producer`: a producer that reports every delivery.
///
/// Consumers never commit, `group.id` is only set because librdkafka wants one.
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn for_metadata(kafka: &KafkaConfig) -> Self {
        let mut builder = Self::base(kafka);
        builder
            .config
            .set("group.id", &kafka.kafka_consumer_group)
            .set("enable.auto.commit", "false");
        builder
    }

    pub fn for_partition_stream(kafka: &KafkaConfig) -> Self {
        let mut builder = Self::base(kafka);
        builder
            .config
            .set("group.id", &kafka.kafka_consumer_group)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", "earliest")
            .set("fetch.wait.max.ms", kafka.kafka_fetch_wait_max_ms.to_string());
        builder
    }

    pub fn for_producer(kafka: &KafkaConfig) -> Self {
        let mut builder = Self::base(kafka);
        builder
            .config
            .set("linger.ms", "0")
            .set(
                "message.timeout.ms",
                kafka.kafka_message_timeout_ms.to_string(),
            )
            .set("compression.codec", &kafka.kafka_compression_codec);
        builder
    }

    fn base(kafka: &KafkaConfig) -> Self {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &kafka.kafka_hosts)
            .set("client.id", &kafka.kafka_client_id);

        if kafka.kafka_tls {
            config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        }

        Self { config }
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
