use std::time::Duration;

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, error, info};

use super::config::ClientConfigBuilder;
use super::run_blocking;
use crate::config::KafkaConfig;
use crate::message::ProducerRecord;
use crate::producer::{ProduceError, RecordSink};

pub struct KafkaProducer {
    producer: FutureProducer,
    flush_timeout: Duration,
}

impl KafkaProducer {
    /// Creates the producer and checks the brokers answer a metadata request.
    pub async fn new(kafka: &KafkaConfig) -> Result<Self, KafkaError> {
        let client_config = ClientConfigBuilder::for_producer(kafka).build();
        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer = client_config.create()?;

        let timeout = kafka.metadata_timeout();
        let ping = producer.clone();
        let metadata = run_blocking(move || {
            ping.client()
                .fetch_metadata(None, timeout)
                .map(|metadata| metadata.topics().len())
        })
        .await;

        match metadata {
            Ok(topics) => {
                info!("Successfully connected to Kafka brokers. Found {topics} topics.");
            }
            Err(error) => {
                error!("Failed to fetch metadata from Kafka brokers: {:?}", error);
                return Err(error);
            }
        }

        Ok(Self {
            producer,
            flush_timeout: Duration::from_millis(kafka.kafka_message_timeout_ms.into()),
        })
    }

    /// Waits for queued records to be delivered. Failures are logged, not returned.
    pub async fn close(self) {
        let producer = self.producer;
        let timeout = self.flush_timeout;
        let flushed = run_blocking(move || producer.flush(timeout)).await;

        if let Err(error) = flushed {
            error!("Failed to flush producer: {}", error);
        }
    }
}

#[async_trait]
impl RecordSink for KafkaProducer {
    async fn send(&self, record: ProducerRecord) -> Result<(), ProduceError> {
        let mut future_record = FutureRecord::<str, str>::to(&record.topic).payload(&record.value);
        if let Some(key) = record.wire_key() {
            future_record = future_record.key(key);
        }

        match self.producer.send(future_record, Timeout::Never).await {
            Ok(_) => Ok(()),
            Err((error, _)) => Err(ProduceError::Send(error)),
        }
    }
}
