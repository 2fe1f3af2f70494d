use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Offset, TopicPartitionList};
use tracing::debug;

use super::config::ClientConfigBuilder;
use super::run_blocking;
use crate::config::KafkaConfig;
use crate::consumer::{PartitionSource, PartitionStream};
use crate::message::Message;
use crate::request::BrokerStart;

/// [`PartitionSource`] backed by a Kafka cluster.
///
/// One shared `BaseConsumer` answers metadata, watermark and offset lookups;
/// each opened partition gets its own assign-only `StreamConsumer`. librdkafka
/// lookups block, so they run on tokio's blocking pool.
pub struct KafkaSource {
    client: Arc<BaseConsumer>,
    stream_config: ClientConfig,
    timeout: Duration,
    idle_timeout: Duration,
}

impl KafkaSource {
    pub fn new(kafka: &KafkaConfig) -> Result<Self, KafkaError> {
        let client: BaseConsumer = ClientConfigBuilder::for_metadata(kafka).build().create()?;
        debug!(brokers = %kafka.kafka_hosts, "Created Kafka metadata client");

        Ok(Self {
            client: Arc::new(client),
            stream_config: ClientConfigBuilder::for_partition_stream(kafka).build(),
            timeout: kafka.metadata_timeout(),
            // A few empty fetches in a row
            idle_timeout: Duration::from_millis(u64::from(kafka.kafka_fetch_wait_max_ms) * 4),
        })
    }

    async fn lookup<T, F>(&self, f: F) -> Result<T, KafkaError>
    where
        T: Send + 'static,
        F: FnOnce(&BaseConsumer, Duration) -> Result<T, KafkaError> + Send + 'static,
    {
        let client = self.client.clone();
        let timeout = self.timeout;
        run_blocking(move || f(&client, timeout)).await
    }
}

#[async_trait]
impl PartitionSource for KafkaSource {
    type Stream = KafkaPartitionStream;

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>, KafkaError> {
        let topic = topic.to_string();
        self.lookup(move |client, timeout| {
            let metadata = client.fetch_metadata(Some(topic.as_str()), timeout)?;
            let topic_metadata = metadata
                .topics()
                .iter()
                .find(|t| t.name() == topic)
                .ok_or(KafkaError::MetadataFetch(
                    RDKafkaErrorCode::UnknownTopicOrPartition,
                ))?;

            if let Some(error) = topic_metadata.error() {
                return Err(KafkaError::MetadataFetch(error.into()));
            }

            Ok(topic_metadata.partitions().iter().map(|p| p.id()).collect())
        })
        .await
    }

    async fn resolve_offset(
        &self,
        topic: &str,
        partition: i32,
        start: BrokerStart,
    ) -> Result<i64, KafkaError> {
        let topic = topic.to_string();
        self.lookup(move |client, timeout| match start {
            // Out of range offsets would make the broker reset to the oldest one
            BrokerStart::Offset(offset) => {
                let (low, high) = client.fetch_watermarks(&topic, partition, timeout)?;
                Ok(offset.max(low).min(high))
            }
            BrokerStart::Oldest => Ok(client.fetch_watermarks(&topic, partition, timeout)?.0),
            BrokerStart::Newest => Ok(client.fetch_watermarks(&topic, partition, timeout)?.1),
            BrokerStart::Timestamp(millis) => {
                let mut query = TopicPartitionList::new();
                query.add_partition_offset(&topic, partition, Offset::Offset(millis))?;
                let resolved = client.offsets_for_times(query, timeout)?;

                let elem = resolved.find_partition(&topic, partition).ok_or(
                    KafkaError::OffsetFetch(RDKafkaErrorCode::UnknownTopicOrPartition),
                )?;
                elem.error()?;

                match elem.offset() {
                    Offset::Offset(offset) => Ok(offset),
                    // No message at or after the timestamp yet
                    _ => Ok(client.fetch_watermarks(&topic, partition, timeout)?.1),
                }
            }
        })
        .await
    }

    async fn high_watermark(&self, topic: &str, partition: i32) -> Result<i64, KafkaError> {
        let topic = topic.to_string();
        self.lookup(move |client, timeout| {
            Ok(client.fetch_watermarks(&topic, partition, timeout)?.1)
        })
        .await
    }

    async fn open(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<KafkaPartitionStream, KafkaError> {
        let consumer: StreamConsumer = self.stream_config.create()?;

        let mut assignment = TopicPartitionList::new();
        assignment.add_partition_offset(topic, partition, Offset::Offset(offset))?;
        consumer.assign(&assignment)?;

        Ok(KafkaPartitionStream {
            consumer: Some(consumer),
        })
    }

    fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

pub struct KafkaPartitionStream {
    consumer: Option<StreamConsumer>,
}

#[async_trait]
impl PartitionStream for KafkaPartitionStream {
    async fn next_message(&mut self) -> Option<Result<Message, KafkaError>> {
        let consumer = self.consumer.as_ref()?;
        Some(
            consumer
                .recv()
                .await
                .map(|message| Message::from_borrowed_message(&message)),
        )
    }

    fn close(self) {
        drop(self);
    }
}

impl Drop for KafkaPartitionStream {
    fn drop(&mut self) {
        let Some(consumer) = self.consumer.take() else {
            return;
        };

        // Closing waits for in-flight fetches, keep that off the reader
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || drop(consumer));
            }
            Err(_) => drop(consumer),
        }
    }
}
