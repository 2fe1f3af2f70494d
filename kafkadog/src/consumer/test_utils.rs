use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;

use super::{PartitionSource, PartitionStream};
use crate::message::Message;
use crate::request::BrokerStart;

pub fn message(topic: &str, partition: i32, offset: i64, millis: i64) -> Message {
    Message {
        topic: topic.to_string(),
        partition,
        offset,
        timestamp: DateTime::<Utc>::from_timestamp_millis(millis).unwrap(),
        key: Some(format!("key-{offset}").into_bytes()),
        value: format!("value-{partition}-{offset}").into_bytes(),
    }
}

#[derive(Default)]
struct Shared {
    partitions: Mutex<BTreeMap<(String, i32), Vec<Message>>>,
    failing_offsets: Mutex<HashSet<i32>>,
    failing_opens: Mutex<HashSet<i32>>,
    read_errors: Mutex<HashSet<(i32, i64)>>,
    delivered: Mutex<HashMap<(String, i32), usize>>,
    // Watermarks past the last stored message, as left by transaction markers
    high_watermarks: Mutex<HashMap<i32, i64>>,
    watermark_lookups: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// In-memory broker. Partitions are fixed at creation time; a stream that
/// has handed out every message waits forever, like a live partition.
#[derive(Clone, Default)]
pub struct MemorySource {
    shared: Arc<Shared>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a partition holding one message per timestamp, at offsets 0..n.
    pub fn add_partition(&self, topic: &str, partition: i32, timestamps: &[i64]) {
        let messages = timestamps
            .iter()
            .zip(0..)
            .map(|(millis, offset)| message(topic, partition, offset, *millis))
            .collect();
        self.shared
            .partitions
            .lock()
            .unwrap()
            .insert((topic.to_string(), partition), messages);
    }

    /// Reports `high_watermark` for `partition` instead of its message count.
    pub fn set_high_watermark(&self, partition: i32, high_watermark: i64) {
        self.shared
            .high_watermarks
            .lock()
            .unwrap()
            .insert(partition, high_watermark);
    }

    pub fn fail_offsets_for(&self, partition: i32) {
        self.shared.failing_offsets.lock().unwrap().insert(partition);
    }

    pub fn fail_open_for(&self, partition: i32) {
        self.shared.failing_opens.lock().unwrap().insert(partition);
    }

    /// Makes the stream yield one error right before the message at `offset`.
    pub fn inject_read_error(&self, partition: i32, offset: i64) {
        self.shared
            .read_errors
            .lock()
            .unwrap()
            .insert((partition, offset));
    }

    pub fn all_messages(&self, topic: &str) -> Vec<Message> {
        self.shared
            .partitions
            .lock()
            .unwrap()
            .iter()
            .filter(|((t, _), _)| t == topic)
            .flat_map(|(_, messages)| messages.iter().cloned())
            .collect()
    }

    pub fn delivered(&self, topic: &str, partition: i32) -> usize {
        self.shared
            .delivered
            .lock()
            .unwrap()
            .get(&(topic.to_string(), partition))
            .copied()
            .unwrap_or_default()
    }

    pub fn watermark_lookups(&self) -> usize {
        self.shared.watermark_lookups.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn messages(&self, topic: &str, partition: i32) -> Result<Vec<Message>, KafkaError> {
        if self.shared.failing_offsets.lock().unwrap().contains(&partition) {
            return Err(KafkaError::OffsetFetch(
                RDKafkaErrorCode::BrokerTransportFailure,
            ));
        }
        self.shared
            .partitions
            .lock()
            .unwrap()
            .get(&(topic.to_string(), partition))
            .cloned()
            .ok_or(KafkaError::OffsetFetch(
                RDKafkaErrorCode::UnknownTopicOrPartition,
            ))
    }

    fn high(&self, partition: i32, messages: &[Message]) -> i64 {
        self.shared
            .high_watermarks
            .lock()
            .unwrap()
            .get(&partition)
            .copied()
            .unwrap_or(messages.len() as i64)
    }
}

#[async_trait]
impl PartitionSource for MemorySource {
    type Stream = MemoryStream;

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>, KafkaError> {
        let partitions: Vec<i32> = self
            .shared
            .partitions
            .lock()
            .unwrap()
            .keys()
            .filter(|(t, _)| t == topic)
            .map(|(_, partition)| *partition)
            .collect();

        if partitions.is_empty() {
            return Err(KafkaError::MetadataFetch(
                RDKafkaErrorCode::UnknownTopicOrPartition,
            ));
        }
        Ok(partitions)
    }

    async fn resolve_offset(
        &self,
        topic: &str,
        partition: i32,
        start: BrokerStart,
    ) -> Result<i64, KafkaError> {
        let messages = self.messages(topic, partition)?;
        let high = self.high(partition, &messages);

        Ok(match start {
            BrokerStart::Oldest => 0,
            BrokerStart::Newest => high,
            BrokerStart::Offset(offset) => offset.clamp(0, high),
            BrokerStart::Timestamp(millis) => messages
                .iter()
                .find(|m| m.timestamp.timestamp_millis() >= millis)
                .map_or(high, |m| m.offset),
        })
    }

    async fn high_watermark(&self, topic: &str, partition: i32) -> Result<i64, KafkaError> {
        self.shared.watermark_lookups.fetch_add(1, Ordering::SeqCst);
        let messages = self.messages(topic, partition)?;
        Ok(self.high(partition, &messages))
    }

    async fn open(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<MemoryStream, KafkaError> {
        if self.shared.failing_opens.lock().unwrap().contains(&partition) {
            return Err(KafkaError::Subscription(format!(
                "cannot assign {topic}/{partition}"
            )));
        }

        let messages = self
            .messages(topic, partition)?
            .into_iter()
            .filter(|m| m.offset >= offset)
            .collect();
        self.shared.opened.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryStream {
            shared: self.shared.clone(),
            topic: topic.to_string(),
            partition,
            messages,
            next: 0,
        })
    }

    fn idle_timeout(&self) -> Duration {
        Duration::from_millis(50)
    }
}

pub struct MemoryStream {
    shared: Arc<Shared>,
    topic: String,
    partition: i32,
    messages: Vec<Message>,
    next: usize,
}

#[async_trait]
impl PartitionStream for MemoryStream {
    async fn next_message(&mut self) -> Option<Result<Message, KafkaError>> {
        let Some(message) = self.messages.get(self.next).cloned() else {
            return std::future::pending().await;
        };

        let injected = self
            .shared
            .read_errors
            .lock()
            .unwrap()
            .remove(&(self.partition, message.offset));
        if injected {
            return Some(Err(KafkaError::MessageConsumption(
                RDKafkaErrorCode::BrokerTransportFailure,
            )));
        }

        self.next += 1;
        *self
            .shared
            .delivered
            .lock()
            .unwrap()
            .entry((self.topic.clone(), self.partition))
            .or_default() += 1;
        Some(Ok(message))
    }

    fn close(self) {
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
    }
}
