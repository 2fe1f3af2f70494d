use chrono::{DateTime, Utc};
use rdkafka::message::BorrowedMessage;
use rdkafka::Message as _;

/// A message read from one partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: DateTime<Utc>,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

impl Message {
    /// Copies a message out of the consumer's buffer. A message without a
    /// timestamp gets the Unix epoch, a null payload an empty value.
    pub fn from_borrowed_message(message: &BorrowedMessage<'_>) -> Self {
        let timestamp = message
            .timestamp()
            .to_millis()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            timestamp,
            key: message.key().map(<[u8]>::to_vec),
            value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }
}

/// A message to publish. Partition, offset and timestamp are assigned by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProducerRecord {
    pub topic: String,
    pub key: String,
    pub value: String,
}

impl ProducerRecord {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    /// The key to put on the wire, if any.
    pub fn wire_key(&self) -> Option<&str> {
        (!self.key.is_empty()).then_some(self.key.as_str())
    }
}
