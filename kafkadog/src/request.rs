use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::position::{EndPosition, StartPosition};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("topic name must not be empty")]
    EmptyTopic,
    #[error("invalid start / end combination: end {end} is not after start {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Where a partition reader starts, expressed the way the broker looks it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerStart {
    Oldest,
    Newest,
    /// Earliest offset whose timestamp is at or after this many epoch milliseconds
    Timestamp(i64),
    Offset(i64),
}

/// What to consume: a topic and a validated start / end window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeRequest {
    topic: String,
    start: BrokerStart,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

impl ConsumeRequest {
    pub fn new(
        topic: impl Into<String>,
        start: StartPosition,
        end: EndPosition,
    ) -> Result<Self, RequestError> {
        Self::new_at(topic, start, end, Utc::now())
    }

    /// Builds a request resolving every "now" against the same `now` instant.
    pub fn new_at(
        topic: impl Into<String>,
        start: StartPosition,
        end: EndPosition,
        now: DateTime<Utc>,
    ) -> Result<Self, RequestError> {
        let topic = topic.into();
        if topic.is_empty() {
            return Err(RequestError::EmptyTopic);
        }

        let (start, start_time) = match start {
            StartPosition::Oldest => (BrokerStart::Oldest, None),
            StartPosition::Newest => (BrokerStart::Newest, Some(now)),
            StartPosition::Time(t) => (BrokerStart::Timestamp(t.timestamp_millis()), Some(t)),
            StartPosition::Offset(offset) => (BrokerStart::Offset(offset), None),
        };

        let end_time = match end {
            EndPosition::Now => Some(now),
            EndPosition::Never => None,
            EndPosition::Time(t) => Some(t),
        };

        // Reading from an offset has no wall-clock anchor to compare against
        if let (Some(start), Some(end)) = (start_time, end_time) {
            if end <= start {
                return Err(RequestError::InvalidRange { start, end });
            }
        }

        Ok(Self {
            topic,
            start,
            start_time,
            end_time,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn start(&self) -> BrokerStart {
        self.start
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn is_bounded(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn for_partition(&self, partition: i32) -> PartitionRequest {
        PartitionRequest {
            request: self.clone(),
            partition,
        }
    }
}

/// A consume request narrowed to one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRequest {
    request: ConsumeRequest,
    partition: i32,
}

impl PartitionRequest {
    pub fn topic(&self) -> &str {
        self.request.topic()
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn start(&self) -> BrokerStart {
        self.request.start()
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.request.end_time()
    }

    pub fn is_bounded(&self) -> bool {
        self.request.is_bounded()
    }
}
