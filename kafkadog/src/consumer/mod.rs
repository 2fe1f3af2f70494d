//! Partitioned, time-bounded consumption.
//!
//! [`consume`] lists the partitions of a topic and runs one
//! [`partition_reader::read_partition`] task per partition. All readers write
//! into the same bounded channel, so a slow receiver throttles every reader.
//! Ordering holds within a partition only.

pub mod partition_reader;
#[cfg(test)]
pub(crate) mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::message::Message;
use crate::request::{BrokerStart, ConsumeRequest};

pub use partition_reader::{read_partition, ReaderExit};

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("failed to list partitions of topic {topic}: {source}")]
    TopicResolution {
        topic: String,
        #[source]
        source: KafkaError,
    },

    #[error("failed to resolve offsets for {topic}/{partition}: {source}")]
    OffsetResolution {
        topic: String,
        partition: i32,
        #[source]
        source: KafkaError,
    },

    #[error("failed to open stream for {topic}/{partition}: {source}")]
    StreamOpen {
        topic: String,
        partition: i32,
        #[source]
        source: KafkaError,
    },

    #[error("partition reader panicked: {0}")]
    ReaderPanicked(#[from] tokio::task::JoinError),
}

/// How a consume run ended when no reader failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Every partition reached its end boundary (or the receiver went away)
    Drained,
    /// The caller's cancellation token fired
    Canceled,
}

/// What the partition readers need from the broker.
#[async_trait]
pub trait PartitionSource: Send + Sync + 'static {
    type Stream: PartitionStream;

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>, KafkaError>;

    /// Maps a start position onto a concrete offset of one partition.
    async fn resolve_offset(
        &self,
        topic: &str,
        partition: i32,
        start: BrokerStart,
    ) -> Result<i64, KafkaError>;

    /// Offset just past the last message currently available in the partition.
    async fn high_watermark(&self, topic: &str, partition: i32) -> Result<i64, KafkaError>;

    async fn open(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<Self::Stream, KafkaError>;

    /// How long an opened stream may stay silent while it still has data to
    /// deliver. Once the end time has passed, a reader that hears nothing for
    /// this long and sees an unchanged high watermark treats the partition as
    /// read, even if the watermark sits past the last message (transaction
    /// markers take offsets too).
    fn idle_timeout(&self) -> Duration {
        Duration::from_secs(2)
    }
}

/// Messages of one partition, in offset order.
#[async_trait]
pub trait PartitionStream: Send + 'static {
    /// Waits for the next message. `None` means the stream ended for good.
    /// Must be cancel safe: readers race it against cancellation.
    async fn next_message(&mut self) -> Option<Result<Message, KafkaError>>;

    /// Starts shutting the stream down without waiting for in-flight fetches.
    fn close(self)
    where
        Self: Sized;
}

/// Reads `request` from every partition of its topic into `output` until all
/// partitions hit their end boundary, one of them fails, or `cancel` fires.
///
/// The first reader error cancels the remaining readers and is returned once
/// they have all unwound. `output` is dropped on return, which closes the
/// channel for the receiver.
pub async fn consume<S: PartitionSource>(
    source: Arc<S>,
    request: ConsumeRequest,
    output: mpsc::Sender<Message>,
    cancel: CancellationToken,
) -> Result<ConsumeOutcome, ConsumeError> {
    let topic = request.topic().to_string();

    let partitions = source
        .partitions(&topic)
        .await
        .map_err(|source| ConsumeError::TopicResolution {
            topic: topic.clone(),
            source,
        })?;

    if partitions.is_empty() {
        return Err(ConsumeError::TopicResolution {
            topic,
            source: KafkaError::MetadataFetch(RDKafkaErrorCode::UnknownTopicOrPartition),
        });
    }

    info!(
        topic = %topic,
        partitions = partitions.len(),
        start = ?request.start(),
        end_time = ?request.end_time(),
        "Starting partition readers"
    );

    let group = cancel.child_token();
    let mut readers = JoinSet::new();

    for partition in partitions {
        let source = source.clone();
        let partition_request = request.for_partition(partition);
        let output = output.clone();
        let group = group.clone();

        readers.spawn(async move {
            read_partition(source.as_ref(), partition_request, output, group).await
        });
    }
    drop(output);

    let mut first_error = None;

    while let Some(joined) = readers.join_next().await {
        let error = match joined {
            Ok(Ok(exit)) => {
                debug!(topic = %topic, exit = ?exit, "Partition reader finished");
                continue;
            }
            Ok(Err(e)) => e,
            Err(e) => ConsumeError::from(e),
        };

        if first_error.is_none() {
            warn!(topic = %topic, error = %error, "Partition reader failed, stopping the others");
            group.cancel();
            first_error = Some(error);
        } else {
            warn!(topic = %topic, error = %error, "Another partition reader failed");
        }
    }

    match first_error {
        Some(error) => Err(error),
        None if cancel.is_cancelled() => Ok(ConsumeOutcome::Canceled),
        None => Ok(ConsumeOutcome::Drained),
    }
}
