//! Reads one partition from its resolved start offset until its end condition.

use chrono::{DateTime, Utc};
use rdkafka::error::KafkaError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ConsumeError, PartitionSource, PartitionStream};
use crate::message::Message;
use crate::request::PartitionRequest;

/// Why a partition reader stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The end time passed, or the reader caught up after it did
    Boundary,
    Canceled,
    ReceiverClosed,
}

/// Forwards the messages of one partition to `output`.
///
/// Without an end time this only returns on cancellation. With one, it stops
/// before the first message stamped after the end time, or once it has read
/// everything available and the end time is in the past.
pub async fn read_partition<S: PartitionSource>(
    source: &S,
    request: PartitionRequest,
    output: mpsc::Sender<Message>,
    cancel: CancellationToken,
) -> Result<ReaderExit, ConsumeError> {
    let topic = request.topic();
    let partition = request.partition();

    let start_offset = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(ReaderExit::Canceled),
        offset = source.resolve_offset(topic, partition, request.start()) => {
            offset.map_err(|e| offset_error(&request, e))?
        }
    };

    let high_watermark = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(ReaderExit::Canceled),
        high = source.high_watermark(topic, partition) => high.map_err(|e| offset_error(&request, e))?,
    };

    if let Some(end_time) = request.end_time() {
        if end_time <= Utc::now() && start_offset >= high_watermark {
            debug!(
                topic,
                partition, start_offset, high_watermark, "Nothing to read before the end time"
            );
            return Ok(ReaderExit::Boundary);
        }
    }

    let mut stream = source
        .open(topic, partition, start_offset)
        .await
        .map_err(|source| ConsumeError::StreamOpen {
            topic: topic.to_string(),
            partition,
            source,
        })?;

    info!(
        topic,
        partition, start_offset, high_watermark, "Reading partition"
    );

    let mut position = Position {
        next_offset: start_offset,
        high_watermark,
    };
    let result = forward(
        source,
        &request,
        &mut stream,
        &mut position,
        &output,
        &cancel,
    )
    .await;
    stream.close();

    match &result {
        Ok(exit) => info!(
            topic,
            partition,
            next_offset = position.next_offset,
            exit = ?exit,
            "Stopped reading partition"
        ),
        Err(e) => warn!(topic, partition, error = %e, "Partition reader failed"),
    }

    result
}

struct Position {
    next_offset: i64,
    high_watermark: i64,
}

impl Position {
    fn caught_up(&self) -> bool {
        self.next_offset >= self.high_watermark
    }
}

async fn forward<S: PartitionSource>(
    source: &S,
    request: &PartitionRequest,
    stream: &mut S::Stream,
    position: &mut Position,
    output: &mpsc::Sender<Message>,
    cancel: &CancellationToken,
) -> Result<ReaderExit, ConsumeError> {
    let end_time = request.end_time();

    // Wakes the reader at the end time so an idle partition can finish
    let until_end = end_time.and_then(|end| (end - Utc::now()).to_std().ok());
    let mut end_timer_armed = until_end.is_some();
    let end_timer = tokio::time::sleep(until_end.unwrap_or_default());
    tokio::pin!(end_timer);

    let idle_timeout = source.idle_timeout();

    loop {
        let draining = end_time.is_some_and(end_has_passed);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(ReaderExit::Canceled),
            _ = &mut end_timer, if end_timer_armed => {
                end_timer_armed = false;
                refresh_high_watermark(source, request, position).await?;
                if position.caught_up() {
                    return Ok(ReaderExit::Boundary);
                }
            }
            _ = tokio::time::sleep(idle_timeout), if draining => {
                let previous = position.high_watermark;
                refresh_high_watermark(source, request, position).await?;
                if position.caught_up() || position.high_watermark == previous {
                    debug!(
                        topic = request.topic(),
                        partition = request.partition(),
                        next_offset = position.next_offset,
                        high_watermark = position.high_watermark,
                        "Partition idle after the end time"
                    );
                    return Ok(ReaderExit::Boundary);
                }
            }
            next = stream.next_message() => {
                let message = match next {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        warn!(
                            topic = request.topic(),
                            partition = request.partition(),
                            error = %e,
                            "Error reading partition, skipping"
                        );
                        continue;
                    }
                    None => return Ok(ReaderExit::Boundary),
                };

                if end_time.is_some_and(|end| message.timestamp > end) {
                    return Ok(ReaderExit::Boundary);
                }

                position.next_offset = message.offset + 1;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(ReaderExit::Canceled),
                    sent = output.send(message) => {
                        if sent.is_err() {
                            return Ok(ReaderExit::ReceiverClosed);
                        }
                    }
                }

                // Before the end time a caught-up reader keeps waiting whatever the watermark says
                if position.caught_up() && end_time.is_some_and(end_has_passed) {
                    refresh_high_watermark(source, request, position).await?;
                    if position.caught_up() {
                        return Ok(ReaderExit::Boundary);
                    }
                }
            }
        }
    }
}

async fn refresh_high_watermark<S: PartitionSource>(
    source: &S,
    request: &PartitionRequest,
    position: &mut Position,
) -> Result<(), ConsumeError> {
    position.high_watermark = source
        .high_watermark(request.topic(), request.partition())
        .await
        .map_err(|e| offset_error(request, e))?;
    Ok(())
}

fn end_has_passed(end: DateTime<Utc>) -> bool {
    end <= Utc::now()
}

fn offset_error(request: &PartitionRequest, source: KafkaError) -> ConsumeError {
    ConsumeError::OffsetResolution {
        topic: request.topic().to_string(),
        partition: request.partition(),
        source,
    }
}
