use async_trait::async_trait;
use futures::{Stream, StreamExt};
use rdkafka::error::KafkaError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::input::InputError;
use crate::message::ProducerRecord;

#[derive(Error, Debug)]
pub enum ProduceError {
    #[error("failed to produce to kafka: {0}")]
    Send(#[source] KafkaError),
    #[error(transparent)]
    Input(#[from] InputError),
}

/// Publishes one record at a time, returning once the broker acknowledged it.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn send(&self, record: ProducerRecord) -> Result<(), ProduceError>;
}

/// Sends `records` in order until the input is exhausted or `cancel` fires.
/// Stops at the first failure; records already sent stay sent.
pub async fn produce<K, R>(
    sink: &K,
    mut records: R,
    cancel: CancellationToken,
) -> Result<usize, ProduceError>
where
    K: RecordSink + ?Sized,
    R: Stream<Item = Result<ProducerRecord, InputError>> + Unpin,
{
    let mut sent = 0;

    loop {
        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(sent, "Produce interrupted");
                return Ok(sent);
            }
            record = records.next() => match record {
                Some(record) => record?,
                None => break,
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(sent, "Produce interrupted");
                return Ok(sent);
            }
            result = sink.send(record) => result?,
        }
        sent += 1;
    }

    debug!(sent, "Input exhausted");
    Ok(sent)
}
