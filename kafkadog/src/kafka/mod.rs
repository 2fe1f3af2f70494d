pub mod config;
pub mod producer;
pub mod source;

pub use producer::KafkaProducer;
pub use source::{KafkaPartitionStream, KafkaSource};

use rdkafka::error::KafkaError;
use tracing::warn;

/// Runs a blocking librdkafka call on the blocking pool. A panic inside `f`
/// resumes in the caller; a call dropped by runtime shutdown is `Canceled`.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, KafkaError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, KafkaError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            warn!("Blocking Kafka call did not complete: {}", e);
            Err(KafkaError::Canceled)
        }
    }
}
