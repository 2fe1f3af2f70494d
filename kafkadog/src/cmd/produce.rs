use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::signals::cancel_on_shutdown_signal;
use crate::config::Config;
use crate::input::{parse_record, read_on_thread, unescape_delimiter, RecordCodec};
use crate::kafka::KafkaProducer;
use crate::producer::produce;

#[derive(Args, Debug)]
pub struct ProduceArgs {
    /// Topic to write to
    pub topic: String,

    /// Bootstrap servers, overrides KAFKA_HOSTS
    #[arg(short, long)]
    pub broker: Option<String>,

    /// Read records from this file instead of stdin
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Separates records; \n, \t, \r, \0 and \\ are unescaped
    #[arg(short, long, default_value = "\\n")]
    pub delimiter: String,

    /// Separates the key from the value inside a record
    #[arg(short = 'D', long)]
    pub key_delimiter: Option<String>,
}

pub async fn run(args: ProduceArgs, config: Config) -> anyhow::Result<()> {
    let codec = RecordCodec::new(&unescape_delimiter(&args.delimiter))?;
    let key_delimiter = args.key_delimiter.as_deref().map(unescape_delimiter);
    let config = config.with_broker(args.broker);

    let input: Box<dyn AsyncRead + Send + Unpin> = match &args.file {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?,
        ),
        None => Box::new(read_on_thread(std::io::stdin()).context("failed to read stdin")?),
    };

    let producer = KafkaProducer::new(&config.kafka)
        .await
        .context("failed to create kafka producer")?;

    let cancel = CancellationToken::new();
    cancel_on_shutdown_signal(cancel.clone());

    let topic = args.topic;
    let records = FramedRead::new(input, codec).map(|record| {
        record.map(|record| parse_record(&topic, &record, key_delimiter.as_deref()))
    });

    let result = produce(&producer, records, cancel.clone()).await;
    cancel.cancel();
    producer.close().await;

    let sent = result?;
    info!(topic = %topic, sent, "Produce finished");
    Ok(())
}
