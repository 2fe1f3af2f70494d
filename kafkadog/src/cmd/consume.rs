use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::signals::cancel_on_shutdown_signal;
use crate::config::Config;
use crate::consumer::consume;
use crate::formatter::{Formatter, DEFAULT_FORMAT, FORMAT_HELP};
use crate::kafka::KafkaSource;
use crate::position::{parse_end, parse_start, EndPosition, StartPosition, END_HELP, START_HELP};
use crate::request::ConsumeRequest;

#[derive(Args, Debug)]
pub struct ConsumeArgs {
    /// Topic to read from
    pub topic: String,

    /// Bootstrap servers, overrides KAFKA_HOSTS
    #[arg(short, long)]
    pub broker: Option<String>,

    /// Where to start reading
    #[arg(short, long, default_value = "now", value_parser = parse_start, long_help = START_HELP)]
    pub start: StartPosition,

    /// When to stop reading
    #[arg(short, long, default_value = "never", value_parser = parse_end, long_help = END_HELP)]
    pub end: EndPosition,

    /// Output template for each message
    #[arg(short, long, default_value = DEFAULT_FORMAT, long_help = FORMAT_HELP)]
    pub format: String,
}

pub async fn run(args: ConsumeArgs, config: Config) -> anyhow::Result<()> {
    let request = ConsumeRequest::new(args.topic, args.start, args.end)?;
    let formatter = Formatter::new(&args.format);
    let config = config.with_broker(args.broker);

    let source = Arc::new(
        KafkaSource::new(&config.kafka).context("failed to create kafka metadata client")?,
    );

    let (tx, mut rx) = mpsc::channel(config.message_buffer_size.max(1));
    let cancel = CancellationToken::new();
    cancel_on_shutdown_signal(cancel.clone());

    let readers = tokio::spawn(consume(source.clone(), request, tx, cancel.clone()));

    let mut stdout = io::stdout();
    let mut printed: u64 = 0;
    while let Some(message) = rx.recv().await {
        if let Err(e) = writeln!(stdout, "{}", formatter.format(&message)) {
            warn!("Stopped printing messages: {}", e);
            break;
        }
        printed += 1;
    }
    // Readers blocked on a full channel see it closed and stop
    drop(rx);

    let outcome = readers.await.context("consume task panicked")??;
    cancel.cancel();
    drop(source);

    info!(printed, outcome = ?outcome, "Consume finished");
    Ok(())
}
