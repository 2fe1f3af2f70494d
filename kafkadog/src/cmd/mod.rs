use clap::{Parser, Subcommand};

use crate::config::Config;

pub mod consume;
pub mod produce;
mod signals;

#[derive(Parser)]
#[command(version, about = "Read from and write to Kafka topics", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print messages from every partition of a topic
    Consume(consume::ConsumeArgs),
    /// Publish delimited records read from a file or stdin
    Produce(produce::ProduceArgs),
}

impl Cli {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        match self.command {
            Commands::Consume(args) => consume::run(args, config).await,
            Commands::Produce(args) => produce::run(args, config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::position::{EndPosition, StartPosition};

    #[test]
    fn consume_defaults_to_live_tail() {
        let cli = Cli::try_parse_from(["kafkadog", "consume", "orders"]).unwrap();

        let Commands::Consume(args) = cli.command else {
            panic!("expected consume");
        };
        assert_eq!(args.topic, "orders");
        assert_eq!(args.start, StartPosition::Newest);
        assert_eq!(args.end, EndPosition::Never);
        assert_eq!(args.format, "%v");
        assert_eq!(args.broker, None);
    }

    #[test]
    fn consume_parses_positions() {
        let cli = Cli::try_parse_from([
            "kafkadog",
            "consume",
            "orders",
            "-b",
            "kafka:9092",
            "-s",
            "oldest",
            "-e",
            "1552555613000",
            "-f",
            "%k %v",
        ])
        .unwrap();

        let Commands::Consume(args) = cli.command else {
            panic!("expected consume");
        };
        assert_eq!(args.broker.as_deref(), Some("kafka:9092"));
        assert_eq!(args.start, StartPosition::Oldest);
        assert_eq!(
            args.end,
            EndPosition::Time(DateTime::<Utc>::from_timestamp_millis(1552555613000).unwrap())
        );
        assert_eq!(args.format, "%k %v");
    }

    #[test]
    fn invalid_position_is_rejected_before_running() {
        let result = Cli::try_parse_from(["kafkadog", "consume", "orders", "-s", "yesterday"]);
        assert!(result.is_err());
    }

    #[test]
    fn produce_takes_delimiters() {
        let cli = Cli::try_parse_from([
            "kafkadog", "produce", "orders", "-f", "input.txt", "-d", "\\t", "-D", ":",
        ])
        .unwrap();

        let Commands::Produce(args) = cli.command else {
            panic!("expected produce");
        };
        assert_eq!(args.file.as_deref(), Some(std::path::Path::new("input.txt")));
        assert_eq!(args.delimiter, "\\t");
        assert_eq!(args.key_delimiter.as_deref(), Some(":"));
    }
}
