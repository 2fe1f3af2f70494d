//! Start and end selectors for a consume window.
//!
//! Selectors are tagged variants rather than reserved integers, so a literal
//! epoch value can never be mistaken for a symbolic position.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const OFFSET_PREFIX: &str = "offset:";

pub const START_HELP: &str = "available start values:
now | newest : start after the last available message
oldest : start at the oldest available offset
YYYY-mm-dd HH:MM:SS : start at this date (UTC)
<epoch in milliseconds> : start at this epoch
offset:<n> : start at this offset in every partition";

pub const END_HELP: &str = "available end values:
now : stop at the current time
never : keep reading until interrupted
YYYY-mm-dd HH:MM:SS : stop at this date (UTC)
<epoch in milliseconds> : stop at this epoch";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    #[error("invalid time spec {0:?}")]
    InvalidTimeSpec(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    Oldest,
    Newest,
    Time(DateTime<Utc>),
    Offset(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndPosition {
    Now,
    Never,
    Time(DateTime<Utc>),
}

pub fn parse_start(input: &str) -> Result<StartPosition, PositionError> {
    let input = input.trim();
    match input {
        "oldest" => return Ok(StartPosition::Oldest),
        "now" | "newest" => return Ok(StartPosition::Newest),
        _ => {}
    }

    if let Some(offset) = input.strip_prefix(OFFSET_PREFIX) {
        return match offset.parse::<i64>() {
            Ok(offset) if offset >= 0 => Ok(StartPosition::Offset(offset)),
            _ => Err(PositionError::InvalidTimeSpec(input.to_string())),
        };
    }

    parse_instant(input).map(StartPosition::Time)
}

pub fn parse_end(input: &str) -> Result<EndPosition, PositionError> {
    let input = input.trim();
    match input {
        "now" => Ok(EndPosition::Now),
        "never" => Ok(EndPosition::Never),
        _ => parse_instant(input).map(EndPosition::Time),
    }
}

fn parse_instant(input: &str) -> Result<DateTime<Utc>, PositionError> {
    if let Ok(date_time) = NaiveDateTime::parse_from_str(input, DATE_TIME_FORMAT) {
        return Ok(date_time.and_utc());
    }

    input
        .parse::<i64>()
        .ok()
        .filter(|millis| *millis >= 0)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| PositionError::InvalidTimeSpec(input.to_string()))
}
