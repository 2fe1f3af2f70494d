//! Splits produce input into records.

use std::io::{self, Read};
use std::thread;

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tokio_util::io::StreamReader;

use crate::message::ProducerRecord;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("record delimiter must not be empty")]
    EmptyDelimiter,
    #[error("record is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Frames a byte stream into records separated by a literal delimiter of any
/// length. Empty records are skipped and trailing data without a delimiter is
/// emitted as the last record.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    delimiter: Vec<u8>,
    // Bytes of the buffer already known not to start a delimiter
    searched: usize,
}

impl RecordCodec {
    pub fn new(delimiter: &str) -> Result<Self, InputError> {
        if delimiter.is_empty() {
            return Err(InputError::EmptyDelimiter);
        }
        Ok(Self {
            delimiter: delimiter.as_bytes().to_vec(),
            searched: 0,
        })
    }

    fn find_delimiter(&self, buf: &[u8]) -> Option<usize> {
        buf.get(self.searched..)?
            .windows(self.delimiter.len())
            .position(|window| window == self.delimiter.as_slice())
            .map(|position| position + self.searched)
    }
}

impl Decoder for RecordCodec {
    type Item = String;
    type Error = InputError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, InputError> {
        loop {
            let Some(end) = self.find_delimiter(&buf[..]) else {
                // A delimiter may straddle the next read
                self.searched = buf.len().saturating_sub(self.delimiter.len() - 1);
                return Ok(None);
            };

            let record = buf.split_to(end);
            buf.advance(self.delimiter.len());
            self.searched = 0;

            if !record.is_empty() {
                return Ok(Some(String::from_utf8(record.to_vec())?));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, InputError> {
        if let Some(record) = self.decode(buf)? {
            return Ok(Some(record));
        }
        self.searched = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let record = buf.split();
        Ok(Some(String::from_utf8(record.to_vec())?))
    }
}

/// Builds the record for one input line, splitting off the key at the first
/// key delimiter when one is configured and present.
pub fn parse_record(topic: &str, record: &str, key_delimiter: Option<&str>) -> ProducerRecord {
    if let Some((key, value)) = key_delimiter
        .filter(|delimiter| !delimiter.is_empty())
        .and_then(|delimiter| record.split_once(delimiter))
    {
        return ProducerRecord::new(topic, key, value);
    }

    ProducerRecord::new(topic, "", record)
}

/// Expands the escape sequences a shell user is likely to type for a delimiter.
pub fn unescape_delimiter(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

const READ_CHUNK_SIZE: usize = 64 * 1024;
const READ_AHEAD_CHUNKS: usize = 4;

/// Reads `reader` on a dedicated thread. Unlike `tokio::io::stdin`, a read
/// stuck waiting for input never holds up runtime shutdown: the thread is
/// simply abandoned when the process exits.
pub fn read_on_thread<R>(mut reader: R) -> io::Result<impl AsyncRead + Send + Unpin>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(READ_AHEAD_CHUNKS);

    thread::Builder::new()
        .name("input-reader".to_string())
        .spawn(move || {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            loop {
                let chunk = match reader.read(&mut buf) {
                    Ok(0) => return,
                    Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => Err(e),
                };
                let failed = chunk.is_err();
                if tx.blocking_send(chunk).is_err() || failed {
                    return;
                }
            }
        })?;

    let chunks = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    Ok(StreamReader::new(Box::pin(chunks)))
}
