//! Destinations for resolved traces.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use super::record::TraceRecord;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Receiver dropped")]
    Closed,
}

/// Something that accepts resolved traces.
///
/// `emit` is called from scrape tasks and must not block for long.
pub trait TraceSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn emit(&self, record: &TraceRecord) -> Result<(), SinkError>;
}

/// Prints one route line per trace on stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl TraceSink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    fn emit(&self, record: &TraceRecord) -> Result<(), SinkError> {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        writeln!(lock, "{}", record.display_line())?;
        lock.flush()?;
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SinkError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for JsonLinesSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn emit(&self, record: &TraceRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        // Each record is on disk before emit returns.
        writer.flush()?;
        Ok(())
    }
}

/// Forwards records into a tokio channel for in-process consumers.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TraceRecord>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TraceRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TraceSink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn emit(&self, record: &TraceRecord) -> Result<(), SinkError> {
        self.tx.send(record.clone()).map_err(|_| SinkError::Closed)
    }
}
