//! # Session sinks.
//!
//! A sink receives batches of accepted entries from the pipeline's flush
//! tick. [`FileSink`] appends one line per entry to a per-session file;
//! [`MemorySink`] keeps lines in memory (tests, headless runs).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::entry::LogEntry;
use crate::error::SinkError;

/// Destination for flushed log batches.
#[async_trait]
pub trait LogSink: Send + 'static {
    /// Human-readable target (path or label) for diagnostics.
    fn target(&self) -> String;

    /// Appends `batch` in order. An error degrades the pipeline to memory-only.
    async fn write_batch(&mut self, batch: &[LogEntry]) -> Result<(), SinkError>;
}

/// Append-only session file: `<dir>/session-<utc stamp>-<session id>.log`.
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    /// Creates `dir` if needed and opens the session file for appending.
    pub async fn create(dir: &Path, session: Uuid) -> Result<Self, SinkError> {
        let io_err = |path: &Path| {
            let target = path.display().to_string();
            move |source: std::io::Error| SinkError::Io { target, source }
        };
        fs::create_dir_all(dir).await.map_err(io_err(dir))?;

        let name = format!("session-{}-{session}.log", Utc::now().format("%Y%m%dT%H%M%SZ"));
        let path = dir.join(name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err(&path))?;
        Ok(Self { path, file })
    }

    /// Path of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogSink for FileSink {
    fn target(&self) -> String {
        self.path.display().to_string()
    }

    async fn write_batch(&mut self, batch: &[LogEntry]) -> Result<(), SinkError> {
        let mut buf = String::new();
        for entry in batch {
            buf.push_str(&entry.to_line());
            buf.push('\n');
        }
        let res = async {
            self.file.write_all(buf.as_bytes()).await?;
            self.file.flush().await
        }
        .await;
        res.map_err(|source| SinkError::Io {
            target: self.target(),
            source,
        })
    }
}

/// In-memory sink; clones share the same line buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    fn target(&self) -> String {
        "memory".to_string()
    }

    async fn write_batch(&mut self, batch: &[LogEntry]) -> Result<(), SinkError> {
        self.lines.lock().extend(batch.iter().map(LogEntry::to_line));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{Level, RawDiagnostic};

    #[tokio::test]
    async fn file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let session = Uuid::new_v4();
        let mut sink = FileSink::create(&dir.path().join("logs"), session).await.unwrap();

        let batch: Vec<_> = ["one", "two"]
            .iter()
            .map(|m| LogEntry::accept(RawDiagnostic::new(Level::Info, "audio", *m), session))
            .collect();
        sink.write_batch(&batch).await.unwrap();
        sink.write_batch(&batch[..1]).await.unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(" INFO audio one"));
        assert!(lines[2].ends_with(" INFO audio one"));
        assert!(sink.path().file_name().unwrap().to_string_lossy().contains(&session.to_string()));
    }
}
