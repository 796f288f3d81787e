//! Output sinks for generated records.
//!
//! The [`Sink`] trait is the narrow contract between the engine and the
//! outside world: one serialized record in, no value out, safe under
//! concurrent calls from every actor. Console and file adapters are
//! provided; anything speaking a broker protocol lives behind this trait
//! in its own crate.

use parking_lot::Mutex;
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// A record failed delivery. Surfaced to the emitting actor; the engine
/// decides whether to continue or abort based on configuration.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write record: {0}")]
    Io(#[from] io::Error),

    #[error("failed to open sink file {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },
}

/// Accepts one serialized record at a time. Implementations must be safe
/// under concurrent calls from multiple actors.
pub trait Sink: Send + Sync {
    fn accept(&self, record: &str) -> Result<(), SinkError>;
}

/// Writes records to stdout, one per line, flushed per record so output
/// interleaves cleanly with whatever consumes it.
pub struct ConsoleSink {
    out: Mutex<io::Stdout>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(io::stdout()),
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ConsoleSink {
    fn accept(&self, record: &str) -> Result<(), SinkError> {
        let mut out = self.out.lock();
        writeln!(out, "{record}")?;
        out.flush()?;
        Ok(())
    }
}

/// Writes records to a file, one per line, flushed per record.
pub struct FileSink {
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    /// Create (truncating) the target file.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = File::create(path).map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl Sink for FileSink {
    fn accept(&self, record: &str) -> Result<(), SinkError> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{record}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Serde model for the output target. `{"type": "stdout"}` or
/// `{"type": "file", "path": "out.jsonl"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TargetConfig {
    Stdout,
    File { path: PathBuf },
}

impl TargetConfig {
    /// Build the configured sink.
    pub fn build(&self) -> Result<Arc<dyn Sink>, SinkError> {
        match self {
            TargetConfig::Stdout => Ok(Arc::new(ConsoleSink::new())),
            TargetConfig::File { path } => Ok(Arc::new(FileSink::create(path)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_writes_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");

        let sink = FileSink::create(&path).unwrap();
        sink.accept(r#"{"a":1}"#).unwrap();
        sink.accept(r#"{"a":2}"#).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn test_file_sink_open_failure_is_surfaced() {
        let result = FileSink::create(Path::new("/nonexistent-dir/records.jsonl"));
        assert!(matches!(result, Err(SinkError::Open { .. })));
    }

    #[test]
    fn test_target_config_parses() {
        let config: TargetConfig =
            serde_json::from_str(r#"{"type": "file", "path": "out.jsonl"}"#).unwrap();
        assert!(matches!(config, TargetConfig::File { .. }));
    }
}
