//! Engine error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A job could not be configured or started. Fatal before the run begins;
/// nothing is silently defaulted.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid workload: {0}")]
    Config(#[from] synthload_schema::ConfigError),

    #[error("invalid distribution: {0}")]
    Distribution(#[from] synthload_dist::DistError),

    #[error("use either a record target or a duration, but not both")]
    ConflictingTermination,

    #[error("workload file has no target and none was supplied")]
    MissingTarget,

    #[error("unknown workload type {0:?}")]
    UnknownWorkloadType(String),

    #[error("failed to read {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid workload JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to set up sink: {0}")]
    Sink(#[from] synthload_sink::SinkError),

    #[error("replay source {path:?} line {line}: {reason}")]
    ReplayRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("invalid replay configuration: {0}")]
    InvalidReplay(String),

    #[error("failed to spawn {name} thread: {source}")]
    Thread { name: &'static str, source: io::Error },
}
