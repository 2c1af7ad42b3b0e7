use std::path::PathBuf;

use thiserror::Error;

/// Startup problems. All of them are detected before a worker is spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("concurrency must be at least 1")]
    NoWorkers,

    #[error("targetRPS must be a finite number above zero, got {0}")]
    InvalidRate(f64),

    #[error("runSec must be at least 1")]
    EmptyRun,

    #[error("timeout must be a finite number of seconds above zero, got {0}")]
    InvalidTimeout(f64),

    #[error("poll interval must be above zero")]
    InvalidPollInterval,

    #[error("channel capacity must be at least 1")]
    InvalidChannelCapacity,

    #[error("no targets configured")]
    NoTargets,

    #[error("invalid target url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("--body is not valid JSON: {0}")]
    InvalidBody(#[source] serde_json::Error),

    #[error("failed to read targets file {path}: {source}")]
    TargetsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse targets file {path}: {source}")]
    TargetsFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The output stream could not be written. Fatal: a run without durable rows
/// is not a measurement.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open output {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write summary row: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode summary row: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
