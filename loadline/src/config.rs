use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{error::ConfigError, executor::PoolConfig, target::TargetSet};

/// Command line of the `loadline` binary.
///
/// The camelCase spellings (`--warmupSec`, `--runSec`, `--targetRPS`) are the
/// primary names. Kebab-case aliases are accepted too.
#[derive(Debug, Clone, Parser)]
#[command(name = "loadline", version, about, long_about = None)]
pub struct Args {
    /// Number of concurrent workers
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Seconds of traffic before measurement starts
    #[arg(long = "warmupSec", visible_alias = "warmup-sec", default_value_t = 10)]
    pub warmup_sec: u64,

    /// Seconds of measured traffic; one CSV row per second
    #[arg(long = "runSec", visible_alias = "run-sec", default_value_t = 120)]
    pub run_sec: u64,

    /// Output CSV path, or `-` for standard output
    #[arg(long, default_value = "load_timeseries.csv")]
    pub out: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 5.0)]
    pub timeout: f64,

    /// Aggregate requests per second across all workers
    #[arg(long = "targetRPS", visible_alias = "target-rps", default_value_t = 50.0)]
    pub target_rps: f64,

    /// Base URL relative target paths are resolved against
    #[arg(long, default_value = "http://localhost:8080")]
    pub base_url: String,

    /// JSON file with `[{"path": ..., "payload": ...}]` target declarations
    #[arg(long, conflicts_with = "url")]
    pub targets: Option<PathBuf>,

    /// Hit a single endpoint instead of the built-in mix
    #[arg(long)]
    pub url: Option<String>,

    /// JSON body sent with `--url`
    #[arg(long, requires = "url")]
    pub body: Option<String>,

    /// How often the aggregator checks for idle seconds, in milliseconds
    #[arg(long, default_value_t = 200)]
    pub poll_ms: u64,

    /// Events buffered between workers and the aggregator
    #[arg(long, default_value_t = 65_536)]
    pub channel_capacity: usize,

    /// Log filter, e.g. `info` or `loadline=debug`. RUST_LOG wins when set.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    File(PathBuf),
    Stdout,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub pool: PoolConfig,
    pub targets: TargetSet,
    pub warmup: Duration,
    pub run_secs: u64,
    pub poll_interval: Duration,
    pub output: Output,
}

impl Args {
    pub fn into_config(self) -> Result<RunConfig, ConfigError> {
        if self.run_sec == 0 {
            return Err(ConfigError::EmptyRun);
        }
        if self.poll_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            return Err(ConfigError::InvalidTimeout(self.timeout));
        }
        let request_timeout = Duration::try_from_secs_f64(self.timeout)
            .map_err(|_| ConfigError::InvalidTimeout(self.timeout))?;

        let pool = PoolConfig::builder()
            .workers(self.concurrency)
            .target_rps(self.target_rps)
            .request_timeout(request_timeout)
            .channel_capacity(self.channel_capacity)
            .build();
        pool.validate()?;

        let targets = match (&self.targets, &self.url) {
            (Some(path), _) => TargetSet::from_file(&self.base_url, path)?,
            (None, Some(url)) => TargetSet::single(&self.base_url, url, self.body.as_deref())?,
            (None, None) => TargetSet::defaults(&self.base_url)?,
        };

        let output = if self.out.as_os_str() == "-" {
            Output::Stdout
        } else {
            Output::File(self.out)
        };

        Ok(RunConfig {
            pool,
            targets,
            warmup: Duration::from_secs(self.warmup_sec),
            run_secs: self.run_sec,
            poll_interval: Duration::from_millis(self.poll_ms),
            output,
        })
    }
}
