//! Loadline: a paced HTTP load generator that writes one summary row per second.
//!
//! A fixed pool of workers issues requests against a small set of endpoints at a
//! controlled aggregate rate. Every completed request becomes an event stamped
//! with the wall-clock second it finished in. A single aggregator folds those
//! events into per-second buckets and streams one row per second, in order and
//! without gaps, to a [`Reporter`]:
//!
//! ```text
//! ts,rps,avg_ms,p50_ms,p95_ms,ok,err
//! 1718000001,50,12.417,11.020,20.112,50,0
//! 1718000002,0,,,,0,0
//! ```
//!
//! # Architecture
//!
//! - [`executor::WorkerPool`]: spawns N paced workers sharing one cancellation
//!   flag and one bounded event channel.
//! - [`metric::OutcomeEvent`]: what a worker emits per request (second, latency,
//!   status or failure).
//! - [`aggregate::SecondBucket`]: samples of one second.
//! - [`aggregator::EventAggregator`]: owns the timeline. Folds events, flushes
//!   idle seconds, drops the ones that arrive too late.
//! - [`report::SummaryRow`] and [`Reporter`]: the row and where it goes (CSV file,
//!   stdout, memory).
//! - [`Scenario`]: warmup, measurement window, shutdown.
//!
//! The binary wires these together from the command line (see [`config::Args`]);
//! [`http`] provides the request action it uses.
//!
//! # Guarantees
//!
//! - Exactly `run_secs` rows, with consecutive `ts` values.
//! - Warmup traffic never reaches a row.
//! - Once [`Scenario::run`] returns, no worker is left running.
//! - Every row is flushed as soon as it is written, so an interrupted run leaves a
//!   valid prefix behind.
//!
//! # Feature flags
//!
//! - `internals`: exposes the single-worker loop (`executor::run_worker` and its
//!   context) for benchmarking harnesses.

/// Per-second buckets
pub mod aggregate;
/// Ordered fold of events into rows
pub mod aggregator;
pub mod clock;
/// Command line and validated run settings
pub mod config;
pub mod error;
/// Paced workers and their shutdown
pub mod executor;
/// HTTP request action
pub mod http;
/// Request outcomes
pub mod metric;
/// Rows and reporters
pub mod report;
/// Run lifecycle
pub mod scenario;
/// Endpoints and payloads
pub mod target;

pub use clock::{Clock, SystemClock};
pub use error::{ConfigError, Error, Result, SinkError};
pub use report::{Reporter, SummaryRow};
pub use scenario::{RunSummary, Scenario};
pub use target::{Target, TargetSet};
