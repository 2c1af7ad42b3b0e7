//! Worker pool: paced request issuers and their coordinated shutdown
//!
//! A [`WorkerPool`] fans an aggregate target rate out over N worker tasks on the
//! current tokio runtime. Every worker is paced independently at
//! `target_rps / workers` requests per second (fractional rates are fine: 2 RPS
//! over 4 workers means one request every two seconds per worker).
//!
//! Workers do not talk to each other. They share:
//! - the immutable [`TargetSet`],
//! - the [`Clock`] used to stamp arrival seconds,
//! - one shutdown signal (a `watch` channel that flips false → true exactly once),
//! - the sending half of the event channel.
//!
//! # High-level flow
//! 1. [`WorkerPool::start`] validates the config, creates the event channel and
//!    spawns the workers. The receiving half is returned to the caller, which
//!    hands it to the aggregator.
//! 2. Each worker loops: pick a target, run the `action` under the request
//!    timeout, emit one [`OutcomeEvent`], sleep out the rest of its interval.
//! 3. [`WorkerPool::signal_stop`] flips the signal. A sleeping worker, or one
//!    blocked on a full channel, wakes up and exits at once. A worker with a
//!    request in flight lets it finish or time out first, so shutdown takes at
//!    most one request timeout.
//! 4. [`WorkerPool::join`] waits for all workers and merges their stats. Only
//!    workers still running at the bound are aborted. Once it returns, every
//!    sender is gone and no further events can appear.
//!
//! # Backpressure
//! The channel is bounded (`channel_capacity`). A full channel blocks the
//! emitting worker until the aggregator catches up, which shows up as reduced
//! throughput rather than unbounded memory growth.
//!
//! # Actions
//! The request itself is a plain closure `Fn(Arc<Target>) -> impl Future<Output =
//! Outcome>`. The HTTP implementation lives in [`crate::http`]; tests plug in
//! closures that return canned outcomes.
mod worker;

pub use worker::{WorkerStats, pacing_interval};

use std::{future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use typed_builder::TypedBuilder;

use crate::{
    clock::Clock,
    error::ConfigError,
    metric::{Outcome, OutcomeEvent},
    target::{Target, TargetSet},
};

#[cfg(feature = "internals")]
pub use worker::{WorkerContext, run_worker};
#[cfg(not(feature = "internals"))]
use worker::{WorkerContext, run_worker};

/// Shape of the load.
#[derive(Clone, Debug, TypedBuilder)]
pub struct PoolConfig {
    /// Number of concurrent worker tasks.
    pub workers: usize,
    /// Aggregate requests per second across all workers.
    pub target_rps: f64,
    #[builder(default = Duration::from_secs(5))]
    pub request_timeout: Duration,
    #[builder(default = 65_536)]
    pub channel_capacity: usize,
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if !self.target_rps.is_finite() || self.target_rps <= 0.0 {
            return Err(ConfigError::InvalidRate(self.target_rps));
        }
        if pacing_interval(self.per_worker_rate()).is_none() {
            return Err(ConfigError::InvalidRate(self.target_rps));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(0.0));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity);
        }
        Ok(())
    }

    /// Rate each individual worker is paced at.
    pub fn per_worker_rate(&self) -> f64 {
        self.target_rps / self.workers as f64
    }
}

/// Stats merged over every worker of a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    /// Workers that returned no stats: aborted after outliving the join bound,
    /// or panicked.
    pub aborted: usize,
    pub totals: WorkerStats,
}

pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
    /// Spawn `config.workers` paced workers and return the pool together with
    /// the receiving end of their event channel.
    pub fn start<C, F, Fut>(
        config: &PoolConfig,
        targets: Arc<TargetSet>,
        clock: C,
        action: F,
    ) -> Result<(Self, mpsc::Receiver<OutcomeEvent>), ConfigError>
    where
        C: Clock,
        F: Fn(Arc<Target>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        config.validate()?;
        if targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let (shutdown, stop_signal) = watch::channel(false);
        let rate = config.per_worker_rate();

        tracing::info!(
            workers = config.workers,
            target_rps = config.target_rps,
            per_worker_rps = rate,
            "spawning workers"
        );

        let ctx = WorkerContext {
            targets,
            clock,
            shutdown: stop_signal,
            events: tx,
            request_timeout: config.request_timeout,
        };
        let handles = spawn_workers(ctx, config.workers, rate, action);

        Ok((Self { shutdown, handles }, rx))
    }

    /// Ask every worker to stop. In-flight requests are left to finish or time
    /// out.
    pub fn signal_stop(&self) {
        let first = self.shutdown.send_if_modified(|stop| !std::mem::replace(stop, true));
        if first {
            tracing::info!(workers = self.handles.len(), "stop signalled");
        }
    }

    /// Wait for every worker to exit. Stops the pool first if that has not
    /// happened yet. Workers still running after `bound` are aborted.
    pub async fn join(self, bound: Duration) -> PoolStats {
        self.signal_stop();
        let deadline = Instant::now() + bound;
        let mut stats = PoolStats {
            workers: self.handles.len(),
            ..PoolStats::default()
        };

        // A finished worker is collected even once the deadline has passed
        for (id, mut handle) in self.handles.into_iter().enumerate() {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(worker)) => stats.totals.merge(worker),
                Ok(Err(e)) => {
                    stats.aborted += 1;
                    tracing::error!(worker = id, "worker panicked: {e}");
                }
                Err(_) => {
                    stats.aborted += 1;
                    handle.abort();
                    tracing::warn!(worker = id, ?bound, "worker did not stop in time, aborted");
                }
            }
        }
        tracing::info!(
            issued = stats.totals.issued,
            emitted = stats.totals.emitted,
            aborted = stats.aborted,
            "workers joined"
        );
        stats
    }
}

fn spawn_workers<C, F, Fut>(
    ctx: WorkerContext<C>,
    workers: usize,
    rate: f64,
    action: F,
) -> Vec<JoinHandle<WorkerStats>>
where
    C: Clock,
    F: Fn(Arc<Target>) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    (0..workers)
        .map(|id| tokio::spawn(run_worker(id, ctx.clone(), action.clone(), rate)))
        .collect()
}
