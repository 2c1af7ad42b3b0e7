use std::{future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use crate::{
    aggregator::{AggregatorStats, EventAggregator},
    clock::Clock,
    error::{ConfigError, Result},
    executor::{PoolConfig, PoolStats, WorkerPool},
    metric::Outcome,
    report::Reporter,
    target::{Target, TargetSet},
};

/// Extra time granted to workers on top of the request timeout before they
/// are aborted.
const JOIN_GRACE: Duration = Duration::from_secs(1);

/// One complete measurement: warm up, record `run_secs` seconds, shut down.
///
/// ```no_run
/// use std::{sync::Arc, time::Duration};
///
/// use loadline::{
///     Scenario, SystemClock, TargetSet,
///     executor::PoolConfig,
///     http,
///     report::CsvReporter,
/// };
///
/// # async fn demo() -> loadline::Result<()> {
/// let pool = PoolConfig::builder().workers(8).target_rps(50.0).build();
/// let client = http::client(pool.request_timeout)?;
///
/// let summary = Scenario::builder()
///     .name("jitlab mixed")
///     .targets(Arc::new(TargetSet::defaults("http://localhost:8080")?))
///     .action(http::action(client))
///     .pool(pool)
///     .warmup(Duration::from_secs(10))
///     .run_secs(120)
///     .clock(SystemClock)
///     .build()
///     .run(&mut CsvReporter::create("load_timeseries.csv")?)
///     .await?;
///
/// println!("{} requests over {} seconds", summary.requests, summary.rows);
/// # Ok(())
/// # }
/// ```
#[derive(TypedBuilder)]
pub struct Scenario<F, C> {
    #[builder(setter(into), default = String::from("loadline"))]
    pub name: String,
    pub targets: Arc<TargetSet>,
    pub action: F,
    pub pool: PoolConfig,
    /// Traffic generated before measurement starts. Never aggregated.
    #[builder(default = Duration::ZERO)]
    pub warmup: Duration,
    pub run_secs: u64,
    #[builder(default = Duration::from_millis(200))]
    pub poll_interval: Duration,
    pub clock: C,
}

/// What a finished run produced.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub rows: u64,
    pub requests: u64,
    pub ok: u64,
    pub err: u64,
    /// Mean of `rps` over the recorded window.
    pub achieved_rps: f64,
    pub aggregator: AggregatorStats,
    pub pool: PoolStats,
}

impl RunSummary {
    fn new(name: String, aggregator: AggregatorStats, pool: PoolStats) -> Self {
        let achieved_rps = if aggregator.rows == 0 {
            0.0
        } else {
            aggregator.requests as f64 / aggregator.rows as f64
        };
        Self {
            name,
            rows: aggregator.rows,
            requests: aggregator.requests,
            ok: aggregator.ok,
            err: aggregator.err,
            achieved_rps,
            aggregator,
            pool,
        }
    }
}

impl<F, Fut, C> Scenario<F, C>
where
    F: Fn(Arc<Target>) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
    C: Clock,
{
    fn validate(&self) -> Result<(), ConfigError> {
        if self.run_secs == 0 {
            return Err(ConfigError::EmptyRun);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidPollInterval);
        }
        self.pool.validate()
    }

    /// Run the scenario, writing one row per recorded second to `reporter`.
    ///
    /// The pool is always stopped and joined before this returns, also when
    /// the sink fails, so no worker outlives the run.
    pub async fn run<R>(self, reporter: &mut R) -> Result<RunSummary>
    where
        R: Reporter + ?Sized,
    {
        self.validate()?;

        let (pool, mut events) = WorkerPool::start(
            &self.pool,
            self.targets.clone(),
            self.clock.clone(),
            self.action,
        )?;
        let mut aggregator = EventAggregator::new(self.clock.clone(), self.poll_interval);

        if !self.warmup.is_zero() {
            tracing::info!(scenario = %self.name, warmup = ?self.warmup, "warming up");
            aggregator
                .discard_until(&mut events, Instant::now() + self.warmup)
                .await;
            tracing::info!(scenario = %self.name, "warmup done");
        }

        let collected = aggregator
            .collect(&mut events, self.run_secs, reporter)
            .await;

        // Keep reading while joining so no worker stays blocked on a full channel
        let (pool_stats, drained) = tokio::join!(
            pool.join(self.pool.request_timeout + JOIN_GRACE),
            aggregator.drain(&mut events),
        );
        tracing::debug!(drained, "event channel drained");

        let stats = collected?;
        reporter.close().await?;

        let summary = RunSummary::new(self.name, stats, pool_stats);
        tracing::info!(
            scenario = %summary.name,
            rows = summary.rows,
            requests = summary.requests,
            ok = summary.ok,
            err = summary.err,
            achieved_rps = summary.achieved_rps,
            "run finished"
        );
        Ok(summary)
    }
}
