use std::{future::Future, sync::Arc, time::Duration};

use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};

use crate::{
    clock::Clock,
    metric::{FailureKind, Outcome, OutcomeEvent},
    target::{Target, TargetSet},
};

/// Everything a worker shares with its siblings.
#[derive(Clone)]
pub struct WorkerContext<C: Clock> {
    pub targets: Arc<TargetSet>,
    pub clock: C,
    /// Flips to `true` once, when the pool is asked to stop.
    pub shutdown: watch::Receiver<bool>,
    pub events: mpsc::Sender<OutcomeEvent>,
    pub request_timeout: Duration,
}

impl<C: Clock> WorkerContext<C> {
    fn cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Resolves once stop is signalled or the pool is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// What a single worker did during the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Requests that completed (with a status or a failure).
    pub issued: u64,
    /// Events handed to the aggregator.
    pub emitted: u64,
    pub failed: u64,
}

impl WorkerStats {
    pub fn merge(&mut self, other: Self) {
        self.issued += other.issued;
        self.emitted += other.emitted;
        self.failed += other.failed;
    }
}

/// Pause between request starts for a worker paced at `rate` req/s. `None`
/// when the interval does not fit a [`Duration`].
pub fn pacing_interval(rate: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(1.0 / rate).ok()
}

/// Run one worker until stop is signalled or the aggregator goes away.
///
/// Each iteration picks a target, issues it through `action` (bounded by the
/// request timeout), emits exactly one event and then sleeps for whatever is
/// left of its pacing interval. A request that overruns the interval is
/// followed immediately by the next one, without any catch-up burst.
///
/// An in-flight request is never interrupted. The pacing sleep and a send
/// blocked on a full channel both end as soon as stop is signalled.
pub async fn run_worker<C, F, Fut>(
    id: usize,
    mut ctx: WorkerContext<C>,
    action: F,
    rate: f64,
) -> WorkerStats
where
    C: Clock,
    F: Fn(Arc<Target>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    // Rates are validated up front; an unrepresentable interval never paces
    let interval = pacing_interval(rate).unwrap_or(Duration::MAX);
    let mut rng = StdRng::from_os_rng();
    let mut stats = WorkerStats::default();

    tracing::debug!(worker = id, ?interval, "worker started");

    while !ctx.cancelled() {
        let started = Instant::now();
        let target = ctx.targets.pick(&mut rng);

        let outcome = match tokio::time::timeout(ctx.request_timeout, action(target)).await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::Failed(FailureKind::Timeout),
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        stats.issued += 1;
        if !outcome.is_ok() {
            stats.failed += 1;
            tracing::trace!(worker = id, code = outcome.code(), %outcome, latency_ms, "request failed");
        }

        // Past this point the aggregator may already be gone
        if ctx.cancelled() {
            break;
        }

        let event = OutcomeEvent::new(ctx.clock.now_secs(), latency_ms, outcome);
        tokio::select! {
            sent = ctx.events.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
            _ = stopped(&mut ctx.shutdown) => break,
        }
        stats.emitted += 1;

        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            tokio::select! {
                _ = tokio::time::sleep(rest) => {}
                _ = stopped(&mut ctx.shutdown) => break,
            }
        }
    }

    tracing::debug!(worker = id, issued = stats.issued, "worker stopped");
    stats
}
