//! Event aggregator: turns out-of-order completions into ordered per-second rows
//!
//! Workers stamp each [`OutcomeEvent`] with the wall-clock second it completed
//! in. Because many workers share one channel, events reach the aggregator in
//! each worker's own order but not in global time order: the last event of
//! second 41 can arrive after the first one of second 42.
//!
//! The aggregator is the only consumer of the channel and the only writer of
//! the sink. It keeps exactly one open [`SecondBucket`] (for `current_second`)
//! and guarantees that the rows it hands to the [`Reporter`]:
//! - are strictly increasing in `ts`, one per second, without gaps,
//! - cover exactly the measurement window `[start, start + run_secs)`,
//! - are written as soon as they are due, even when no traffic arrives.
//!
//! # Advancement rules
//! For an event of second `S`:
//!
//! ```text
//! S <  start            warmup traffic still in flight      -> dropped, counted
//! S >= end              completed after the window          -> ignored, counted
//! S <  current_second   clock went backwards / late arrival -> dropped, counted, warned
//! S == current_second   fold into the open bucket
//! S >  current_second   flush current, flush empty rows for every skipped
//!                       second, open S, fold
//! ```
//!
//! On a poll timeout (no event for `poll_interval`), every second strictly
//! before the current wall-clock second is flushed. This bounds how stale the
//! output can get to one poll interval, regardless of traffic.
//!
//! The split between [`Timeline`] (pure bookkeeping, no I/O, no time source) and
//! [`EventAggregator`] (channel, clock, sink) keeps the ordering logic testable
//! without sleeping.
use std::{mem, time::Duration};

use serde::Serialize;
use tokio::{sync::mpsc, time::Instant};

use crate::{
    aggregate::SecondBucket,
    clock::{Clock, until_next_second},
    error::SinkError,
    metric::OutcomeEvent,
    report::{Reporter, SummaryRow},
};

/// Where an event ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    Folded,
    BeforeWindow,
    AfterWindow,
    Late,
}

/// Ordering core of the aggregator for the window `[start, end)`.
#[derive(Debug)]
pub struct Timeline {
    start: u64,
    end: u64,
    current: u64,
    bucket: SecondBucket,
}

impl Timeline {
    pub fn new(start: u64, seconds: u64) -> Self {
        Self {
            start,
            end: start + seconds,
            current: start,
            bucket: SecondBucket::new(start),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Oldest second not yet flushed.
    pub fn current_second(&self) -> u64 {
        self.current
    }

    /// Every second of the window has been flushed.
    pub fn is_complete(&self) -> bool {
        self.current >= self.end
    }

    /// Route one event. Rows that become due are appended to `out`.
    pub fn record(&mut self, event: &OutcomeEvent, out: &mut Vec<SummaryRow>) -> Placement {
        let second = event.second;
        if second < self.start {
            return Placement::BeforeWindow;
        }
        if second >= self.end {
            // A completion past the window means the whole window is due
            self.advance_to(self.end, out);
            return Placement::AfterWindow;
        }
        if second < self.current {
            return Placement::Late;
        }

        self.advance_to(second, out);
        self.bucket.consume(event);
        Placement::Folded
    }

    /// Flush every second strictly before `second`, each exactly once, and make
    /// `second` the open one. Never moves past the end of the window.
    pub fn advance_to(&mut self, second: u64, out: &mut Vec<SummaryRow>) {
        let target = second.min(self.end);
        while self.current < target {
            let next = SecondBucket::new(self.current + 1);
            let closed = mem::replace(&mut self.bucket, next);
            out.push(SummaryRow::from(closed));
            self.current += 1;
        }
    }

    /// Flush the open bucket and every remaining second of the window.
    pub fn finish(&mut self, out: &mut Vec<SummaryRow>) {
        self.advance_to(self.end, out);
    }
}

/// Counters describing what the aggregator saw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AggregatorStats {
    pub rows: u64,
    /// Events folded into a row; equals the sum of `rps` over all rows.
    pub requests: u64,
    pub ok: u64,
    pub err: u64,
    /// Events consumed while warming up.
    pub warmup: u64,
    /// Warmup requests that completed after measurement began.
    pub before_window: u64,
    pub after_window: u64,
    /// Events whose second was already flushed.
    pub late: u64,
}

/// Sole consumer of the event channel and sole writer of the sink.
pub struct EventAggregator<C: Clock> {
    clock: C,
    poll_interval: Duration,
    stats: AggregatorStats,
}

impl<C: Clock> EventAggregator<C> {
    pub fn new(clock: C, poll_interval: Duration) -> Self {
        Self {
            clock,
            poll_interval,
            stats: AggregatorStats::default(),
        }
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }

    /// Consume and drop events until `deadline`. Keeps the channel from
    /// filling up while warmup traffic is generated.
    pub async fn discard_until(
        &mut self,
        events: &mut mpsc::Receiver<OutcomeEvent>,
        deadline: Instant,
    ) {
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => break,
                event = events.recv() => match event {
                    Some(_) => self.stats.warmup += 1,
                    None => {
                        (&mut sleep).await;
                        break;
                    }
                },
            }
        }
        tracing::debug!(discarded = self.stats.warmup, "warmup traffic discarded");
    }

    /// Aggregate `run_secs` whole seconds, starting at the next second boundary,
    /// writing each row to `reporter` as soon as it is due.
    ///
    /// Returns once every second of the window has been flushed. A sink error
    /// aborts the collection.
    pub async fn collect<R>(
        &mut self,
        events: &mut mpsc::Receiver<OutcomeEvent>,
        run_secs: u64,
        reporter: &mut R,
    ) -> Result<AggregatorStats, SinkError>
    where
        R: Reporter + ?Sized,
    {
        let mut timeline = Timeline::new(self.clock.now_secs() + 1, run_secs);
        let window_end = Duration::from_secs(timeline.end());
        let mut rows = Vec::new();

        let first_row_due = until_next_second(&self.clock) + Duration::from_secs(1);
        tracing::info!(
            start = timeline.start(),
            end = timeline.end(),
            ?first_row_due,
            "collecting"
        );

        while !timeline.is_complete() {
            let now = self.clock.now();
            if now >= window_end {
                break;
            }
            let wait = self.poll_interval.min(window_end - now);

            match tokio::time::timeout(wait, events.recv()).await {
                Ok(Some(event)) => {
                    let placement = timeline.record(&event, &mut rows);
                    self.note(placement, &event, &timeline);
                }
                Ok(None) => {
                    // No producers left; rows are still owed for the window
                    tokio::time::sleep(wait).await;
                    timeline.advance_to(self.clock.now_secs(), &mut rows);
                }
                Err(_) => timeline.advance_to(self.clock.now_secs(), &mut rows),
            }
            self.write(&mut rows, reporter).await?;
        }

        timeline.finish(&mut rows);
        self.write(&mut rows, reporter).await?;

        if self.stats.late > 0 {
            tracing::warn!(
                late = self.stats.late,
                "events arrived after their second was flushed"
            );
        }
        Ok(self.stats)
    }

    /// Drop whatever is still queued once the window is closed. Returns the
    /// number of events drained; resolves when every sender is gone.
    pub async fn drain(&mut self, events: &mut mpsc::Receiver<OutcomeEvent>) -> u64 {
        let mut drained = 0;
        while events.recv().await.is_some() {
            drained += 1;
        }
        self.stats.after_window += drained;
        drained
    }

    fn note(&mut self, placement: Placement, event: &OutcomeEvent, timeline: &Timeline) {
        match placement {
            Placement::Folded => {}
            Placement::BeforeWindow => self.stats.before_window += 1,
            Placement::AfterWindow => self.stats.after_window += 1,
            Placement::Late => {
                self.stats.late += 1;
                let current = timeline.current_second();
                if self.stats.late == 1 {
                    tracing::warn!(
                        second = event.second,
                        current,
                        "dropping event for an already flushed second"
                    );
                } else {
                    tracing::debug!(second = event.second, current, "dropping late event");
                }
            }
        }
    }

    async fn write<R>(
        &mut self,
        rows: &mut Vec<SummaryRow>,
        reporter: &mut R,
    ) -> Result<(), SinkError>
    where
        R: Reporter + ?Sized,
    {
        for row in rows.drain(..) {
            reporter.report(&row).await?;
            self.stats.rows += 1;
            self.stats.requests += row.rps;
            self.stats.ok += row.ok;
            self.stats.err += row.err;
            tracing::trace!(ts = row.ts, rps = row.rps, "row flushed");
        }
        Ok(())
    }
}
