use crate::metric::OutcomeEvent;

/// Accumulator for every [`OutcomeEvent`] that completed within one wall-clock
/// second.
///
/// The bucket keeps raw latencies rather than a sketch: percentiles are taken
/// by nearest rank over the exact sample, which at per-second granularity is
/// at most a few thousand values. Derived statistics are not computed here;
/// they belong to [`SummaryRow`](crate::report::SummaryRow), which is built
/// from a bucket when its second is flushed.
///
/// Invariant: `ok + err == count()`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SecondBucket {
    pub second: u64,
    pub latencies: Vec<f64>,
    pub ok: u64,
    pub err: u64,
}

impl SecondBucket {
    pub fn new(second: u64) -> Self {
        Self {
            second,
            ..Self::default()
        }
    }

    /// Fold a single event into the bucket. The caller is responsible for
    /// routing only events of `self.second` here.
    pub fn consume(&mut self, event: &OutcomeEvent) {
        debug_assert_eq!(event.second, self.second);
        self.latencies.push(event.latency_ms);
        if event.outcome.is_ok() {
            self.ok += 1;
        } else {
            self.err += 1;
        }
    }

    pub fn count(&self) -> u64 {
        self.latencies.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.latencies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{FailureKind, Outcome};

    #[test]
    fn counts_split_by_status_class() {
        let mut bucket = SecondBucket::new(9);
        for event in [
            OutcomeEvent::new(9, 1.0, Outcome::Status(200)),
            OutcomeEvent::new(9, 2.0, Outcome::Status(404)),
            OutcomeEvent::new(9, 3.0, Outcome::Failed(FailureKind::Timeout)),
            OutcomeEvent::new(9, 4.0, Outcome::Status(201)),
        ] {
            bucket.consume(&event);
        }

        assert_eq!(bucket.count(), 4);
        assert_eq!(bucket.ok, 2);
        assert_eq!(bucket.err, 2);
        assert_eq!(bucket.ok + bucket.err, bucket.count());
        assert_eq!(bucket.latencies, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn new_bucket_is_empty() {
        let bucket = SecondBucket::new(3);
        assert!(bucket.is_empty());
        assert_eq!(bucket.count(), 0);
        assert_eq!(bucket.second, 3);
    }
}
