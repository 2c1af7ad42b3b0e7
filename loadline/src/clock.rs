use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock source shared by workers (to stamp arrival seconds) and the
/// aggregator (to decide when a second is due).
///
/// The timebase is the UNIX epoch so rows line up with anything else sampling
/// the server under test on the same host.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Time elapsed since the UNIX epoch.
    fn now(&self) -> Duration;

    /// Integer wall-clock second.
    fn now_secs(&self) -> u64 {
        self.now().as_secs()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        // A clock set before 1970 reads as zero rather than panicking
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

/// Time left until the next whole-second boundary of `clock`.
pub fn until_next_second<C: Clock>(clock: &C) -> Duration {
    let now = clock.now();
    Duration::from_secs(now.as_secs() + 1) - now
}


#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;

    #[test]
    fn next_second_from_mid_second() {
        let clock = ManualClock::at(41_250);
        assert_eq!(until_next_second(&clock), Duration::from_millis(750));
        assert_eq!(clock.now_secs(), 41);
    }

    #[test]
    fn next_second_on_exact_boundary_is_a_full_second() {
        let clock = ManualClock::at(7_000);
        assert_eq!(until_next_second(&clock), Duration::from_secs(1));
    }

    #[test]
    fn system_clock_is_past_epoch() {
        assert!(SystemClock.now_secs() > 1_600_000_000);
    }
}
