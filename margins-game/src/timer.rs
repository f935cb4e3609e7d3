//! Cancellable repeating timers driven by host-supplied elapsed time.
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A repeating timer that fires every `interval` of advanced time.
///
/// Owned by the state that needs it; a cancelled timer never fires again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatingTimer {
    interval: Duration,
    until_next: Duration,
    cancelled: bool,
}

impl RepeatingTimer {
    /// Zero intervals are bumped to one millisecond so the timer always makes progress.
    #[must_use]
    pub fn every(interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        Self {
            interval,
            until_next: interval,
            cancelled: false,
        }
    }

    #[must_use]
    pub fn every_ms(millis: u64) -> Self {
        Self::every(Duration::from_millis(millis))
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Time until the next firing; `None` once cancelled.
    #[must_use]
    pub const fn time_to_next(&self) -> Option<Duration> {
        if self.cancelled {
            None
        } else {
            Some(self.until_next)
        }
    }

    /// Advance by `step`, returning true when the timer fires.
    ///
    /// Callers step at most `time_to_next()` at a time so that each firing
    /// is observed individually.
    pub fn advance(&mut self, step: Duration) -> bool {
        if self.cancelled {
            return false;
        }
        if step >= self.until_next {
            self.until_next = self.interval;
            true
        } else {
            self.until_next -= step;
            false
        }
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_on_interval() {
        let mut timer = RepeatingTimer::every_ms(100);
        assert!(!timer.advance(Duration::from_millis(60)));
        assert_eq!(timer.time_to_next(), Some(Duration::from_millis(40)));
        assert!(timer.advance(Duration::from_millis(40)));
        assert_eq!(timer.time_to_next(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut timer = RepeatingTimer::every_ms(100);
        timer.cancel();
        assert!(timer.is_cancelled());
        assert!(!timer.advance(Duration::from_secs(10)));
        assert_eq!(timer.time_to_next(), None);
    }

    #[test]
    fn zero_interval_still_progresses() {
        let mut timer = RepeatingTimer::every(Duration::ZERO);
        assert_eq!(timer.interval(), Duration::from_millis(1));
        assert!(timer.advance(Duration::from_millis(1)));
    }
}
