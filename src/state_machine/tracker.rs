use std::time::Duration;

use tokio::time::Instant;

/// Result of recording one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// Attempts remain; the state should be retried.
    Retry { attempt: u32, max: u32 },
    /// The maximum was reached; the failure is terminal.
    Exhausted { attempts: u32 },
}

/// Bounded per-state failure counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptCounter {
    count: u32,
    max: u32,
}

impl AttemptCounter {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    /// Counts a failure. The counter is exhausted once it reaches `max`.
    pub fn record_failure(&mut self) -> AttemptVerdict {
        self.count = self.count.saturating_add(1);
        if self.count >= self.max {
            AttemptVerdict::Exhausted {
                attempts: self.count,
            }
        } else {
            AttemptVerdict::Retry {
                attempt: self.count,
                max: self.max,
            }
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Wall-clock timer for states that wait on an external event.
///
/// Checked once per poll; it never interrupts a call in flight.
#[derive(Debug, Clone)]
pub struct PhaseTimer {
    started: Option<Instant>,
    timeout: Duration,
}

impl PhaseTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            started: None,
            timeout,
        }
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        self.started = None;
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.started.map(|started| started.elapsed())
    }

    /// True once strictly more than `timeout` has passed since `start`.
    pub fn expired(&self) -> bool {
        self.elapsed().is_some_and(|elapsed| elapsed > self.timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_exhausts_at_max() {
        let mut counter = AttemptCounter::new(3);
        assert_eq!(
            counter.record_failure(),
            AttemptVerdict::Retry { attempt: 1, max: 3 }
        );
        assert_eq!(
            counter.record_failure(),
            AttemptVerdict::Retry { attempt: 2, max: 3 }
        );
        assert_eq!(
            counter.record_failure(),
            AttemptVerdict::Exhausted { attempts: 3 }
        );
    }

    #[test]
    fn counter_of_one_exhausts_immediately() {
        let mut counter = AttemptCounter::new(1);
        assert_eq!(
            counter.record_failure(),
            AttemptVerdict::Exhausted { attempts: 1 }
        );
    }

    #[test]
    fn reset_starts_over() {
        let mut counter = AttemptCounter::new(2);
        counter.record_failure();
        counter.reset();
        assert_eq!(counter.count(), 0);
        assert!(matches!(counter.record_failure(), AttemptVerdict::Retry { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expires_strictly_after_timeout() {
        let mut timer = PhaseTimer::new(Duration::from_secs(5));
        assert!(!timer.expired());
        assert_eq!(timer.elapsed(), None);

        timer.start();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!timer.expired());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(timer.expired());

        timer.stop();
        assert!(!timer.expired());
    }
}
