use std::time::{Duration, Instant};

/// A repeating deadline. Nothing fires unless the owner calls [`IntervalTimer::fire`],
/// so a stopped timer can never run after its owner is gone.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period: Duration,
    next_due: Option<Instant>,
}

impl IntervalTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            next_due: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arms the timer so the first period elapses at `now + period`. Restarting a
    /// running timer discards its old phase. A deadline past the end of the
    /// clock leaves the timer stopped.
    pub fn start(&mut self, now: Instant) {
        self.next_due = now.checked_add(self.period);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Returns how many whole periods have elapsed since the last call and
    /// re-arms for the next one. Returns 0 when stopped or not yet due.
    pub fn fire(&mut self, now: Instant) -> u32 {
        let Some(due) = self.next_due else {
            return 0;
        };
        if now < due {
            return 0;
        }
        let behind = now.duration_since(due);
        let extra = (behind.as_nanos() / self.period.as_nanos()).min(u32::MAX as u128 - 1) as u32;
        let count = extra + 1;
        self.next_due = self
            .period
            .checked_mul(count)
            .and_then(|step| due.checked_add(step));
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_timer_never_fires() {
        let now = Instant::now();
        let mut timer = IntervalTimer::new(Duration::from_secs(3));
        assert_eq!(timer.fire(now + Duration::from_secs(30)), 0);
        timer.start(now);
        timer.stop();
        assert_eq!(timer.fire(now + Duration::from_secs(30)), 0);
    }

    #[test]
    fn fires_once_per_elapsed_period() {
        let now = Instant::now();
        let mut timer = IntervalTimer::new(Duration::from_secs(1));
        timer.start(now);
        assert_eq!(timer.fire(now + Duration::from_millis(999)), 0);
        assert_eq!(timer.fire(now + Duration::from_secs(1)), 1);
        assert_eq!(timer.fire(now + Duration::from_millis(1500)), 0);
        assert_eq!(timer.fire(now + Duration::from_millis(4200)), 3);
        assert_eq!(timer.next_due(), Some(now + Duration::from_secs(5)));
    }

    #[test]
    fn unreachable_deadline_never_fires() {
        let now = Instant::now();
        let mut timer = IntervalTimer::new(Duration::from_secs(u64::MAX));
        timer.start(now);
        assert!(!timer.is_running());
        assert_eq!(timer.fire(now + Duration::from_secs(86_400)), 0);
    }
}
