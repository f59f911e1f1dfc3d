use std::time::{Duration, Instant};

use crate::timers::IntervalTimer;

const TICK: Duration = Duration::from_secs(1);

/// Seconds remaining until the next scheduled refresh.
///
/// The clock decrements once per elapsed second. When the value reaches zero a
/// single "refresh due" event is latched; it stays latched until the controller
/// consumes it with [`CountdownClock::take_expiry`] or discards it with a reset.
#[derive(Debug, Clone)]
pub struct CountdownClock {
    remaining: u64,
    ticker: IntervalTimer,
    awaiting_zero: bool,
    expiry_pending: bool,
}

impl Default for CountdownClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownClock {
    pub fn new() -> Self {
        Self {
            remaining: 0,
            ticker: IntervalTimer::new(TICK),
            awaiting_zero: false,
            expiry_pending: false,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    /// Restarts the countdown from `seconds`, dropping any unconsumed expiry.
    /// A zero reset expires on the next tick rather than immediately.
    pub fn reset(&mut self, seconds: u64, now: Instant) {
        self.remaining = seconds;
        self.awaiting_zero = true;
        self.expiry_pending = false;
        self.ticker.start(now);
    }

    pub fn stop(&mut self) {
        self.ticker.stop();
        self.awaiting_zero = false;
        self.expiry_pending = false;
    }

    /// Applies every whole second elapsed since the previous call.
    pub fn tick(&mut self, now: Instant) {
        for _ in 0..self.ticker.fire(now) {
            self.step();
        }
    }

    /// Consumes the latched zero event. Returns `true` at most once per reset.
    pub fn take_expiry(&mut self) -> bool {
        std::mem::take(&mut self.expiry_pending)
    }

    fn step(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 && self.awaiting_zero {
            self.awaiting_zero = false;
            self.expiry_pending = true;
        }
    }
}

pub fn format_countdown(seconds: u64) -> String {
    let minutes = seconds / 60;
    let secs = seconds % 60;
    if minutes >= 60 {
        format!("{}:{:02}:{:02}", minutes / 60, minutes % 60, secs)
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}
