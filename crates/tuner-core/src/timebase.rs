use crate::hal::Clock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic microseconds since start.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Wall-clock microseconds since Unix epoch (for audit records only).
    pub fn unix_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TimeBase {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn now_us(&self) -> u64 {
        TimeBase::now_us(self)
    }
}

/// Clock that only advances when slept on. Used to run motion loops without
/// real delays.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualClock {
    elapsed_us: u64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, duration: Duration) {
        self.elapsed_us = self
            .elapsed_us
            .saturating_add(duration.as_micros() as u64);
    }
}

impl Clock for ManualClock {
    fn sleep(&mut self, duration: Duration) {
        self.advance(duration);
    }

    fn now_us(&self) -> u64 {
        self.elapsed_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_only_on_sleep() {
        let mut clock = ManualClock::new();
        assert_eq!(clock.now_us(), 0);
        clock.sleep(Duration::from_millis(15));
        clock.sleep(Duration::from_micros(5));
        assert_eq!(clock.now_us(), 15_005);
    }
}
