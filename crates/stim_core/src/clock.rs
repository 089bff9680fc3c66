//! Monotonic and countdown clocks.
//!
//! Tasks that return `Repeat` are re-invoked once per frame and must pace
//! themselves by a clock of their own rather than by call count. These types
//! are the sanctioned way to do that.

use std::time::{Duration, Instant};

/// A clock whose origin is fixed at construction time.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Seconds elapsed since the clock was created.
    #[must_use]
    pub fn get_time(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A resettable clock.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Seconds elapsed since the last reset.
    #[must_use]
    pub fn get_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// Restart the clock from zero.
    pub fn reset(&mut self) {
        self.origin = Instant::now();
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// A timer counting down from a starting duration.
///
/// `get_time` goes negative once the duration has elapsed; callers test for
/// expiry with [`CountdownTimer::expired`].
#[derive(Debug, Clone, Copy)]
pub struct CountdownTimer {
    origin: Instant,
    duration: Duration,
}

impl CountdownTimer {
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            origin: Instant::now(),
            duration,
        }
    }

    /// Seconds remaining (negative once expired).
    #[must_use]
    pub fn get_time(&self) -> f64 {
        self.duration.as_secs_f64() - self.origin.elapsed().as_secs_f64()
    }

    /// Whether the countdown has run out.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.get_time() <= 0.0
    }

    /// Restart the countdown with a new duration.
    pub fn reset(&mut self, duration: Duration) {
        self.origin = Instant::now();
        self.duration = duration;
    }

    /// Extend (or shorten, with care) the remaining time.
    pub fn add(&mut self, extra: Duration) {
        self.duration += extra;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let t0 = clock.get_time();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.get_time() > t0);
    }

    #[test]
    fn test_clock_reset_restarts_from_zero() {
        let mut clock = Clock::new();
        std::thread::sleep(Duration::from_millis(5));
        let before = clock.get_time();
        clock.reset();
        assert!(clock.get_time() < before);
    }

    #[test]
    fn test_countdown_expires() {
        let timer = CountdownTimer::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.expired());
        assert!(timer.get_time() < 0.0);
    }

    #[test]
    fn test_countdown_add_extends() {
        let mut timer = CountdownTimer::new(Duration::from_millis(1));
        timer.add(Duration::from_secs(60));
        assert!(!timer.expired());
    }
}
