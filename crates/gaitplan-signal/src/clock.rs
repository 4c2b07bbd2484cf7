//! [`Clock`] – fixed-period time base.
//!
//! The control loop is driven from outside; the clock only counts ticks and
//! converts between tick counts and seconds.

use std::time::Duration;

use gaitplan_types::{Interval, Tick};

/// Nominal control period of the robot loop.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(5);

/// Tick counter with a fixed period.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use gaitplan_signal::Clock;
/// use gaitplan_types::{Interval, Tick};
///
/// let mut clock = Clock::new(Duration::from_millis(5));
/// assert_eq!(clock.now(), Tick(0));
/// clock.advance();
/// clock.advance();
/// assert_eq!(clock.now(), Tick(2));
/// assert!((clock.seconds(200) - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct Clock {
    period: Duration,
    now: Tick,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD)
    }
}

impl Clock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            now: Tick::ZERO,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Period in seconds.
    pub fn dt(&self) -> f64 {
        self.period.as_secs_f64()
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    /// Move to the next tick and return it.
    pub fn advance(&mut self) -> Tick {
        self.now = self.now.next();
        self.now
    }

    /// Duration of `ticks` periods, in seconds.
    pub fn seconds(&self, ticks: u64) -> f64 {
        ticks as f64 * self.dt()
    }

    /// Seconds elapsed between `origin` and `tick`; `None` before the origin.
    pub fn elapsed(&self, tick: Tick, origin: Tick) -> Option<f64> {
        tick.ticks_since(origin).map(|n| self.seconds(n))
    }

    /// Smallest number of ticks covering `seconds`.
    pub fn ticks_for(&self, seconds: f64) -> u64 {
        if seconds <= 0.0 {
            return 0;
        }
        (seconds / self.dt() - 1e-9).ceil() as u64
    }

    /// Tick offsets `[first, end)` covered by `interval`, rounded with
    /// [`Clock::ticks_for`] so every boundary in a plan uses the same rule.
    pub fn tick_span(&self, interval: &Interval) -> (u64, u64) {
        (self.ticks_for(interval.start()), self.ticks_for(interval.end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_period_is_five_ms() {
        let clock = Clock::default();
        assert_eq!(clock.period(), Duration::from_millis(5));
        assert!((clock.dt() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn elapsed_is_none_before_origin() {
        let clock = Clock::default();
        assert_eq!(clock.elapsed(Tick(3), Tick(10)), None);
        let e = clock.elapsed(Tick(10), Tick(10)).unwrap();
        assert_eq!(e, 0.0);
        let e = clock.elapsed(Tick(210), Tick(10)).unwrap();
        assert!((e - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ticks_for_rounds_up() {
        let clock = Clock::default();
        assert_eq!(clock.ticks_for(0.0), 0);
        assert_eq!(clock.ticks_for(1.0), 200);
        assert_eq!(clock.ticks_for(0.0051), 2);
        assert_eq!(clock.ticks_for(-3.0), 0);
    }

    #[test]
    fn tick_span_agrees_with_ticks_for_on_inexact_periods() {
        // 30 × 0.015 evaluates to 0.44999999999999996, just below 0.45.
        let clock = Clock::new(Duration::from_millis(15));
        let span = clock.tick_span(&Interval::new(0.45, 0.9).unwrap());
        assert_eq!(span, (30, 60));
        assert_eq!(span.0, clock.ticks_for(0.45));
        assert_eq!(clock.tick_span(&Interval::new(0.0, 0.0).unwrap()), (0, 0));
    }
}
