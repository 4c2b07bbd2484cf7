//! [`TickDeadline`] – per-tick evaluation budget monitor.
//!
//! Wrap each tick's evaluation between [`TickDeadline::begin`] and
//! [`TickDeadline::finish`].  The monitor records how long the evaluation took
//! and whether it exceeded the budget.  It never interrupts a tick: an
//! overrun is reported to the caller, which decides how loudly to complain.

use std::fmt;
use std::time::{Duration, Instant};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Timing of one finished tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickTiming {
    pub elapsed: Duration,
    /// `true` when `elapsed` exceeded the budget.
    pub overrun: bool,
}

/// Aggregate statistics since the monitor was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeadlineStats {
    pub ticks: u64,
    pub overruns: u64,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
    pub last: Option<Duration>,
}

// ────────────────────────────────────────────────────────────────────────────
// TickDeadline
// ────────────────────────────────────────────────────────────────────────────

/// Measures tick evaluation time against a fixed budget.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use gaitplan_kernel::deadline::TickDeadline;
///
/// let mut deadline = TickDeadline::new(Duration::from_secs(1));
/// deadline.begin();
/// let timing = deadline.finish().unwrap();
///
/// assert!(!timing.overrun);
/// assert_eq!(deadline.stats().ticks, 1);
/// ```
#[derive(Debug)]
pub struct TickDeadline {
    budget: Duration,
    started: Option<Instant>,
    stats: DeadlineStats,
}

impl TickDeadline {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            started: None,
            stats: DeadlineStats::default(),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Mark the start of a tick's evaluation.  Calling it again before
    /// [`TickDeadline::finish`] restarts the measurement.
    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Mark the end of the tick started by the last [`TickDeadline::begin`].
    ///
    /// Returns `None` when no tick was started.
    pub fn finish(&mut self) -> Option<TickTiming> {
        let started = self.started.take()?;
        Some(self.record(started.elapsed()))
    }

    /// Record an externally measured tick duration.
    pub fn record(&mut self, elapsed: Duration) -> TickTiming {
        let overrun = elapsed > self.budget;
        let s = &mut self.stats;
        s.ticks += 1;
        if overrun {
            s.overruns += 1;
        }
        s.min = Some(s.min.map_or(elapsed, |m| m.min(elapsed)));
        s.max = Some(s.max.map_or(elapsed, |m| m.max(elapsed)));
        s.last = Some(elapsed);
        TickTiming { elapsed, overrun }
    }

    pub fn stats(&self) -> DeadlineStats {
        self.stats
    }
}

impl fmt::Display for TickDeadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        write!(
            f,
            "{} ticks, {} overruns (budget {:?}, min {:?}, max {:?})",
            s.ticks,
            s.overruns,
            self.budget,
            s.min.unwrap_or_default(),
            s.max.unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn finish_without_begin_is_none() {
        let mut d = TickDeadline::new(Duration::from_millis(5));
        assert!(d.finish().is_none());
        assert_eq!(d.stats().ticks, 0);
    }

    #[test]
    fn slow_tick_is_an_overrun() {
        let mut d = TickDeadline::new(Duration::from_millis(1));
        d.begin();
        thread::sleep(Duration::from_millis(5));
        let timing = d.finish().unwrap();
        assert!(timing.overrun);
        assert_eq!(d.stats().overruns, 1);
    }

    #[test]
    fn record_tracks_min_max_last() {
        let mut d = TickDeadline::new(Duration::from_millis(5));
        d.record(Duration::from_millis(3));
        d.record(Duration::from_millis(7));
        d.record(Duration::from_millis(1));
        let s = d.stats();
        assert_eq!(s.ticks, 3);
        assert_eq!(s.overruns, 1);
        assert_eq!(s.min, Some(Duration::from_millis(1)));
        assert_eq!(s.max, Some(Duration::from_millis(7)));
        assert_eq!(s.last, Some(Duration::from_millis(1)));
    }

    #[test]
    fn exactly_on_budget_is_not_an_overrun() {
        let mut d = TickDeadline::new(Duration::from_millis(5));
        assert!(!d.record(Duration::from_millis(5)).overrun);
    }
}
