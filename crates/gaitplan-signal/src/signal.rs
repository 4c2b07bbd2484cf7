//! Tick-memoized values.
//!
//! [`TickCache`] is the bare single-slot memo.  [`Signal`] adds a name and a
//! fallible producer on top of it: calling [`Signal::get`] twice for the same
//! tick returns the cached value without running the producer again.
//! Producers may read other signals inside their closure, which turns a set
//! of signals into a DAG evaluated on demand; the wiring itself is checked
//! for cycles once, at setup, by [`SignalGraph`][crate::graph::SignalGraph].
//!
//! A producer that fails leaves the cache untouched.  The failure is fatal for
//! that tick's evaluation only: callers use [`Signal::get_or_hold`] to keep
//! the previous safe output instead of forwarding a partial update.
//!
//! # Example
//!
//! ```
//! use gaitplan_signal::{Signal, SignalError};
//! use gaitplan_types::Tick;
//!
//! let mut square: Signal<u64> = Signal::new("square");
//! let produce = |t: Tick| Ok::<_, SignalError>(t.index() * t.index());
//! assert_eq!(square.get(Tick(3), || produce(Tick(3))).unwrap(), 9);
//! assert_eq!(square.get(Tick(3), || unreachable!()).unwrap(), 9);
//! assert_eq!(square.evaluations(), 1);
//! ```

use gaitplan_types::Tick;
use thiserror::Error;
use tracing::warn;

/// A producer could not compute its value for a tick.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("signal '{signal}' failed at tick {tick}: {reason}")]
pub struct SignalError {
    pub signal: String,
    pub tick: Tick,
    pub reason: String,
}

// ────────────────────────────────────────────────────────────────────────────
// TickCache
// ────────────────────────────────────────────────────────────────────────────

/// Single-slot cache keyed by tick.
///
/// Components whose per-tick output cannot fail embed a `TickCache`; fallible
/// outputs go through a [`Signal`].
#[derive(Debug, Clone)]
pub struct TickCache<T> {
    entry: Option<(Tick, T)>,
    evaluations: u64,
}

impl<T> Default for TickCache<T> {
    fn default() -> Self {
        Self {
            entry: None,
            evaluations: 0,
        }
    }
}

impl<T: Clone> TickCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for exactly `tick`.
    pub fn at(&self, tick: Tick) -> Option<&T> {
        match &self.entry {
            Some((t, v)) if *t == tick => Some(v),
            _ => None,
        }
    }

    /// Most recently stored value, whatever its tick.
    pub fn last(&self) -> Option<&T> {
        self.entry.as_ref().map(|(_, v)| v)
    }

    /// Tick of the most recently stored value.
    pub fn last_tick(&self) -> Option<Tick> {
        self.entry.as_ref().map(|(t, _)| *t)
    }

    /// Number of times a value was computed and stored.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn store(&mut self, tick: Tick, value: T) {
        self.entry = Some((tick, value));
        self.evaluations += 1;
    }

    /// Return the value for `tick`, computing it with `produce` on a miss.
    pub fn get_or_compute(&mut self, tick: Tick, produce: impl FnOnce() -> T) -> T {
        if let Some(v) = self.at(tick) {
            return v.clone();
        }
        let value = produce();
        self.store(tick, value.clone());
        value
    }

    /// Fallible variant of [`TickCache::get_or_compute`].  On error nothing is
    /// stored and the previous entry stays available through
    /// [`TickCache::last`].
    pub fn get_or_try_compute<E>(
        &mut self,
        tick: Tick,
        produce: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        if let Some(v) = self.at(tick) {
            return Ok(v.clone());
        }
        let value = produce()?;
        self.store(tick, value.clone());
        Ok(value)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Signal
// ────────────────────────────────────────────────────────────────────────────

/// A named, lazily evaluated, tick-memoized value whose producer may fail.
#[derive(Debug, Clone)]
pub struct Signal<T> {
    name: String,
    cache: TickCache<T>,
}

impl<T: Clone> Signal<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cache: TickCache::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cached value for exactly `tick`.
    pub fn at(&self, tick: Tick) -> Option<&T> {
        self.cache.at(tick)
    }

    /// Last successfully produced value, whatever its tick.
    pub fn last(&self) -> Option<&T> {
        self.cache.last()
    }

    /// Value at `tick`.  `produce` runs at most once per tick; a failed run
    /// is not cached and leaves the previous value in place.
    pub fn get(
        &mut self,
        tick: Tick,
        produce: impl FnOnce() -> Result<T, SignalError>,
    ) -> Result<T, SignalError> {
        self.cache.get_or_try_compute(tick, produce)
    }

    /// Value at `tick`, or the last safe value when `produce` fails.
    ///
    /// Returns `None` only when the producer fails and nothing was ever
    /// computed.
    pub fn get_or_hold(
        &mut self,
        tick: Tick,
        produce: impl FnOnce() -> Result<T, SignalError>,
    ) -> Option<T> {
        match self.get(tick, produce) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(signal = %self.name, error = %e, "holding previous output");
                self.cache.last().cloned()
            }
        }
    }

    pub fn last_tick(&self) -> Option<Tick> {
        self.cache.last_tick()
    }

    /// Number of successful producer runs.
    pub fn evaluations(&self) -> u64 {
        self.cache.evaluations()
    }
}

impl SignalError {
    pub fn new(signal: impl Into<String>, tick: Tick, reason: impl Into<String>) -> Self {
        Self {
            signal: signal.into(),
            tick,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;

    // ---- helpers ----------------------------------------------------------

    fn counting(calls: &Cell<u32>, t: Tick) -> Result<u64, SignalError> {
        calls.set(calls.get() + 1);
        Ok(t.index() + 1)
    }

    fn failing(t: Tick) -> Result<u64, SignalError> {
        Err(SignalError::new("flaky", t, "no data"))
    }

    #[test]
    fn same_tick_uses_cache() {
        let calls = Cell::new(0);
        let mut s = Signal::new("s");
        assert_eq!(s.get(Tick(5), || counting(&calls, Tick(5))).unwrap(), 6);
        assert_eq!(s.get(Tick(5), || counting(&calls, Tick(5))).unwrap(), 6);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn new_tick_reevaluates() {
        let calls = Cell::new(0);
        let mut s = Signal::new("s");
        s.get(Tick(1), || counting(&calls, Tick(1))).unwrap();
        s.get(Tick(2), || counting(&calls, Tick(2))).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(s.last_tick(), Some(Tick(2)));
        assert_eq!(s.at(Tick(1)), None);
        assert_eq!(s.at(Tick(2)), Some(&3));
    }

    #[test]
    fn diamond_dependency_evaluates_root_once() {
        // root feeds left and right, both feed sum.
        let root_calls = Cell::new(0);
        let mut root = Signal::new("root");
        let mut left = Signal::new("left");
        let mut right = Signal::new("right");
        let mut sum = Signal::new("sum");

        let mut eval = |t: Tick| {
            sum.get(t, || {
                let l = left.get(t, || Ok(root.get(t, || counting(&root_calls, t))? * 2))?;
                let r = right.get(t, || Ok(root.get(t, || counting(&root_calls, t))? * 3))?;
                Ok(l + r)
            })
        };
        assert_eq!(eval(Tick(1)).unwrap(), 2 * 2 + 2 * 3);
        assert_eq!(eval(Tick(1)).unwrap(), 10);
        assert_eq!(root_calls.get(), 1);
        assert_eq!(eval(Tick(2)).unwrap(), 3 * 2 + 3 * 3);
        assert_eq!(root_calls.get(), 2);
    }

    #[test]
    fn failure_is_not_cached_and_hold_returns_previous() {
        let mut s = Signal::new("flaky");
        assert_eq!(s.get(Tick(2), || Ok(2)).unwrap(), 2);
        assert!(s.get(Tick(3), || failing(Tick(3))).is_err());
        assert_eq!(s.get_or_hold(Tick(3), || failing(Tick(3))), Some(2));
        assert_eq!(s.last_tick(), Some(Tick(2)));
        // A later success replaces the held value.
        assert_eq!(s.get_or_hold(Tick(4), || Ok(4)), Some(4));
    }

    #[test]
    fn hold_without_history_is_none() {
        let mut s: Signal<u64> = Signal::new("dead");
        assert_eq!(s.get_or_hold(Tick(0), || failing(Tick(0))), None);
        assert_eq!(s.evaluations(), 0);
        assert_eq!(s.name(), "dead");
    }

    #[test]
    fn tick_cache_get_or_compute() {
        let mut cache = TickCache::new();
        assert_eq!(cache.get_or_compute(Tick(1), || 10), 10);
        assert_eq!(cache.get_or_compute(Tick(1), || 99), 10);
        assert_eq!(cache.get_or_compute(Tick(2), || 20), 20);
        assert_eq!(cache.evaluations(), 2);
        assert_eq!(cache.at(Tick(1)), None);
        assert_eq!(cache.last(), Some(&20));
    }

    proptest! {
        #[test]
        fn producer_runs_at_most_once_per_tick(ticks in proptest::collection::vec(0u64..20, 1..60)) {
            let calls = Cell::new(0u32);
            let mut s = Signal::new("p");
            let mut expected = 0u32;
            let mut last = None;
            for t in ticks {
                let v1 = s.get(Tick(t), || counting(&calls, Tick(t))).unwrap();
                let v2 = s.get(Tick(t), || counting(&calls, Tick(t))).unwrap();
                prop_assert_eq!(v1, v2);
                if last != Some(t) {
                    expected += 1;
                }
                last = Some(t);
            }
            prop_assert_eq!(calls.get(), expected);
        }
    }
}
