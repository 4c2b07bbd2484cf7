//! `gaitplan-signal` – Time base and per-tick signal evaluation.
//!
//! Everything in a motion plan is evaluated synchronously, one control tick
//! at a time.  This crate provides the pieces that make that evaluation cheap
//! and predictable.
//!
//! # Modules
//!
//! - [`clock`] – [`Clock`][clock::Clock]: fixed-period tick counter and
//!   tick ↔ seconds conversion.
//! - [`signal`] – [`Signal`][signal::Signal] and
//!   [`TickCache`][signal::TickCache]: lazily evaluated, tick-memoized values.
//!   Re-reading a signal at the same tick never re-invokes its producer, and
//!   a failed producer leaves the previous output in place.
//! - [`graph`] – [`SignalGraph`][graph::SignalGraph]: setup-time record of
//!   which signal feeds which, rejecting cyclic wiring before the first tick.

pub mod clock;
pub mod graph;
pub mod signal;

pub use clock::{Clock, DEFAULT_PERIOD};
pub use graph::SignalGraph;
pub use signal::{Signal, SignalError, TickCache};
