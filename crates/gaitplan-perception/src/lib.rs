//! `gaitplan-perception` – From measurements to one error estimate per tick.
//!
//! # Modules
//!
//! - [`bridge`] – [`MeasurementBridge`][bridge::MeasurementBridge] /
//!   [`MeasurementInbox`][bridge::MeasurementInbox]: non-blocking hand-off of
//!   measurements published by external relays.
//! - [`control`] – [`ControlElement`][control::ControlElement]: uniform
//!   wrapper over one measurement source (`constant`, `mocap`,
//!   `visual-servo`, `hueblob`, `virtual-sensor`) producing
//!   [`ErrorEstimate`][gaitplan_types::ErrorEstimate]s with staleness decay.
//! - [`strategy`] – [`ErrorEstimationStrategy`][strategy::ErrorEstimationStrategy]
//!   with the posture and vision implementations.
//! - [`merger`] – [`ErrorMerger`][merger::ErrorMerger]: order-independent
//!   confidence-weighted average of the strategies' outputs.

pub mod bridge;
pub mod control;
pub mod merger;
pub mod strategy;

pub use bridge::{Measurement, MeasurementBridge, MeasurementInbox};
pub use control::{ControlElement, ControlFamily, ControlKind, ControlSource};
pub use merger::ErrorMerger;
pub use strategy::{ErrorEstimationStrategy, PostureStrategy, StrategySelection, VisionStrategy};
