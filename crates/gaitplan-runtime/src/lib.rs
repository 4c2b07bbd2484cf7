//! `gaitplan-runtime` – Plan loading and tick-by-tick execution.
//!
//! Turns a plan document into a running [`MotionPlan`][plan::MotionPlan] and
//! drives it one control tick at a time.
//!
//! # Modules
//!
//! - [`document`] – YAML plan decoding.  Tagged `motion`, `control` and
//!   `environment` entries are dispatched through explicit tag tables; an
//!   unknown tag fails the load with the tag named.
//! - [`environment`] – [`Environment`][environment::Environment]: named object
//!   poses referenced by vision controls and visual-point tasks.
//! - [`motion`] – [`MotionElement`][motion::MotionElement]: walk, joint, task
//!   and visual-point elements and the scheduled tasks they expand into.
//! - [`control`] – builds [`ControlElement`][gaitplan_perception::ControlElement]s
//!   and their measurement bridges.
//! - [`plan`] – [`MotionPlan`][plan::MotionPlan]: the orchestrator owning the
//!   lifecycle (`Loaded → Ready → Running → Finished | Cancelled`), the
//!   corrected follower, the supervisor and the downstream task stack.
//! - [`cancel`] – [`CancelToken`][cancel::CancelToken]: cooperative stop
//!   checked between ticks.
//! - [`search`] – [`search_file`][search::search_file]: plan lookup along a
//!   search path.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the one place
//!   a global `tracing` subscriber is installed.

pub mod cancel;
pub mod control;
pub mod document;
pub mod environment;
pub mod motion;
pub mod plan;
pub mod search;
pub mod telemetry;

pub use cancel::CancelToken;
pub use document::{PlanSpec, parse};
pub use environment::Environment;
pub use motion::MotionElement;
pub use plan::{MotionPlan, PlanPhase, PlanSettings, StartOutcome, TickReport};
pub use search::search_file;
pub use telemetry::{LogFormat, init_tracing};
