//! `gaitplan-kernel` – Correction and scheduling.
//!
//! The two pieces of state that change during a run live here, each owned and
//! mutated only by its component during its step of the tick.
//!
//! # Modules
//!
//! - [`correction`] – [`CorrectionOperator`][correction::CorrectionOperator]:
//!   moves a cumulative offset towards the merged error estimate, clamped to a
//!   per-axis maximum per tick.
//! - [`supervisor`] – [`Supervisor`][supervisor::Supervisor]: interval and
//!   priority based DOF ownership, with eager rejection of conflicts that
//!   cannot be arbitrated.
//! - [`task_stack`] – [`TaskStack`][task_stack::TaskStack]: the downstream
//!   solver boundary the supervisor pushes to and pops from.
//! - [`deadline`] – [`TickDeadline`][deadline::TickDeadline]: measures each
//!   tick against the control period.

pub mod correction;
pub mod deadline;
pub mod supervisor;
pub mod task_stack;

pub use correction::{CorrectionOperator, CorrectionState, CorrectionStep, DEFAULT_MAX_STEP};
pub use deadline::{DeadlineStats, TickDeadline, TickTiming};
pub use supervisor::{ScheduledTask, Supervisor, SupervisorBuilder, TaskStatus};
pub use task_stack::{SolverStack, TaskStack};
