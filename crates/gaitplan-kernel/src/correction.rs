//! [`CorrectionOperator`] – rate-limited accumulation of the merged error.
//!
//! Every tick the operator moves its cumulative offset towards the merged
//! estimate, but never by more than the configured maximum per axis:
//!
//! ```text
//! delta   = merged − offset          (θ wrapped to (−π, π])
//! applied = clamp(delta, −max, +max) per axis
//! offset += applied
//! ```
//!
//! Whatever the estimate stream does (steps, dropouts, outliers) the applied
//! correction is continuous at the scale of `max`.  A "no data" estimate
//! (confidence 0) leaves the offset untouched.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use gaitplan_kernel::correction::{CorrectionOperator, CorrectionState};
//! use gaitplan_types::{ErrorEstimate, Pose2, Tick};
//!
//! let state = CorrectionState::new(Pose2::new(0.1, 0.1, 0.1)).unwrap();
//! let mut op = CorrectionOperator::new(state, Duration::from_millis(5));
//! let target = ErrorEstimate::new(Pose2::new(1.0, 0.0, 0.0), 1.0, Tick(0));
//!
//! let step = op.step(Tick(0), &target);
//! assert!((step.offset.x - 0.1).abs() < 1e-12);
//! ```

use std::fmt;
use std::time::Duration;

use gaitplan_signal::TickCache;
use gaitplan_types::{ErrorEstimate, PlanError, Pose2, Tick, wrap_angle};
use serde::{Deserialize, Serialize};

/// Per-axis step limit used when a plan does not configure one.
pub const DEFAULT_MAX_STEP: Pose2 = Pose2::new(0.01, 0.01, 0.01);

// ────────────────────────────────────────────────────────────────────────────
// CorrectionState
// ────────────────────────────────────────────────────────────────────────────

/// Cumulative offset plus the per-axis maximum change per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionState {
    offset: Pose2,
    max_step: Pose2,
}

impl Default for CorrectionState {
    fn default() -> Self {
        Self {
            offset: Pose2::zero(),
            max_step: DEFAULT_MAX_STEP,
        }
    }
}

impl CorrectionState {
    /// Zero offset with the given limits.
    ///
    /// Every limit must be finite and non-negative.
    pub fn new(max_step: Pose2) -> Result<Self, PlanError> {
        for (axis, value) in [("x", max_step.x), ("y", max_step.y), ("theta", max_step.theta)] {
            if !value.is_finite() || value < 0.0 {
                return Err(PlanError::InvalidLimits(format!(
                    "{axis} = {value} must be finite and >= 0"
                )));
            }
        }
        Ok(Self {
            offset: Pose2::zero(),
            max_step,
        })
    }

    pub fn offset(&self) -> Pose2 {
        self.offset
    }

    pub fn max_step(&self) -> Pose2 {
        self.max_step
    }
}

/// What one tick of the operator did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionStep {
    pub tick: Tick,
    /// Offset after this tick.
    pub offset: Pose2,
    /// Change applied during this tick (already clamped).
    pub delta: Pose2,
    /// `delta / period`: the velocity contribution matching `delta`.
    pub velocity: Pose2,
}

impl CorrectionStep {
    fn hold(tick: Tick, offset: Pose2) -> Self {
        Self {
            tick,
            offset,
            delta: Pose2::zero(),
            velocity: Pose2::zero(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CorrectionOperator
// ────────────────────────────────────────────────────────────────────────────

/// Owns the [`CorrectionState`] and advances it once per tick.
#[derive(Debug)]
pub struct CorrectionOperator {
    state: CorrectionState,
    period: f64,
    cache: TickCache<CorrectionStep>,
}

impl CorrectionOperator {
    pub fn new(state: CorrectionState, period: Duration) -> Self {
        Self {
            state,
            period: period.as_secs_f64(),
            cache: TickCache::new(),
        }
    }

    pub fn state(&self) -> &CorrectionState {
        &self.state
    }

    pub fn offset(&self) -> Pose2 {
        self.state.offset
    }

    /// Last step taken, if any.
    pub fn last_step(&self) -> Option<CorrectionStep> {
        self.cache.last().copied()
    }

    /// Advance the offset for `tick` towards `merged`.
    ///
    /// Memoized: a second call for the same tick returns the first result
    /// without moving the offset again.
    pub fn step(&mut self, tick: Tick, merged: &ErrorEstimate) -> CorrectionStep {
        if let Some(done) = self.cache.at(tick) {
            return *done;
        }
        let step = if merged.is_valid() {
            let target = merged.offset();
            let current = self.state.offset;
            let raw = Pose2::new(
                target.x - current.x,
                target.y - current.y,
                wrap_angle(target.theta - current.theta),
            );
            let delta = raw.clamp_each(&self.state.max_step);
            self.state.offset = current + delta;
            let velocity = if self.period > 0.0 {
                delta.scale(1.0 / self.period)
            } else {
                Pose2::zero()
            };
            CorrectionStep {
                tick,
                offset: self.state.offset,
                delta,
                velocity,
            }
        } else {
            CorrectionStep::hold(tick, self.state.offset)
        };
        self.cache.store(tick, step);
        step
    }
}

impl fmt::Display for CorrectionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "offset {} (max step {})",
            self.state.offset, self.state.max_step
        )
    }
}
