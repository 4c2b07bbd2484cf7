//! Feet followers.
//!
//! A [`FeetFollower`] turns a trajectory reference into per-tick samples once
//! its start tick is fixed.
//!
//! ```text
//! Idle ──start(t)──▶ Started ──first sample──▶ Running ──end of reference──▶ Finished
//! ```

use std::fmt;
use std::time::Duration;

use gaitplan_signal::{Clock, TickCache};
use gaitplan_types::{AnklePose, Pose2, Tick, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{Span, info};

use crate::footsteps::{FootstepReference, TrajectoryPoint};

/// Lifecycle of a follower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowerState {
    Idle,
    Started,
    Running,
    Finished,
}

impl fmt::Display for FollowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FollowerState::Idle => "idle",
            FollowerState::Started => "started",
            FollowerState::Running => "running",
            FollowerState::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Follower output for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FollowerSample {
    pub tick: Tick,
    pub com: Vec3,
    pub com_velocity: Vec3,
    pub zmp: Vec3,
    pub zmp_velocity: Vec3,
    pub left_ankle: AnklePose,
    pub left_ankle_velocity: AnklePose,
    pub right_ankle: AnklePose,
    pub right_ankle_velocity: AnklePose,
    pub waist_yaw: f64,
    pub waist_yaw_velocity: f64,
}

impl FollowerSample {
    fn from_point(tick: Tick, p: TrajectoryPoint) -> Self {
        Self {
            tick,
            com: p.com,
            com_velocity: p.com_velocity,
            zmp: p.zmp,
            zmp_velocity: p.zmp_velocity,
            left_ankle: p.left_ankle,
            left_ankle_velocity: p.left_ankle_velocity,
            right_ankle: p.right_ankle,
            right_ankle_velocity: p.right_ankle_velocity,
            waist_yaw: p.waist_yaw,
            waist_yaw_velocity: p.waist_yaw_velocity,
        }
    }

    /// Planar robot pose the plan expects: CoM position and waist yaw.
    pub fn planned_pose(&self) -> Pose2 {
        Pose2::new(self.com.x, self.com.y, self.waist_yaw)
    }

    pub fn is_finite(&self) -> bool {
        [self.com, self.com_velocity, self.zmp, self.zmp_velocity]
            .iter()
            .all(Vec3::is_finite)
            && [
                self.left_ankle,
                self.left_ankle_velocity,
                self.right_ankle,
                self.right_ankle_velocity,
            ]
            .iter()
            .all(AnklePose::is_finite)
            && self.waist_yaw.is_finite()
            && self.waist_yaw_velocity.is_finite()
    }
}

/// A trajectory generator anchored at a start tick.
pub trait FeetFollower {
    fn name(&self) -> &str;

    fn state(&self) -> FollowerState;

    /// `true` once the trajectory input and the anchor ankles are set.
    fn can_start(&self) -> bool;

    /// Fix the start tick.  Only the first call from `Idle` has an effect.
    fn start(&mut self, tick: Tick);

    /// Start tick, once determined.
    fn start_time(&self) -> Option<Tick>;

    /// Reference duration in seconds.
    fn duration(&self) -> f64;

    /// Output for `tick`; `None` before start or before the start tick.
    fn sample(&mut self, tick: Tick) -> Option<FollowerSample>;
}

// ────────────────────────────────────────────────────────────────────────────
// AnalyticalFollower
// ────────────────────────────────────────────────────────────────────────────

/// Samples a [`FootstepReference`] in closed form.
#[derive(Debug)]
pub struct AnalyticalFollower {
    name: String,
    reference: Option<FootstepReference>,
    clock: Clock,
    origin: Option<Tick>,
    state: FollowerState,
    cache: TickCache<FollowerSample>,
    span: Span,
}

impl AnalyticalFollower {
    pub fn new(name: impl Into<String>, period: Duration, span: Span) -> Self {
        Self {
            name: name.into(),
            reference: None,
            clock: Clock::new(period),
            origin: None,
            state: FollowerState::Idle,
            cache: TickCache::new(),
            span,
        }
    }

    pub fn with_reference(mut self, reference: FootstepReference) -> Self {
        self.set_reference(reference);
        self
    }

    /// Install the trajectory.  Ignored once started.
    pub fn set_reference(&mut self, reference: FootstepReference) {
        if self.state == FollowerState::Idle {
            self.reference = Some(reference);
        }
    }

    pub fn reference(&self) -> Option<&FootstepReference> {
        self.reference.as_ref()
    }
}

impl FeetFollower for AnalyticalFollower {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> FollowerState {
        self.state
    }

    fn can_start(&self) -> bool {
        self.reference.is_some()
    }

    fn start(&mut self, tick: Tick) {
        if self.state != FollowerState::Idle {
            return;
        }
        info!(parent: &self.span, follower = %self.name, %tick, "follower started");
        self.origin = Some(tick);
        self.state = FollowerState::Started;
    }

    fn start_time(&self) -> Option<Tick> {
        self.origin
    }

    fn duration(&self) -> f64 {
        self.reference.as_ref().map_or(0.0, |r| r.duration())
    }

    fn sample(&mut self, tick: Tick) -> Option<FollowerSample> {
        if let Some(s) = self.cache.at(tick) {
            return Some(*s);
        }
        let t = self.clock.elapsed(tick, self.origin?)?;
        let reference = self.reference.as_ref()?;

        if self.state == FollowerState::Started {
            self.state = FollowerState::Running;
        }
        if self.state == FollowerState::Running && t >= reference.duration() {
            info!(parent: &self.span, follower = %self.name, %tick, "follower finished");
            self.state = FollowerState::Finished;
        }
        let sample = FollowerSample::from_point(tick, reference.sample(t));
        self.cache.store(tick, sample);
        Some(sample)
    }
}

impl fmt::Display for AnalyticalFollower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.state)?;
        if let Some(o) = self.origin {
            write!(f, " start tick {o}")?;
        }
        match &self.reference {
            Some(r) => write!(f, " {} steps, {:.3} s", r.footsteps(), r.duration()),
            None => f.write_str(" no reference"),
        }
    }
}
