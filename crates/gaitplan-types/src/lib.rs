//! `gaitplan-types` – shared data model.
//!
//! Ticks, degree-of-freedom sets, time intervals, planar poses, error
//! estimates and the load-time error type used by every other crate in the
//! workspace.

use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Time
// ────────────────────────────────────────────────────────────────────────────

/// Monotonic control-cycle index, advanced externally once per period.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    /// The tick that follows this one.
    pub fn next(self) -> Self {
        Tick(self.0 + 1)
    }

    pub fn index(self) -> u64 {
        self.0
    }

    /// Number of ticks elapsed since `origin`, or `None` when `origin` lies in
    /// the future.
    pub fn ticks_since(self, origin: Tick) -> Option<u64> {
        self.0.checked_sub(origin.0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open time interval `[start, end)` in seconds, relative to the
/// supervisor origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    start: f64,
    end: f64,
}

impl Interval {
    /// Build a well-formed interval.
    ///
    /// Returns [`PlanError::InvalidInterval`] when either bound is not finite
    /// or when `start > end`.
    pub fn new(start: f64, end: f64) -> Result<Self, PlanError> {
        if !start.is_finite() || !end.is_finite() || start > end {
            return Err(PlanError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// `true` when `start <= t < end`.
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }

    /// `true` when some instant lies inside both intervals.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Degrees of freedom
// ────────────────────────────────────────────────────────────────────────────

/// Index of one independently commandable joint or axis.
pub type Dof = u32;

/// Ordered set of degrees of freedom claimed by a task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DofSet(BTreeSet<Dof>);

impl DofSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dof: Dof) -> bool {
        self.0.insert(dof)
    }

    pub fn contains(&self, dof: Dof) -> bool {
        self.0.contains(&dof)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Dof> + '_ {
        self.0.iter().copied()
    }

    /// Smallest DOF present in both sets.
    pub fn first_shared(&self, other: &DofSet) -> Option<Dof> {
        self.0.intersection(&other.0).next().copied()
    }
}

impl FromIterator<Dof> for DofSet {
    fn from_iter<I: IntoIterator<Item = Dof>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for DofSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        write!(f, "{{{}}}", items.join(", "))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// Wrap an angle to `(-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// Planar pose or planar offset: translation `(x, y)` in metres and heading
/// `theta` in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2 {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose2 {
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.theta * k)
    }

    /// Clamp every axis to `[-limit, +limit]` of the matching axis of `limits`.
    pub fn clamp_each(self, limits: &Pose2) -> Self {
        Self::new(
            self.x.clamp(-limits.x, limits.x),
            self.y.clamp(-limits.y, limits.y),
            self.theta.clamp(-limits.theta, limits.theta),
        )
    }

    /// Rotate the translation part by `angle` (heading unchanged).
    pub fn rotate(self, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::new(c * self.x - s * self.y, s * self.x + c * self.y, self.theta)
    }

    /// Rigid-body composition `self ∘ rhs`.
    pub fn compose(self, rhs: Pose2) -> Self {
        let t = rhs.rotate(self.theta);
        Self::new(self.x + t.x, self.y + t.y, wrap_angle(self.theta + rhs.theta))
    }

    /// Rigid-body inverse, such that `p.compose(p.inverse())` is the identity.
    pub fn inverse(self) -> Self {
        let t = Pose2::new(-self.x, -self.y, 0.0).rotate(-self.theta);
        Self::new(t.x, t.y, wrap_angle(-self.theta))
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()
    }
}

impl Add for Pose2 {
    type Output = Pose2;

    fn add(self, rhs: Pose2) -> Pose2 {
        Pose2::new(self.x + rhs.x, self.y + rhs.y, self.theta + rhs.theta)
    }
}

impl Sub for Pose2 {
    type Output = Pose2;

    fn sub(self, rhs: Pose2) -> Pose2 {
        Pose2::new(self.x - rhs.x, self.y - rhs.y, self.theta - rhs.theta)
    }
}

impl fmt::Display for Pose2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}, {:.4})", self.x, self.y, self.theta)
    }
}

/// A 3-D point or vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Ankle position plus yaw around the vertical axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnklePose {
    pub position: Vec3,
    pub yaw: f64,
}

impl AnklePose {
    pub const fn new(x: f64, y: f64, z: f64, yaw: f64) -> Self {
        Self {
            position: Vec3::new(x, y, z),
            yaw,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.yaw.is_finite()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Estimates and events
// ────────────────────────────────────────────────────────────────────────────

/// A measured deviation between planned and observed robot pose, expressed as
/// the offset that must be added to the nominal trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorEstimate {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
    /// Trust in this estimate, `0.0` meaning "no data".
    pub confidence: f64,
    pub tick: Tick,
}

impl ErrorEstimate {
    pub fn new(offset: Pose2, confidence: f64, tick: Tick) -> Self {
        Self {
            dx: offset.x,
            dy: offset.y,
            dtheta: offset.theta,
            confidence,
            tick,
        }
    }

    /// The zero estimate carrying no information.
    pub fn none(tick: Tick) -> Self {
        Self::new(Pose2::zero(), 0.0, tick)
    }

    pub fn offset(&self) -> Pose2 {
        Pose2::new(self.dx, self.dy, self.dtheta)
    }

    /// Finite components and a strictly positive confidence.
    pub fn is_valid(&self) -> bool {
        self.offset().is_finite() && self.confidence.is_finite() && self.confidence > 0.0
    }
}

/// Direction of a supervisor transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEventKind {
    /// Inactive → active: the task was pushed onto the task stack.
    Activated,
    /// Active → inactive: the task was popped from the task stack.
    Released,
}

/// One activation or release emitted by the supervisor during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub tick: Tick,
    pub task: String,
    pub kind: TaskEventKind,
}

impl fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            TaskEventKind::Activated => "push",
            TaskEventKind::Released => "pop",
        };
        write!(f, "[{}] {} {}", self.tick, verb, self.task)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Load-time configuration errors.  Any of these aborts plan construction.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanError {
    #[error("malformed plan document: {0}")]
    Malformed(String),

    #[error("invalid {kind} element '{tag}'")]
    UnknownTag { kind: String, tag: String },

    #[error("each {kind} element must have exactly one tag, found {found}")]
    AmbiguousElement { kind: String, found: usize },

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("invalid interval [{start}, {end}]")]
    InvalidInterval { start: f64, end: f64 },

    #[error("invalid element '{element}': {reason}")]
    InvalidElement { element: String, reason: String },

    #[error(
        "tasks '{first}' and '{second}' both claim DOF {dof} at priority {priority} over overlapping intervals"
    )]
    PriorityConflict {
        first: String,
        second: String,
        dof: Dof,
        priority: i32,
    },

    #[error("task '{0}' is registered twice")]
    DuplicateTask(String),

    #[error("unknown environment object '{0}'")]
    UnknownObject(String),

    #[error("environment object '{0}' is defined twice")]
    DuplicateObject(String),

    #[error("only one walk element is supported per plan, found {0}")]
    MultipleWalks(usize),

    #[error("invalid correction limits: {0}")]
    InvalidLimits(String),

    #[error("signal wiring cycle through {}", .0.join(" -> "))]
    SignalCycle(Vec<String>),

    #[error("supervisor origin already set at tick {0}")]
    OriginAlreadySet(Tick),

    #[error("plan file '{name}' not found in {searched:?}")]
    PlanNotFound { name: String, searched: Vec<String> },

    #[error("I/O error: {0}")]
    Io(String),
}
