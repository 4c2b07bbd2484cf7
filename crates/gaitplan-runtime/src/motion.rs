//! Motion plan elements.
//!
//! Each element is decoded from one `motion` entry, validated against the
//! environment, and expands into the [`ScheduledTask`]s it hands the
//! supervisor at load time.

use std::fmt;

use gaitplan_kernel::ScheduledTask;
use gaitplan_locomotion::{FootstepReference, WalkParameters};
use gaitplan_types::{AnklePose, Dof, DofSet, Interval, PlanError, Pose2};

use crate::document::{JointSpec, MotionSpec, TaskSpec, VisualPointSpec, WalkSpec, require_interval};
use crate::environment::Environment;

/// Default right-leg DOFs of the walk's right-ankle task.
pub const RIGHT_LEG_DOFS: std::ops::RangeInclusive<Dof> = 6..=11;
/// Default left-leg DOFs of the walk's left-ankle task.
pub const LEFT_LEG_DOFS: std::ops::RangeInclusive<Dof> = 12..=17;

#[derive(Debug, Clone)]
pub struct WalkElement {
    pub name: String,
    pub interval: Interval,
    pub priority: i32,
    pub reference: FootstepReference,
    pub extra_dofs: DofSet,
    pub left_leg_dofs: DofSet,
    pub right_leg_dofs: DofSet,
}

#[derive(Debug, Clone)]
pub struct JointElement {
    pub name: String,
    pub interval: Interval,
    pub priority: i32,
    pub dofs: DofSet,
    /// Target per DOF, in DOF order; empty when only the posture is held.
    pub position: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct TaskElement {
    pub name: String,
    pub interval: Interval,
    pub priority: i32,
    pub operational_point: String,
    pub dofs: DofSet,
}

#[derive(Debug, Clone)]
pub struct VisualPointElement {
    pub name: String,
    pub interval: Interval,
    pub priority: i32,
    pub object: String,
    pub object_pose: Pose2,
    pub dofs: DofSet,
}

/// A validated motion element.
#[derive(Debug, Clone)]
pub enum MotionElement {
    Walk(WalkElement),
    Joint(JointElement),
    Task(TaskElement),
    VisualPoint(VisualPointElement),
}

fn ankle(raw: Option<[f64; 4]>, default: AnklePose) -> AnklePose {
    raw.map_or(default, |[x, y, z, yaw]| AnklePose::new(x, y, z, yaw))
}

fn dof_set(dofs: impl IntoIterator<Item = Dof>) -> DofSet {
    dofs.into_iter().collect()
}

impl MotionElement {
    /// Validate `spec`, the `index`-th entry of the `motion` list.
    pub fn from_spec(index: usize, spec: MotionSpec, env: &Environment) -> Result<Self, PlanError> {
        match spec {
            MotionSpec::Walk(w) => Self::walk(w),
            MotionSpec::Joint(j) => Self::joint(index, j),
            MotionSpec::Task(t) => Self::task(index, t),
            MotionSpec::VisualPoint(v) => Self::visual_point(index, v, env),
        }
    }

    fn walk(spec: WalkSpec) -> Result<Self, PlanError> {
        let name = spec.name.unwrap_or_else(|| "walk".to_string());
        let interval = require_interval("walk", spec.interval)?;
        let defaults = WalkParameters::default();
        let params = WalkParameters {
            step_duration: spec.step_duration.unwrap_or(defaults.step_duration),
            double_support: spec.double_support.unwrap_or(defaults.double_support),
            step_height: spec.step_height.unwrap_or(defaults.step_height),
            com_height: spec.com_height.unwrap_or(defaults.com_height),
            first_foot: spec.first_foot.unwrap_or(defaults.first_foot),
            left_ankle: ankle(spec.left_ankle, defaults.left_ankle),
            right_ankle: ankle(spec.right_ankle, defaults.right_ankle),
        };
        let footsteps: Vec<Pose2> = spec.footsteps.iter().map(|f| f.0).collect();
        let reference =
            FootstepReference::new(params, &footsteps).map_err(|reason| PlanError::InvalidElement {
                element: name.clone(),
                reason,
            })?;
        Ok(Self::Walk(WalkElement {
            name,
            interval,
            priority: spec.priority,
            reference,
            extra_dofs: dof_set(spec.extra_dofs),
            left_leg_dofs: dof_set(spec.left_leg_dofs.unwrap_or_else(|| LEFT_LEG_DOFS.collect())),
            right_leg_dofs: dof_set(
                spec.right_leg_dofs
                    .unwrap_or_else(|| RIGHT_LEG_DOFS.collect()),
            ),
        }))
    }

    fn joint(index: usize, spec: JointSpec) -> Result<Self, PlanError> {
        let name = spec.name.unwrap_or_else(|| format!("joint-{index}"));
        let interval = require_interval("joint", spec.interval)?;
        let raw_dofs = spec
            .dofs
            .ok_or_else(|| PlanError::MissingField("joint.dofs".into()))?;
        let dofs = dof_set(raw_dofs.iter().copied());
        if dofs.len() != raw_dofs.len() {
            return Err(PlanError::InvalidElement {
                element: name,
                reason: "dofs contain duplicates".into(),
            });
        }
        let position = spec.position.unwrap_or_default();
        if !position.is_empty() && position.len() != dofs.len() {
            return Err(PlanError::InvalidElement {
                element: name,
                reason: format!(
                    "{} positions given for {} dofs",
                    position.len(),
                    dofs.len()
                ),
            });
        }
        Ok(Self::Joint(JointElement {
            name,
            interval,
            priority: spec.priority,
            dofs,
            position,
        }))
    }

    fn task(index: usize, spec: TaskSpec) -> Result<Self, PlanError> {
        let operational_point = spec
            .operational_point
            .ok_or_else(|| PlanError::MissingField("task.operational-point".into()))?;
        let name = spec.name.unwrap_or_else(|| format!("task-{index}"));
        Ok(Self::Task(TaskElement {
            interval: require_interval("task", spec.interval)?,
            name,
            priority: spec.priority,
            operational_point,
            dofs: dof_set(spec.dofs),
        }))
    }

    fn visual_point(
        index: usize,
        spec: VisualPointSpec,
        env: &Environment,
    ) -> Result<Self, PlanError> {
        let object = spec
            .object
            .ok_or_else(|| PlanError::MissingField("visual-point.object".into()))?;
        let object_pose = env.get(&object)?;
        Ok(Self::VisualPoint(VisualPointElement {
            name: spec.name.unwrap_or_else(|| format!("visual-point-{index}")),
            interval: require_interval("visual-point", spec.interval)?,
            priority: spec.priority,
            object,
            object_pose,
            dofs: dof_set(spec.dofs),
        }))
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Walk(_) => "walk",
            Self::Joint(_) => "joint",
            Self::Task(_) => "task",
            Self::VisualPoint(_) => "visual-point",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Walk(w) => &w.name,
            Self::Joint(j) => &j.name,
            Self::Task(t) => &t.name,
            Self::VisualPoint(v) => &v.name,
        }
    }

    pub fn interval(&self) -> Interval {
        match self {
            Self::Walk(w) => w.interval,
            Self::Joint(j) => j.interval,
            Self::Task(t) => t.interval,
            Self::VisualPoint(v) => v.interval,
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            Self::Walk(w) => w.priority,
            Self::Joint(j) => j.priority,
            Self::Task(t) => t.priority,
            Self::VisualPoint(v) => v.priority,
        }
    }

    /// Tasks this element registers with the supervisor.
    ///
    /// A walk expands into CoM, left ankle, right ankle and waist tasks at
    /// descending priority offsets above the element's own priority.
    pub fn tasks(&self) -> Vec<ScheduledTask> {
        let task = |name: String, priority: i32, dofs: &DofSet| ScheduledTask {
            name,
            interval: self.interval(),
            priority,
            dofs: dofs.clone(),
        };
        match self {
            Self::Walk(w) => vec![
                task(format!("{}_com", w.name), w.priority + 3, &w.extra_dofs),
                task(format!("{}_left-ankle", w.name), w.priority + 2, &w.left_leg_dofs),
                task(format!("{}_right-ankle", w.name), w.priority + 1, &w.right_leg_dofs),
                task(format!("{}_waist", w.name), w.priority, &DofSet::new()),
            ],
            Self::Joint(j) => vec![task(j.name.clone(), j.priority, &j.dofs)],
            Self::Task(t) => vec![task(t.name.clone(), t.priority, &t.dofs)],
            Self::VisualPoint(v) => vec![task(v.name.clone(), v.priority, &v.dofs)],
        }
    }
}

impl fmt::Display for MotionElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' {} priority {}",
            self.tag(),
            self.name(),
            self.interval(),
            self.priority()
        )?;
        match self {
            Self::Walk(w) => write!(
                f,
                ", {} footsteps over {:.3} s",
                w.reference.footsteps(),
                w.reference.duration()
            ),
            Self::Joint(j) => write!(f, ", dofs {}", j.dofs),
            Self::Task(t) => write!(f, ", point {}", t.operational_point),
            Self::VisualPoint(v) => write!(f, ", object {} at {}", v.object, v.object_pose),
        }
    }
}
