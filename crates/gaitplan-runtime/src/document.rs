//! Plan document decoding.
//!
//! The document is YAML:
//!
//! ```yaml
//! name: corridor
//! duration: 6.0
//! error-strategy: vision-and-posture
//! maximum-correction-per-step: { x: 0.01, y: 0.01, theta: 0.01 }
//! environment:
//!   - object: { name: door, position: [3.0, 0.0, 0.0] }
//! motion:
//!   - walk:
//!       interval: [0.0, 5.0]
//!       footsteps: [{ x: 0.1, y: -0.19, theta: 0.0 }]
//!   - joint: { name: head, interval: [0.0, 2.0], priority: 1, dofs: [28, 29] }
//! control:
//!   - mocap: {}
//!   - visual-servo: { object: door }
//! ```
//!
//! `environment`, `motion` and `control` are sequences of single-key maps.
//! The key is a tag looked up in a fixed table per section; anything else is
//! rejected with the offending tag named.

use gaitplan_locomotion::Foot;
use gaitplan_perception::StrategySelection;
use gaitplan_types::{Interval, PlanError, Pose2};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

// ────────────────────────────────────────────────────────────────────────────
// Raw document
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawDocument {
    name: Option<String>,
    duration: Option<f64>,
    error_strategy: Option<String>,
    maximum_correction_per_step: Option<RawLimits>,
    #[serde(default)]
    environment: Vec<Value>,
    #[serde(default)]
    motion: Vec<Value>,
    #[serde(default)]
    control: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLimits {
    x: f64,
    y: f64,
    theta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPose {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    theta: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Decoded plan
// ────────────────────────────────────────────────────────────────────────────

/// A fully decoded plan document, before any component is built.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSpec {
    pub name: String,
    pub duration: f64,
    pub strategy: StrategySelection,
    pub max_step: Option<Pose2>,
    pub environment: Vec<ObjectSpec>,
    pub motion: Vec<MotionSpec>,
    pub control: Vec<ControlSpec>,
}

/// A named environment object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectSpec {
    pub name: String,
    /// `[x, y, theta]`.
    pub position: [f64; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub enum MotionSpec {
    Walk(WalkSpec),
    Joint(JointSpec),
    Task(TaskSpec),
    VisualPoint(VisualPointSpec),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WalkSpec {
    pub name: Option<String>,
    pub interval: Option<[f64; 2]>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub footsteps: Vec<Pose2Spec>,
    pub step_duration: Option<f64>,
    pub double_support: Option<f64>,
    pub step_height: Option<f64>,
    pub com_height: Option<f64>,
    pub first_foot: Option<Foot>,
    /// `[x, y, z, yaw]`.
    pub left_ankle: Option<[f64; 4]>,
    /// `[x, y, z, yaw]`.
    pub right_ankle: Option<[f64; 4]>,
    #[serde(default)]
    pub extra_dofs: Vec<u32>,
    pub left_leg_dofs: Option<Vec<u32>>,
    pub right_leg_dofs: Option<Vec<u32>>,
}

/// `{x, y, theta}` with every field optional.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "RawPose")]
pub struct Pose2Spec(pub Pose2);

impl From<RawPose> for Pose2Spec {
    fn from(r: RawPose) -> Self {
        Self(Pose2::new(r.x, r.y, r.theta))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct JointSpec {
    pub name: Option<String>,
    pub interval: Option<[f64; 2]>,
    #[serde(default)]
    pub priority: i32,
    pub dofs: Option<Vec<u32>>,
    pub position: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TaskSpec {
    pub name: Option<String>,
    pub interval: Option<[f64; 2]>,
    #[serde(default)]
    pub priority: i32,
    pub operational_point: Option<String>,
    #[serde(default)]
    pub dofs: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VisualPointSpec {
    pub name: Option<String>,
    pub interval: Option<[f64; 2]>,
    #[serde(default)]
    pub priority: i32,
    pub object: Option<String>,
    #[serde(default)]
    pub dofs: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlSpec {
    Constant(ConstantSpec),
    Mocap(SensorSpec),
    VisualServo(ObjectSensorSpec),
    Hueblob(ObjectSensorSpec),
    VirtualSensor(VirtualSensorSpec),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConstantSpec {
    pub name: Option<String>,
    /// `[x, y, theta]`.
    pub offset: Option<[f64; 3]>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SensorSpec {
    pub name: Option<String>,
    pub confidence: Option<f64>,
    pub staleness_decay: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ObjectSensorSpec {
    pub name: Option<String>,
    pub object: Option<String>,
    pub confidence: Option<f64>,
    pub staleness_decay: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VirtualSensorSpec {
    pub name: Option<String>,
    /// Drift per second, `[x, y, theta]`.
    pub drift: Option<[f64; 3]>,
    pub confidence: Option<f64>,
}

// ────────────────────────────────────────────────────────────────────────────
// Tag tables
// ────────────────────────────────────────────────────────────────────────────

type Decoder<T> = fn(Value) -> Result<T, PlanError>;

fn typed<T: DeserializeOwned>(tag: &str, value: Value) -> Result<T, PlanError> {
    // `walk: ~` and `mocap:` are accepted as empty bodies.
    let value = if value.is_null() {
        Value::Mapping(Mapping::new())
    } else {
        value
    };
    serde_yaml::from_value(value).map_err(|e| PlanError::Malformed(format!("{tag}: {e}")))
}

/// Motion tags and their decoders.
pub const MOTION_TAGS: &[(&str, Decoder<MotionSpec>)] = &[
    ("walk", |v| typed("walk", v).map(MotionSpec::Walk)),
    ("joint", |v| typed("joint", v).map(MotionSpec::Joint)),
    ("task", |v| typed("task", v).map(MotionSpec::Task)),
    ("visual-point", |v| typed("visual-point", v).map(MotionSpec::VisualPoint)),
];

/// Control tags and their decoders.
pub const CONTROL_TAGS: &[(&str, Decoder<ControlSpec>)] = &[
    ("constant", |v| typed("constant", v).map(ControlSpec::Constant)),
    ("mocap", |v| typed("mocap", v).map(ControlSpec::Mocap)),
    ("visual-servo", |v| typed("visual-servo", v).map(ControlSpec::VisualServo)),
    ("hueblob", |v| typed("hueblob", v).map(ControlSpec::Hueblob)),
    ("virtual-sensor", |v| typed("virtual-sensor", v).map(ControlSpec::VirtualSensor)),
];

/// Environment tags and their decoders.
pub const ENVIRONMENT_TAGS: &[(&str, Decoder<ObjectSpec>)] = &[("object", |v| typed("object", v))];

/// Split a single-key map into its tag and body.
fn single_key(kind: &str, element: Value) -> Result<(String, Value), PlanError> {
    let Value::Mapping(map) = element else {
        return Err(PlanError::AmbiguousElement {
            kind: kind.to_string(),
            found: 0,
        });
    };
    if map.len() != 1 {
        return Err(PlanError::AmbiguousElement {
            kind: kind.to_string(),
            found: map.len(),
        });
    }
    let Some((key, body)) = map.into_iter().next() else {
        return Err(PlanError::AmbiguousElement {
            kind: kind.to_string(),
            found: 0,
        });
    };
    let tag = match key {
        Value::String(s) => s,
        other => {
            return Err(PlanError::UnknownTag {
                kind: kind.to_string(),
                tag: format!("{other:?}"),
            });
        }
    };
    Ok((tag, body))
}

fn dispatch<T>(kind: &str, table: &[(&str, Decoder<T>)], element: Value) -> Result<T, PlanError> {
    let (tag, body) = single_key(kind, element)?;
    let decode = table
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, d)| *d)
        .ok_or_else(|| PlanError::UnknownTag {
            kind: kind.to_string(),
            tag: tag.clone(),
        })?;
    decode(body)
}

/// Check that an optional `[start, end]` pair is present and well-formed.
pub fn require_interval(element: &str, raw: Option<[f64; 2]>) -> Result<Interval, PlanError> {
    let [start, end] = raw.ok_or_else(|| PlanError::MissingField(format!("{element}.interval")))?;
    Interval::new(start, end)
}

// ────────────────────────────────────────────────────────────────────────────
// Entry point
// ────────────────────────────────────────────────────────────────────────────

/// Decode a YAML plan document.
pub fn parse(text: &str) -> Result<PlanSpec, PlanError> {
    let raw: RawDocument =
        serde_yaml::from_str(text).map_err(|e| PlanError::Malformed(e.to_string()))?;

    let duration = raw
        .duration
        .ok_or_else(|| PlanError::MissingField("duration".into()))?;
    if !duration.is_finite() || duration < 0.0 {
        return Err(PlanError::InvalidElement {
            element: "duration".into(),
            reason: format!("{duration} must be finite and >= 0"),
        });
    }

    let strategy = match raw.error_strategy.as_deref() {
        None => StrategySelection::default(),
        Some(tag) => StrategySelection::from_tag(tag).ok_or_else(|| PlanError::UnknownTag {
            kind: "error-strategy".into(),
            tag: tag.to_string(),
        })?,
    };

    let environment = raw
        .environment
        .into_iter()
        .map(|e| dispatch("environment", ENVIRONMENT_TAGS, e))
        .collect::<Result<Vec<_>, _>>()?;
    let motion = raw
        .motion
        .into_iter()
        .map(|e| dispatch("motion", MOTION_TAGS, e))
        .collect::<Result<Vec<_>, _>>()?;
    let control = raw
        .control
        .into_iter()
        .map(|e| dispatch("control", CONTROL_TAGS, e))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PlanSpec {
        name: raw.name.unwrap_or_else(|| "motion-plan".to_string()),
        duration,
        strategy,
        max_step: raw
            .maximum_correction_per_step
            .map(|l| Pose2::new(l.x, l.y, l.theta)),
        environment,
        motion,
        control,
    })
}
