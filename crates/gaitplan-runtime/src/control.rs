//! Control plan elements.
//!
//! Turns decoded `control` entries into [`ControlElement`]s.  Every element
//! fed by an external stream gets its own [`MeasurementBridge`], which the
//! plan keeps so relays can publish into it by element name.

use std::time::Duration;

use gaitplan_perception::{ControlElement, ControlSource, MeasurementBridge};
use gaitplan_types::{PlanError, Pose2};

use crate::document::{ControlSpec, ObjectSensorSpec};
use crate::environment::Environment;

/// A built control element and, for stream-fed kinds, its input bridge.
#[derive(Debug)]
pub struct BuiltControl {
    pub element: ControlElement,
    pub bridge: Option<MeasurementBridge>,
}

fn pose(raw: [f64; 3]) -> Pose2 {
    let [x, y, theta] = raw;
    Pose2::new(x, y, theta)
}

fn check_unit(element: &str, field: &str, value: Option<f64>) -> Result<Option<f64>, PlanError> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(PlanError::InvalidElement {
            element: element.to_string(),
            reason: format!("{field} {v} must lie in [0, 1]"),
        }),
        other => Ok(other),
    }
}

fn tune(
    mut element: ControlElement,
    confidence: Option<f64>,
    decay: Option<f64>,
) -> Result<ControlElement, PlanError> {
    let name = element.name().to_string();
    if let Some(c) = check_unit(&name, "confidence", confidence)? {
        element = element.with_confidence(c);
    }
    if let Some(d) = check_unit(&name, "staleness-decay", decay)? {
        element = element.with_staleness_decay(d);
    }
    Ok(element)
}

fn object_sensor(
    tag: &str,
    index: usize,
    spec: ObjectSensorSpec,
    env: &Environment,
    hueblob: bool,
) -> Result<BuiltControl, PlanError> {
    let name = spec.name.unwrap_or_else(|| format!("{tag}-{index}"));
    let object = spec
        .object
        .ok_or_else(|| PlanError::MissingField(format!("{tag}.object")))?;
    let object_pose = env.get(&object)?;
    let bridge = MeasurementBridge::new(name.clone());
    let inbox = bridge.subscribe();
    let source = if hueblob {
        ControlSource::Hueblob {
            object,
            object_pose,
            inbox,
        }
    } else {
        ControlSource::VisualServo {
            object,
            object_pose,
            inbox,
        }
    };
    Ok(BuiltControl {
        element: tune(
            ControlElement::new(name, source),
            spec.confidence,
            spec.staleness_decay,
        )?,
        bridge: Some(bridge),
    })
}

/// Build the `index`-th control element.  Unnamed elements are called
/// `<tag>-<index>`.
pub fn build_control(
    index: usize,
    spec: ControlSpec,
    env: &Environment,
    period: Duration,
) -> Result<BuiltControl, PlanError> {
    match spec {
        ControlSpec::Constant(c) => {
            let name = c.name.unwrap_or_else(|| format!("constant-{index}"));
            let offset = pose(
                c.offset
                    .ok_or_else(|| PlanError::MissingField("constant.offset".into()))?,
            );
            if !offset.is_finite() {
                return Err(PlanError::InvalidElement {
                    element: name,
                    reason: "offset must be finite".into(),
                });
            }
            let element = ControlElement::new(name, ControlSource::Constant { offset });
            Ok(BuiltControl {
                element: tune(element, c.confidence, None)?,
                bridge: None,
            })
        }
        ControlSpec::Mocap(m) => {
            let name = m.name.unwrap_or_else(|| format!("mocap-{index}"));
            let bridge = MeasurementBridge::new(name.clone());
            let element = ControlElement::new(
                name,
                ControlSource::Mocap {
                    inbox: bridge.subscribe(),
                },
            );
            Ok(BuiltControl {
                element: tune(element, m.confidence, m.staleness_decay)?,
                bridge: Some(bridge),
            })
        }
        ControlSpec::VisualServo(v) => object_sensor("visual-servo", index, v, env, false),
        ControlSpec::Hueblob(h) => object_sensor("hueblob", index, h, env, true),
        ControlSpec::VirtualSensor(v) => {
            let name = v.name.unwrap_or_else(|| format!("virtual-sensor-{index}"));
            let drift = pose(v.drift.unwrap_or([0.0; 3]));
            let element = ControlElement::new(
                name,
                ControlSource::VirtualSensor {
                    drift,
                    period: period.as_secs_f64(),
                },
            );
            Ok(BuiltControl {
                element: tune(element, v.confidence, None)?,
                bridge: None,
            })
        }
    }
}
