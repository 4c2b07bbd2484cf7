//! Control elements.
//!
//! A [`ControlElement`] wraps one measurement source and turns it into an
//! [`ErrorEstimate`]: the offset `planned − observed` that has to be added to
//! the nominal trajectory so the robot lands where the plan wants it.
//!
//! Sampling never blocks.  When no fresh measurement arrived during a tick the
//! previous estimate is returned again with its confidence multiplied by the
//! staleness decay once per stale tick.  A fresh estimate carries the tick its
//! measurement was taken at, so strategies can rank sources by freshness.
//!
//! A measurement that cannot be turned into a finite estimate fails the
//! element's output [`Signal`] for that tick; the previous output is held.
//!
//! | Kind | Source | Family |
//! |---|---|---|
//! | `constant` | fixed configured offset | posture |
//! | `mocap` | robot world pose | posture |
//! | `virtual-sensor` | synthetic linear drift | posture |
//! | `visual-servo` | object pose in the robot frame | vision |
//! | `hueblob` | blob position in the robot frame | vision |

use std::fmt;

use gaitplan_signal::{Signal, SignalError};
use gaitplan_types::{ErrorEstimate, Pose2, Tick, wrap_angle};
use tracing::debug;

use crate::bridge::{Measurement, MeasurementInbox};

/// Default per-tick confidence decay applied to a stale estimate.
pub const DEFAULT_STALENESS_DECAY: f64 = 0.9;

/// The closed set of control element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlKind {
    Constant,
    Mocap,
    VisualServo,
    Hueblob,
    VirtualSensor,
}

/// Which error-estimation strategy consumes an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFamily {
    Posture,
    Vision,
}

impl ControlKind {
    pub const ALL: [ControlKind; 5] = [
        ControlKind::Constant,
        ControlKind::Mocap,
        ControlKind::VisualServo,
        ControlKind::Hueblob,
        ControlKind::VirtualSensor,
    ];

    /// Document tag of this kind.
    pub fn tag(self) -> &'static str {
        match self {
            ControlKind::Constant => "constant",
            ControlKind::Mocap => "mocap",
            ControlKind::VisualServo => "visual-servo",
            ControlKind::Hueblob => "hueblob",
            ControlKind::VirtualSensor => "virtual-sensor",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    pub fn family(self) -> ControlFamily {
        match self {
            ControlKind::Constant | ControlKind::Mocap | ControlKind::VirtualSensor => {
                ControlFamily::Posture
            }
            ControlKind::VisualServo | ControlKind::Hueblob => ControlFamily::Vision,
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Where an element gets its observation from.
#[derive(Debug)]
pub enum ControlSource {
    /// Fixed offset, reported as-is every tick.
    Constant { offset: Pose2 },
    /// Robot (waist) world pose.
    Mocap { inbox: MeasurementInbox },
    /// Pose of a known environment object, measured in the robot frame.
    VisualServo {
        object: String,
        object_pose: Pose2,
        inbox: MeasurementInbox,
    },
    /// Position of a known environment object in the robot frame; heading is
    /// not observed.
    Hueblob {
        object: String,
        object_pose: Pose2,
        inbox: MeasurementInbox,
    },
    /// Observed pose drifts away from the plan at `drift` per second.
    VirtualSensor { drift: Pose2, period: f64 },
}

impl ControlSource {
    pub fn kind(&self) -> ControlKind {
        match self {
            ControlSource::Constant { .. } => ControlKind::Constant,
            ControlSource::Mocap { .. } => ControlKind::Mocap,
            ControlSource::VisualServo { .. } => ControlKind::VisualServo,
            ControlSource::Hueblob { .. } => ControlKind::Hueblob,
            ControlSource::VirtualSensor { .. } => ControlKind::VirtualSensor,
        }
    }

    fn inbox(&mut self) -> Option<&mut MeasurementInbox> {
        match self {
            ControlSource::Mocap { inbox }
            | ControlSource::VisualServo { inbox, .. }
            | ControlSource::Hueblob { inbox, .. } => Some(inbox),
            ControlSource::Constant { .. } | ControlSource::VirtualSensor { .. } => None,
        }
    }

    /// Environment object a vision source observes.
    pub fn object(&self) -> Option<&str> {
        match self {
            ControlSource::VisualServo { object, .. } | ControlSource::Hueblob { object, .. } => {
                Some(object)
            }
            _ => None,
        }
    }

    fn is_synthetic(&self) -> bool {
        matches!(
            self,
            ControlSource::Constant { .. } | ControlSource::VirtualSensor { .. }
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ControlElement
// ────────────────────────────────────────────────────────────────────────────

/// One control element of a motion plan.
#[derive(Debug)]
pub struct ControlElement {
    name: String,
    source: ControlSource,
    confidence: f64,
    staleness_decay: f64,
    /// Newest measurement not yet turned into an estimate.
    pending: Option<Measurement>,
    /// Last estimate built from a fresh observation, with the tick it was
    /// built at.
    fresh: Option<(ErrorEstimate, Tick)>,
    first_sample: Option<Tick>,
    output: Signal<Option<ErrorEstimate>>,
}

impl ControlElement {
    pub fn new(name: impl Into<String>, source: ControlSource) -> Self {
        let name = name.into();
        Self {
            output: Signal::new(format!("control/{name}")),
            name,
            source,
            confidence: 1.0,
            staleness_decay: DEFAULT_STALENESS_DECAY,
            pending: None,
            fresh: None,
            first_sample: None,
        }
    }

    /// Confidence attached to a fresh estimate (clamped to `[0, 1]`).
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Per-tick multiplier applied to a stale estimate (clamped to `[0, 1]`).
    pub fn with_staleness_decay(mut self, decay: f64) -> Self {
        self.staleness_decay = decay.clamp(0.0, 1.0);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ControlKind {
        self.source.kind()
    }

    pub fn family(&self) -> ControlFamily {
        self.kind().family()
    }

    pub fn object(&self) -> Option<&str> {
        self.source.object()
    }

    /// Drain the element's inbox without producing an estimate.  Called every
    /// tick, before and after start, so readiness can be reached while the
    /// plan waits.
    pub fn poll(&mut self) {
        let Some(inbox) = self.source.inbox() else {
            return;
        };
        if let Some(m) = inbox.drain_latest() {
            if self.pending.is_none_or(|p| m.stamp >= p.stamp) {
                self.pending = Some(m);
            }
        }
    }

    /// `true` once at least one valid measurement was received.
    /// Synthetic sources are always ready.
    pub fn can_start(&self) -> bool {
        self.source.is_synthetic()
            || self.fresh.is_some()
            || self.pending.is_some_and(|m| m.pose.is_finite())
    }

    /// The estimate for `tick` given the robot pose the plan expects.
    ///
    /// Memoized per tick.  Returns `None` while nothing was ever observed.
    /// When this tick's measurement is unusable the previous output is held.
    pub fn sample(&mut self, tick: Tick, planned: &Pose2) -> Option<ErrorEstimate> {
        if let Some(cached) = self.output.at(tick) {
            return *cached;
        }
        self.poll();
        let produced = self.compute(tick, planned);
        self.output.get_or_hold(tick, || produced).flatten()
    }

    /// Last estimate handed out, if any.
    pub fn last_estimate(&self) -> Option<ErrorEstimate> {
        self.output.last().copied().flatten()
    }

    fn compute(
        &mut self,
        tick: Tick,
        planned: &Pose2,
    ) -> Result<Option<ErrorEstimate>, SignalError> {
        let observed = match &self.source {
            ControlSource::Constant { offset } => {
                return Ok(Some(ErrorEstimate::new(*offset, self.confidence, tick)));
            }
            ControlSource::VirtualSensor { drift, period } => {
                let origin = *self.first_sample.get_or_insert(tick);
                let elapsed = tick.ticks_since(origin).unwrap_or(0) as f64 * period;
                Some((*planned + drift.scale(elapsed), tick))
            }
            ControlSource::Mocap { .. } => self.pending.take().map(|m| (m.pose, m.stamp)),
            ControlSource::VisualServo { object_pose, .. } => self
                .pending
                .take()
                .map(|m| (object_pose.compose(m.pose.inverse()), m.stamp)),
            ControlSource::Hueblob { object_pose, .. } => self.pending.take().map(|m| {
                // Heading is unobserved: rebuild the robot pose with the
                // planned heading.
                let relative = Pose2::new(m.pose.x, m.pose.y, 0.0).rotate(planned.theta);
                let robot = Pose2::new(
                    object_pose.x - relative.x,
                    object_pose.y - relative.y,
                    planned.theta,
                );
                (robot, m.stamp)
            }),
        };

        match observed {
            Some((observed, stamp)) => {
                let error = Pose2::new(
                    planned.x - observed.x,
                    planned.y - observed.y,
                    wrap_angle(planned.theta - observed.theta),
                );
                if !error.is_finite() {
                    return Err(SignalError::new(
                        self.output.name(),
                        tick,
                        format!("non-finite estimate from measurement stamped {stamp}"),
                    ));
                }
                // A stamp from the future cannot be fresher than now.
                let estimate = ErrorEstimate::new(error, self.confidence, stamp.min(tick));
                self.fresh = Some((estimate, tick));
                Ok(Some(estimate))
            }
            None => {
                let Some((fresh, received)) = self.fresh else {
                    return Ok(None);
                };
                let stale_ticks = tick.ticks_since(received).unwrap_or(0);
                let decay = self
                    .staleness_decay
                    .powi(stale_ticks.min(i32::MAX as u64) as i32);
                debug!(control = %self.name, stale_ticks, "no fresh measurement");
                Ok(Some(ErrorEstimate {
                    confidence: fresh.confidence * decay,
                    ..fresh
                }))
            }
        }
    }
}

impl fmt::Display for ControlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {})",
            self.name,
            self.kind(),
            if self.can_start() { "ready" } else { "waiting" }
        )?;
        if let Some(object) = self.object() {
            write!(f, " object={object}")?;
        }
        match self.last_estimate() {
            Some(e) => write!(
                f,
                " last={} conf={:.3} @{}",
                e.offset(),
                e.confidence,
                e.tick
            ),
            None => f.write_str(" last=none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MeasurementBridge;
    use std::f64::consts::FRAC_PI_2;

    // ---- helpers ----------------------------------------------------------

    fn mocap() -> (MeasurementBridge, ControlElement) {
        let bridge = MeasurementBridge::new("mocap-0");
        let inbox = bridge.subscribe();
        let element = ControlElement::new("mocap-0", ControlSource::Mocap { inbox });
        (bridge, element)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // ---- kinds ------------------------------------------------------------

    #[test]
    fn tags_round_trip() {
        for kind in ControlKind::ALL {
            assert_eq!(ControlKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ControlKind::from_tag("sonar"), None);
        assert_eq!(ControlKind::Hueblob.family(), ControlFamily::Vision);
        assert_eq!(ControlKind::VirtualSensor.family(), ControlFamily::Posture);
    }

    // ---- constant ---------------------------------------------------------

    #[test]
    fn constant_is_always_ready() {
        let mut c = ControlElement::new(
            "constant-0",
            ControlSource::Constant {
                offset: Pose2::new(1.0, 2.0, 0.0),
            },
        );
        assert!(c.can_start());
        let e = c.sample(Tick(4), &Pose2::zero()).unwrap();
        assert_eq!(e.offset(), Pose2::new(1.0, 2.0, 0.0));
        assert_eq!(e.confidence, 1.0);
        assert_eq!(e.tick, Tick(4));
    }

    // ---- mocap ------------------------------------------------------------

    #[test]
    fn mocap_waits_for_first_measurement() {
        let (bridge, mut c) = mocap();
        assert!(!c.can_start());
        assert!(c.sample(Tick(0), &Pose2::zero()).is_none());

        bridge.publish(Measurement::new(Pose2::new(0.5, 0.0, 0.0), Tick(1)));
        c.poll();
        assert!(c.can_start());
    }

    #[test]
    fn mocap_error_is_planned_minus_observed() {
        let (bridge, mut c) = mocap();
        bridge.publish(Measurement::new(Pose2::new(0.9, 2.1, 0.1), Tick(1)));
        let e = c.sample(Tick(1), &Pose2::new(1.0, 2.0, 0.0)).unwrap();
        assert!(close(e.dx, 0.1));
        assert!(close(e.dy, -0.1));
        assert!(close(e.dtheta, -0.1));
    }

    #[test]
    fn stale_estimate_loses_confidence_per_tick() {
        let (bridge, mut c) = mocap();
        bridge.publish(Measurement::new(Pose2::new(1.0, 0.0, 0.0), Tick(0)));
        let planned = Pose2::zero();
        let fresh = c.sample(Tick(0), &planned).unwrap();
        assert_eq!(fresh.confidence, 1.0);

        let stale = c.sample(Tick(1), &planned).unwrap();
        assert!(close(stale.confidence, 0.9));
        assert_eq!(stale.tick, Tick(0));
        assert_eq!(stale.offset(), fresh.offset());

        let staler = c.sample(Tick(3), &planned).unwrap();
        assert!(close(staler.confidence, 0.729));
    }

    #[test]
    fn estimate_carries_measurement_tick() {
        let (bridge, mut c) = mocap();
        // Measured at tick 3, delivered at tick 5.
        bridge.publish(Measurement::new(Pose2::new(1.0, 0.0, 0.0), Tick(3)));
        let e = c.sample(Tick(5), &Pose2::zero()).unwrap();
        assert_eq!(e.tick, Tick(3));
        assert_eq!(e.confidence, 1.0);
        // Staleness counts from delivery.
        let stale = c.sample(Tick(6), &Pose2::zero()).unwrap();
        assert_eq!(stale.tick, Tick(3));
        assert!(close(stale.confidence, 0.9));
    }

    #[test]
    fn future_stamp_is_capped_at_current_tick() {
        let (bridge, mut c) = mocap();
        bridge.publish(Measurement::new(Pose2::zero(), Tick(40)));
        assert_eq!(c.sample(Tick(2), &Pose2::zero()).unwrap().tick, Tick(2));
    }

    #[test]
    fn unusable_measurement_holds_previous_output() {
        let (bridge, mut c) = mocap();
        bridge.publish(Measurement::new(Pose2::new(0.8, 0.0, 0.0), Tick(0)));
        let good = c.sample(Tick(0), &Pose2::new(1.0, 0.0, 0.0)).unwrap();
        assert!(close(good.dx, 0.2));

        bridge.publish(Measurement::new(Pose2::new(f64::NAN, 0.0, 0.0), Tick(1)));
        let held = c.sample(Tick(1), &Pose2::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(held, good);
        assert_eq!(c.last_estimate(), Some(good));

        // The next usable measurement replaces it.
        bridge.publish(Measurement::new(Pose2::new(1.1, 0.0, 0.0), Tick(2)));
        let next = c.sample(Tick(2), &Pose2::new(1.0, 0.0, 0.0)).unwrap();
        assert!(close(next.dx, -0.1));
    }

    #[test]
    fn non_finite_first_measurement_is_not_ready() {
        let (bridge, mut c) = mocap();
        bridge.publish(Measurement::new(Pose2::new(f64::INFINITY, 0.0, 0.0), Tick(0)));
        c.poll();
        assert!(!c.can_start());
        assert!(c.sample(Tick(0), &Pose2::zero()).is_none());
    }

    #[test]
    fn sample_is_memoized_per_tick() {
        let (bridge, mut c) = mocap();
        bridge.publish(Measurement::new(Pose2::new(1.0, 0.0, 0.0), Tick(0)));
        let first = c.sample(Tick(0), &Pose2::zero()).unwrap();
        bridge.publish(Measurement::new(Pose2::new(5.0, 0.0, 0.0), Tick(0)));
        let again = c.sample(Tick(0), &Pose2::zero()).unwrap();
        assert_eq!(first, again);
    }

    // ---- vision -----------------------------------------------------------

    #[test]
    fn visual_servo_recovers_robot_pose_from_object() {
        let bridge = MeasurementBridge::new("vs");
        let mut c = ControlElement::new(
            "visual-servo-0",
            ControlSource::VisualServo {
                object: "table".into(),
                object_pose: Pose2::new(2.0, 1.0, FRAC_PI_2),
                inbox: bridge.subscribe(),
            },
        );
        // Robot at (1, 1, 0) sees the object 1 m ahead, rotated by 90°.
        bridge.publish(Measurement::new(Pose2::new(1.0, 0.0, FRAC_PI_2), Tick(2)));
        let e = c.sample(Tick(2), &Pose2::new(1.0, 1.0, 0.0)).unwrap();
        assert!(close(e.dx, 0.0));
        assert!(close(e.dy, 0.0));
        assert!(close(e.dtheta, 0.0));
    }

    #[test]
    fn hueblob_ignores_heading() {
        let bridge = MeasurementBridge::new("hb");
        let mut c = ControlElement::new(
            "hueblob-0",
            ControlSource::Hueblob {
                object: "ball".into(),
                object_pose: Pose2::new(3.0, 0.0, 0.0),
                inbox: bridge.subscribe(),
            },
        );
        // Blob seen 2.5 m ahead: robot is at x = 0.5 while the plan says 0.
        bridge.publish(Measurement::new(Pose2::new(2.5, 0.0, 1.0), Tick(0)));
        let e = c.sample(Tick(0), &Pose2::zero()).unwrap();
        assert!(close(e.dx, -0.5));
        assert!(close(e.dy, 0.0));
        assert_eq!(e.dtheta, 0.0);
    }

    // ---- virtual sensor ---------------------------------------------------

    #[test]
    fn virtual_sensor_drifts_linearly() {
        let mut c = ControlElement::new(
            "virtual-sensor-0",
            ControlSource::VirtualSensor {
                drift: Pose2::new(0.1, 0.0, 0.0),
                period: 0.005,
            },
        );
        assert!(c.can_start());
        let e0 = c.sample(Tick(10), &Pose2::zero()).unwrap();
        assert!(close(e0.dx, 0.0));
        let e1 = c.sample(Tick(210), &Pose2::zero()).unwrap();
        assert!(close(e1.dx, -0.1));
    }

    #[test]
    fn display_mentions_state() {
        let (_bridge, c) = mocap();
        let line = c.to_string();
        assert!(line.contains("mocap-0"));
        assert!(line.contains("waiting"));
        assert!(line.contains("last=none"));
    }
}
