//! Error-estimation strategies.
//!
//! A strategy looks at the control elements of one family and the pose the
//! plan expects, and yields at most one raw [`ErrorEstimate`] per tick.
//! Strategies are owned by the follower they correct, so two followers never
//! share selection state.
//!
//! Selection rule shared by both built-in strategies: among the elements of
//! the strategy's family that produced an estimate, keep the one measured most
//! recently; among equally fresh ones, the most confident; remaining ties go
//! to the lexicographically smallest element name.

use std::cmp::Ordering;

use gaitplan_signal::TickCache;
use gaitplan_types::{ErrorEstimate, Pose2, Tick};

use crate::control::{ControlElement, ControlFamily};

/// Maps control-element outputs and the planned pose to one raw estimate.
pub trait ErrorEstimationStrategy {
    fn name(&self) -> &str;

    /// Control elements this strategy reads from.
    fn family(&self) -> ControlFamily;

    /// Raw estimate for `tick`, or `None` when no element of interest has
    /// anything to say.
    fn estimate(
        &mut self,
        tick: Tick,
        planned: &Pose2,
        controls: &mut [ControlElement],
    ) -> Option<ErrorEstimate>;
}

/// Which strategies a plan installs on its follower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategySelection {
    /// Posture only.
    Posture,
    /// Posture and vision, merged.
    #[default]
    VisionAndPosture,
}

impl StrategySelection {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "posture" => Some(Self::Posture),
            "vision-and-posture" => Some(Self::VisionAndPosture),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Posture => "posture",
            Self::VisionAndPosture => "vision-and-posture",
        }
    }

    /// Fresh strategy instances for one follower.
    pub fn build(self) -> Vec<Box<dyn ErrorEstimationStrategy>> {
        match self {
            Self::Posture => vec![Box::new(PostureStrategy::new())],
            Self::VisionAndPosture => vec![
                Box::new(PostureStrategy::new()),
                Box::new(VisionStrategy::new()),
            ],
        }
    }
}

fn rank(a: &(ErrorEstimate, &str), b: &(ErrorEstimate, &str)) -> Ordering {
    a.0.tick
        .cmp(&b.0.tick)
        .then(a.0.confidence.total_cmp(&b.0.confidence))
        .then_with(|| b.1.cmp(a.1))
}

fn select(
    family: ControlFamily,
    tick: Tick,
    planned: &Pose2,
    controls: &mut [ControlElement],
) -> Option<ErrorEstimate> {
    let mut best: Option<(ErrorEstimate, &str)> = None;
    for control in controls.iter_mut() {
        if control.family() != family {
            continue;
        }
        let Some(estimate) = control.sample(tick, planned) else {
            continue;
        };
        if !estimate.is_valid() {
            continue;
        }
        let candidate = (estimate, control.name());
        if best
            .as_ref()
            .is_none_or(|b| rank(&candidate, b) == Ordering::Greater)
        {
            best = Some(candidate);
        }
    }
    best.map(|(e, _)| e)
}

/// Whole-body pose feedback: `mocap`, `constant` and `virtual-sensor`.
#[derive(Debug, Default)]
pub struct PostureStrategy {
    cache: TickCache<Option<ErrorEstimate>>,
}

impl PostureStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErrorEstimationStrategy for PostureStrategy {
    fn name(&self) -> &str {
        "posture"
    }

    fn family(&self) -> ControlFamily {
        ControlFamily::Posture
    }

    fn estimate(
        &mut self,
        tick: Tick,
        planned: &Pose2,
        controls: &mut [ControlElement],
    ) -> Option<ErrorEstimate> {
        self.cache.get_or_compute(tick, || {
            select(ControlFamily::Posture, tick, planned, controls)
        })
    }
}

/// Landmark feedback: `visual-servo` and `hueblob`.
#[derive(Debug, Default)]
pub struct VisionStrategy {
    cache: TickCache<Option<ErrorEstimate>>,
}

impl VisionStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErrorEstimationStrategy for VisionStrategy {
    fn name(&self) -> &str {
        "vision"
    }

    fn family(&self) -> ControlFamily {
        ControlFamily::Vision
    }

    fn estimate(
        &mut self,
        tick: Tick,
        planned: &Pose2,
        controls: &mut [ControlElement],
    ) -> Option<ErrorEstimate> {
        self.cache.get_or_compute(tick, || {
            select(ControlFamily::Vision, tick, planned, controls)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Measurement, MeasurementBridge};
    use crate::control::ControlSource;

    fn constant(name: &str, x: f64, confidence: f64) -> ControlElement {
        ControlElement::new(
            name,
            ControlSource::Constant {
                offset: Pose2::new(x, 0.0, 0.0),
            },
        )
        .with_confidence(confidence)
    }

    #[test]
    fn no_controls_means_no_estimate() {
        let mut s = PostureStrategy::new();
        assert!(s.estimate(Tick(0), &Pose2::zero(), &mut []).is_none());
    }

    #[test]
    fn posture_picks_most_confident() {
        let mut controls = vec![constant("a", 1.0, 0.4), constant("b", 2.0, 0.8)];
        let mut s = PostureStrategy::new();
        let e = s.estimate(Tick(0), &Pose2::zero(), &mut controls).unwrap();
        assert_eq!(e.dx, 2.0);
    }

    #[test]
    fn equal_confidence_tie_goes_to_smallest_name() {
        let mut forward = vec![constant("beta", 2.0, 1.0), constant("alpha", 1.0, 1.0)];
        let mut reverse = vec![constant("alpha", 1.0, 1.0), constant("beta", 2.0, 1.0)];
        let a = PostureStrategy::new()
            .estimate(Tick(0), &Pose2::zero(), &mut forward)
            .unwrap();
        let b = PostureStrategy::new()
            .estimate(Tick(0), &Pose2::zero(), &mut reverse)
            .unwrap();
        assert_eq!(a.dx, 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn fresher_measurement_beats_stale_confident_one() {
        let bridge = MeasurementBridge::new("m");
        let mut mocap = ControlElement::new(
            "mocap-0",
            ControlSource::Mocap {
                inbox: bridge.subscribe(),
            },
        );
        bridge.publish(Measurement::new(Pose2::new(-1.0, 0.0, 0.0), Tick(5)));
        mocap.poll();
        // A constant element is fresh every tick.
        let mut controls = vec![mocap, constant("constant-0", 0.3, 0.2)];
        let mut s = PostureStrategy::new();
        // Tick 5: both fresh, mocap more confident.
        let e5 = s.estimate(Tick(5), &Pose2::zero(), &mut controls).unwrap();
        assert_eq!(e5.dx, 1.0);
        // Tick 6: mocap stale.
        let e6 = s.estimate(Tick(6), &Pose2::zero(), &mut controls).unwrap();
        assert_eq!(e6.dx, 0.3);
    }

    #[test]
    fn late_delivered_measurement_ranks_by_its_stamp() {
        let bridge = MeasurementBridge::new("m");
        let mocap = ControlElement::new(
            "mocap-0",
            ControlSource::Mocap {
                inbox: bridge.subscribe(),
            },
        );
        // Taken at tick 2, delivered at tick 4.
        bridge.publish(Measurement::new(Pose2::new(-1.0, 0.0, 0.0), Tick(2)));
        let mut controls = vec![mocap, constant("constant-0", 0.3, 0.2)];
        let e = PostureStrategy::new()
            .estimate(Tick(4), &Pose2::zero(), &mut controls)
            .unwrap();
        assert_eq!(e.dx, 0.3);
        assert_eq!(e.tick, Tick(4));
    }

    #[test]
    fn vision_ignores_posture_family() {
        let mut controls = vec![constant("a", 1.0, 1.0)];
        let mut s = VisionStrategy::new();
        assert!(s.estimate(Tick(0), &Pose2::zero(), &mut controls).is_none());
        assert_eq!(s.name(), "vision");
    }

    #[test]
    fn zero_confidence_elements_are_skipped() {
        let mut controls = vec![constant("a", 1.0, 0.0)];
        let mut s = PostureStrategy::new();
        assert!(s.estimate(Tick(0), &Pose2::zero(), &mut controls).is_none());
    }

    #[test]
    fn selection_builds_expected_strategies() {
        let names: Vec<String> = StrategySelection::VisionAndPosture
            .build()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["posture", "vision"]);
        let families: Vec<ControlFamily> = StrategySelection::VisionAndPosture
            .build()
            .iter()
            .map(|s| s.family())
            .collect();
        assert_eq!(families, vec![ControlFamily::Posture, ControlFamily::Vision]);
        assert_eq!(StrategySelection::Posture.build().len(), 1);
        assert_eq!(StrategySelection::from_tag("posture"), Some(StrategySelection::Posture));
        assert_eq!(StrategySelection::from_tag("sonar"), None);
        assert_eq!(StrategySelection::default().tag(), "vision-and-posture");
    }
}
