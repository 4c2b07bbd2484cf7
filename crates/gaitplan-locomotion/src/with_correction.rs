//! [`CorrectedFollower`] – a follower with the correction pipeline threaded
//! through its outputs.
//!
//! Every tick:
//!
//! 1. sample the base follower (nominal trajectory),
//! 2. run each owned strategy against the control elements, using the
//!    nominal planned pose,
//! 3. merge the raw estimates,
//! 4. step the rate-limited [`CorrectionOperator`],
//! 5. apply the offset `(x, y, θ)` as a planar rigid transform to every
//!    output, with the matching velocity terms.
//!
//! For a point `p` with velocity `v` the corrected signals are
//!
//! ```text
//! p' = R(θ)·p + t
//! v' = R(θ)·v + θ̇·J·R(θ)·p + ṫ        J = [[0, −1], [1, 0]]
//! ```
//!
//! so position and velocity stay consistent while the offset moves.
//!
//! A non-finite nominal sample fails the follower's output [`Signal`] for that
//! tick: the correction operator is not stepped and the previous corrected
//! sample is held.

use std::fmt;

use gaitplan_kernel::{CorrectionOperator, CorrectionStep};
use gaitplan_perception::{ControlElement, ErrorEstimationStrategy, ErrorMerger};
use gaitplan_signal::{Signal, SignalError};
use gaitplan_types::{AnklePose, ErrorEstimate, Pose2, Tick, Vec3};

use crate::feet_follower::{FeetFollower, FollowerSample, FollowerState};

/// Everything computed for one corrected tick.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedSample {
    pub nominal: FollowerSample,
    pub corrected: FollowerSample,
    /// Raw estimate of each strategy, in strategy order.
    pub raw: Vec<Option<ErrorEstimate>>,
    pub merged: ErrorEstimate,
    pub step: CorrectionStep,
}

/// Planar rigid transform with its time derivative.
#[derive(Debug, Clone, Copy)]
struct Rigid {
    offset: Pose2,
    rate: Pose2,
}

impl Rigid {
    fn point(&self, p: Vec3, v: Vec3) -> (Vec3, Vec3) {
        let (s, c) = self.offset.theta.sin_cos();
        let rx = c * p.x - s * p.y;
        let ry = s * p.x + c * p.y;
        let position = Vec3::new(rx + self.offset.x, ry + self.offset.y, p.z);
        let w = self.rate.theta;
        let velocity = Vec3::new(
            c * v.x - s * v.y - w * ry + self.rate.x,
            s * v.x + c * v.y + w * rx + self.rate.y,
            v.z,
        );
        (position, velocity)
    }

    fn ankle(&self, a: AnklePose, v: AnklePose) -> (AnklePose, AnklePose) {
        let (p, pv) = self.point(a.position, v.position);
        (
            AnklePose {
                position: p,
                yaw: a.yaw + self.offset.theta,
            },
            AnklePose {
                position: pv,
                yaw: v.yaw + self.rate.theta,
            },
        )
    }

    fn apply(&self, s: &FollowerSample) -> FollowerSample {
        let (com, com_velocity) = self.point(s.com, s.com_velocity);
        let (zmp, zmp_velocity) = self.point(s.zmp, s.zmp_velocity);
        let (left_ankle, left_ankle_velocity) = self.ankle(s.left_ankle, s.left_ankle_velocity);
        let (right_ankle, right_ankle_velocity) = self.ankle(s.right_ankle, s.right_ankle_velocity);
        FollowerSample {
            tick: s.tick,
            com,
            com_velocity,
            zmp,
            zmp_velocity,
            left_ankle,
            left_ankle_velocity,
            right_ankle,
            right_ankle_velocity,
            waist_yaw: s.waist_yaw + self.offset.theta,
            waist_yaw_velocity: s.waist_yaw_velocity + self.rate.theta,
        }
    }
}

/// Wraps a base follower with strategies, a merger and a correction operator
/// scoped to this instance.
pub struct CorrectedFollower<F> {
    base: F,
    strategies: Vec<Box<dyn ErrorEstimationStrategy>>,
    merger: ErrorMerger,
    correction: CorrectionOperator,
    output: Signal<CorrectedSample>,
}

impl<F: FeetFollower> CorrectedFollower<F> {
    pub fn new(
        base: F,
        strategies: Vec<Box<dyn ErrorEstimationStrategy>>,
        correction: CorrectionOperator,
    ) -> Self {
        Self {
            output: Signal::new(format!("corrected/{}", base.name())),
            base,
            strategies,
            merger: ErrorMerger::new(),
            correction,
        }
    }

    pub fn base(&self) -> &F {
        &self.base
    }

    pub fn correction(&self) -> &CorrectionOperator {
        &self.correction
    }

    pub fn strategies(&self) -> &[Box<dyn ErrorEstimationStrategy>] {
        &self.strategies
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Last corrected tick, if any.
    pub fn last(&self) -> Option<&CorrectedSample> {
        self.output.last()
    }

    /// Run the whole pipeline for `tick`.  Memoized per tick; `None` while
    /// the base follower has no output.
    pub fn correct(
        &mut self,
        tick: Tick,
        controls: &mut [ControlElement],
    ) -> Option<CorrectedSample> {
        if let Some(done) = self.output.at(tick) {
            return Some(done.clone());
        }
        let nominal = self.base.sample(tick)?;
        let produced = self.produce(tick, nominal, controls);
        self.output.get_or_hold(tick, || produced)
    }

    fn produce(
        &mut self,
        tick: Tick,
        nominal: FollowerSample,
        controls: &mut [ControlElement],
    ) -> Result<CorrectedSample, SignalError> {
        if !nominal.is_finite() {
            return Err(SignalError::new(
                self.output.name(),
                tick,
                "non-finite nominal sample",
            ));
        }
        let planned = nominal.planned_pose();

        let raw: Vec<Option<ErrorEstimate>> = self
            .strategies
            .iter_mut()
            .map(|s| s.estimate(tick, &planned, controls))
            .collect();
        let valid: Vec<ErrorEstimate> = raw.iter().flatten().copied().collect();
        let merged = self.merger.merge(&valid, tick);
        let step = self.correction.step(tick, &merged);

        let rigid = Rigid {
            offset: step.offset,
            rate: step.velocity,
        };
        Ok(CorrectedSample {
            nominal,
            corrected: rigid.apply(&nominal),
            raw,
            merged,
            step,
        })
    }
}

impl<F: FeetFollower> FeetFollower for CorrectedFollower<F> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn state(&self) -> FollowerState {
        self.base.state()
    }

    fn can_start(&self) -> bool {
        self.base.can_start()
    }

    fn start(&mut self, tick: Tick) {
        self.base.start(tick);
    }

    fn start_time(&self) -> Option<Tick> {
        self.base.start_time()
    }

    fn duration(&self) -> f64 {
        self.base.duration()
    }

    /// Corrected output.  When [`CorrectedFollower::correct`] already ran for
    /// `tick` its result is returned; otherwise the pipeline runs without
    /// control elements, which holds the current offset.
    fn sample(&mut self, tick: Tick) -> Option<FollowerSample> {
        self.correct(tick, &mut []).map(|c| c.corrected)
    }
}

impl<F: FeetFollower + fmt::Display> fmt::Display for CorrectedFollower<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} with correction [{}] {}",
            self.base,
            self.strategy_names().join(", "),
            self.correction
        )
    }
}
