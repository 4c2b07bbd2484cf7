//! Footstep reference.
//!
//! Turns a list of footsteps into a closed-form trajectory for the CoM, the
//! ZMP, both ankles and the waist yaw.  The timeline is a sequence of
//! segments; inside a segment every quantity moves between two keyframes with
//! the cubic blend `s(τ) = 3τ² − 2τ³`, so velocities are continuous and zero
//! at every keyframe.
//!
//! Each footstep takes `step-duration` seconds: a double-support phase of
//! `double-support` seconds during which the CoM shifts over the support
//! foot, then a single-support phase during which the swing foot moves to
//! its new pose and lifts by up to `step-height`.  A final double-support
//! phase brings the CoM back between the feet.
//!
//! Footstep displacements are expressed in the frame of the support foot.

use gaitplan_types::{AnklePose, Pose2, Vec3, wrap_angle};
use serde::{Deserialize, Serialize};

/// Rest pose of the left ankle.
pub const REST_LEFT_ANKLE: AnklePose = AnklePose::new(0.0, 0.095, 0.105, 0.0);
/// Rest pose of the right ankle.
pub const REST_RIGHT_ANKLE: AnklePose = AnklePose::new(0.0, -0.095, 0.105, 0.0);

/// One of the two feet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Foot {
    Left,
    Right,
}

impl Foot {
    pub fn other(self) -> Self {
        match self {
            Foot::Left => Foot::Right,
            Foot::Right => Foot::Left,
        }
    }
}

/// Timing and geometry of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkParameters {
    pub step_duration: f64,
    pub double_support: f64,
    pub step_height: f64,
    pub com_height: f64,
    /// Foot that moves first.
    pub first_foot: Foot,
    pub left_ankle: AnklePose,
    pub right_ankle: AnklePose,
}

impl Default for WalkParameters {
    fn default() -> Self {
        Self {
            step_duration: 0.8,
            double_support: 0.1,
            step_height: 0.05,
            com_height: 0.8,
            first_foot: Foot::Right,
            left_ankle: REST_LEFT_ANKLE,
            right_ankle: REST_RIGHT_ANKLE,
        }
    }
}

impl WalkParameters {
    /// Reason the parameters cannot produce a trajectory, if any.
    pub fn check(&self) -> Result<(), String> {
        let finite = [
            self.step_duration,
            self.double_support,
            self.step_height,
            self.com_height,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err("walk parameters must be finite".into());
        }
        if self.step_duration <= 0.0 {
            return Err(format!("step-duration {} must be > 0", self.step_duration));
        }
        if self.double_support < 0.0 || self.double_support >= self.step_duration {
            return Err(format!(
                "double-support {} must lie in [0, step-duration)",
                self.double_support
            ));
        }
        if self.step_height < 0.0 {
            return Err(format!("step-height {} must be >= 0", self.step_height));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Blending
// ────────────────────────────────────────────────────────────────────────────

fn blend(tau: f64) -> (f64, f64) {
    let t = tau.clamp(0.0, 1.0);
    (3.0 * t * t - 2.0 * t * t * t, 6.0 * t - 6.0 * t * t)
}

/// Swing-foot lift profile: 0 at both ends, 1 at mid-swing, zero slope at
/// both ends.
fn lift(tau: f64) -> (f64, f64) {
    let t = tau.clamp(0.0, 1.0);
    let u = t * (1.0 - t);
    (16.0 * u * u, 32.0 * u * (1.0 - 2.0 * t))
}

fn planar(a: &AnklePose) -> Pose2 {
    Pose2::new(a.position.x, a.position.y, a.yaw)
}

fn midpoint(a: Pose2, b: Pose2) -> Pose2 {
    Pose2::new(
        0.5 * (a.x + b.x),
        0.5 * (a.y + b.y),
        a.theta + 0.5 * wrap_angle(b.theta - a.theta),
    )
}

/// Blend between two planar poses (yaw along the short arc).  Returns the
/// pose and its derivative with respect to the segment parameter.
fn blend_pose(a: Pose2, b: Pose2, s: f64, ds: f64) -> (Pose2, Pose2) {
    let d = Pose2::new(b.x - a.x, b.y - a.y, wrap_angle(b.theta - a.theta));
    (a + d.scale(s), d.scale(ds))
}

// ────────────────────────────────────────────────────────────────────────────
// Reference
// ────────────────────────────────────────────────────────────────────────────

/// One sample of the nominal trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectoryPoint {
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

#[derive(Debug, Clone, Copy)]
struct Segment {
    start: f64,
    end: f64,
    com: (Pose2, Pose2),
    left: (Pose2, Pose2),
    right: (Pose2, Pose2),
    swing: Option<Foot>,
    zmp: Pose2,
}

/// Precomputed footstep trajectory, sampled in closed form.
#[derive(Debug, Clone)]
pub struct FootstepReference {
    params: WalkParameters,
    segments: Vec<Segment>,
    footsteps: usize,
}

impl FootstepReference {
    /// Build the reference for `footsteps` (displacements of the swing foot
    /// relative to the support foot, feet alternating).
    pub fn new(params: WalkParameters, footsteps: &[Pose2]) -> Result<Self, String> {
        params.check()?;
        if let Some(i) = footsteps.iter().position(|f| !f.is_finite()) {
            return Err(format!("footstep {i} is not finite"));
        }

        let mut left = planar(&params.left_ankle);
        let mut right = planar(&params.right_ankle);
        let mut com = midpoint(left, right);
        let mut swing = params.first_foot;
        let mut t = 0.0;
        let mut segments = Vec::with_capacity(2 * footsteps.len() + 1);
        let single = params.step_duration - params.double_support;

        for step in footsteps {
            let support = match swing {
                Foot::Left => right,
                Foot::Right => left,
            };
            let target = support.compose(*step);
            let com_over_support = Pose2::new(support.x, support.y, midpoint(left, right).theta);

            segments.push(Segment {
                start: t,
                end: t + params.double_support,
                com: (com, com_over_support),
                left: (left, left),
                right: (right, right),
                swing: None,
                zmp: support,
            });
            t += params.double_support;

            let (new_left, new_right) = match swing {
                Foot::Left => (target, right),
                Foot::Right => (left, target),
            };
            let com_after = Pose2::new(support.x, support.y, midpoint(new_left, new_right).theta);
            segments.push(Segment {
                start: t,
                end: t + single,
                com: (com_over_support, com_after),
                left: (left, new_left),
                right: (right, new_right),
                swing: Some(swing),
                zmp: support,
            });
            t += single;

            left = new_left;
            right = new_right;
            com = com_after;
            swing = swing.other();
        }

        let rest = midpoint(left, right);
        let closing = if footsteps.is_empty() { 0.0 } else { params.double_support };
        segments.push(Segment {
            start: t,
            end: t + closing,
            com: (com, rest),
            left: (left, left),
            right: (right, right),
            swing: None,
            zmp: rest,
        });

        Ok(Self {
            params,
            segments,
            footsteps: footsteps.len(),
        })
    }

    pub fn params(&self) -> &WalkParameters {
        &self.params
    }

    pub fn footsteps(&self) -> usize {
        self.footsteps
    }

    /// Total duration in seconds.
    pub fn duration(&self) -> f64 {
        self.segments.last().map_or(0.0, |s| s.end)
    }

    /// Trajectory at `t` seconds from the start.  Times outside
    /// `[0, duration]` hold the nearest end with zero velocity.
    pub fn sample(&self, t: f64) -> TrajectoryPoint {
        let clamped = t.clamp(0.0, self.duration());
        let holding = t < 0.0 || t >= self.duration();
        let segment = self
            .segments
            .iter()
            .find(|s| clamped < s.end)
            .or_else(|| self.segments.last());
        let Some(seg) = segment else {
            return TrajectoryPoint::default();
        };

        let length = seg.end - seg.start;
        let tau = if length > 0.0 { (clamped - seg.start) / length } else { 1.0 };
        let (s, ds_dtau) = blend(tau);
        let rate = if length > 0.0 && !holding { ds_dtau / length } else { 0.0 };

        let (com, com_v) = blend_pose(seg.com.0, seg.com.1, s, rate);
        let (left, left_v) = blend_pose(seg.left.0, seg.left.1, s, rate);
        let (right, right_v) = blend_pose(seg.right.0, seg.right.1, s, rate);

        let (h, dh_dtau) = lift(tau);
        let dh = if length > 0.0 && !holding { dh_dtau / length } else { 0.0 };
        let lift_of = |foot: Foot| match seg.swing {
            Some(f) if f == foot => (h * self.params.step_height, dh * self.params.step_height),
            _ => (0.0, 0.0),
        };
        let (lz, lvz) = lift_of(Foot::Left);
        let (rz, rvz) = lift_of(Foot::Right);

        let waist = midpoint(left, right);
        let waist_v = 0.5 * (left_v.theta + right_v.theta);

        TrajectoryPoint {
            com: Vec3::new(com.x, com.y, self.params.com_height),
            com_velocity: Vec3::new(com_v.x, com_v.y, 0.0),
            zmp: Vec3::new(seg.zmp.x, seg.zmp.y, 0.0),
            zmp_velocity: Vec3::zero(),
            left_ankle: AnklePose::new(left.x, left.y, self.params.left_ankle.position.z + lz, left.theta),
            left_ankle_velocity: AnklePose::new(left_v.x, left_v.y, lvz, left_v.theta),
            right_ankle: AnklePose::new(
                right.x,
                right.y,
                self.params.right_ankle.position.z + rz,
                right.theta,
            ),
            right_ankle_velocity: AnklePose::new(right_v.x, right_v.y, rvz, right_v.theta),
            waist_yaw: waist.theta,
            waist_yaw_velocity: waist_v,
        }
    }
}

/// `n` forward steps of `length` metres, alternating feet at the rest
/// stance width.
pub fn straight_walk(n: usize, length: f64, first: Foot) -> Vec<Pose2> {
    let width = REST_LEFT_ANKLE.position.y - REST_RIGHT_ANKLE.position.y;
    let mut foot = first;
    (0..n)
        .map(|_| {
            let lateral = match foot {
                Foot::Right => -width,
                Foot::Left => width,
            };
            foot = foot.other();
            Pose2::new(length, lateral, 0.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn blend_has_zero_slope_at_ends() {
        assert_eq!(blend(0.0), (0.0, 0.0));
        assert_eq!(blend(1.0), (1.0, 0.0));
        let (s, _) = blend(0.5);
        assert!(close(s, 0.5));
        assert_eq!(lift(0.0).0, 0.0);
        assert!(close(lift(0.5).0, 1.0));
        assert!(close(lift(1.0).1, 0.0));
    }

    #[test]
    fn empty_walk_stands_at_rest() {
        let r = FootstepReference::new(WalkParameters::default(), &[]).unwrap();
        assert_eq!(r.duration(), 0.0);
        let p = r.sample(3.0);
        assert!(close(p.com.x, 0.0));
        assert!(close(p.com.y, 0.0));
        assert!(close(p.com.z, 0.8));
        assert!(close(p.left_ankle.position.y, 0.095));
        assert!(close(p.right_ankle.position.y, -0.095));
        assert_eq!(p.com_velocity, Vec3::zero());
    }

    #[test]
    fn duration_counts_steps_and_closing_phase() {
        let steps = straight_walk(4, 0.1, Foot::Right);
        let r = FootstepReference::new(WalkParameters::default(), &steps).unwrap();
        assert!(close(r.duration(), 4.0 * 0.8 + 0.1));
        assert_eq!(r.footsteps(), 4);
    }

    #[test]
    fn first_step_moves_right_foot_relative_to_left() {
        let steps = vec![Pose2::new(0.1, -0.19, 0.0)];
        let r = FootstepReference::new(WalkParameters::default(), &steps).unwrap();
        let end = r.sample(r.duration());
        assert!(close(end.right_ankle.position.x, 0.1));
        assert!(close(end.right_ankle.position.y, 0.095 - 0.19));
        assert!(close(end.left_ankle.position.x, 0.0));
        // CoM ends between the feet.
        assert!(close(end.com.x, 0.05));
    }

    #[test]
    fn zmp_sits_on_support_foot_during_step() {
        let steps = vec![Pose2::new(0.1, -0.19, 0.0)];
        let r = FootstepReference::new(WalkParameters::default(), &steps).unwrap();
        let mid = r.sample(0.45);
        assert!(close(mid.zmp.x, REST_LEFT_ANKLE.position.x));
        assert!(close(mid.zmp.y, REST_LEFT_ANKLE.position.y));
        // Swing foot is lifted, support foot is not.
        assert!(mid.right_ankle.position.z > 0.105);
        assert!(close(mid.left_ankle.position.z, 0.105));
    }

    #[test]
    fn velocity_matches_finite_difference() {
        let steps = straight_walk(3, 0.15, Foot::Right);
        let r = FootstepReference::new(WalkParameters::default(), &steps).unwrap();
        let h = 1e-6;
        for &t in &[0.05, 0.3, 0.95, 1.7, 2.2] {
            let a = r.sample(t - h);
            let b = r.sample(t + h);
            let p = r.sample(t);
            let fd = (b.com.x - a.com.x) / (2.0 * h);
            assert!((fd - p.com_velocity.x).abs() < 1e-4, "com vx at {t}");
            let fd = (b.right_ankle.position.x - a.right_ankle.position.x) / (2.0 * h);
            assert!((fd - p.right_ankle_velocity.position.x).abs() < 1e-4, "ankle vx at {t}");
        }
    }

    #[test]
    fn turning_step_updates_waist_yaw() {
        let steps = vec![Pose2::new(0.0, -0.19, 0.4), Pose2::new(0.0, 0.19, 0.0)];
        let r = FootstepReference::new(WalkParameters::default(), &steps).unwrap();
        let end = r.sample(r.duration());
        assert!(close(end.right_ankle.yaw, 0.4));
        assert!(close(end.left_ankle.yaw, 0.4));
        assert!(close(end.waist_yaw, 0.4));
    }

    #[test]
    fn rejects_bad_parameters() {
        let params = WalkParameters {
            double_support: 0.9,
            ..WalkParameters::default()
        };
        assert!(FootstepReference::new(params, &[]).is_err());
        let params = WalkParameters {
            step_duration: f64::NAN,
            ..WalkParameters::default()
        };
        assert!(params.check().is_err());
        assert!(
            FootstepReference::new(WalkParameters::default(), &[Pose2::new(f64::INFINITY, 0.0, 0.0)])
                .is_err()
        );
    }

    proptest! {
        #[test]
        fn trajectory_is_continuous(
            steps in proptest::collection::vec(
                (-0.2f64..0.2, 0.12f64..0.25, -0.3f64..0.3),
                0..6,
            ),
            frac in 0.0f64..1.0,
        ) {
            // Alternate the lateral sign so the feet never cross.
            let footsteps: Vec<Pose2> = steps
                .iter()
                .enumerate()
                .map(|(i, &(x, y, th))| Pose2::new(x, if i % 2 == 0 { -y } else { y }, th))
                .collect();
            let r = FootstepReference::new(WalkParameters::default(), &footsteps).unwrap();
            let t = frac * r.duration();
            let h = 1e-7;
            let a = r.sample(t);
            let b = r.sample(t + h);
            for (pa, pb) in [
                (a.com, b.com),
                (a.left_ankle.position, b.left_ankle.position),
                (a.right_ankle.position, b.right_ankle.position),
            ] {
                prop_assert!(pa.x.is_finite() && pa.y.is_finite() && pa.z.is_finite());
                prop_assert!((pa.x - pb.x).abs() < 1e-4);
                prop_assert!((pa.y - pb.y).abs() < 1e-4);
                prop_assert!((pa.z - pb.z).abs() < 1e-4);
            }
            prop_assert!((a.waist_yaw - b.waist_yaw).abs() < 1e-4);
        }
    }
}
