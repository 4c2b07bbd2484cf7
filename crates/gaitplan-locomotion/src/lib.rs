//! `gaitplan-locomotion` – Nominal and corrected walking trajectories.
//!
//! # Modules
//!
//! - [`footsteps`] – [`FootstepReference`][footsteps::FootstepReference]:
//!   footstep list to closed-form CoM, ZMP, ankle and waist trajectories.
//! - [`feet_follower`] – the [`FeetFollower`][feet_follower::FeetFollower]
//!   trait and [`AnalyticalFollower`][feet_follower::AnalyticalFollower],
//!   which anchors a reference at its start tick.
//! - [`with_correction`] – [`CorrectedFollower`][with_correction::CorrectedFollower]:
//!   threads a follower's outputs through the estimation, merge and
//!   rate-limited correction pipeline.

pub mod feet_follower;
pub mod footsteps;
pub mod with_correction;

pub use feet_follower::{AnalyticalFollower, FeetFollower, FollowerSample, FollowerState};
pub use footsteps::{
    Foot, FootstepReference, REST_LEFT_ANKLE, REST_RIGHT_ANKLE, TrajectoryPoint, WalkParameters,
    straight_walk,
};
pub use with_correction::{CorrectedFollower, CorrectedSample};
