//! Error merger.
//!
//! Combines the raw estimates of every strategy into one by
//! confidence-weighted averaging.  Translations average linearly; headings
//! take the weighted circular mean, so two estimates either side of ±π agree
//! instead of cancelling.
//!
//! ```text
//! (x, y)     = Σ cᵢ·(xᵢ, yᵢ) / Σ cᵢ
//! θ          = atan2(Σ cᵢ·sin θᵢ, Σ cᵢ·cos θᵢ)
//! confidence = max cᵢ
//! ```
//!
//! Invalid inputs (non-finite components, confidence ≤ 0) are dropped.  With
//! no valid input the result is the zero estimate with confidence 0, which the
//! correction operator reads as "no data".  The sums run over a canonically
//! sorted copy of the inputs, so the result is bit-identical whatever order
//! the strategies were registered in.
//!
//! # Example
//!
//! ```rust
//! use gaitplan_perception::merger::ErrorMerger;
//! use gaitplan_types::{ErrorEstimate, Pose2, Tick, wrap_angle};
//!
//! let merger = ErrorMerger::new();
//! let a = ErrorEstimate::new(Pose2::new(1.0, 0.0, 0.0), 1.0, Tick(0));
//! let b = ErrorEstimate::new(Pose2::new(3.0, 0.0, 0.0), 1.0, Tick(0));
//! let m = merger.merge(&[a, b], Tick(0));
//! assert_eq!(m.dx, 2.0);
//! assert_eq!(m.confidence, 1.0);
//! ```

use std::cmp::Ordering;

use gaitplan_types::{ErrorEstimate, Pose2, Tick, wrap_angle};

fn canonical(a: &ErrorEstimate, b: &ErrorEstimate) -> Ordering {
    a.dx.total_cmp(&b.dx)
        .then(a.dy.total_cmp(&b.dy))
        .then(a.dtheta.total_cmp(&b.dtheta))
        .then(a.confidence.total_cmp(&b.confidence))
        .then(a.tick.cmp(&b.tick))
}

/// Stateless confidence-weighted merger.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorMerger;

impl ErrorMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge `estimates` into the estimate for `tick`.
    pub fn merge(&self, estimates: &[ErrorEstimate], tick: Tick) -> ErrorEstimate {
        let mut valid: Vec<ErrorEstimate> =
            estimates.iter().copied().filter(|e| e.is_valid()).collect();
        if valid.is_empty() {
            return ErrorEstimate::none(tick);
        }
        valid.sort_by(canonical);

        let mut weight = 0.0;
        let mut confidence: f64 = 0.0;
        let (mut x, mut y) = (0.0, 0.0);
        let (mut sin, mut cos) = (0.0, 0.0);
        for e in &valid {
            weight += e.confidence;
            confidence = confidence.max(e.confidence);
            x += e.confidence * e.dx;
            y += e.confidence * e.dy;
            let (s, c) = e.dtheta.sin_cos();
            sin += e.confidence * s;
            cos += e.confidence * c;
        }
        let theta = if valid.len() == 1 {
            wrap_angle(valid[0].dtheta)
        } else {
            wrap_angle(sin.atan2(cos))
        };
        ErrorEstimate::new(Pose2::new(x / weight, y / weight, theta), confidence, tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn est(x: f64, y: f64, c: f64) -> ErrorEstimate {
        ErrorEstimate::new(Pose2::new(x, y, 0.0), c, Tick(1))
    }

    #[test]
    fn empty_input_is_no_data() {
        let m = ErrorMerger::new().merge(&[], Tick(9));
        assert_eq!(m, ErrorEstimate::none(Tick(9)));
        assert!(!m.is_valid());
    }

    #[test]
    fn invalid_inputs_are_dropped() {
        let m = ErrorMerger::new().merge(
            &[est(f64::NAN, 0.0, 1.0), est(5.0, 0.0, 0.0), est(1.0, 2.0, 0.5)],
            Tick(1),
        );
        assert_eq!(m.offset(), Pose2::new(1.0, 2.0, 0.0));
        assert_eq!(m.confidence, 0.5);
    }

    #[test]
    fn weights_follow_confidence() {
        let m = ErrorMerger::new().merge(&[est(0.0, 0.0, 0.25), est(4.0, 0.0, 0.75)], Tick(1));
        assert!((m.dx - 3.0).abs() < 1e-12);
        assert_eq!(m.confidence, 0.75);
    }

    #[test]
    fn single_input_passes_through() {
        let m = ErrorMerger::new().merge(&[est(1.0, 2.0, 1.0)], Tick(3));
        assert_eq!(m.offset(), Pose2::new(1.0, 2.0, 0.0));
        assert_eq!(m.tick, Tick(3));
    }

    #[test]
    fn headings_either_side_of_pi_agree() {
        use std::f64::consts::PI;
        let a = ErrorEstimate::new(Pose2::new(0.0, 0.0, PI - 0.01), 1.0, Tick(1));
        let b = ErrorEstimate::new(Pose2::new(0.0, 0.0, -PI + 0.01), 1.0, Tick(1));
        let m = ErrorMerger::new().merge(&[a, b], Tick(1));
        assert!(m.dtheta.abs() > 3.0, "merged heading {}", m.dtheta);
        assert!((m.dtheta.abs() - PI).abs() < 1e-9);
    }

    #[test]
    fn heading_mean_follows_confidence() {
        let a = ErrorEstimate::new(Pose2::new(0.0, 0.0, 0.0), 0.5, Tick(1));
        let b = ErrorEstimate::new(Pose2::new(0.0, 0.0, 0.2), 0.5, Tick(1));
        let m = ErrorMerger::new().merge(&[a, b], Tick(1));
        assert!((m.dtheta - 0.1).abs() < 1e-12);
    }

    fn any_estimate() -> impl Strategy<Value = ErrorEstimate> {
        (-10.0f64..10.0, -10.0f64..10.0, -3.0f64..3.0, 0.0f64..1.0, 0u64..50).prop_map(
            |(x, y, t, c, tick)| ErrorEstimate::new(Pose2::new(x, y, t), c, Tick(tick)),
        )
    }

    proptest! {
        #[test]
        fn merge_is_commutative(
            (original, shuffled) in proptest::collection::vec(any_estimate(), 0..8)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            let merger = ErrorMerger::new();
            let a = merger.merge(&original, Tick(7));
            let b = merger.merge(&shuffled, Tick(7));
            prop_assert_eq!(a.dx.to_bits(), b.dx.to_bits());
            prop_assert_eq!(a.dy.to_bits(), b.dy.to_bits());
            prop_assert_eq!(a.dtheta.to_bits(), b.dtheta.to_bits());
            prop_assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
        }

        #[test]
        fn headings_straddling_pi_stay_near_pi(
            v in proptest::collection::vec((0.0f64..0.3, -1.0f64..1.0, 0.05f64..1.0), 1..6)
        ) {
            use std::f64::consts::PI;
            // Each heading lies within 0.3 rad of ±π, on either side.
            let estimates: Vec<ErrorEstimate> = v
                .iter()
                .map(|&(d, side, c)| {
                    let theta = if side < 0.0 { -PI + d } else { PI - d };
                    ErrorEstimate::new(Pose2::new(0.0, 0.0, theta), c, Tick(0))
                })
                .collect();
            let m = ErrorMerger::new().merge(&estimates, Tick(0));
            prop_assert!(m.dtheta.abs() >= PI - 0.3 - 1e-9, "merged heading {}", m.dtheta);
            prop_assert!(m.dtheta > -PI && m.dtheta <= PI);
        }

        #[test]
        fn merged_value_lies_within_inputs(v in proptest::collection::vec(any_estimate(), 1..8)) {
            let m = ErrorMerger::new().merge(&v, Tick(0));
            let valid: Vec<_> = v.iter().filter(|e| e.is_valid()).collect();
            if valid.is_empty() {
                prop_assert_eq!(m.confidence, 0.0);
            } else {
                let lo = valid.iter().map(|e| e.dx).fold(f64::INFINITY, f64::min);
                let hi = valid.iter().map(|e| e.dx).fold(f64::NEG_INFINITY, f64::max);
                prop_assert!(m.dx >= lo - 1e-9 && m.dx <= hi + 1e-9);
            }
        }
    }
}
