// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Pairwise trajectory conflict detection.
//!
//! Two phases:
//! - broad: the trajectories' time windows must overlap;
//! - narrow: sample the overlap at a fixed step and compare centre
//!   distance against the sum of footprint radii.
//!
//! The sampling step bounds the cost of a check and is far below the
//! schedule's conflict-reaction latency, so a sub-step graze slipping
//! through is acceptable to the negotiation layer above.

use crate::profile::Profile;
use crate::time::{Duration, Time};
use crate::trajectory::Trajectory;

/// Sampling step for the narrow phase.
const SAMPLE_STEP: Duration = Duration::from_millis(100);

/// Errors raised by the conflict predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    /// A participant registered a degenerate footprint.
    #[error("profile has a zero footprint radius")]
    InvalidProfile,
}

/// Pairwise conflict predicate over (profile, trajectory) pairs.
#[derive(Debug, Clone, Copy)]
pub struct DetectConflict;

impl DetectConflict {
    /// Tests whether two swept footprints come into contact.
    ///
    /// Returns the first sampled instant of contact, or `None` when the
    /// trajectories never approach within the sum of their radii.
    ///
    /// # Errors
    /// Returns [`ConflictError::InvalidProfile`] when either footprint
    /// radius is zero.
    pub fn between(
        profile_a: &Profile,
        trajectory_a: &Trajectory,
        profile_b: &Profile,
        trajectory_b: &Trajectory,
    ) -> Result<Option<Time>, ConflictError> {
        if profile_a.footprint_radius_mm == 0 || profile_b.footprint_radius_mm == 0 {
            return Err(ConflictError::InvalidProfile);
        }

        let start = trajectory_a.start_time().max(trajectory_b.start_time());
        let end = trajectory_a.finish_time().min(trajectory_b.finish_time());
        if end < start {
            return Ok(None);
        }

        let threshold = profile_a.radius_m() + profile_b.radius_m();
        let threshold_sq = threshold * threshold;

        let mut t = start;
        loop {
            let pa = trajectory_a.position_at(t);
            let pb = trajectory_b.position_at(t);
            let dx = pa[0] - pb[0];
            let dy = pa[1] - pb[1];
            if dx * dx + dy * dy <= threshold_sq {
                return Ok(Some(t));
            }
            if t >= end {
                return Ok(None);
            }
            // Always test the exact window end so short overlaps are not
            // skipped by the stride.
            t = (t + SAMPLE_STEP).min(end);
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::trajectory::Waypoint;

    fn line(t0: i64, t1: i64, from: [f64; 2], to: [f64; 2]) -> Trajectory {
        Trajectory::from_waypoints(vec![
            Waypoint::new(Time::from_secs(t0), from),
            Waypoint::new(Time::from_secs(t1), to),
        ])
        .expect("valid trajectory")
    }

    const ROBOT: Profile = Profile::circle_mm(500);

    #[test]
    fn crossing_paths_conflict() {
        let a = line(0, 10, [0.0, -5.0], [0.0, 5.0]);
        let b = line(0, 10, [-5.0, 0.0], [5.0, 0.0]);
        let hit = DetectConflict::between(&ROBOT, &a, &ROBOT, &b).expect("valid profiles");
        assert!(hit.is_some());
    }

    #[test]
    fn disjoint_time_windows_never_conflict() {
        let a = line(0, 10, [0.0, 0.0], [1.0, 0.0]);
        let b = line(20, 30, [0.0, 0.0], [1.0, 0.0]);
        let hit = DetectConflict::between(&ROBOT, &a, &ROBOT, &b).expect("valid profiles");
        assert_eq!(hit, None);
    }

    #[test]
    fn distant_paths_never_conflict() {
        let a = line(0, 10, [0.0, 0.0], [10.0, 0.0]);
        let b = line(0, 10, [0.0, 100.0], [10.0, 100.0]);
        let hit = DetectConflict::between(&ROBOT, &a, &ROBOT, &b).expect("valid profiles");
        assert_eq!(hit, None);
    }

    #[test]
    fn zero_radius_is_rejected() {
        let a = line(0, 10, [0.0, 0.0], [1.0, 0.0]);
        let degenerate = Profile::circle_mm(0);
        assert_eq!(
            DetectConflict::between(&degenerate, &a, &ROBOT, &a),
            Err(ConflictError::InvalidProfile)
        );
    }
}
