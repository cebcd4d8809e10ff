// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Piecewise-linear trajectories.

use serde::{Deserialize, Serialize};

use crate::time::{Duration, Time};

/// A timed position sample on a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Instant at which the participant occupies `position`.
    pub time: Time,
    /// Planar position in metres, in the route map's frame.
    pub position: [f64; 2],
}

impl Waypoint {
    /// Constructs a waypoint.
    #[must_use]
    pub const fn new(time: Time, position: [f64; 2]) -> Self {
        Self { time, position }
    }
}

/// Errors rejected at trajectory construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrajectoryError {
    /// A trajectory needs at least one waypoint.
    #[error("trajectory has no waypoints")]
    Empty,
    /// Waypoint times must strictly increase.
    #[error("waypoint {index} does not advance time")]
    NonMonotonicTime {
        /// Index of the offending waypoint.
        index: usize,
    },
}

/// A non-empty, strictly time-ordered sequence of waypoints.
///
/// Between waypoints the participant is assumed to move in a straight line
/// at constant speed; before the first and after the last waypoint it
/// holds position. Ordering is validated at construction so every other
/// consumer can interpolate without re-checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    waypoints: Vec<Waypoint>,
}

impl Trajectory {
    /// Builds a trajectory from an ordered waypoint sequence.
    ///
    /// # Errors
    /// Returns [`TrajectoryError::Empty`] for an empty sequence and
    /// [`TrajectoryError::NonMonotonicTime`] when a waypoint fails to
    /// strictly advance time.
    pub fn from_waypoints(waypoints: Vec<Waypoint>) -> Result<Self, TrajectoryError> {
        if waypoints.is_empty() {
            return Err(TrajectoryError::Empty);
        }
        for (index, pair) in waypoints.windows(2).enumerate() {
            if pair[1].time <= pair[0].time {
                return Err(TrajectoryError::NonMonotonicTime { index: index + 1 });
            }
        }
        Ok(Self { waypoints })
    }

    /// The ordered waypoint sequence.
    #[must_use]
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Instant of the first waypoint.
    #[must_use]
    pub fn start_time(&self) -> Time {
        // Invariant: waypoints is non-empty after construction.
        self.waypoints[0].time
    }

    /// Instant of the last waypoint.
    #[must_use]
    pub fn finish_time(&self) -> Time {
        self.waypoints[self.waypoints.len() - 1].time
    }

    /// Shifts every waypoint by `delay`.
    pub fn delay(&mut self, delay: Duration) {
        for wp in &mut self.waypoints {
            wp.time += delay;
        }
    }

    /// Interpolated position at `time`, clamped to the endpoints.
    #[must_use]
    pub fn position_at(&self, time: Time) -> [f64; 2] {
        if time <= self.start_time() {
            return self.waypoints[0].position;
        }
        if time >= self.finish_time() {
            return self.waypoints[self.waypoints.len() - 1].position;
        }
        for pair in self.waypoints.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if time <= b.time {
                let span = (b.time - a.time).nanos() as f64;
                let s = (time - a.time).nanos() as f64 / span;
                return [
                    a.position[0] + s * (b.position[0] - a.position[0]),
                    a.position[1] + s * (b.position[1] - a.position[1]),
                ];
            }
        }
        self.waypoints[self.waypoints.len() - 1].position
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn traj(points: &[(i64, [f64; 2])]) -> Trajectory {
        Trajectory::from_waypoints(
            points
                .iter()
                .map(|(t, p)| Waypoint::new(Time::from_secs(*t), *p))
                .collect(),
        )
        .expect("valid trajectory")
    }

    #[test]
    fn rejects_empty_and_unordered() {
        assert_eq!(
            Trajectory::from_waypoints(Vec::new()),
            Err(TrajectoryError::Empty)
        );
        let out_of_order = vec![
            Waypoint::new(Time::from_secs(2), [0.0, 0.0]),
            Waypoint::new(Time::from_secs(1), [1.0, 0.0]),
        ];
        assert_eq!(
            Trajectory::from_waypoints(out_of_order),
            Err(TrajectoryError::NonMonotonicTime { index: 1 })
        );
    }

    #[test]
    fn interpolates_and_clamps() {
        let t = traj(&[(0, [0.0, 0.0]), (10, [10.0, 0.0])]);
        assert_eq!(t.position_at(Time::from_secs(5)), [5.0, 0.0]);
        assert_eq!(t.position_at(Time::from_secs(-3)), [0.0, 0.0]);
        assert_eq!(t.position_at(Time::from_secs(30)), [10.0, 0.0]);
    }

    #[test]
    fn delay_shifts_every_waypoint() {
        let mut t = traj(&[(0, [0.0, 0.0]), (10, [10.0, 0.0])]);
        t.delay(Duration::from_secs(5));
        assert_eq!(t.start_time(), Time::from_secs(5));
        assert_eq!(t.finish_time(), Time::from_secs(15));
    }
}
