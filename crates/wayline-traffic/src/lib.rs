// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Traffic primitives for the Wayline schedule: logical time, circular
//! footprint profiles, piecewise-linear trajectories, map-scoped routes,
//! and the pairwise conflict predicate used by the schedule's checker.
//!
//! Everything here is deliberately transport- and storage-agnostic: the
//! schedule database stores these values, the conflict checker samples
//! them, and the wire layer serializes them, but none of that machinery
//! lives in this crate.

mod detect;
mod profile;
mod route;
mod time;
mod trajectory;

pub use detect::{ConflictError, DetectConflict};
pub use profile::Profile;
pub use route::Route;
pub use time::{Duration, Time};
pub use trajectory::{Trajectory, TrajectoryError, Waypoint};
