// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Map-scoped routes.

use serde::{Deserialize, Serialize};

use crate::trajectory::Trajectory;

/// A trajectory bound to a named map.
///
/// The map is an opaque namespace: two routes can only conflict when their
/// map names are equal, so stacked floors or disjoint facilities never
/// cross-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Name of the map this trajectory is planned on.
    pub map: String,
    /// The planned motion.
    pub trajectory: Trajectory,
}

impl Route {
    /// Constructs a route on `map`.
    #[must_use]
    pub fn new(map: impl Into<String>, trajectory: Trajectory) -> Self {
        Self {
            map: map.into(),
            trajectory,
        }
    }
}
