// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Participant footprint profiles.

use serde::{Deserialize, Serialize};

/// The spatial footprint a participant sweeps along its trajectory.
///
/// Wayline models every participant as a disc. The radius is stored in
/// integer millimetres so profiles are `Eq`/`Hash` and can take part in
/// the registry's description comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    /// Footprint radius in millimetres. Must be positive for conflict
    /// detection to accept the profile.
    pub footprint_radius_mm: u32,
}

impl Profile {
    /// Constructs a circular profile with the given radius in millimetres.
    #[must_use]
    pub const fn circle_mm(footprint_radius_mm: u32) -> Self {
        Self {
            footprint_radius_mm,
        }
    }

    /// Footprint radius in metres, for distance math.
    #[must_use]
    pub fn radius_m(self) -> f64 {
        f64::from(self.footprint_radius_mm) / 1_000.0
    }
}
