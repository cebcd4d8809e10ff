// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Participant descriptions.

use serde::{Deserialize, Serialize};
use wayline_traffic::Profile;

/// How a participant reacts to conflict negotiations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Responsiveness {
    /// The participant cannot revise its plan; others must accommodate it.
    Unresponsive,
    /// The participant takes part in negotiations.
    Responsive,
}

/// Immutable description of a schedule participant.
///
/// Replaceable only by an unregister/register cycle; the registry treats a
/// structurally equal description from the same `(name, owner)` pair as a
/// re-registration of the existing participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantDescription {
    /// Name of the participant, unique within its owner.
    pub name: String,
    /// The fleet or subsystem that owns this participant.
    pub owner: String,
    /// Negotiation behavior.
    pub responsiveness: Responsiveness,
    /// Footprint swept along the participant's trajectories.
    pub profile: Profile,
}

impl ParticipantDescription {
    /// Constructs a description.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        responsiveness: Responsiveness,
        profile: Profile,
    ) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            responsiveness,
            profile,
        }
    }
}
