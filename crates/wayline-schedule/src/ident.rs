// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Identifier and version newtypes for the schedule.
//!
//! Everything the schedule hands across a boundary is identified by one of
//! these wrappers rather than a bare integer, so a participant id can never
//! be confused with a route id or a version counter at a call site.

use serde::{Deserialize, Serialize};

/// Stable identifier of a schedule participant.
///
/// Assigned by the registry and never reused within the lifetime of a
/// database, even across unregister/register cycles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ParticipantId(pub u64);

impl core::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "participant#{}", self.0)
    }
}

/// Identifier of a route, unique within one participant's itinerary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RouteId(pub u64);

/// Per-participant itinerary version, supplied by the client.
///
/// Monotonically non-decreasing; the database drops mutations that go
/// backwards and buffers mutations that jump ahead.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ItineraryVersion(pub u64);

impl ItineraryVersion {
    /// The version that immediately follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Global database version, incremented on every accepted mutation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ScheduleVersion(pub u64);

impl ScheduleVersion {
    /// The version that immediately follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Identifier of a registered query topic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct QueryId(pub u64);

/// Per-conflict negotiation identifier, allocated by the negotiation
/// manager and carried in every negotiation message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NegotiationVersion(pub u64);

impl core::fmt::Display for NegotiationVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "negotiation#{}", self.0)
    }
}
