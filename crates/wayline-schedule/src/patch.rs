// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Incremental change-sets between two database versions.
//!
//! A patch is the boundary artifact between the authoritative database and
//! its mirrors: applying a patch with `base == mirror.latest_version()`
//! advances the mirror to `patch.latest`. A patch with `base == None` is a
//! full snapshot and resets the mirror unconditionally.
//!
//! Composition law: applying patches `(0, v]` then `(v, w]` must leave a
//! mirror structurally identical to applying `(0, w]` in one step. The
//! netting in `Database::changes` and the apply order in `Mirror::apply`
//! are both written against that law, and it is property-tested in
//! `tests/patch_composition.rs`.

use serde::{Deserialize, Serialize};
use wayline_traffic::{Duration, Route, Time};

use crate::ident::{ItineraryVersion, ParticipantId, RouteId, ScheduleVersion};

/// A route entry carried by a patch or a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Identifier within the owning participant's itinerary.
    pub id: RouteId,
    /// The route contents.
    pub route: Route,
}

/// Net itinerary changes for one participant, relative to the base version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePatch {
    /// The participant's newest applied itinerary version.
    pub itinerary_version: ItineraryVersion,
    /// Routes removed from the itinerary.
    pub erased: Vec<RouteId>,
    /// Net delay applied to routes that existed at the base version.
    pub delay: Option<Duration>,
    /// Routes added since the base version, already shifted by any delays
    /// that followed their insertion.
    pub additions: Vec<RouteEntry>,
}

impl UpdatePatch {
    /// True when the update would not change a mirror.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.erased.is_empty() && self.delay.is_none() && self.additions.is_empty()
    }
}

/// Per-participant contents of a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParticipantPatch {
    /// Incremental changes against the participant's base-version state.
    Update(UpdatePatch),
    /// Full itinerary replacement. Emitted when the window contains a
    /// registration, a `set`, or a `clear`, and for every participant in a
    /// snapshot patch.
    Replace {
        /// The participant's newest applied itinerary version.
        itinerary_version: ItineraryVersion,
        /// The complete current itinerary (query-filtered).
        routes: Vec<RouteEntry>,
    },
    /// The participant unregistered; drop all of its state.
    Remove,
}

/// Marker for expired-trajectory removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cull {
    /// Routes finishing strictly before this instant were removed.
    pub before: Time,
}

/// A change-set covering `(base, latest]`, filtered by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Version the receiving mirror must be at, or `None` for a snapshot.
    pub base: Option<ScheduleVersion>,
    /// Version the mirror is at after applying this patch.
    pub latest: ScheduleVersion,
    /// Per-participant changes, ordered by participant id.
    pub participants: Vec<(ParticipantId, ParticipantPatch)>,
    /// Present when a cull happened inside the window.
    pub cull: Option<Cull>,
}

impl Patch {
    /// True when applying the patch would not change a mirror's contents.
    ///
    /// An empty patch still advances the version bookkeeping, but the
    /// mirror-update publisher skips it entirely.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty() && self.cull.is_none()
    }
}

/// A current-state route returned by [`Database::query`].
///
/// [`Database::query`]: crate::Database::query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteView {
    /// Owner of the route.
    pub participant: ParticipantId,
    /// Identifier within the owner's itinerary.
    pub route_id: RouteId,
    /// The route contents.
    pub route: Route,
}
