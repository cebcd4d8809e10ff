// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Read-only schedule replicas reconstructed from patches.
//!
//! A mirror never talks to the database directly: it is fed patches (and
//! participant-table refreshes) and replays them. Patch application is
//! strict about version continuity so a dropped update can never silently
//! corrupt the replica; on a mismatch the owner requests a full snapshot.

use std::collections::BTreeMap;

use wayline_traffic::{Profile, Route};

use crate::ident::{ItineraryVersion, ParticipantId, RouteId, ScheduleVersion};
use crate::participant::ParticipantDescription;
use crate::patch::{ParticipantPatch, Patch, RouteEntry};

/// Errors from patch application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MirrorError {
    /// The patch base does not match the mirror's current version; the
    /// owner must request a full snapshot.
    #[error("patch base {base:?} does not match mirror version {mirror:?}")]
    BaseMismatch {
        /// Base version the patch was computed against.
        base: ScheduleVersion,
        /// Version the mirror is actually at.
        mirror: ScheduleVersion,
    },
}

/// One participant's replicated itinerary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorItinerary {
    /// Newest itinerary version reflected here.
    pub itinerary_version: ItineraryVersion,
    /// Replicated routes.
    pub routes: BTreeMap<RouteId, Route>,
}

/// A read-only, eventually-consistent replica of the schedule.
///
/// A fresh mirror sits at version zero, the version of an empty database,
/// so the first incremental patch computed from version zero applies
/// without a snapshot round-trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mirror {
    latest_version: ScheduleVersion,
    descriptions: BTreeMap<ParticipantId, ParticipantDescription>,
    itineraries: BTreeMap<ParticipantId, MirrorItinerary>,
}

impl Mirror {
    /// Constructs an empty mirror at version zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Database version this mirror reflects.
    #[must_use]
    pub fn latest_version(&self) -> ScheduleVersion {
        self.latest_version
    }

    /// Replaces the participant table. Itineraries of participants absent
    /// from the new table are dropped.
    pub fn update_participants(
        &mut self,
        participants: impl IntoIterator<Item = (ParticipantId, ParticipantDescription)>,
    ) {
        self.descriptions = participants.into_iter().collect();
        self.itineraries
            .retain(|id, _| self.descriptions.contains_key(id));
    }

    /// Footprint profile of `participant`, if known.
    #[must_use]
    pub fn profile(&self, participant: ParticipantId) -> Option<&Profile> {
        self.descriptions.get(&participant).map(|d| &d.profile)
    }

    /// Replicated itinerary of `participant`, if any.
    #[must_use]
    pub fn itinerary(&self, participant: ParticipantId) -> Option<&MirrorItinerary> {
        self.itineraries.get(&participant)
    }

    /// Every replicated route, in (participant, route) order.
    pub fn routes(&self) -> impl Iterator<Item = (ParticipantId, RouteId, &Route)> {
        self.itineraries.iter().flat_map(|(participant, itin)| {
            itin.routes
                .iter()
                .map(move |(route_id, route)| (*participant, *route_id, route))
        })
    }

    /// Applies a patch.
    ///
    /// A snapshot patch (`base == None`) resets the replica. An
    /// incremental patch must match the mirror's current version exactly.
    ///
    /// # Errors
    /// Returns [`MirrorError::BaseMismatch`] when continuity is broken;
    /// the mirror is left untouched in that case.
    pub fn apply(&mut self, patch: &Patch) -> Result<(), MirrorError> {
        match patch.base {
            None => {
                self.itineraries.clear();
            }
            Some(base) => {
                if base != self.latest_version {
                    return Err(MirrorError::BaseMismatch {
                        base,
                        mirror: self.latest_version,
                    });
                }
            }
        }

        // The cull horizon is applied before the per-participant changes:
        // addition and replacement payloads already reflect the database's
        // post-cull state, so the marker only concerns routes this mirror
        // carried into the patch.
        if let Some(cull) = patch.cull {
            for itin in self.itineraries.values_mut() {
                itin.routes
                    .retain(|_, route| route.trajectory.finish_time() >= cull.before);
            }
        }

        for (participant, change) in &patch.participants {
            match change {
                ParticipantPatch::Remove => {
                    self.itineraries.remove(participant);
                }
                ParticipantPatch::Replace {
                    itinerary_version,
                    routes,
                } => {
                    self.itineraries.insert(
                        *participant,
                        MirrorItinerary {
                            itinerary_version: *itinerary_version,
                            routes: collect_routes(routes),
                        },
                    );
                }
                ParticipantPatch::Update(update) => {
                    let itin = self.itineraries.entry(*participant).or_default();
                    for erased in &update.erased {
                        itin.routes.remove(erased);
                    }
                    if let Some(delay) = update.delay {
                        for route in itin.routes.values_mut() {
                            route.trajectory.delay(delay);
                        }
                    }
                    for entry in &update.additions {
                        itin.routes.insert(entry.id, entry.route.clone());
                    }
                    itin.itinerary_version = update.itinerary_version;
                }
            }
        }

        self.latest_version = patch.latest;
        Ok(())
    }
}

fn collect_routes(entries: &[RouteEntry]) -> BTreeMap<RouteId, Route> {
    entries
        .iter()
        .map(|entry| (entry.id, entry.route.clone()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::participant::Responsiveness;
    use crate::query::Query;
    use wayline_traffic::{Time, Trajectory, Waypoint};

    fn description(name: &str) -> ParticipantDescription {
        ParticipantDescription::new(
            name,
            "test_fleet",
            Responsiveness::Responsive,
            Profile::circle_mm(500),
        )
    }

    fn route(map: &str, t0: i64, t1: i64) -> Route {
        Route::new(
            map,
            Trajectory::from_waypoints(vec![
                Waypoint::new(Time::from_secs(t0), [0.0, 0.0]),
                Waypoint::new(Time::from_secs(t1), [1.0, 0.0]),
            ])
            .expect("valid trajectory"),
        )
    }

    #[test]
    fn incremental_patch_requires_continuity() {
        let mut db = Database::new();
        let reg = db.register(description("alpha"));
        db.set(reg.id, vec![route("L1", 0, 10)], crate::ItineraryVersion(1))
            .expect("registered");

        let mut mirror = Mirror::new();
        let gap_patch = db.changes(&Query::all(), Some(ScheduleVersion(1)));
        assert!(matches!(
            mirror.apply(&gap_patch),
            Err(MirrorError::BaseMismatch { .. })
        ));

        let snapshot = db.changes(&Query::all(), None);
        mirror.apply(&snapshot).expect("snapshot always applies");
        assert_eq!(mirror.latest_version(), db.latest_version());
        assert_eq!(
            mirror.itinerary(reg.id).expect("replicated").routes.len(),
            1
        );
    }

    #[test]
    fn remove_patch_drops_participant_state() {
        let mut db = Database::new();
        let reg = db.register(description("alpha"));
        db.set(reg.id, vec![route("L1", 0, 10)], crate::ItineraryVersion(1))
            .expect("registered");

        let mut mirror = Mirror::new();
        mirror
            .apply(&db.changes(&Query::all(), None))
            .expect("snapshot");

        let checkpoint = db.latest_version();
        db.unregister(reg.id).expect("registered");
        mirror
            .apply(&db.changes(&Query::all(), Some(checkpoint)))
            .expect("continuous");
        assert!(mirror.itinerary(reg.id).is_none());
    }
}
