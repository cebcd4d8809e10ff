// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! The authoritative versioned itinerary store.
//!
//! Every accepted mutation bumps the global [`ScheduleVersion`] and appends
//! one entry to an internal change log; [`Database::changes`] nets the log
//! window `(since, latest]` into a [`Patch`] and [`Database::query`]
//! returns the current routes of the participants touched in that window.
//!
//! Per-participant client versions are strictly ordered: a mutation at or
//! below the last applied version is dropped as stale, and a mutation that
//! jumps ahead is buffered until the missing versions arrive. The missing
//! runs are reported as inconsistency ranges so the sender can retransmit.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;
use wayline_traffic::{Duration, Route, Time};

use crate::ident::{ItineraryVersion, ParticipantId, RouteId, ScheduleVersion};
use crate::inconsistency::{missing_ranges, VersionRange};
use crate::participant::ParticipantDescription;
use crate::patch::{Cull, ParticipantPatch, Patch, RouteEntry, RouteView, UpdatePatch};
use crate::query::Query;

/// Errors returned by database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DatabaseError {
    /// The referenced participant is not registered.
    #[error("{0} is not registered")]
    UnknownParticipant(ParticipantId),
}

/// Outcome of registering a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// The participant's stable identifier.
    pub id: ParticipantId,
    /// Newest itinerary version the database has applied for this
    /// participant. Zero for a fresh registration.
    pub last_itinerary_version: ItineraryVersion,
    /// Newest route id the database has allocated for this participant.
    pub last_route_id: RouteId,
    /// False when an identical description was already registered and the
    /// existing record was returned instead of a new one.
    pub fresh: bool,
    /// The id of a stale participant with the same `(name, owner)` pair
    /// that this registration displaced, if any.
    pub replaced: Option<ParticipantId>,
}

/// How a mutation was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    /// Applied immediately (and possibly unblocked buffered successors).
    Applied(ItineraryVersion),
    /// Held in the reorder buffer until the versions before it arrive.
    Buffered,
    /// At or below the last applied version; dropped.
    Stale,
}

/// Result of an itinerary mutation, including the participant's current
/// inconsistency state for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    /// How the mutation was absorbed.
    pub status: MutationStatus,
    /// Missing-version ranges after this mutation; empty when consistent.
    pub ranges: Vec<VersionRange>,
    /// Newest applied itinerary version for the participant.
    pub last_known_version: ItineraryVersion,
}

/// An itinerary mutation waiting for, or taken from, the reorder buffer.
#[derive(Debug, Clone)]
enum ChangeRequest {
    Set { routes: Vec<Route> },
    Extend { routes: Vec<Route> },
    Delay { delay: Duration },
    Erase { route_ids: Vec<RouteId> },
    Clear,
}

/// The materialized effect of an applied mutation, as recorded in the log.
#[derive(Debug, Clone)]
enum ItineraryEffect {
    Replace { routes: Vec<RouteEntry> },
    Extend { routes: Vec<RouteEntry> },
    Delay { delay: Duration },
    Erase { route_ids: Vec<RouteId> },
}

#[derive(Debug, Clone)]
enum LogEntry {
    Itinerary {
        participant: ParticipantId,
        effect: ItineraryEffect,
    },
    Register {
        participant: ParticipantId,
    },
    Unregister {
        participant: ParticipantId,
    },
    Cull {
        before: Time,
    },
}

#[derive(Debug)]
struct ParticipantState {
    description: ParticipantDescription,
    itinerary: BTreeMap<RouteId, Route>,
    last_route_id: RouteId,
    last_version: ItineraryVersion,
    buffer: BTreeMap<ItineraryVersion, ChangeRequest>,
}

impl ParticipantState {
    fn new(description: ParticipantDescription) -> Self {
        Self {
            description,
            itinerary: BTreeMap::new(),
            last_route_id: RouteId(0),
            last_version: ItineraryVersion(0),
            buffer: BTreeMap::new(),
        }
    }

    fn buffered_versions(&self) -> Vec<ItineraryVersion> {
        self.buffer.keys().copied().collect()
    }
}

/// The authoritative, monotonically versioned schedule database.
#[derive(Debug, Default)]
pub struct Database {
    participants: FxHashMap<ParticipantId, ParticipantState>,
    next_participant_id: u64,
    latest_version: ScheduleVersion,
    participants_version: ScheduleVersion,
    log: Vec<(ScheduleVersion, LogEntry)>,
}

impl Database {
    /// Constructs an empty database at version zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Global version of the newest accepted mutation.
    #[must_use]
    pub fn latest_version(&self) -> ScheduleVersion {
        self.latest_version
    }

    /// Version of the newest registration change, for cheap participant
    /// table staleness checks.
    #[must_use]
    pub fn participants_version(&self) -> ScheduleVersion {
        self.participants_version
    }

    /// Registered participants and their descriptions, in id order.
    #[must_use]
    pub fn participants(&self) -> Vec<(ParticipantId, &ParticipantDescription)> {
        let mut out: Vec<_> = self
            .participants
            .iter()
            .map(|(id, state)| (*id, &state.description))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Description of `participant`, if registered.
    #[must_use]
    pub fn description(&self, participant: ParticipantId) -> Option<&ParticipantDescription> {
        self.participants
            .get(&participant)
            .map(|state| &state.description)
    }

    /// Current itinerary of `participant`, if registered.
    #[must_use]
    pub fn itinerary(&self, participant: ParticipantId) -> Option<&BTreeMap<RouteId, Route>> {
        self.participants
            .get(&participant)
            .map(|state| &state.itinerary)
    }

    /// Current missing-version ranges and newest applied version for
    /// `participant`.
    ///
    /// # Errors
    /// Returns [`DatabaseError::UnknownParticipant`] for an unregistered id.
    pub fn inconsistencies(
        &self,
        participant: ParticipantId,
    ) -> Result<(Vec<VersionRange>, ItineraryVersion), DatabaseError> {
        let state = self
            .participants
            .get(&participant)
            .ok_or(DatabaseError::UnknownParticipant(participant))?;
        Ok((
            missing_ranges(state.last_version, &state.buffered_versions()),
            state.last_version,
        ))
    }

    /// Registers `description`, or retrieves the existing registration when
    /// an identical description is already recorded.
    ///
    /// A registration with the same `(name, owner)` pair but a different
    /// description replaces the old participant: the stale record is
    /// unregistered and a fresh id is allocated, since descriptions are
    /// immutable once registered.
    pub fn register(&mut self, description: ParticipantDescription) -> Registration {
        if let Some((id, state)) = self
            .participants
            .iter()
            .find(|(_, state)| state.description == description)
        {
            return Registration {
                id: *id,
                last_itinerary_version: state.last_version,
                last_route_id: state.last_route_id,
                fresh: false,
                replaced: None,
            };
        }

        let stale = self
            .participants
            .iter()
            .find(|(_, state)| {
                state.description.name == description.name
                    && state.description.owner == description.owner
            })
            .map(|(id, _)| *id);
        if let Some(stale_id) = stale {
            // Ignore the impossible unknown-participant error.
            let _ = self.unregister(stale_id);
        }

        self.next_participant_id += 1;
        let id = ParticipantId(self.next_participant_id);
        self.participants
            .insert(id, ParticipantState::new(description));
        self.push_log(LogEntry::Register { participant: id });
        self.participants_version = self.latest_version;
        Registration {
            id,
            last_itinerary_version: ItineraryVersion(0),
            last_route_id: RouteId(0),
            fresh: true,
            replaced: stale,
        }
    }

    /// Re-creates a participant from a durable registry record during
    /// recovery. The id counter is advanced past `id` so later allocations
    /// never collide with recovered participants.
    ///
    /// # Errors
    /// Returns [`DatabaseError::UnknownParticipant`] when `id` is already
    /// registered (a corrupt registry log).
    pub fn restore(
        &mut self,
        id: ParticipantId,
        description: ParticipantDescription,
    ) -> Result<(), DatabaseError> {
        if self.participants.contains_key(&id) {
            return Err(DatabaseError::UnknownParticipant(id));
        }
        self.next_participant_id = self.next_participant_id.max(id.0);
        self.participants
            .insert(id, ParticipantState::new(description));
        self.push_log(LogEntry::Register { participant: id });
        self.participants_version = self.latest_version;
        Ok(())
    }

    /// Unregisters `participant`, erasing its itinerary at the current
    /// version.
    ///
    /// # Errors
    /// Returns [`DatabaseError::UnknownParticipant`] for an unregistered id.
    pub fn unregister(&mut self, participant: ParticipantId) -> Result<(), DatabaseError> {
        if self.participants.remove(&participant).is_none() {
            return Err(DatabaseError::UnknownParticipant(participant));
        }
        self.push_log(LogEntry::Unregister { participant });
        self.participants_version = self.latest_version;
        Ok(())
    }

    /// Replaces the participant's entire itinerary.
    ///
    /// # Errors
    /// Returns [`DatabaseError::UnknownParticipant`] for an unregistered id.
    pub fn set(
        &mut self,
        participant: ParticipantId,
        routes: Vec<Route>,
        version: ItineraryVersion,
    ) -> Result<MutationOutcome, DatabaseError> {
        self.mutate(participant, version, ChangeRequest::Set { routes })
    }

    /// Appends routes to the participant's itinerary, allocating fresh
    /// route ids.
    ///
    /// # Errors
    /// Returns [`DatabaseError::UnknownParticipant`] for an unregistered id.
    pub fn extend(
        &mut self,
        participant: ParticipantId,
        routes: Vec<Route>,
        version: ItineraryVersion,
    ) -> Result<MutationOutcome, DatabaseError> {
        self.mutate(participant, version, ChangeRequest::Extend { routes })
    }

    /// Shifts every trajectory in the participant's itinerary by `delay`.
    ///
    /// # Errors
    /// Returns [`DatabaseError::UnknownParticipant`] for an unregistered id.
    pub fn delay(
        &mut self,
        participant: ParticipantId,
        delay: Duration,
        version: ItineraryVersion,
    ) -> Result<MutationOutcome, DatabaseError> {
        self.mutate(participant, version, ChangeRequest::Delay { delay })
    }

    /// Drops specific routes from the participant's itinerary. Unknown
    /// route ids are ignored.
    ///
    /// # Errors
    /// Returns [`DatabaseError::UnknownParticipant`] for an unregistered id.
    pub fn erase(
        &mut self,
        participant: ParticipantId,
        route_ids: Vec<RouteId>,
        version: ItineraryVersion,
    ) -> Result<MutationOutcome, DatabaseError> {
        self.mutate(participant, version, ChangeRequest::Erase { route_ids })
    }

    /// Drops every route from the participant's itinerary.
    ///
    /// # Errors
    /// Returns [`DatabaseError::UnknownParticipant`] for an unregistered id.
    pub fn clear(
        &mut self,
        participant: ParticipantId,
        version: ItineraryVersion,
    ) -> Result<MutationOutcome, DatabaseError> {
        self.mutate(participant, version, ChangeRequest::Clear)
    }

    /// Removes every route whose trajectory finishes strictly before
    /// `before`, across all participants, and stamps the change log with a
    /// cull marker.
    pub fn cull(&mut self, before: Time) -> ScheduleVersion {
        for state in self.participants.values_mut() {
            state
                .itinerary
                .retain(|_, route| route.trajectory.finish_time() >= before);
        }
        self.push_log(LogEntry::Cull { before });
        self.latest_version
    }

    fn mutate(
        &mut self,
        participant: ParticipantId,
        version: ItineraryVersion,
        request: ChangeRequest,
    ) -> Result<MutationOutcome, DatabaseError> {
        let last_version = self
            .participants
            .get(&participant)
            .ok_or(DatabaseError::UnknownParticipant(participant))?
            .last_version;

        let status = if version <= last_version {
            MutationStatus::Stale
        } else if version == last_version.next() {
            self.apply_now(participant, version, request);
            self.drain_buffer(participant);
            let applied = self
                .participants
                .get(&participant)
                .map_or(version, |s| s.last_version);
            MutationStatus::Applied(applied)
        } else {
            if let Some(state) = self.participants.get_mut(&participant) {
                state.buffer.insert(version, request);
            }
            MutationStatus::Buffered
        };

        let state = self
            .participants
            .get(&participant)
            .ok_or(DatabaseError::UnknownParticipant(participant))?;
        Ok(MutationOutcome {
            status,
            ranges: missing_ranges(state.last_version, &state.buffered_versions()),
            last_known_version: state.last_version,
        })
    }

    /// Applies one in-order mutation: mutates the itinerary, bumps the
    /// global version, and appends the materialized effect to the log.
    fn apply_now(
        &mut self,
        participant: ParticipantId,
        version: ItineraryVersion,
        request: ChangeRequest,
    ) {
        let Some(state) = self.participants.get_mut(&participant) else {
            return;
        };
        state.last_version = version;

        let effect = match request {
            ChangeRequest::Set { routes } => {
                state.itinerary.clear();
                let entries = Self::insert_routes(state, routes);
                ItineraryEffect::Replace { routes: entries }
            }
            ChangeRequest::Clear => {
                state.itinerary.clear();
                ItineraryEffect::Replace { routes: Vec::new() }
            }
            ChangeRequest::Extend { routes } => {
                let entries = Self::insert_routes(state, routes);
                ItineraryEffect::Extend { routes: entries }
            }
            ChangeRequest::Delay { delay } => {
                for route in state.itinerary.values_mut() {
                    route.trajectory.delay(delay);
                }
                ItineraryEffect::Delay { delay }
            }
            ChangeRequest::Erase { route_ids } => {
                let mut erased = Vec::new();
                for id in route_ids {
                    if state.itinerary.remove(&id).is_some() {
                        erased.push(id);
                    }
                }
                ItineraryEffect::Erase { route_ids: erased }
            }
        };

        self.push_log(LogEntry::Itinerary {
            participant,
            effect,
        });
    }

    fn insert_routes(state: &mut ParticipantState, routes: Vec<Route>) -> Vec<RouteEntry> {
        let mut entries = Vec::with_capacity(routes.len());
        for route in routes {
            state.last_route_id = RouteId(state.last_route_id.0 + 1);
            state.itinerary.insert(state.last_route_id, route.clone());
            entries.push(RouteEntry {
                id: state.last_route_id,
                route,
            });
        }
        entries
    }

    /// Applies buffered mutations that became contiguous.
    fn drain_buffer(&mut self, participant: ParticipantId) {
        loop {
            let Some(state) = self.participants.get_mut(&participant) else {
                return;
            };
            let next = state.last_version.next();
            let Some(request) = state.buffer.remove(&next) else {
                return;
            };
            self.apply_now(participant, next, request);
        }
    }

    fn push_log(&mut self, entry: LogEntry) {
        self.latest_version = self.latest_version.next();
        self.log.push((self.latest_version, entry));
    }

    /// Builds the change-set covering `(since, latest]`, filtered by
    /// `query`. With `since == None` the patch is a full snapshot.
    #[must_use]
    pub fn changes(&self, query: &Query, since: Option<ScheduleVersion>) -> Patch {
        let Some(since) = since else {
            return self.snapshot(query);
        };
        if since >= self.latest_version {
            return Patch {
                base: Some(since),
                latest: self.latest_version,
                participants: Vec::new(),
                cull: None,
            };
        }

        let mut folds: BTreeMap<ParticipantId, NetFold> = BTreeMap::new();
        let mut cull: Option<Cull> = None;
        for (_, entry) in self.window(since) {
            match entry {
                LogEntry::Register { participant } => {
                    folds.entry(*participant).or_default().replace = true;
                }
                LogEntry::Unregister { participant } => {
                    let fold = folds.entry(*participant).or_default();
                    *fold = NetFold::default();
                    fold.removed = true;
                }
                LogEntry::Cull { before } => {
                    cull = Some(Cull { before: *before });
                    for fold in folds.values_mut() {
                        // A delay that preceded the cull changed which
                        // finish times the cull saw; netting cannot order
                        // the two, so such participants fall back to a
                        // full replacement.
                        if fold.delay.is_some() {
                            fold.make_replace();
                        } else {
                            fold.additions
                                .retain(|_, route| route.trajectory.finish_time() >= *before);
                        }
                    }
                }
                LogEntry::Itinerary {
                    participant,
                    effect,
                } => {
                    folds.entry(*participant).or_default().absorb(effect);
                }
            }
        }

        let mut participants = Vec::new();
        for (id, fold) in folds {
            if !query.includes_participant(id) {
                continue;
            }
            let Some(patch) = self.materialize(id, fold, query) else {
                continue;
            };
            participants.push((id, patch));
        }

        Patch {
            base: Some(since),
            latest: self.latest_version,
            participants,
            cull,
        }
    }

    /// Current routes of every participant touched in `(since, latest]`,
    /// filtered by `query`.
    #[must_use]
    pub fn query(&self, query: &Query, since: ScheduleVersion) -> Vec<RouteView> {
        let mut touched = BTreeSet::new();
        for (_, entry) in self.window(since) {
            match entry {
                LogEntry::Register { participant }
                | LogEntry::Itinerary { participant, .. } => {
                    touched.insert(*participant);
                }
                LogEntry::Unregister { .. } | LogEntry::Cull { .. } => {}
            }
        }

        let mut views = Vec::new();
        for id in touched {
            if !query.includes_participant(id) {
                continue;
            }
            let Some(state) = self.participants.get(&id) else {
                continue;
            };
            for (route_id, route) in &state.itinerary {
                if query.includes_route(route) {
                    views.push(RouteView {
                        participant: id,
                        route_id: *route_id,
                        route: route.clone(),
                    });
                }
            }
        }
        views
    }

    fn window(&self, since: ScheduleVersion) -> impl Iterator<Item = &(ScheduleVersion, LogEntry)> {
        let start = self.log.partition_point(|(version, _)| *version <= since);
        self.log[start..].iter()
    }

    fn snapshot(&self, query: &Query) -> Patch {
        let mut participants = Vec::new();
        for (id, state) in self.ordered_participants() {
            if !query.includes_participant(id) {
                continue;
            }
            let routes = Self::filtered_entries(&state.itinerary, query);
            participants.push((
                id,
                ParticipantPatch::Replace {
                    itinerary_version: state.last_version,
                    routes,
                },
            ));
        }
        Patch {
            base: None,
            latest: self.latest_version,
            participants,
            cull: None,
        }
    }

    fn ordered_participants(&self) -> Vec<(ParticipantId, &ParticipantState)> {
        let mut out: Vec<_> = self
            .participants
            .iter()
            .map(|(id, state)| (*id, state))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    fn filtered_entries(itinerary: &BTreeMap<RouteId, Route>, query: &Query) -> Vec<RouteEntry> {
        itinerary
            .iter()
            .filter(|(_, route)| query.includes_route(route))
            .map(|(id, route)| RouteEntry {
                id: *id,
                route: route.clone(),
            })
            .collect()
    }

    fn materialize(
        &self,
        id: ParticipantId,
        fold: NetFold,
        query: &Query,
    ) -> Option<ParticipantPatch> {
        if fold.removed {
            return Some(ParticipantPatch::Remove);
        }
        let state = self.participants.get(&id)?;
        if fold.replace {
            return Some(ParticipantPatch::Replace {
                itinerary_version: state.last_version,
                routes: Self::filtered_entries(&state.itinerary, query),
            });
        }
        let update = UpdatePatch {
            itinerary_version: state.last_version,
            erased: fold.erased.into_iter().collect(),
            delay: fold.delay,
            additions: fold
                .additions
                .into_iter()
                .filter(|(_, route)| query.includes_route(route))
                .map(|(route_id, route)| RouteEntry {
                    id: route_id,
                    route,
                })
                .collect(),
        };
        if update.is_empty() {
            return None;
        }
        Some(ParticipantPatch::Update(update))
    }
}

/// Per-participant accumulator for netting a log window.
#[derive(Debug, Default)]
struct NetFold {
    replace: bool,
    removed: bool,
    erased: BTreeSet<RouteId>,
    delay: Option<Duration>,
    additions: BTreeMap<RouteId, Route>,
}

impl NetFold {
    /// Collapses the fold into a full-replacement marker; the patch will
    /// carry the participant's current state instead of increments.
    fn make_replace(&mut self) {
        if self.removed {
            return;
        }
        self.erased.clear();
        self.delay = None;
        self.additions.clear();
        self.replace = true;
    }

    fn absorb(&mut self, effect: &ItineraryEffect) {
        if self.replace || self.removed {
            // The output is the participant's current state; later
            // incremental effects are already reflected there.
            return;
        }
        match effect {
            ItineraryEffect::Replace { .. } => {
                self.make_replace();
            }
            ItineraryEffect::Extend { routes } => {
                for entry in routes {
                    self.additions.insert(entry.id, entry.route.clone());
                }
            }
            ItineraryEffect::Delay { delay } => {
                self.delay = Some(self.delay.unwrap_or(Duration::ZERO) + *delay);
                for route in self.additions.values_mut() {
                    route.trajectory.delay(*delay);
                }
            }
            ItineraryEffect::Erase { route_ids } => {
                for id in route_ids {
                    if self.additions.remove(id).is_none() {
                        self.erased.insert(*id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::participant::Responsiveness;
    use wayline_traffic::{Profile, Trajectory, Waypoint};

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

    fn v(n: u64) -> ItineraryVersion {
        ItineraryVersion(n)
    }

    #[test]
    fn stale_mutations_are_dropped() {
        let mut db = Database::new();
        let reg = db.register(description("alpha"));
        assert_eq!(reg.last_itinerary_version, v(0));

        let accepted = db
            .set(reg.id, vec![route("L1", 0, 10)], v(1))
            .expect("registered");
        assert_eq!(accepted.status, MutationStatus::Applied(v(1)));
        let after_accept = db.latest_version();

        let stale = db
            .set(reg.id, vec![route("L1", 5, 15)], v(0))
            .expect("registered");
        assert_eq!(stale.status, MutationStatus::Stale);
        // A dropped mutation does not advance the global version.
        assert_eq!(db.latest_version(), after_accept);
        assert_eq!(db.itinerary(reg.id).expect("registered").len(), 1);
    }

    #[test]
    fn out_of_order_mutations_buffer_and_repair() {
        let mut db = Database::new();
        let reg = db.register(description("alpha"));
        db.set(reg.id, vec![route("L1", 0, 10)], v(1))
            .expect("registered");

        let jumped = db
            .set(reg.id, vec![route("L1", 20, 30)], v(3))
            .expect("registered");
        assert_eq!(jumped.status, MutationStatus::Buffered);
        assert_eq!(
            jumped.ranges,
            vec![VersionRange {
                lower: v(2),
                upper: v(2)
            }]
        );
        assert_eq!(jumped.last_known_version, v(1));

        let repair = db
            .set(reg.id, vec![route("L1", 5, 15)], v(2))
            .expect("registered");
        assert_eq!(repair.status, MutationStatus::Applied(v(3)));
        assert!(repair.ranges.is_empty());

        // The v3 itinerary won.
        let itinerary = db.itinerary(reg.id).expect("registered");
        let route = itinerary.values().next().expect("one route");
        assert_eq!(route.trajectory.start_time(), Time::from_secs(20));
    }

    #[test]
    fn register_is_idempotent_for_identical_descriptions() {
        let mut db = Database::new();
        let first = db.register(description("alpha"));
        db.set(first.id, vec![route("L1", 0, 10)], v(1))
            .expect("registered");

        let again = db.register(description("alpha"));
        assert_eq!(again.id, first.id);
        assert!(!again.fresh);
        assert_eq!(again.last_itinerary_version, v(1));
        assert_eq!(again.last_route_id, RouteId(1));
    }

    #[test]
    fn changed_description_replaces_and_never_reuses_ids() {
        let mut db = Database::new();
        let first = db.register(description("alpha"));
        let mut changed = description("alpha");
        changed.profile = Profile::circle_mm(900);

        let replaced = db.register(changed);
        assert_ne!(replaced.id, first.id);
        assert!(replaced.fresh);
        assert_eq!(replaced.replaced, Some(first.id));
        assert!(db.description(first.id).is_none());
    }

    #[test]
    fn latest_version_strictly_increases_per_accepted_mutation() {
        let mut db = Database::new();
        let reg = db.register(description("alpha"));
        let mut prev = db.latest_version();
        for n in 1..=5 {
            db.extend(reg.id, vec![route("L1", n, n + 1)], v(n as u64))
                .expect("registered");
            assert!(db.latest_version() > prev);
            prev = db.latest_version();
        }
    }

    #[test]
    fn erase_ignores_unknown_route_ids() {
        let mut db = Database::new();
        let reg = db.register(description("alpha"));
        db.extend(reg.id, vec![route("L1", 0, 10)], v(1))
            .expect("registered");
        let outcome = db
            .erase(reg.id, vec![RouteId(42)], v(2))
            .expect("registered");
        assert_eq!(outcome.status, MutationStatus::Applied(v(2)));
        assert_eq!(db.itinerary(reg.id).expect("registered").len(), 1);
    }

    #[test]
    fn cull_drops_expired_routes_and_marks_patches() {
        let mut db = Database::new();
        let reg = db.register(description("alpha"));
        db.set(
            reg.id,
            vec![route("L1", 0, 10), route("L1", 20, 30)],
            v(1),
        )
        .expect("registered");
        let before_cull = db.latest_version();

        db.cull(Time::from_secs(15));
        assert_eq!(db.itinerary(reg.id).expect("registered").len(), 1);

        let patch = db.changes(&Query::all(), Some(before_cull));
        assert_eq!(
            patch.cull,
            Some(Cull {
                before: Time::from_secs(15)
            })
        );
    }

    #[test]
    fn unknown_participant_is_an_error() {
        let mut db = Database::new();
        assert_eq!(
            db.set(ParticipantId(7), vec![], v(1)),
            Err(DatabaseError::UnknownParticipant(ParticipantId(7)))
        );
    }

    #[test]
    fn query_returns_current_routes_of_touched_participants() {
        let mut db = Database::new();
        let a = db.register(description("alpha"));
        let b = db.register(description("beta"));
        db.set(a.id, vec![route("L1", 0, 10)], v(1))
            .expect("registered");
        let checkpoint = db.latest_version();
        db.set(b.id, vec![route("L1", 0, 10)], v(1))
            .expect("registered");

        let views = db.query(&Query::all(), checkpoint);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].participant, b.id);
    }
}
