// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Negotiation room management.
//!
//! Rooms are owned by value and keyed by [`NegotiationVersion`]; every
//! message routes to a room by that id. Messages that arrive before their
//! table exists are cached (bounded) and replayed after each successful
//! mutation of the room. Concluded rooms linger only to collect
//! acknowledgments, then evict.

use std::collections::{BTreeSet, VecDeque};

use rustc_hash::FxHashMap;
use tracing::{debug, warn};
use wayline_schedule::{
    ItineraryVersion, Negotiation, NegotiationError, NegotiationVersion, ParticipantId,
    QuickestFinishEvaluator,
};
use wayline_schedule_proto::{
    topics, ConflictAck, ConflictConclusion, NegotiationForfeit, NegotiationProposal,
    NegotiationRefusal, NegotiationRejection,
};

use crate::transport::{publish_msg, Broker};

/// Upper bound on cached messages per room and kind. One proposal per
/// table is ever legitimately in flight, so a small window covers real
/// reordering; beyond it the sender has desynced and must renegotiate.
const CACHE_CAP: usize = 64;

/// An acknowledgment the manager is still waiting for.
#[derive(Debug, Clone, Copy)]
struct Wait {
    /// When set, the ack only becomes real once the database applies this
    /// itinerary version for the participant.
    itinerary_update_version: Option<ItineraryVersion>,
}

#[derive(Debug)]
struct Room {
    negotiation: Negotiation,
    cached_proposals: VecDeque<NegotiationProposal>,
    cached_rejections: VecDeque<NegotiationRejection>,
    cached_forfeits: VecDeque<NegotiationForfeit>,
    concluded: bool,
}

impl Room {
    fn new(participants: BTreeSet<ParticipantId>) -> Self {
        Self {
            negotiation: Negotiation::new(participants),
            cached_proposals: VecDeque::new(),
            cached_rejections: VecDeque::new(),
            cached_forfeits: VecDeque::new(),
            concluded: false,
        }
    }

    fn accepts(&self, participants: &[ParticipantId]) -> bool {
        participants
            .iter()
            .all(|p| self.negotiation.participants().contains(p))
    }
}

/// Tracks every open negotiation and its acknowledgment state.
#[derive(Debug, Default)]
pub(crate) struct NegotiationManager {
    rooms: FxHashMap<NegotiationVersion, Room>,
    awaiting: FxHashMap<(NegotiationVersion, ParticipantId), Wait>,
    next_version: u64,
}

impl NegotiationManager {
    /// Opens a negotiation for an unordered conflict pair, unless one is
    /// already live for the same pair. Returns the new room's id and
    /// participant set.
    pub(crate) fn insert(
        &mut self,
        pair: (ParticipantId, ParticipantId),
    ) -> Option<(NegotiationVersion, Vec<ParticipantId>)> {
        let participants: BTreeSet<ParticipantId> = [pair.0, pair.1].into_iter().collect();
        let live_duplicate = self.rooms.values().any(|room| {
            !room.concluded && *room.negotiation.participants() == participants
        });
        if live_duplicate {
            return None;
        }

        self.next_version += 1;
        let version = NegotiationVersion(self.next_version);
        let listed: Vec<ParticipantId> = participants.iter().copied().collect();
        self.rooms.insert(version, Room::new(participants));
        Some((version, listed))
    }

    /// Number of rooms currently held (live and awaiting-ack).
    pub(crate) fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Participants whose acknowledgment of `version` is still pending.
    pub(crate) fn awaiting_participants(&self, version: NegotiationVersion) -> Vec<ParticipantId> {
        let mut pending: Vec<ParticipantId> = self
            .awaiting
            .keys()
            .filter(|(v, _)| *v == version)
            .map(|(_, p)| *p)
            .collect();
        pending.sort_unstable();
        pending
    }

    pub(crate) fn receive_proposal(&mut self, broker: &dyn Broker, msg: NegotiationProposal) {
        let Some(room) = self.rooms.get_mut(&msg.conflict_version) else {
            debug!(version = msg.conflict_version.0, "proposal for unknown negotiation");
            return;
        };
        if room.concluded {
            debug!(version = msg.conflict_version.0, "proposal for concluded negotiation");
            return;
        }
        let path = table_path(&msg.to_accommodate, msg.for_participant);
        if !room.accepts(&path) {
            warn!(
                version = msg.conflict_version.0,
                "proposal names a participant outside the negotiation"
            );
            return;
        }
        match room
            .negotiation
            .submit(&path, msg.itinerary.clone(), msg.proposal_version)
        {
            Ok(()) => {
                replay_caches(room);
                evaluate(msg.conflict_version, room, &mut self.awaiting, broker);
            }
            Err(NegotiationError::TableNotFound(_)) => {
                cache_push(&mut room.cached_proposals, msg, "proposal");
            }
            Err(NegotiationError::Deprecated) => {
                debug!(version = msg.conflict_version.0, "deprecated proposal dropped");
            }
        }
    }

    pub(crate) fn receive_rejection(&mut self, broker: &dyn Broker, msg: NegotiationRejection) {
        let Some(room) = self.rooms.get_mut(&msg.conflict_version) else {
            debug!(version = msg.conflict_version.0, "rejection for unknown negotiation");
            return;
        };
        if room.concluded {
            return;
        }
        let path = table_path(&msg.to_accommodate, msg.for_participant);
        if !room.accepts(&path) {
            warn!(
                version = msg.conflict_version.0,
                "rejection names a participant outside the negotiation"
            );
            return;
        }
        match room.negotiation.reject(
            &path,
            msg.proposal_version,
            msg.rejected_by,
            msg.alternatives.clone(),
        ) {
            Ok(()) => {
                replay_caches(room);
                evaluate(msg.conflict_version, room, &mut self.awaiting, broker);
            }
            Err(NegotiationError::TableNotFound(_)) => {
                cache_push(&mut room.cached_rejections, msg, "rejection");
            }
            Err(NegotiationError::Deprecated) => {
                debug!(version = msg.conflict_version.0, "stale rejection dropped");
            }
        }
    }

    pub(crate) fn receive_forfeit(&mut self, broker: &dyn Broker, msg: NegotiationForfeit) {
        let Some(room) = self.rooms.get_mut(&msg.conflict_version) else {
            debug!(version = msg.conflict_version.0, "forfeit for unknown negotiation");
            return;
        };
        if room.concluded {
            return;
        }
        let path = table_path(&msg.to_accommodate, msg.for_participant);
        if !room.accepts(&path) {
            warn!(
                version = msg.conflict_version.0,
                "forfeit names a participant outside the negotiation"
            );
            return;
        }
        match room.negotiation.forfeit(&path, msg.proposal_version) {
            Ok(()) => {
                replay_caches(room);
                evaluate(msg.conflict_version, room, &mut self.awaiting, broker);
            }
            Err(NegotiationError::TableNotFound(_)) => {
                cache_push(&mut room.cached_forfeits, msg, "forfeit");
            }
            Err(NegotiationError::Deprecated) => {
                debug!(version = msg.conflict_version.0, "stale forfeit dropped");
            }
        }
    }

    /// A refusal abandons the whole negotiation: an unresolved conclusion
    /// is published and only the acknowledgment bookkeeping remains.
    pub(crate) fn receive_refusal(&mut self, broker: &dyn Broker, msg: NegotiationRefusal) {
        let Some(room) = self.rooms.get_mut(&msg.conflict_version) else {
            debug!(version = msg.conflict_version.0, "refusal for unknown negotiation");
            return;
        };
        if room.concluded {
            return;
        }
        conclude(msg.conflict_version, room, &mut self.awaiting, broker, None);
    }

    pub(crate) fn receive_conclusion_ack(&mut self, msg: &ConflictAck) {
        for ack in &msg.acknowledgments {
            let key = (msg.conflict_version, ack.participant);
            if !self.awaiting.contains_key(&key) {
                continue;
            }
            match (ack.updating, ack.itinerary_version) {
                (true, Some(version)) => {
                    self.awaiting.insert(
                        key,
                        Wait {
                            itinerary_update_version: Some(version),
                        },
                    );
                }
                _ => {
                    self.awaiting.remove(&key);
                }
            }
        }
        self.evict_if_done(msg.conflict_version);
    }

    /// Called after every database mutation: retires waits whose promised
    /// itinerary update has now been applied.
    pub(crate) fn check(&mut self, participant: ParticipantId, version: ItineraryVersion) {
        let satisfied: Vec<(NegotiationVersion, ParticipantId)> = self
            .awaiting
            .iter()
            .filter(|((_, p), wait)| {
                *p == participant
                    && wait
                        .itinerary_update_version
                        .is_some_and(|pending| pending <= version)
            })
            .map(|(key, _)| *key)
            .collect();
        for key in satisfied {
            self.awaiting.remove(&key);
            self.evict_if_done(key.0);
        }
    }

    fn evict_if_done(&mut self, version: NegotiationVersion) {
        let concluded = self
            .rooms
            .get(&version)
            .is_some_and(|room| room.concluded);
        let pending = self.awaiting.keys().any(|(v, _)| *v == version);
        if concluded && !pending {
            self.rooms.remove(&version);
        }
    }
}

fn table_path(to_accommodate: &[ParticipantId], for_participant: ParticipantId) -> Vec<ParticipantId> {
    let mut path = to_accommodate.to_vec();
    path.push(for_participant);
    path
}

fn cache_push<M>(cache: &mut VecDeque<M>, msg: M, kind: &str) {
    if cache.len() == CACHE_CAP {
        cache.pop_front();
        warn!(kind, "negotiation cache full, dropping oldest message");
    }
    cache.push_back(msg);
}

/// Re-applies cached messages until none of them make progress.
fn replay_caches(room: &mut Room) {
    loop {
        let mut progressed = false;

        for msg in std::mem::take(&mut room.cached_proposals) {
            let path = table_path(&msg.to_accommodate, msg.for_participant);
            match room
                .negotiation
                .submit(&path, msg.itinerary.clone(), msg.proposal_version)
            {
                Ok(()) => progressed = true,
                Err(NegotiationError::TableNotFound(_)) => room.cached_proposals.push_back(msg),
                Err(NegotiationError::Deprecated) => {}
            }
        }

        for msg in std::mem::take(&mut room.cached_rejections) {
            let path = table_path(&msg.to_accommodate, msg.for_participant);
            match room.negotiation.reject(
                &path,
                msg.proposal_version,
                msg.rejected_by,
                msg.alternatives.clone(),
            ) {
                Ok(()) => progressed = true,
                Err(NegotiationError::TableNotFound(_)) => room.cached_rejections.push_back(msg),
                Err(NegotiationError::Deprecated) => {}
            }
        }

        for msg in std::mem::take(&mut room.cached_forfeits) {
            let path = table_path(&msg.to_accommodate, msg.for_participant);
            match room.negotiation.forfeit(&path, msg.proposal_version) {
                Ok(()) => progressed = true,
                Err(NegotiationError::TableNotFound(_)) => room.cached_forfeits.push_back(msg),
                Err(NegotiationError::Deprecated) => {}
            }
        }

        if !progressed {
            return;
        }
    }
}

/// Publishes a conclusion if the negotiation has become decidable.
fn evaluate(
    version: NegotiationVersion,
    room: &mut Room,
    awaiting: &mut FxHashMap<(NegotiationVersion, ParticipantId), Wait>,
    broker: &dyn Broker,
) {
    if room.concluded {
        return;
    }
    if room.negotiation.ready() {
        if let Some(table) = QuickestFinishEvaluator::choose(&room.negotiation) {
            conclude(version, room, awaiting, broker, Some(table));
        }
    } else if room.negotiation.all_forfeited() {
        conclude(version, room, awaiting, broker, None);
    }
}

fn conclude(
    version: NegotiationVersion,
    room: &mut Room,
    awaiting: &mut FxHashMap<(NegotiationVersion, ParticipantId), Wait>,
    broker: &dyn Broker,
    table: Option<Vec<ParticipantId>>,
) {
    let conclusion = ConflictConclusion {
        conflict_version: version,
        resolved: table.is_some(),
        table: table.unwrap_or_default(),
    };
    if let Err(err) = publish_msg(broker, topics::NEGOTIATION_CONCLUSION, &conclusion) {
        warn!(%err, "failed to publish conflict conclusion");
    }
    room.concluded = true;
    for participant in room.negotiation.participants() {
        awaiting.insert(
            (version, *participant),
            Wait {
                itinerary_update_version: None,
            },
        );
    }
}
