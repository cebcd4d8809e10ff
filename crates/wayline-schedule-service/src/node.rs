// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! The schedule node facade.
//!
//! Wires the broker surface onto the database and the negotiation
//! manager. Two locks guard everything, always taken in this order and
//! never nested: the database lock (database, registry, query topics)
//! and the negotiation lock. Subscription handlers run on broker
//! threads; request handlers run on the caller's thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use tracing::{error, info, warn};
use wayline_schedule::{
    Database, DatabaseError, MutationOutcome, NegotiationVersion, ParticipantId, QueryId,
    ScheduleVersion,
};
use wayline_schedule_proto::{
    topics, ChangesResult, Heartbeat, InconsistencyMsg, ItineraryClear, ItineraryDelay,
    ItineraryErase, ItineraryExtend, ItinerarySet, MirrorUpdateMsg, ParticipantInfo,
    ParticipantsInfo, QueriesInfo, RegisterParticipantRequest, RegisterParticipantResponse,
    RegisterQueryRequest, RegisterQueryResponse, RequestChangesRequest, RequestChangesResponse,
    UnregisterParticipantRequest, UnregisterParticipantResponse, UnregisterQueryRequest,
    UnregisterQueryResponse,
};

use crate::checker;
use crate::config::NodeConfig;
use crate::negotiation::NegotiationManager;
use crate::queries::QueryRegistry;
use crate::registry::{ParticipantRegistry, RegistryError};
use crate::transport::{publish_msg, serve_msg, subscribe_msg, Broker, TransportError};

/// Errors that keep a node from starting.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The durable registry could not be opened or replayed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The broker rejected a subscription or service registration.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The registry log replayed two registrations for the same id.
    #[error("registry replay conflicts on {0}")]
    ReplayConflict(ParticipantId),
}

/// Everything behind the database lock.
pub(crate) struct DatabaseState {
    pub(crate) db: Database,
    pub(crate) registry: ParticipantRegistry,
    pub(crate) queries: QueryRegistry,
}

/// State shared between the facade, the broker callbacks, and the
/// background threads.
pub(crate) struct NodeShared {
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) database: Mutex<DatabaseState>,
    pub(crate) negotiations: Mutex<NegotiationManager>,
    /// Paired with `database`; signaled whenever the schedule version may
    /// have advanced.
    pub(crate) wakeup: Condvar,
    pub(crate) shutdown: AtomicBool,
    heartbeat_lock: Mutex<()>,
    heartbeat_cv: Condvar,
}

impl NodeShared {
    pub(crate) fn lock_database(&self) -> MutexGuard<'_, DatabaseState> {
        self.database.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_negotiations(&self) -> MutexGuard<'_, NegotiationManager> {
        self.negotiations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies one itinerary mutation and runs the follow-up protocol:
    /// inconsistency report, negotiation ack check, mirror updates, and
    /// the checker wakeup.
    fn handle_mutation(
        &self,
        participant: ParticipantId,
        mutate: impl FnOnce(&mut Database) -> Result<MutationOutcome, DatabaseError>,
    ) {
        let outcome = {
            let mut state = self.lock_database();
            mutate(&mut state.db)
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%err, "itinerary mutation rejected");
                return;
            }
        };

        if !outcome.ranges.is_empty() {
            let report = InconsistencyMsg {
                participant,
                ranges: outcome.ranges.clone(),
                last_known_version: outcome.last_known_version,
            };
            if let Err(err) = publish_msg(self.broker.as_ref(), topics::INCONSISTENCY, &report) {
                warn!(%err, "failed to publish inconsistency report");
            }
        }

        self.lock_negotiations()
            .check(participant, outcome.last_known_version);

        {
            let mut state = self.lock_database();
            update_mirrors(&mut state, self.broker.as_ref());
        }
        self.wakeup.notify_all();
    }

    fn handle_register_participant(
        &self,
        request: RegisterParticipantRequest,
    ) -> RegisterParticipantResponse {
        let (response, changed) = {
            let mut state = self.lock_database();
            let registration = state.db.register(request.description.clone());

            if let Some(replaced) = registration.replaced {
                if let Err(err) = state.registry.record_unregistration(replaced) {
                    error!(%err, "failed to log displaced participant");
                }
            }
            if registration.fresh {
                if let Err(err) = state
                    .registry
                    .record_registration(registration.id, &request.description)
                {
                    // The registration never became durable; roll it back
                    // so a restart cannot hand the id to someone else.
                    let _ = state.db.unregister(registration.id);
                    error!(%err, "failed to log registration");
                    return RegisterParticipantResponse {
                        id: ParticipantId(0),
                        last_itinerary_version: Default::default(),
                        last_route_id: Default::default(),
                        error: Some(err.to_string()),
                    };
                }
            }

            if registration.fresh {
                update_mirrors(&mut state, self.broker.as_ref());
            }
            (
                RegisterParticipantResponse {
                    id: registration.id,
                    last_itinerary_version: registration.last_itinerary_version,
                    last_route_id: registration.last_route_id,
                    error: None,
                },
                registration.fresh,
            )
        };

        if changed {
            self.publish_participants_info();
            self.wakeup.notify_all();
        }
        response
    }

    fn handle_unregister_participant(
        &self,
        request: UnregisterParticipantRequest,
    ) -> UnregisterParticipantResponse {
        let result = {
            let mut state = self.lock_database();
            let result = state.db.unregister(request.id);
            if result.is_ok() {
                if let Err(err) = state.registry.record_unregistration(request.id) {
                    error!(%err, "failed to log unregistration");
                }
                update_mirrors(&mut state, self.broker.as_ref());
            }
            result
        };
        match result {
            Ok(()) => {
                self.publish_participants_info();
                self.wakeup.notify_all();
                UnregisterParticipantResponse {
                    confirmation: true,
                    error: None,
                }
            }
            Err(err) => UnregisterParticipantResponse {
                confirmation: false,
                error: Some(err.to_string()),
            },
        }
    }

    fn handle_register_query(&self, request: RegisterQueryRequest) -> RegisterQueryResponse {
        let (query_id, infos) = {
            let mut state = self.lock_database();
            let query_id = state.queries.register(request.query);
            (query_id, state.queries.infos())
        };
        self.publish_queries_info(infos);
        RegisterQueryResponse {
            query_id,
            error: None,
        }
    }

    fn handle_unregister_query(&self, request: UnregisterQueryRequest) -> UnregisterQueryResponse {
        let outcome = {
            let mut state = self.lock_database();
            let outcome = state.queries.unregister(request.query_id);
            outcome.map(|_| state.queries.infos())
        };
        match outcome {
            Some(infos) => {
                self.publish_queries_info(infos);
                UnregisterQueryResponse {
                    confirmation: true,
                    error: None,
                }
            }
            None => UnregisterQueryResponse {
                confirmation: false,
                error: Some(format!("unknown query id {}", request.query_id.0)),
            },
        }
    }

    fn handle_request_changes(&self, request: RequestChangesRequest) -> RequestChangesResponse {
        let mut state = self.lock_database();
        let found =
            state
                .queries
                .request_changes(request.query_id, request.full_update, request.version);
        if !found {
            return RequestChangesResponse {
                result: ChangesResult::UnknownQueryId,
            };
        }
        update_mirrors(&mut state, self.broker.as_ref());
        RequestChangesResponse {
            result: ChangesResult::Accepted,
        }
    }

    fn publish_participants_info(&self) {
        let info = {
            let state = self.lock_database();
            ParticipantsInfo {
                participants: state
                    .db
                    .participants()
                    .into_iter()
                    .map(|(id, description)| ParticipantInfo {
                        id,
                        description: description.clone(),
                    })
                    .collect(),
            }
        };
        if let Err(err) = publish_msg(self.broker.as_ref(), topics::PARTICIPANTS_INFO, &info) {
            warn!(%err, "failed to publish participants info");
        }
    }

    fn publish_queries_info(&self, queries: Vec<wayline_schedule_proto::QueryInfo>) {
        let info = QueriesInfo { queries };
        if let Err(err) = publish_msg(self.broker.as_ref(), topics::QUERIES_INFO, &info) {
            warn!(%err, "failed to publish queries info");
        }
    }
}

/// Publishes pending changes on every query topic whose cursor lags the
/// database, advancing the cursors that produced output. Also part of the
/// checker handshake: callers signal `wakeup` after this.
pub(crate) fn update_mirrors(state: &mut DatabaseState, broker: &dyn Broker) {
    let DatabaseState { db, queries, .. } = state;
    let latest = db.latest_version();
    for (query_id, query, topic) in queries.iter_mut() {
        let patch = db.changes(query, topic.last_sent_version);
        if patch.is_empty() {
            continue;
        }
        let update = MirrorUpdateMsg {
            database_version: latest,
            query_id,
            query: query.clone(),
            patch,
        };
        match publish_msg(broker, &topics::query_update(query_id), &update) {
            Ok(()) => topic.last_sent_version = Some(latest),
            Err(err) => warn!(%err, query = query_id.0, "failed to publish mirror update"),
        }
    }
}

fn run_heartbeat(shared: &NodeShared, period: std::time::Duration) {
    let mut count = 0u64;
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let beat = Heartbeat { count };
        if let Err(err) = publish_msg(shared.broker.as_ref(), topics::HEARTBEAT, &beat) {
            warn!(%err, "heartbeat publish failed");
        }
        count += 1;
        let guard = shared
            .heartbeat_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _ = shared.heartbeat_cv.wait_timeout(guard, period);
    }
}

/// A running schedule node.
///
/// Dropping the node stops the heartbeat and conflict-checker threads and
/// joins them; the broker itself is left to its owner.
pub struct ScheduleNode {
    shared: Arc<NodeShared>,
    checker: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl ScheduleNode {
    /// Recovers the registry, wires the broker surface, and starts the
    /// background threads.
    ///
    /// # Errors
    /// Returns [`NodeError::Registry`] / [`NodeError::ReplayConflict`]
    /// when the durable log is unusable, and [`NodeError::Transport`]
    /// when the broker rejects the node's subscriptions.
    pub fn start(broker: Arc<dyn Broker>, config: &NodeConfig) -> Result<Self, NodeError> {
        let (registry, survivors) = ParticipantRegistry::open(&config.log_file_location)?;
        let mut db = Database::new();
        for (id, description) in survivors {
            db.restore(id, description)
                .map_err(|_| NodeError::ReplayConflict(id))?;
        }
        let recovered = db.participants().len();
        if recovered > 0 {
            info!(recovered, "recovered participants from registry log");
        }

        let shared = Arc::new(NodeShared {
            broker: Arc::clone(&broker),
            database: Mutex::new(DatabaseState {
                db,
                registry,
                queries: QueryRegistry::default(),
            }),
            negotiations: Mutex::new(NegotiationManager::default()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
            heartbeat_lock: Mutex::new(()),
            heartbeat_cv: Condvar::new(),
        });

        Self::wire_subscriptions(&shared)?;
        Self::wire_services(&shared)?;

        shared.publish_participants_info();
        let infos = shared.lock_database().queries.infos();
        shared.publish_queries_info(infos);

        let checker = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || checker::run(&shared))
        };
        let heartbeat = {
            let shared = Arc::clone(&shared);
            let period = config.heartbeat_period();
            std::thread::spawn(move || run_heartbeat(&shared, period))
        };

        info!("schedule node started");
        Ok(Self {
            shared,
            checker: Some(checker),
            heartbeat: Some(heartbeat),
        })
    }

    fn wire_subscriptions(shared: &Arc<NodeShared>) -> Result<(), TransportError> {
        let broker = Arc::clone(&shared.broker);

        let s = Arc::clone(shared);
        subscribe_msg(broker.as_ref(), topics::ITINERARY_SET, move |msg: ItinerarySet| {
            s.handle_mutation(msg.participant, move |db| {
                db.set(msg.participant, msg.itinerary, msg.version)
            });
        })?;

        let s = Arc::clone(shared);
        subscribe_msg(
            broker.as_ref(),
            topics::ITINERARY_EXTEND,
            move |msg: ItineraryExtend| {
                s.handle_mutation(msg.participant, move |db| {
                    db.extend(msg.participant, msg.routes, msg.version)
                });
            },
        )?;

        let s = Arc::clone(shared);
        subscribe_msg(
            broker.as_ref(),
            topics::ITINERARY_DELAY,
            move |msg: ItineraryDelay| {
                s.handle_mutation(msg.participant, move |db| {
                    db.delay(msg.participant, msg.delay, msg.version)
                });
            },
        )?;

        let s = Arc::clone(shared);
        subscribe_msg(
            broker.as_ref(),
            topics::ITINERARY_ERASE,
            move |msg: ItineraryErase| {
                s.handle_mutation(msg.participant, move |db| {
                    db.erase(msg.participant, msg.routes, msg.version)
                });
            },
        )?;

        let s = Arc::clone(shared);
        subscribe_msg(
            broker.as_ref(),
            topics::ITINERARY_CLEAR,
            move |msg: ItineraryClear| {
                s.handle_mutation(msg.participant, move |db| {
                    db.clear(msg.participant, msg.version)
                });
            },
        )?;

        let s = Arc::clone(shared);
        subscribe_msg(broker.as_ref(), topics::NEGOTIATION_PROPOSAL, move |msg| {
            let broker = Arc::clone(&s.broker);
            s.lock_negotiations().receive_proposal(broker.as_ref(), msg);
        })?;

        let s = Arc::clone(shared);
        subscribe_msg(broker.as_ref(), topics::NEGOTIATION_REJECTION, move |msg| {
            let broker = Arc::clone(&s.broker);
            s.lock_negotiations()
                .receive_rejection(broker.as_ref(), msg);
        })?;

        let s = Arc::clone(shared);
        subscribe_msg(broker.as_ref(), topics::NEGOTIATION_FORFEIT, move |msg| {
            let broker = Arc::clone(&s.broker);
            s.lock_negotiations().receive_forfeit(broker.as_ref(), msg);
        })?;

        let s = Arc::clone(shared);
        subscribe_msg(broker.as_ref(), topics::NEGOTIATION_REFUSAL, move |msg| {
            let broker = Arc::clone(&s.broker);
            s.lock_negotiations().receive_refusal(broker.as_ref(), msg);
        })?;

        let s = Arc::clone(shared);
        subscribe_msg(broker.as_ref(), topics::NEGOTIATION_ACK, move |msg| {
            s.lock_negotiations().receive_conclusion_ack(&msg);
        })?;

        Ok(())
    }

    fn wire_services(shared: &Arc<NodeShared>) -> Result<(), TransportError> {
        let broker = Arc::clone(&shared.broker);

        let s = Arc::clone(shared);
        serve_msg(broker.as_ref(), topics::REGISTER_PARTICIPANT, move |req| {
            s.handle_register_participant(req)
        })?;

        let s = Arc::clone(shared);
        serve_msg(broker.as_ref(), topics::UNREGISTER_PARTICIPANT, move |req| {
            s.handle_unregister_participant(req)
        })?;

        let s = Arc::clone(shared);
        serve_msg(broker.as_ref(), topics::REGISTER_QUERY, move |req| {
            s.handle_register_query(req)
        })?;

        let s = Arc::clone(shared);
        serve_msg(broker.as_ref(), topics::UNREGISTER_QUERY, move |req| {
            s.handle_unregister_query(req)
        })?;

        let s = Arc::clone(shared);
        serve_msg(broker.as_ref(), topics::REQUEST_CHANGES, move |req| {
            s.handle_request_changes(req)
        })?;

        Ok(())
    }

    /// The database's newest version.
    #[must_use]
    pub fn latest_version(&self) -> ScheduleVersion {
        self.shared.lock_database().db.latest_version()
    }

    /// Number of registered participants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.shared.lock_database().db.participants().len()
    }

    /// Subscriber count of a registered query, if any.
    #[must_use]
    pub fn query_subscribers(&self, query_id: QueryId) -> Option<u64> {
        self.shared
            .lock_database()
            .queries
            .infos()
            .into_iter()
            .find(|info| info.id == query_id)
            .map(|info| info.subscriber_count)
    }

    /// Number of negotiation rooms currently held, including concluded
    /// rooms still waiting for acknowledgments.
    #[must_use]
    pub fn open_negotiations(&self) -> usize {
        self.shared.lock_negotiations().room_count()
    }

    /// Participants that have not yet acknowledged the conclusion of
    /// `version`.
    #[must_use]
    pub fn awaiting_acknowledgments(&self, version: NegotiationVersion) -> Vec<ParticipantId> {
        self.shared
            .lock_negotiations()
            .awaiting_participants(version)
    }
}

impl Drop for ScheduleNode {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_all();
        self.shared.heartbeat_cv.notify_all();
        if let Some(handle) = self.checker.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.heartbeat.take() {
            let _ = handle.join();
        }
    }
}
