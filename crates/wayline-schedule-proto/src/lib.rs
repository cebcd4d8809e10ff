// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Wire schema for the Wayline schedule service.
//!
//! Every pub/sub topic and request/response service exchanged between the
//! schedule node and its participants is defined here, together with the
//! CBOR codec in [`wire`]. The schema types re-use the core crate's ids
//! and query/patch structures directly, so a decoded message needs no
//! translation layer before it reaches the database.

use serde::{Deserialize, Serialize};
use wayline_schedule::{
    ItineraryVersion, NegotiationVersion, ParticipantDescription, ParticipantId, Patch, Query,
    QueryId, RouteId, ScheduleVersion, VersionRange,
};
use wayline_traffic::{Duration, Route};

pub mod topics;
pub mod wire;

/// Liveness beacon published on [`topics::HEARTBEAT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Beat counter since node start; a stalled counter means the node
    /// died between beats.
    pub count: u64,
}

/// One participant's registration, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    /// The participant's stable id.
    pub id: ParticipantId,
    /// Its immutable description.
    pub description: ParticipantDescription,
}

/// Full participant list, published on every registration change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantsInfo {
    /// All registered participants, in id order.
    pub participants: Vec<ParticipantInfo>,
}

/// One registered query and its subscriber count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryInfo {
    /// The query's id.
    pub id: QueryId,
    /// The query itself.
    pub query: Query,
    /// How many subscribers share it.
    pub subscriber_count: u64,
}

/// Full query list, published on every registration change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueriesInfo {
    /// All registered queries, in id order.
    pub queries: Vec<QueryInfo>,
}

/// Incremental schedule update for one query topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorUpdateMsg {
    /// Database version the patch advances to.
    pub database_version: ScheduleVersion,
    /// The query this update was filtered by.
    pub query_id: QueryId,
    /// The query contents, for subscribers that joined late.
    pub query: Query,
    /// The change-set itself.
    pub patch: Patch,
}

/// Missing-version report for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InconsistencyMsg {
    /// The participant whose mutations arrived out of order.
    pub participant: ParticipantId,
    /// The version runs the database is missing.
    pub ranges: Vec<VersionRange>,
    /// Newest version the database has applied.
    pub last_known_version: ItineraryVersion,
}

/// Replaces a participant's entire itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItinerarySet {
    /// Whose itinerary.
    pub participant: ParticipantId,
    /// The replacement routes.
    pub itinerary: Vec<Route>,
    /// Client itinerary version.
    pub version: ItineraryVersion,
}

/// Appends routes to a participant's itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryExtend {
    /// Whose itinerary.
    pub participant: ParticipantId,
    /// Routes to append.
    pub routes: Vec<Route>,
    /// Client itinerary version.
    pub version: ItineraryVersion,
}

/// Shifts a participant's itinerary in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItineraryDelay {
    /// Whose itinerary.
    pub participant: ParticipantId,
    /// How far to shift it.
    pub delay: Duration,
    /// Client itinerary version.
    pub version: ItineraryVersion,
}

/// Drops specific routes from a participant's itinerary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItineraryErase {
    /// Whose itinerary.
    pub participant: ParticipantId,
    /// Routes to drop.
    pub routes: Vec<RouteId>,
    /// Client itinerary version.
    pub version: ItineraryVersion,
}

/// Drops every route from a participant's itinerary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItineraryClear {
    /// Whose itinerary.
    pub participant: ParticipantId,
    /// Client itinerary version.
    pub version: ItineraryVersion,
}

/// Announces a newly opened negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictNotice {
    /// Identifier for all follow-up messages of this negotiation.
    pub conflict_version: NegotiationVersion,
    /// The conflicting participants.
    pub participants: Vec<ParticipantId>,
}

/// A proposal for one negotiation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationProposal {
    /// Which negotiation.
    pub conflict_version: NegotiationVersion,
    /// The participant this proposal plans for.
    pub for_participant: ParticipantId,
    /// The ancestor participants the proposal accommodates, root first.
    pub to_accommodate: Vec<ParticipantId>,
    /// The proposed routes.
    pub itinerary: Vec<Route>,
    /// Proposal version; newer versions deprecate descendants.
    pub proposal_version: u64,
}

/// Rejects a table's current proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRejection {
    /// Which negotiation.
    pub conflict_version: NegotiationVersion,
    /// The table owner whose proposal is rejected.
    pub for_participant: ParticipantId,
    /// The table's accommodation path, root first.
    pub to_accommodate: Vec<ParticipantId>,
    /// Version of the proposal being rejected.
    pub proposal_version: u64,
    /// Who rejects it.
    pub rejected_by: ParticipantId,
    /// Rollouts the rejecting participant could live with.
    pub alternatives: Vec<Route>,
}

/// Abandons a negotiation branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationForfeit {
    /// Which negotiation.
    pub conflict_version: NegotiationVersion,
    /// The table owner giving up.
    pub for_participant: ParticipantId,
    /// The table's accommodation path, root first.
    pub to_accommodate: Vec<ParticipantId>,
    /// Proposal version this forfeit supersedes; a forfeit at or below
    /// the table's live proposal version is dropped as deprecated.
    pub proposal_version: u64,
}

/// Refuses an entire negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationRefusal {
    /// Which negotiation.
    pub conflict_version: NegotiationVersion,
}

/// Announces the outcome of a negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictConclusion {
    /// Which negotiation.
    pub conflict_version: NegotiationVersion,
    /// Whether a winning proposal was selected.
    pub resolved: bool,
    /// The winning table's path, root first; empty when unresolved.
    pub table: Vec<ParticipantId>,
}

/// One participant's acknowledgment of a conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantAck {
    /// Who acknowledges.
    pub participant: ParticipantId,
    /// True when the participant will push an itinerary update to honor
    /// the conclusion.
    pub updating: bool,
    /// The itinerary version that will carry the update, when `updating`.
    pub itinerary_version: Option<ItineraryVersion>,
}

/// Acknowledges a published conclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictAck {
    /// Which negotiation.
    pub conflict_version: NegotiationVersion,
    /// Acknowledgments carried by this message.
    pub acknowledgments: Vec<ParticipantAck>,
}

/// Registers (or re-registers) a schedule query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterQueryRequest {
    /// The query to register.
    pub query: Query,
}

/// Response to [`RegisterQueryRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterQueryResponse {
    /// Id of the (possibly shared) query topic.
    pub query_id: QueryId,
    /// Error text, if registration failed.
    pub error: Option<String>,
}

/// Drops one subscription from a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterQueryRequest {
    /// The query to unsubscribe from.
    pub query_id: QueryId,
}

/// Response to [`UnregisterQueryRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterQueryResponse {
    /// True when the subscription was dropped.
    pub confirmation: bool,
    /// Error text, if the id was unknown.
    pub error: Option<String>,
}

/// Registers a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParticipantRequest {
    /// The participant's description.
    pub description: ParticipantDescription,
}

/// Response to [`RegisterParticipantRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParticipantResponse {
    /// The assigned (or recovered) participant id.
    pub id: ParticipantId,
    /// Newest itinerary version the database holds for this participant.
    pub last_itinerary_version: ItineraryVersion,
    /// Newest route id allocated for this participant.
    pub last_route_id: RouteId,
    /// Error text, if registration failed.
    pub error: Option<String>,
}

/// Unregisters a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterParticipantRequest {
    /// The participant to remove.
    pub id: ParticipantId,
}

/// Response to [`UnregisterParticipantRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterParticipantResponse {
    /// True when the participant was removed.
    pub confirmation: bool,
    /// Error text, if the id was unknown.
    pub error: Option<String>,
}

/// Asks the node to re-send changes on a query topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestChangesRequest {
    /// Which query topic.
    pub query_id: QueryId,
    /// Version the requester is at; ignored when `full_update`.
    pub version: Option<ScheduleVersion>,
    /// True to force a full snapshot on the next update.
    pub full_update: bool,
}

/// Typed result of a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangesResult {
    /// The request was accepted; an update follows on the query topic.
    Accepted,
    /// No query with that id is registered.
    UnknownQueryId,
}

/// Response to [`RequestChangesRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestChangesResponse {
    /// Outcome of the request.
    pub result: ChangesResult,
}
