// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Topic and service names.
//!
//! Itinerary mutation topics are best-effort on real brokers; senders
//! recover dropped messages by watching [`INCONSISTENCY`]. Everything
//! else is reliable, and the info topics are transient-local keep-last-1
//! so late joiners see the current lists.

use wayline_schedule::QueryId;

/// Liveness beacon.
pub const HEARTBEAT: &str = "schedule/heartbeat";
/// Full participant list on every registration change.
pub const PARTICIPANTS_INFO: &str = "schedule/participants_info";
/// Full query list on every registration change.
pub const QUERIES_INFO: &str = "schedule/queries_info";
/// Missing-version reports.
pub const INCONSISTENCY: &str = "schedule/inconsistency";

/// Per-query update topic.
#[must_use]
pub fn query_update(query_id: QueryId) -> String {
    format!("schedule/query_update/{}", query_id.0)
}

/// Itinerary replacement mutations.
pub const ITINERARY_SET: &str = "itinerary/set";
/// Itinerary append mutations.
pub const ITINERARY_EXTEND: &str = "itinerary/extend";
/// Itinerary delay mutations.
pub const ITINERARY_DELAY: &str = "itinerary/delay";
/// Itinerary route-erase mutations.
pub const ITINERARY_ERASE: &str = "itinerary/erase";
/// Itinerary clear mutations.
pub const ITINERARY_CLEAR: &str = "itinerary/clear";

/// New-conflict announcements.
pub const NEGOTIATION_NOTICE: &str = "negotiation/notice";
/// Conclusion acknowledgments.
pub const NEGOTIATION_ACK: &str = "negotiation/ack";
/// Whole-negotiation refusals.
pub const NEGOTIATION_REFUSAL: &str = "negotiation/refusal";
/// Table proposals.
pub const NEGOTIATION_PROPOSAL: &str = "negotiation/proposal";
/// Proposal rejections.
pub const NEGOTIATION_REJECTION: &str = "negotiation/rejection";
/// Branch forfeits.
pub const NEGOTIATION_FORFEIT: &str = "negotiation/forfeit";
/// Negotiation outcomes.
pub const NEGOTIATION_CONCLUSION: &str = "negotiation/conclusion";

/// Query registration service.
pub const REGISTER_QUERY: &str = "schedule/register_query";
/// Query unregistration service.
pub const UNREGISTER_QUERY: &str = "schedule/unregister_query";
/// Participant registration service.
pub const REGISTER_PARTICIPANT: &str = "schedule/register_participant";
/// Participant unregistration service.
pub const UNREGISTER_PARTICIPANT: &str = "schedule/unregister_participant";
/// Change re-send service.
pub const REQUEST_CHANGES: &str = "schedule/request_changes";
