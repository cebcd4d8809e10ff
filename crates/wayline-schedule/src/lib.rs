// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Wayline schedule core: the authoritative versioned itinerary database,
//! incremental patches, read-only mirrors, and conflict negotiation trees.
//!
//! This crate is pure state machinery. It performs no I/O, spawns no
//! threads, and holds no locks; the service crate wraps it with the
//! transport surface, persistence, and the background conflict checker.

mod database;
mod ident;
mod inconsistency;
mod mirror;
mod negotiation;
mod participant;
mod patch;
mod query;

pub use database::{Database, DatabaseError, MutationOutcome, MutationStatus, Registration};
pub use ident::{
    ItineraryVersion, NegotiationVersion, ParticipantId, QueryId, RouteId, ScheduleVersion,
};
pub use inconsistency::{missing_ranges, VersionRange};
pub use mirror::{Mirror, MirrorError, MirrorItinerary};
pub use negotiation::{
    Negotiation, NegotiationError, Proposal, QuickestFinishEvaluator, Rejection, Table,
};
pub use participant::{ParticipantDescription, Responsiveness};
pub use patch::{Cull, ParticipantPatch, Patch, RouteEntry, RouteView, UpdatePatch};
pub use query::{MapFilter, ParticipantFilter, Query, TimeRange};
