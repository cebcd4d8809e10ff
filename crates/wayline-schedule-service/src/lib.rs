// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! The Wayline schedule node.
//!
//! Hosts the authoritative schedule database behind a broker surface:
//! itinerary mutation subscriptions, registration services, per-query
//! mirror-update topics, the background conflict checker, and the
//! negotiation manager. The broker itself is pluggable; [`bus::InProcBus`]
//! serves tests and single-process deployments.

pub mod bus;
pub mod config;
pub mod node;
pub mod registry;
pub mod transport;

mod checker;
mod negotiation;
mod queries;

pub use bus::InProcBus;
pub use config::NodeConfig;
pub use node::{NodeError, ScheduleNode};
pub use registry::{ParticipantRegistry, RegistryError};
pub use transport::{
    call_service, publish_msg, serve_msg, subscribe_msg, Broker, TransportError,
};
