// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! The message transport seam.
//!
//! The schedule node does not own a broker; it is handed one. A broker
//! moves opaque CBOR payloads between topics and services, and may invoke
//! subscription callbacks on any thread it likes. The typed helpers below
//! put the codec in one place so the rest of the service deals in schema
//! types only.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;
use wayline_schedule_proto::wire::{self, WireError};

/// A subscription callback, invoked with the raw payload.
pub type SubscriberFn = dyn Fn(&[u8]) + Send + Sync;

/// A service responder: raw request bytes in, raw response bytes out.
pub type ResponderFn = dyn Fn(&[u8]) -> Result<Vec<u8>, TransportError> + Send + Sync;

/// Errors crossing the transport seam.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No responder is registered under the requested service name.
    #[error("no responder for service {0:?}")]
    UnknownService(String),
    /// The broker has shut down.
    #[error("broker disconnected")]
    Disconnected,
    /// A payload failed to encode or decode.
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// A publish/subscribe and request/response message broker.
///
/// Callbacks and responders run on broker-owned threads; implementations
/// must tolerate them blocking briefly on the node's locks.
pub trait Broker: Send + Sync {
    /// Publishes `payload` to every subscriber of `topic`.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Registers `callback` for every future message on `topic`.
    fn subscribe(&self, topic: &str, callback: Box<SubscriberFn>) -> Result<(), TransportError>;

    /// Registers the responder for `service`, replacing any previous one.
    fn serve(&self, service: &str, responder: Box<ResponderFn>) -> Result<(), TransportError>;

    /// Sends a request to `service` and waits for its response.
    fn call(&self, service: &str, request: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

/// Publishes a schema message on `topic`.
///
/// # Errors
/// Propagates codec and broker failures.
pub fn publish_msg<M: Serialize>(
    broker: &dyn Broker,
    topic: &str,
    message: &M,
) -> Result<(), TransportError> {
    broker.publish(topic, wire::encode(message)?)
}

/// Subscribes a typed handler to `topic`. Payloads that fail to decode
/// are logged and dropped, never surfaced to the handler.
///
/// # Errors
/// Propagates broker subscription failures.
pub fn subscribe_msg<M, F>(broker: &dyn Broker, topic: &str, handler: F) -> Result<(), TransportError>
where
    M: DeserializeOwned + 'static,
    F: Fn(M) + Send + Sync + 'static,
{
    let topic_name = topic.to_owned();
    broker.subscribe(
        topic,
        Box::new(move |payload| match wire::decode::<M>(payload) {
            Ok(message) => handler(message),
            Err(err) => warn!(topic = %topic_name, %err, "dropping undecodable message"),
        }),
    )
}

/// Registers a typed responder for `service`.
///
/// # Errors
/// Propagates broker registration failures.
pub fn serve_msg<Req, Resp, F>(
    broker: &dyn Broker,
    service: &str,
    handler: F,
) -> Result<(), TransportError>
where
    Req: DeserializeOwned + 'static,
    Resp: Serialize + 'static,
    F: Fn(Req) -> Resp + Send + Sync + 'static,
{
    broker.serve(
        service,
        Box::new(move |payload| {
            let request = wire::decode::<Req>(payload)?;
            Ok(wire::encode(&handler(request))?)
        }),
    )
}

/// Calls `service` with a typed request and decodes the typed response.
///
/// # Errors
/// Propagates codec and broker failures.
pub fn call_service<Req, Resp>(
    broker: &dyn Broker,
    service: &str,
    request: &Req,
) -> Result<Resp, TransportError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let response = broker.call(service, wire::encode(request)?)?;
    Ok(wire::decode(&response)?)
}
