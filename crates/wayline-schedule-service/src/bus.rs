// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! In-process broker.
//!
//! Each subscription gets an unbounded channel and a dedicated dispatch
//! thread, so publishing never blocks on a slow subscriber and callbacks
//! genuinely arrive on threads the node does not control. Requests run
//! the responder synchronously on the caller's thread.
//!
//! QoS concerns from real deployments (transient-local info topics,
//! liveliness leases) are the production broker's job; this bus delivers
//! to live subscriptions only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use rustc_hash::FxHashMap;

use crate::transport::{Broker, ResponderFn, SubscriberFn, TransportError};

#[derive(Default)]
struct BusState {
    topics: FxHashMap<String, Vec<Sender<Vec<u8>>>>,
    services: FxHashMap<String, Arc<ResponderFn>>,
}

/// A channel-backed broker for tests and single-process deployments.
pub struct InProcBus {
    state: Mutex<BusState>,
    dispatchers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl Default for InProcBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcBus {
    /// Constructs an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            dispatchers: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Stops delivery: drops every subscription channel and joins the
    /// dispatch threads. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            state.topics.clear();
            state.services.clear();
        }
        let handles = match self.dispatchers.lock() {
            Ok(mut dispatchers) => std::mem::take(&mut *dispatchers),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for InProcBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Broker for InProcBus {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        let senders = {
            let state = self
                .state
                .lock()
                .map_err(|_| TransportError::Disconnected)?;
            state.topics.get(topic).cloned().unwrap_or_default()
        };
        for sender in senders {
            // A dropped receiver just means that subscriber is gone.
            let _ = sender.send(payload.clone());
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str, callback: Box<SubscriberFn>) -> Result<(), TransportError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        let (tx, rx) = unbounded::<Vec<u8>>();
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| TransportError::Disconnected)?;
            state.topics.entry(topic.to_owned()).or_default().push(tx);
        }
        let handle = std::thread::spawn(move || {
            while let Ok(payload) = rx.recv() {
                callback(&payload);
            }
        });
        self.dispatchers
            .lock()
            .map_err(|_| TransportError::Disconnected)?
            .push(handle);
        Ok(())
    }

    fn serve(&self, service: &str, responder: Box<ResponderFn>) -> Result<(), TransportError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.state
            .lock()
            .map_err(|_| TransportError::Disconnected)?
            .services
            .insert(service.to_owned(), Arc::from(responder));
        Ok(())
    }

    fn call(&self, service: &str, request: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let responder = {
            let state = self
                .state
                .lock()
                .map_err(|_| TransportError::Disconnected)?;
            state
                .services
                .get(service)
                .cloned()
                .ok_or_else(|| TransportError::UnknownService(service.to_owned()))?
        };
        responder(&request)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn publish_reaches_every_subscriber() {
        let bus = InProcBus::new();
        let (tx_a, rx_a) = unbounded();
        let (tx_b, rx_b) = unbounded();
        bus.subscribe(
            "t",
            Box::new(move |payload| {
                tx_a.send(payload.to_vec()).unwrap();
            }),
        )
        .expect("subscribe");
        bus.subscribe(
            "t",
            Box::new(move |payload| {
                tx_b.send(payload.to_vec()).unwrap();
            }),
        )
        .expect("subscribe");

        bus.publish("t", vec![1, 2, 3]).expect("publish");
        assert_eq!(
            rx_a.recv_timeout(Duration::from_secs(1)).expect("delivery"),
            vec![1, 2, 3]
        );
        assert_eq!(
            rx_b.recv_timeout(Duration::from_secs(1)).expect("delivery"),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn calls_reach_the_registered_responder() {
        let bus = InProcBus::new();
        bus.serve(
            "echo",
            Box::new(|request| {
                let mut response = request.to_vec();
                response.reverse();
                Ok(response)
            }),
        )
        .expect("serve");

        assert_eq!(bus.call("echo", vec![1, 2, 3]).expect("call"), vec![3, 2, 1]);
        assert!(matches!(
            bus.call("missing", Vec::new()),
            Err(TransportError::UnknownService(_))
        ));
    }

    #[test]
    fn shutdown_disconnects_publishers() {
        let bus = InProcBus::new();
        bus.shutdown();
        assert!(matches!(
            bus.publish("t", Vec::new()),
            Err(TransportError::Disconnected)
        ));
    }
}
