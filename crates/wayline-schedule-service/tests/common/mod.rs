// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>
//! Shared helpers for node integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use serde::de::DeserializeOwned;
use wayline_schedule::{ParticipantDescription, Responsiveness};
use wayline_schedule_proto::{topics, RegisterParticipantRequest, RegisterParticipantResponse};
use wayline_schedule_service::{
    call_service, subscribe_msg, Broker, InProcBus, NodeConfig, ScheduleNode,
};
use wayline_traffic::{Profile, Route, Time, Trajectory, Waypoint};

/// Starts a node on a fresh bus with its registry log inside `dir`.
pub fn start_node(dir: &Path) -> (Arc<InProcBus>, ScheduleNode) {
    let bus = Arc::new(InProcBus::new());
    let config = NodeConfig {
        heartbeat_period_ms: 50,
        log_file_location: dir.join("registry.yaml"),
    };
    let node =
        ScheduleNode::start(Arc::clone(&bus) as Arc<dyn Broker>, &config).expect("node starts");
    (bus, node)
}

pub fn description(name: &str) -> ParticipantDescription {
    ParticipantDescription::new(
        name,
        "integration_fleet",
        Responsiveness::Responsive,
        Profile::circle_mm(500),
    )
}

/// Registers a participant through the service surface.
pub fn register(bus: &InProcBus, name: &str) -> RegisterParticipantResponse {
    let response: RegisterParticipantResponse = call_service(
        bus,
        topics::REGISTER_PARTICIPANT,
        &RegisterParticipantRequest {
            description: description(name),
        },
    )
    .expect("registration call");
    assert_eq!(response.error, None);
    response
}

/// A straight-line route between two points.
pub fn line(map: &str, t0: i64, t1: i64, from: [f64; 2], to: [f64; 2]) -> Route {
    Route::new(
        map,
        Trajectory::from_waypoints(vec![
            Waypoint::new(Time::from_secs(t0), from),
            Waypoint::new(Time::from_secs(t1), to),
        ])
        .expect("strictly ordered waypoints"),
    )
}

/// Subscribes a capture channel to `topic`.
pub fn capture<M>(bus: &InProcBus, topic: &str) -> Receiver<M>
where
    M: DeserializeOwned + Send + 'static,
{
    let (tx, rx) = unbounded();
    subscribe_msg(bus, topic, move |msg: M| {
        let _ = tx.send(msg);
    })
    .expect("capture subscription");
    rx
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
