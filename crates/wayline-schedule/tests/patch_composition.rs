// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>
//! Patch composition law: replaying `(0, v]` then `(v, latest]` must leave
//! a mirror identical to replaying `(0, latest]` in one step, for any
//! mutation sequence and any split point.

#![allow(missing_docs)]
use proptest::prelude::*;
use wayline_schedule::{
    Database, ItineraryVersion, Mirror, ParticipantDescription, ParticipantId, Query,
    Responsiveness, RouteId, ScheduleVersion,
};
use wayline_traffic::{Duration, Profile, Route, Time, Trajectory, Waypoint};

const SLOTS: usize = 3;

#[derive(Debug, Clone)]
enum Op {
    Set(usize, Vec<RouteSpec>),
    Extend(usize, Vec<RouteSpec>),
    Delay(usize, i64),
    Erase(usize, Vec<u64>),
    Clear(usize),
    Unregister(usize),
    Reregister(usize),
    Cull(i64),
}

#[derive(Debug, Clone)]
struct RouteSpec {
    map: u8,
    start_secs: i64,
    len_secs: i64,
}

impl RouteSpec {
    fn build(&self) -> Route {
        let t0 = Time::from_secs(self.start_secs);
        let t1 = Time::from_secs(self.start_secs + self.len_secs);
        Route::new(
            format!("L{}", self.map % 2),
            Trajectory::from_waypoints(vec![
                Waypoint::new(t0, [0.0, 0.0]),
                Waypoint::new(t1, [1.0, 1.0]),
            ])
            .expect("strictly ordered waypoints"),
        )
    }
}

fn route_spec() -> impl Strategy<Value = RouteSpec> {
    (0u8..2, 0i64..50, 1i64..20).prop_map(|(map, start_secs, len_secs)| RouteSpec {
        map,
        start_secs,
        len_secs,
    })
}

fn op() -> impl Strategy<Value = Op> {
    let slot = 0usize..SLOTS;
    prop_oneof![
        (slot.clone(), prop::collection::vec(route_spec(), 0..3)).prop_map(|(s, r)| Op::Set(s, r)),
        (slot.clone(), prop::collection::vec(route_spec(), 1..3))
            .prop_map(|(s, r)| Op::Extend(s, r)),
        (slot.clone(), 1i64..10).prop_map(|(s, d)| Op::Delay(s, d)),
        (slot.clone(), prop::collection::vec(1u64..8, 1..3)).prop_map(|(s, r)| Op::Erase(s, r)),
        slot.clone().prop_map(Op::Clear),
        slot.clone().prop_map(Op::Unregister),
        slot.prop_map(Op::Reregister),
        (10i64..60).prop_map(Op::Cull),
    ]
}

fn description(slot: usize, generation: u64) -> ParticipantDescription {
    ParticipantDescription::new(
        format!("robot-{slot}-{generation}"),
        "proptest_fleet",
        Responsiveness::Responsive,
        Profile::circle_mm(400),
    )
}

/// Drives a database through `ops`, keeping client versions in order.
struct Driver {
    db: Database,
    slots: Vec<Option<(ParticipantId, u64)>>,
    generations: Vec<u64>,
}

impl Driver {
    fn new() -> Self {
        let mut db = Database::new();
        let slots = (0..SLOTS)
            .map(|slot| {
                let reg = db.register(description(slot, 0));
                Some((reg.id, 0u64))
            })
            .collect();
        Self {
            db,
            slots,
            generations: vec![0; SLOTS],
        }
    }

    fn apply(&mut self, op: &Op) {
        match op {
            Op::Set(slot, specs) => {
                if let Some((id, version)) = self.bump(*slot) {
                    let routes = specs.iter().map(RouteSpec::build).collect();
                    self.db.set(id, routes, version).expect("registered");
                }
            }
            Op::Extend(slot, specs) => {
                if let Some((id, version)) = self.bump(*slot) {
                    let routes = specs.iter().map(RouteSpec::build).collect();
                    self.db.extend(id, routes, version).expect("registered");
                }
            }
            Op::Delay(slot, secs) => {
                if let Some((id, version)) = self.bump(*slot) {
                    self.db
                        .delay(id, Duration::from_secs(*secs), version)
                        .expect("registered");
                }
            }
            Op::Erase(slot, raw_ids) => {
                if let Some((id, version)) = self.bump(*slot) {
                    let routes = raw_ids.iter().map(|r| RouteId(*r)).collect();
                    self.db.erase(id, routes, version).expect("registered");
                }
            }
            Op::Clear(slot) => {
                if let Some((id, version)) = self.bump(*slot) {
                    self.db.clear(id, version).expect("registered");
                }
            }
            Op::Unregister(slot) => {
                if let Some((id, _)) = self.slots[*slot].take() {
                    self.db.unregister(id).expect("registered");
                }
            }
            Op::Reregister(slot) => {
                if self.slots[*slot].is_none() {
                    self.generations[*slot] += 1;
                    let reg = self
                        .db
                        .register(description(*slot, self.generations[*slot]));
                    self.slots[*slot] = Some((reg.id, 0));
                }
            }
            Op::Cull(secs) => {
                self.db.cull(Time::from_secs(*secs));
            }
        }
    }

    fn bump(&mut self, slot: usize) -> Option<(ParticipantId, ItineraryVersion)> {
        let (id, version) = self.slots[slot].as_mut()?;
        *version += 1;
        Some((*id, ItineraryVersion(*version)))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn split_patches_compose_to_the_single_patch(
        ops in prop::collection::vec(op(), 1..24),
        split_at in 0usize..24,
    ) {
        let split_at = split_at.min(ops.len());
        let mut driver = Driver::new();

        for op in &ops[..split_at] {
            driver.apply(op);
        }
        let first = driver.db.changes(&Query::all(), Some(ScheduleVersion(0)));
        let mid = driver.db.latest_version();

        for op in &ops[split_at..] {
            driver.apply(op);
        }
        let second = driver.db.changes(&Query::all(), Some(mid));
        let whole = driver.db.changes(&Query::all(), Some(ScheduleVersion(0)));

        let mut stepped = Mirror::new();
        stepped.apply(&first).expect("first window applies");
        stepped.apply(&second).expect("second window applies");

        let mut once = Mirror::new();
        once.apply(&whole).expect("whole window applies");

        prop_assert_eq!(&stepped, &once);

        // A snapshot lands on the same state as well.
        let mut snapshot = Mirror::new();
        snapshot
            .apply(&driver.db.changes(&Query::all(), None))
            .expect("snapshots always apply");
        prop_assert_eq!(&snapshot, &once);
    }
}
