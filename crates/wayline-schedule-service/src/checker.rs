// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! The background conflict checker.
//!
//! One OS thread owns a private [`Mirror`]. Each pass: under the database
//! lock, refresh the participant table if registrations changed, take the
//! patch and the changed-route views since the last checked version, and
//! advance the cursor. The pairwise collision sweep then runs outside the
//! lock, against the freshly patched mirror: testing the changed routes
//! against the updated replica covers conflicts among routes landing in
//! the same batch, which a stale replica would miss.
//!
//! Collision failures are logged and skipped; the loop must outlive any
//! single bad trajectory.

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::PoisonError;
use std::time::Duration;

use tracing::{info, warn};
use wayline_schedule::{Mirror, ParticipantId, Query, RouteView, ScheduleVersion};
use wayline_schedule_proto::{topics, ConflictNotice};
use wayline_traffic::DetectConflict;

use crate::node::NodeShared;
use crate::transport::publish_msg;

/// How long the checker sleeps before re-polling the shutdown flag when
/// no new version arrives.
const CHECK_PERIOD: Duration = Duration::from_millis(100);

pub(crate) fn run(shared: &NodeShared) {
    let mut mirror = Mirror::new();
    let mut last_checked = ScheduleVersion(0);
    let mut last_participants = ScheduleVersion(0);
    let everything = Query::all();

    loop {
        let (participants, patch, views) = {
            let mut state = shared.lock_database();
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    info!("conflict checker stopping");
                    return;
                }
                if state.db.latest_version() > last_checked {
                    break;
                }
                let (next, _timed_out) = shared
                    .wakeup
                    .wait_timeout(state, CHECK_PERIOD)
                    .unwrap_or_else(PoisonError::into_inner);
                state = next;
            }

            let participants = (state.db.participants_version() > last_participants).then(|| {
                last_participants = state.db.participants_version();
                state
                    .db
                    .participants()
                    .into_iter()
                    .map(|(id, description)| (id, description.clone()))
                    .collect::<Vec<_>>()
            });
            let patch = state.db.changes(&everything, Some(last_checked));
            let views = state.db.query(&everything, last_checked);
            last_checked = state.db.latest_version();
            (participants, patch, views)
        };

        if let Some(participants) = participants {
            mirror.update_participants(participants);
        }
        if let Err(err) = mirror.apply(&patch) {
            warn!(%err, "conflict mirror fell behind, resynchronizing");
            let snapshot = shared.lock_database().db.changes(&everything, None);
            if let Err(err) = mirror.apply(&snapshot) {
                warn!(%err, "snapshot resynchronization failed");
                continue;
            }
        }

        for pair in find_conflicts(&mirror, &views) {
            let opened = shared.lock_negotiations().insert(pair);
            if let Some((conflict_version, participants)) = opened {
                info!(
                    version = conflict_version.0,
                    a = pair.0 .0,
                    b = pair.1 .0,
                    "conflict detected, opening negotiation"
                );
                let notice = ConflictNotice {
                    conflict_version,
                    participants,
                };
                if let Err(err) =
                    publish_msg(shared.broker.as_ref(), topics::NEGOTIATION_NOTICE, &notice)
                {
                    warn!(%err, "failed to publish conflict notice");
                }
            }
        }
    }
}

/// Tests every changed route against every other-participant route on the
/// same map. Pairs are unordered and deduplicated.
fn find_conflicts(
    mirror: &Mirror,
    views: &[RouteView],
) -> BTreeSet<(ParticipantId, ParticipantId)> {
    let mut conflicts = BTreeSet::new();
    for view in views {
        let Some(profile_a) = mirror.profile(view.participant) else {
            continue;
        };
        for (other, _, route) in mirror.routes() {
            if other == view.participant || route.map != view.route.map {
                continue;
            }
            let pair = unordered(view.participant, other);
            if conflicts.contains(&pair) {
                continue;
            }
            let Some(profile_b) = mirror.profile(other) else {
                continue;
            };
            match DetectConflict::between(
                profile_a,
                &view.route.trajectory,
                profile_b,
                &route.trajectory,
            ) {
                Ok(Some(_)) => {
                    conflicts.insert(pair);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        a = view.participant.0,
                        b = other.0,
                        %err,
                        "collision check failed, skipping pair"
                    );
                }
            }
        }
    }
    conflicts
}

fn unordered(a: ParticipantId, b: ParticipantId) -> (ParticipantId, ParticipantId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
