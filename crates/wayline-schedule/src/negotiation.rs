// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Per-conflict negotiation trees.
//!
//! A negotiation is a tree of proposal tables. The root has one branch per
//! participant; a table at path `[a, b, c]` belongs to `c` and holds `c`'s
//! proposed itinerary accommodating the proposals of `a` then `b`. Tables
//! are owned by value and keyed by their path; every cross-reference is a
//! path, never a pointer.
//!
//! Submitting at a path spawns the child tables that accommodate the new
//! proposal and wipes any descendants of an older proposal. The tree is
//! *ready* once some full-depth path has a proposal at every step, and
//! dead once every top-level branch has forfeited.

use std::collections::{BTreeMap, BTreeSet};

use wayline_traffic::Route;

use crate::ident::ParticipantId;

/// Errors from table operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    /// No table exists at the given path; the caller may cache the message
    /// and retry after the tree grows.
    #[error("no table at path {0:?}")]
    TableNotFound(Vec<ParticipantId>),
    /// The message refers to an older proposal (or a forfeited branch) and
    /// must be dropped.
    #[error("message deprecated by a newer proposal")]
    Deprecated,
}

/// A proposed itinerary for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    /// The proposed routes for the table's owner.
    pub itinerary: Vec<Route>,
    /// Client-side proposal version; a higher version invalidates the
    /// descendants of an older one.
    pub version: u64,
}

/// The record of a proposal being turned down.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// The participant that could not accommodate the proposal.
    pub rejected_by: ParticipantId,
    /// Rollouts the rejecting participant could live with, kept for the
    /// table owner's next attempt.
    pub alternatives: Vec<Route>,
}

/// A node in the negotiation tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    proposal: Option<Proposal>,
    forfeited: bool,
    rejection: Option<Rejection>,
}

impl Table {
    /// Current proposal, if any.
    #[must_use]
    pub fn proposal(&self) -> Option<&Proposal> {
        self.proposal.as_ref()
    }

    /// True when this branch has given up.
    #[must_use]
    pub fn forfeited(&self) -> bool {
        self.forfeited
    }

    /// The last rejection of this table's proposal, if any.
    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        self.rejection.as_ref()
    }
}

/// A negotiation tree over a fixed set of participants.
#[derive(Debug, Clone, PartialEq)]
pub struct Negotiation {
    participants: BTreeSet<ParticipantId>,
    tables: BTreeMap<Vec<ParticipantId>, Table>,
}

impl Negotiation {
    /// Opens a negotiation among `participants`, with one empty root table
    /// per participant.
    #[must_use]
    pub fn new(participants: BTreeSet<ParticipantId>) -> Self {
        let tables = participants
            .iter()
            .map(|p| (vec![*p], Table::default()))
            .collect();
        Self {
            participants,
            tables,
        }
    }

    /// The negotiating participants.
    #[must_use]
    pub fn participants(&self) -> &BTreeSet<ParticipantId> {
        &self.participants
    }

    /// The table at `path`, if it exists.
    #[must_use]
    pub fn table(&self, path: &[ParticipantId]) -> Option<&Table> {
        self.tables.get(path)
    }

    /// Submits a proposal at `path`.
    ///
    /// Spawns child tables accommodating the proposal and wipes the
    /// descendants of any older proposal at the same path.
    ///
    /// # Errors
    /// [`NegotiationError::TableNotFound`] when the path has no table yet;
    /// [`NegotiationError::Deprecated`] when the branch forfeited or a
    /// proposal with an equal or newer version is already in place.
    pub fn submit(
        &mut self,
        path: &[ParticipantId],
        itinerary: Vec<Route>,
        version: u64,
    ) -> Result<(), NegotiationError> {
        let table = self
            .tables
            .get_mut(path)
            .ok_or_else(|| NegotiationError::TableNotFound(path.to_vec()))?;
        if table.forfeited {
            return Err(NegotiationError::Deprecated);
        }
        if let Some(existing) = &table.proposal {
            if version <= existing.version {
                return Err(NegotiationError::Deprecated);
            }
        }
        table.proposal = Some(Proposal { itinerary, version });
        self.wipe_descendants(path);
        self.spawn_children(path);
        Ok(())
    }

    /// Rejects the proposal at `path`, clearing it and recording who
    /// rejected it and what they could live with instead.
    ///
    /// # Errors
    /// [`NegotiationError::TableNotFound`] when the path has no table;
    /// [`NegotiationError::Deprecated`] when there is no live proposal at
    /// `version` to reject.
    pub fn reject(
        &mut self,
        path: &[ParticipantId],
        version: u64,
        rejected_by: ParticipantId,
        alternatives: Vec<Route>,
    ) -> Result<(), NegotiationError> {
        let table = self
            .tables
            .get_mut(path)
            .ok_or_else(|| NegotiationError::TableNotFound(path.to_vec()))?;
        match &table.proposal {
            Some(existing) if existing.version == version => {
                table.proposal = None;
                table.rejection = Some(Rejection {
                    rejected_by,
                    alternatives,
                });
            }
            _ => return Err(NegotiationError::Deprecated),
        }
        self.wipe_descendants(path);
        Ok(())
    }

    /// Forfeits the branch at `path`: the table and its descendants stop
    /// taking part in the negotiation. A forfeit must be newer than the
    /// table's live proposal, so a forfeit reordered behind a
    /// resubmission cannot silently kill the fresh proposal.
    ///
    /// # Errors
    /// [`NegotiationError::TableNotFound`] when the path has no table;
    /// [`NegotiationError::Deprecated`] when the branch already forfeited
    /// or a proposal with an equal or newer version is in place.
    pub fn forfeit(&mut self, path: &[ParticipantId], version: u64) -> Result<(), NegotiationError> {
        let table = self
            .tables
            .get_mut(path)
            .ok_or_else(|| NegotiationError::TableNotFound(path.to_vec()))?;
        if table.forfeited {
            return Err(NegotiationError::Deprecated);
        }
        if let Some(existing) = &table.proposal {
            if version <= existing.version {
                return Err(NegotiationError::Deprecated);
            }
        }
        table.forfeited = true;
        table.proposal = None;
        self.wipe_descendants(path);
        Ok(())
    }

    /// True when some full-depth path has a proposal at every step.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.tables
            .keys()
            .any(|path| path.len() == self.participants.len() && self.path_proposed(path))
    }

    /// True when every top-level branch has forfeited, so no proposal can
    /// ever complete.
    #[must_use]
    pub fn all_forfeited(&self) -> bool {
        self.participants
            .iter()
            .all(|p| self.tables.get(&[*p][..]).is_some_and(Table::forfeited))
    }

    fn path_proposed(&self, path: &[ParticipantId]) -> bool {
        (1..=path.len()).all(|depth| {
            self.tables
                .get(&path[..depth])
                .is_some_and(|table| table.proposal.is_some() && !table.forfeited)
        })
    }

    fn wipe_descendants(&mut self, path: &[ParticipantId]) {
        self.tables
            .retain(|key, _| !(key.len() > path.len() && key.starts_with(path)));
    }

    fn spawn_children(&mut self, path: &[ParticipantId]) {
        for participant in &self.participants {
            if path.contains(participant) {
                continue;
            }
            let mut child = path.to_vec();
            child.push(*participant);
            self.tables.entry(child).or_default();
        }
    }
}

/// Selects, among all ready full-depth paths, the one minimizing the sum
/// of per-participant finish times; ties break toward the path that is
/// first in participant-id order.
#[derive(Debug, Clone, Copy)]
pub struct QuickestFinishEvaluator;

impl QuickestFinishEvaluator {
    /// The winning path, or `None` when the negotiation is not ready.
    #[must_use]
    pub fn choose(negotiation: &Negotiation) -> Option<Vec<ParticipantId>> {
        let depth = negotiation.participants().len();
        let mut best: Option<(i64, &Vec<ParticipantId>)> = None;
        for path in negotiation.tables.keys() {
            if path.len() != depth || !negotiation.path_proposed(path) {
                continue;
            }
            let cost = Self::path_cost(negotiation, path);
            let better = match best {
                None => true,
                Some((best_cost, best_path)) => {
                    cost < best_cost || (cost == best_cost && path < best_path)
                }
            };
            if better {
                best = Some((cost, path));
            }
        }
        best.map(|(_, path)| path.clone())
    }

    /// Sum of finish times (nanoseconds) across every proposal on `path`.
    fn path_cost(negotiation: &Negotiation, path: &[ParticipantId]) -> i64 {
        (1..=path.len())
            .filter_map(|depth| negotiation.tables.get(&path[..depth]))
            .filter_map(Table::proposal)
            .map(|proposal| {
                proposal
                    .itinerary
                    .iter()
                    .map(|route| route.trajectory.finish_time().nanos())
                    .max()
                    .unwrap_or(0)
            })
            .sum()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use wayline_traffic::{Time, Trajectory, Waypoint};

    fn p(n: u64) -> ParticipantId {
        ParticipantId(n)
    }

    fn pair(a: u64, b: u64) -> BTreeSet<ParticipantId> {
        [p(a), p(b)].into_iter().collect()
    }

    fn plan(finish_secs: i64) -> Vec<Route> {
        vec![Route::new(
            "L1",
            Trajectory::from_waypoints(vec![
                Waypoint::new(Time::from_secs(0), [0.0, 0.0]),
                Waypoint::new(Time::from_secs(finish_secs), [1.0, 0.0]),
            ])
            .expect("valid trajectory"),
        )]
    }

    #[test]
    fn submit_spawns_children_and_readiness_follows() {
        let mut neg = Negotiation::new(pair(1, 2));
        assert!(!neg.ready());

        neg.submit(&[p(1)], plan(10), 1).expect("root table exists");
        assert!(neg.table(&[p(1), p(2)]).is_some());
        assert!(!neg.ready());

        neg.submit(&[p(1), p(2)], plan(8), 1).expect("child exists");
        assert!(neg.ready());
    }

    #[test]
    fn quickest_finish_wins() {
        let mut neg = Negotiation::new(pair(1, 2));
        // Branch [1] -> [1, 2]: 10s + 8s = 18s total.
        neg.submit(&[p(1)], plan(10), 1).expect("root");
        neg.submit(&[p(1), p(2)], plan(8), 1).expect("child");
        // Branch [2] -> [2, 1]: 5s + 6s = 11s total.
        neg.submit(&[p(2)], plan(5), 1).expect("root");
        neg.submit(&[p(2), p(1)], plan(6), 1).expect("child");

        assert_eq!(
            QuickestFinishEvaluator::choose(&neg),
            Some(vec![p(2), p(1)])
        );
    }

    #[test]
    fn tie_breaks_by_participant_order() {
        let mut neg = Negotiation::new(pair(1, 2));
        neg.submit(&[p(1)], plan(7), 1).expect("root");
        neg.submit(&[p(1), p(2)], plan(7), 1).expect("child");
        neg.submit(&[p(2)], plan(7), 1).expect("root");
        neg.submit(&[p(2), p(1)], plan(7), 1).expect("child");

        assert_eq!(
            QuickestFinishEvaluator::choose(&neg),
            Some(vec![p(1), p(2)])
        );
    }

    #[test]
    fn resubmission_deprecates_descendants() {
        let mut neg = Negotiation::new(pair(1, 2));
        neg.submit(&[p(1)], plan(10), 1).expect("root");
        neg.submit(&[p(1), p(2)], plan(8), 1).expect("child");
        assert!(neg.ready());

        // Same version is deprecated; a newer one wipes the child.
        assert_eq!(
            neg.submit(&[p(1)], plan(9), 1),
            Err(NegotiationError::Deprecated)
        );
        neg.submit(&[p(1)], plan(9), 2).expect("newer version");
        assert!(!neg.ready());
        assert_eq!(
            neg.table(&[p(1), p(2)]).expect("respawned").proposal(),
            None
        );
    }

    #[test]
    fn rejection_clears_the_proposal_and_records_the_rejecter() {
        let mut neg = Negotiation::new(pair(1, 2));
        neg.submit(&[p(1)], plan(10), 1).expect("root");
        neg.reject(&[p(1)], 1, p(2), plan(4)).expect("live proposal");

        let table = neg.table(&[p(1)]).expect("root table");
        assert_eq!(table.proposal(), None);
        let rejection = table.rejection().expect("recorded rejection");
        assert_eq!(rejection.rejected_by, p(2));
        assert_eq!(rejection.alternatives.len(), 1);

        // Rejecting again is stale.
        assert_eq!(
            neg.reject(&[p(1)], 1, p(2), Vec::new()),
            Err(NegotiationError::Deprecated)
        );
    }

    #[test]
    fn all_roots_forfeited_means_dead() {
        let mut neg = Negotiation::new(pair(1, 2));
        neg.forfeit(&[p(1)], 1).expect("root");
        assert!(!neg.all_forfeited());
        neg.forfeit(&[p(2)], 1).expect("root");
        assert!(neg.all_forfeited());
    }

    #[test]
    fn stale_forfeits_cannot_kill_a_newer_proposal() {
        let mut neg = Negotiation::new(pair(1, 2));
        neg.submit(&[p(1)], plan(10), 2).expect("root");

        // A forfeit reordered behind the resubmission is dropped, and so
        // is a duplicate of an accepted forfeit.
        assert_eq!(
            neg.forfeit(&[p(1)], 2),
            Err(NegotiationError::Deprecated)
        );
        assert!(!neg.table(&[p(1)]).expect("root table").forfeited());

        neg.forfeit(&[p(1)], 3).expect("newer than the proposal");
        assert_eq!(
            neg.forfeit(&[p(1)], 4),
            Err(NegotiationError::Deprecated)
        );
    }

    #[test]
    fn unknown_table_reports_not_found() {
        let mut neg = Negotiation::new(pair(1, 2));
        assert_eq!(
            neg.submit(&[p(1), p(2)], plan(8), 1),
            Err(NegotiationError::TableNotFound(vec![p(1), p(2)]))
        );
    }
}
