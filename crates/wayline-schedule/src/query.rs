// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Change-set queries.
//!
//! A query scopes which part of the schedule a subscriber cares about:
//! a set of maps, a time window, and a set of participants. Queries
//! compare structurally, which is what the query registry uses to
//! deduplicate subscriptions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use wayline_traffic::{Route, Time};

use crate::ident::ParticipantId;

/// Which maps a query spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapFilter {
    /// Every map.
    All,
    /// Only routes on the named maps.
    Include(BTreeSet<String>),
}

/// Which participants a query spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantFilter {
    /// Every participant.
    All,
    /// Only the listed participants.
    Include(BTreeSet<ParticipantId>),
}

/// An optional time window; `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    /// Earliest instant of interest, if bounded below.
    pub lower: Option<Time>,
    /// Latest instant of interest, if bounded above.
    pub upper: Option<Time>,
}

impl TimeRange {
    /// True when `[start, finish]` overlaps this window.
    #[must_use]
    pub fn overlaps(&self, start: Time, finish: Time) -> bool {
        if let Some(lower) = self.lower {
            if finish < lower {
                return false;
            }
        }
        if let Some(upper) = self.upper {
            if start > upper {
                return false;
            }
        }
        true
    }
}

/// A subscriber's scope over the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Map scope.
    pub maps: MapFilter,
    /// Time window scope.
    pub time_range: TimeRange,
    /// Participant scope.
    pub participants: ParticipantFilter,
}

impl Query {
    /// The unfiltered query: all maps, all time, all participants.
    #[must_use]
    pub fn all() -> Self {
        Self {
            maps: MapFilter::All,
            time_range: TimeRange::default(),
            participants: ParticipantFilter::All,
        }
    }

    /// Restricts the query to the given maps.
    #[must_use]
    pub fn for_maps<I, S>(maps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            maps: MapFilter::Include(maps.into_iter().map(Into::into).collect()),
            time_range: TimeRange::default(),
            participants: ParticipantFilter::All,
        }
    }

    /// True when the query includes `participant`.
    #[must_use]
    pub fn includes_participant(&self, participant: ParticipantId) -> bool {
        match &self.participants {
            ParticipantFilter::All => true,
            ParticipantFilter::Include(set) => set.contains(&participant),
        }
    }

    /// True when the query includes `route` (map and time window).
    #[must_use]
    pub fn includes_route(&self, route: &Route) -> bool {
        let map_ok = match &self.maps {
            MapFilter::All => true,
            MapFilter::Include(maps) => maps.contains(&route.map),
        };
        map_ok
            && self.time_range.overlaps(
                route.trajectory.start_time(),
                route.trajectory.finish_time(),
            )
    }
}
