// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Inconsistency ranges for out-of-order itinerary mutations.
//!
//! When a participant's mutation arrives with a version beyond the next
//! expected one, the missing versions form gaps. The ranges reported here
//! are derived from the buffer contents on every change, so they are
//! disjoint and contiguous runs are merged by construction.

use serde::{Deserialize, Serialize};

use crate::ident::ItineraryVersion;

/// An inclusive range of itinerary versions the database has not seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    /// First missing version.
    pub lower: ItineraryVersion,
    /// Last missing version.
    pub upper: ItineraryVersion,
}

/// Computes the missing-version ranges for one participant.
///
/// `last_applied` is the newest version the database has applied;
/// `buffered` must be the sorted list of versions currently held in the
/// participant's reorder buffer. The result is the maximal runs of
/// versions in `(last_applied, max(buffered))` that are in neither set.
#[must_use]
pub fn missing_ranges(
    last_applied: ItineraryVersion,
    buffered: &[ItineraryVersion],
) -> Vec<VersionRange> {
    let mut ranges = Vec::new();
    let mut expected = last_applied.next();
    for &held in buffered {
        if held > expected {
            ranges.push(VersionRange {
                lower: expected,
                upper: ItineraryVersion(held.0 - 1),
            });
        }
        expected = held.next();
    }
    ranges
}
