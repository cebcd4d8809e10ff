// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! The query registry: deduplicated queries, subscriber counts, and the
//! per-topic version cursors that drive mirror updates.

use std::collections::BTreeMap;

use wayline_schedule::{Query, QueryId, ScheduleVersion};
use wayline_schedule_proto::QueryInfo;

/// Per-query publication state.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueryTopic {
    /// Version the topic's subscribers were last advanced to. `None`
    /// forces a full snapshot on the next mirror update.
    pub last_sent_version: Option<ScheduleVersion>,
    /// How many subscribers share the query.
    pub subscriber_count: u64,
}

/// Deduplicated query registrations.
#[derive(Debug, Default)]
pub(crate) struct QueryRegistry {
    queries: BTreeMap<QueryId, Query>,
    topics: BTreeMap<QueryId, QueryTopic>,
    last_query_id: u64,
}

impl QueryRegistry {
    /// Registers `query`, reusing a structurally equal registration when
    /// one exists.
    pub(crate) fn register(&mut self, query: Query) -> QueryId {
        if let Some((id, _)) = self.queries.iter().find(|(_, q)| **q == query) {
            let id = *id;
            if let Some(topic) = self.topics.get_mut(&id) {
                topic.subscriber_count += 1;
            }
            return id;
        }

        let mut candidate = self.last_query_id.wrapping_add(1);
        while self.queries.contains_key(&QueryId(candidate)) {
            candidate = candidate.wrapping_add(1);
        }
        self.last_query_id = candidate;
        let id = QueryId(candidate);
        self.queries.insert(id, query);
        self.topics.insert(
            id,
            QueryTopic {
                last_sent_version: None,
                subscriber_count: 1,
            },
        );
        id
    }

    /// Drops one subscription. Returns `None` for an unknown id, and
    /// otherwise whether the query was removed entirely.
    pub(crate) fn unregister(&mut self, id: QueryId) -> Option<bool> {
        let topic = self.topics.get_mut(&id)?;
        topic.subscriber_count = topic.subscriber_count.saturating_sub(1);
        if topic.subscriber_count == 0 {
            self.topics.remove(&id);
            self.queries.remove(&id);
            return Some(true);
        }
        Some(false)
    }

    /// Rewinds (or pins) a topic's cursor so the next mirror update
    /// re-sends changes. Returns false for an unknown id.
    pub(crate) fn request_changes(
        &mut self,
        id: QueryId,
        full_update: bool,
        version: Option<ScheduleVersion>,
    ) -> bool {
        let Some(topic) = self.topics.get_mut(&id) else {
            return false;
        };
        topic.last_sent_version = if full_update { None } else { version };
        true
    }

    /// The registered queries and their topics, for mirror updates.
    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (QueryId, &Query, &mut QueryTopic)> {
        let queries = &self.queries;
        self.topics.iter_mut().filter_map(move |(id, topic)| {
            queries.get(id).map(|query| (*id, query, topic))
        })
    }

    /// Current `{id, query, subscriber_count}` triples, in id order.
    pub(crate) fn infos(&self) -> Vec<QueryInfo> {
        self.queries
            .iter()
            .map(|(id, query)| QueryInfo {
                id: *id,
                query: query.clone(),
                subscriber_count: self
                    .topics
                    .get(id)
                    .map_or(0, |topic| topic.subscriber_count),
            })
            .collect()
    }

    /// Subscriber count for `id`, if registered.
    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, id: QueryId) -> Option<u64> {
        self.topics.get(&id).map(|topic| topic.subscriber_count)
    }
}
