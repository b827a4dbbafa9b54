//! Folding message events into per-channel, per-user counts.
//!
//! A flush turns a batch of raw [`Event`]s into [`AggregatedCounts`], resolves
//! the external user ids to members, and ends up with one delta per
//! `(member, channel)` counter row. Counts commute, so event order inside a
//! batch is irrelevant.

use std::collections::{BTreeSet, HashMap};

use crate::models::{ChannelId, CounterKey, Event, ExternalUserId, MemberId};

/// `channel → (external user → occurrences)` for one flush cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedCounts {
    channels: HashMap<ChannelId, HashMap<ExternalUserId, u64>>,
}

/// Counter deltas after mapping external users to members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCounts {
    /// Delta to add to each counter row.
    pub deltas: HashMap<CounterKey, u64>,
    /// External ids with no member mapping, ascending.
    pub unknown_users: Vec<ExternalUserId>,
    /// Events whose contribution was dropped because the user is unknown.
    pub unknown_events: u64,
}

impl AggregatedCounts {
    /// Aggregate a batch of events.
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut counts = Self::default();
        for event in events {
            counts.add(event);
        }
        counts
    }

    pub fn add(&mut self, event: &Event) {
        *self
            .channels
            .entry(event.channel_id)
            .or_default()
            .entry(event.external_user_id)
            .or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Total number of events folded in.
    pub fn total_events(&self) -> u64 {
        self.channels.values().flat_map(|users| users.values()).sum()
    }

    /// Occurrences of `user` in `channel`.
    pub fn get(&self, channel: ChannelId, user: ExternalUserId) -> u64 {
        self.channels
            .get(&channel)
            .and_then(|users| users.get(&user))
            .copied()
            .unwrap_or(0)
    }

    /// Distinct external user ids in the batch, ascending.
    pub fn external_ids(&self) -> Vec<ExternalUserId> {
        self.channels
            .values()
            .flat_map(|users| users.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Map external users to members and sum per counter row.
    ///
    /// Several external ids resolving to the same member contribute to a
    /// single delta. Unknown ids are reported, not errors.
    pub fn resolve(&self, mapping: &HashMap<ExternalUserId, MemberId>) -> ResolvedCounts {
        let mut resolved = ResolvedCounts::default();
        let mut unknown = BTreeSet::new();

        for (channel_id, users) in &self.channels {
            for (external_id, count) in users {
                match mapping.get(external_id) {
                    Some(member_id) => {
                        *resolved
                            .deltas
                            .entry(CounterKey::new(*member_id, *channel_id))
                            .or_insert(0) += count;
                    }
                    None => {
                        unknown.insert(*external_id);
                        resolved.unknown_events += count;
                    }
                }
            }
        }

        resolved.unknown_users = unknown.into_iter().collect();
        resolved
    }
}

impl ResolvedCounts {
    /// Counter rows touched, ascending.
    pub fn keys(&self) -> Vec<CounterKey> {
        let mut keys: Vec<CounterKey> = self.deltas.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Sum of all deltas.
    pub fn total(&self) -> u64 {
        self.deltas.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch() {
        let events: [Event; 0] = [];
        let counts = AggregatedCounts::from_events(&events);
        assert!(counts.is_empty());
        assert_eq!(counts.total_events(), 0);
        assert!(counts.external_ids().is_empty());
    }

    #[test]
    fn test_aggregates_per_channel_per_user() {
        let events = [
            Event::new(10, 100),
            Event::new(10, 100),
            Event::new(10, 200),
            Event::new(11, 100),
            Event::new(10, 100),
        ];
        let counts = AggregatedCounts::from_events(&events);

        assert_eq!(counts.get(ChannelId(100), ExternalUserId(10)), 3);
        assert_eq!(counts.get(ChannelId(200), ExternalUserId(10)), 1);
        assert_eq!(counts.get(ChannelId(100), ExternalUserId(11)), 1);
        assert_eq!(counts.get(ChannelId(200), ExternalUserId(11)), 0);
        assert_eq!(counts.channel_count(), 2);
        assert_eq!(counts.total_events(), 5);
        assert_eq!(
            counts.external_ids(),
            vec![ExternalUserId(10), ExternalUserId(11)]
        );
    }

    #[test]
    fn test_resolve_drops_unknown_users() {
        let events = [Event::new(10, 1), Event::new(99, 1), Event::new(99, 2)];
        let counts = AggregatedCounts::from_events(&events);
        let mapping = HashMap::from([(ExternalUserId(10), MemberId(7))]);

        let resolved = counts.resolve(&mapping);
        assert_eq!(resolved.unknown_users, vec![ExternalUserId(99)]);
        assert_eq!(resolved.unknown_events, 2);
        assert_eq!(resolved.total(), 1);
        assert_eq!(
            resolved.deltas.get(&CounterKey::new(MemberId(7), ChannelId(1))),
            Some(&1)
        );
    }

    #[test]
    fn test_resolve_merges_ids_mapping_to_same_member() {
        let events = [Event::new(1, 5), Event::new(2, 5), Event::new(2, 5)];
        let counts = AggregatedCounts::from_events(&events);
        let mapping = HashMap::from([
            (ExternalUserId(1), MemberId(3)),
            (ExternalUserId(2), MemberId(3)),
        ]);

        let resolved = counts.resolve(&mapping);
        assert_eq!(resolved.deltas.len(), 1);
        assert_eq!(
            resolved.deltas.get(&CounterKey::new(MemberId(3), ChannelId(5))),
            Some(&3)
        );
        assert!(resolved.unknown_users.is_empty());
    }

    #[test]
    fn test_resolved_keys_are_sorted() {
        let events = [Event::new(2, 9), Event::new(1, 3), Event::new(1, 9)];
        let counts = AggregatedCounts::from_events(&events);
        let mapping = HashMap::from([
            (ExternalUserId(1), MemberId(20)),
            (ExternalUserId(2), MemberId(10)),
        ]);

        let keys = counts.resolve(&mapping).keys();
        assert_eq!(
            keys,
            vec![
                CounterKey::new(MemberId(10), ChannelId(9)),
                CounterKey::new(MemberId(20), ChannelId(3)),
                CounterKey::new(MemberId(20), ChannelId(9)),
            ]
        );
    }
}
