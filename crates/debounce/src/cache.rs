//! Suppression cache
//!
//! Ordered map from key to the instant its last call was decided. Entries are
//! kept in decision order (re-deciding a key moves it to the back), so the
//! front of the map is always the oldest decision and eviction is a pop from
//! the front.

use ahash::RandomState;
use indexmap::IndexMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Last decision instant per key, oldest first
#[derive(Debug)]
pub struct SuppressionCache<K> {
    entries: IndexMap<K, Instant, RandomState>,
}

impl<K> SuppressionCache<K>
where
    K: Hash + Eq,
{
    pub fn new() -> Self {
        Self {
            entries: IndexMap::with_hasher(RandomState::new()),
        }
    }

    /// Drop every entry decided at or before `submitted_at - window`
    ///
    /// Walks from the oldest entry and stops at the first one still inside
    /// the window. Returns the number of evicted entries.
    pub fn evict_expired(&mut self, submitted_at: Instant, window: Duration) -> usize {
        let cutoff = match submitted_at.checked_sub(window) {
            Some(cutoff) => cutoff,
            None => return 0,
        };

        let mut evicted = 0;
        while let Some((_, &decided_at)) = self.entries.first() {
            if decided_at > cutoff {
                break;
            }
            self.entries.shift_remove_index(0);
            evicted += 1;
        }
        evicted
    }

    /// True if `key` was decided at or after `submitted_at`
    pub fn is_stale(&self, key: &K, submitted_at: Instant) -> bool {
        self.entries
            .get(key)
            .map_or(false, |&decided_at| decided_at >= submitted_at)
    }

    /// Record a decision for `key`, moving it to the most recent position
    pub fn commit(&mut self, key: K, decided_at: Instant) {
        self.entries.shift_remove(&key);
        self.entries.insert(key, decided_at);
    }

    /// Decision instant for `key`, if cached
    pub fn decided_at(&self, key: &K) -> Option<Instant> {
        self.entries.get(key).copied()
    }

    /// Oldest cached decision
    pub fn oldest(&self) -> Option<(&K, Instant)> {
        self.entries.first().map(|(k, &t)| (k, t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in decision order, oldest first
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }
}

impl<K> Default for SuppressionCache<K>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}
