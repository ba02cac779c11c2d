//! Bounded, recency-ordered cache of provider sets.
//!
//! Eviction only drops the in-memory copy. The durable store is untouched,
//! so an evicted content id is rebuilt from storage on its next query.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use provstore_types::{ContentId, Timestamp};

use crate::record::ProviderSet;

pub struct ProviderCache {
    entries: LruCache<ContentId, ProviderSet>,
}

impl ProviderCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Look up a set and mark it most recently used.
    pub fn get(&mut self, content_id: &ContentId) -> Option<&ProviderSet> {
        self.entries.get(content_id)
    }

    /// Mutable lookup; also marks the entry most recently used.
    pub fn get_mut(&mut self, content_id: &ContentId) -> Option<&mut ProviderSet> {
        self.entries.get_mut(content_id)
    }

    /// Insert a set as most recently used, returning the content id evicted to make room.
    pub fn put(&mut self, set: ProviderSet) -> Option<ContentId> {
        let content_id = set.content_id().clone();
        let replacing = self.contains(&content_id);
        match self.entries.push(content_id, set) {
            Some((evicted, _)) if !replacing => Some(evicted),
            _ => None,
        }
    }

    pub fn remove(&mut self, content_id: &ContentId) -> Option<ProviderSet> {
        self.entries.pop(content_id)
    }

    pub fn contains(&self, content_id: &ContentId) -> bool {
        self.entries.contains(content_id)
    }

    /// Prune expired peers of one cached set without touching its recency.
    ///
    /// The entry is dropped from the cache once its set is empty. Returns the
    /// number of peers removed.
    pub fn remove_expired_peers(
        &mut self,
        content_id: &ContentId,
        now: Timestamp,
        validity: Duration,
    ) -> usize {
        let Some(set) = self.entries.peek_mut(content_id) else {
            return 0;
        };
        let removed = set.remove_expired(now, validity);
        if set.is_empty() {
            self.remove(content_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
