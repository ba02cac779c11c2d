//! Provider records and per-content provider sets.

use std::collections::HashMap;
use std::time::Duration;

use provstore_types::{ContentId, PeerId, Timestamp};

/// A claim that `peer_id` provides `content_id`, as of `last_seen`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderRecord {
    pub content_id: ContentId,
    pub peer_id: PeerId,
    pub last_seen: Timestamp,
}

/// All known providers of one content identifier, one entry per peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSet {
    content_id: ContentId,
    entries: HashMap<PeerId, Timestamp>,
}

impl ProviderSet {
    pub fn new(content_id: ContentId) -> Self {
        Self {
            content_id,
            entries: HashMap::new(),
        }
    }

    pub fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    /// Record `peer` as seen at `last_seen`.
    ///
    /// An older timestamp never replaces a newer one. Returns the timestamp
    /// retained for the peer.
    pub fn insert(&mut self, peer: PeerId, last_seen: Timestamp) -> Timestamp {
        let slot = self.entries.entry(peer).or_insert(last_seen);
        if last_seen > *slot {
            *slot = last_seen;
        }
        *slot
    }

    pub fn get(&self, peer: &PeerId) -> Option<Timestamp> {
        self.entries.get(peer).copied()
    }

    /// Peers whose claims are still within `validity` at `now`.
    pub fn valid_peers(&self, now: Timestamp, validity: Duration) -> Vec<PeerId> {
        self.entries
            .iter()
            .filter(|(_, seen)| !seen.is_expired(validity, now))
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn remove_expired(&mut self, now: Timestamp, validity: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, seen| !seen.is_expired(validity, now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
