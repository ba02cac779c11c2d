//! Durable store adapter: provider records ⇄ key-value entries.
//!
//! Entries that fail to decode are logged and skipped so one corrupt record
//! never blocks the rest of a scan. Backend errors are propagated.

use std::sync::Arc;

use provstore_store::{Datastore, StoreError};
use provstore_types::{ContentId, DecodeError, PeerId, Timestamp};
use tracing::warn;

use crate::keys::{content_prefix, parse_provider_key, provider_key, NAMESPACE};
use crate::record::{ProviderRecord, ProviderSet};

/// Provider-record view over a shared [`Datastore`].
#[derive(Clone)]
pub struct ProviderStore {
    store: Arc<dyn Datastore>,
}

impl ProviderStore {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Write or overwrite the record for `(content_id, peer_id)`.
    pub fn put(
        &self,
        content_id: &ContentId,
        peer_id: &PeerId,
        last_seen: Timestamp,
    ) -> Result<(), StoreError> {
        self.store
            .put(&provider_key(content_id, peer_id), &last_seen.to_bytes())
    }

    /// Read one record's timestamp. A corrupt value reads as absent.
    pub fn get(
        &self,
        content_id: &ContentId,
        peer_id: &PeerId,
    ) -> Result<Option<Timestamp>, StoreError> {
        let key = provider_key(content_id, peer_id);
        let Some(value) = self.store.get(&key)? else {
            return Ok(None);
        };
        match Timestamp::from_bytes(&value) {
            Ok(ts) => Ok(Some(ts)),
            Err(e) => {
                warn!(cid = %content_id, peer = %peer_id, error = %e, "skipping undecodable provider record");
                Ok(None)
            }
        }
    }

    pub fn delete(&self, content_id: &ContentId, peer_id: &PeerId) -> Result<(), StoreError> {
        self.store.delete(&provider_key(content_id, peer_id))
    }

    /// Every decodable `(peer, last_seen)` persisted for `content_id`.
    pub fn scan_by_content_id(
        &self,
        content_id: &ContentId,
    ) -> Result<impl Iterator<Item = Result<(PeerId, Timestamp), StoreError>> + '_, StoreError>
    {
        let iter = self.store.query_prefix(&content_prefix(content_id))?;
        Ok(iter.filter_map(|entry| match entry {
            Ok((key, value)) => match decode_entry(&key, &value) {
                Ok(record) => Some(Ok((record.peer_id, record.last_seen))),
                Err(e) => {
                    warn!(key = %String::from_utf8_lossy(&key), error = %e, "skipping undecodable provider record");
                    None
                }
            },
            Err(e) => Some(Err(e)),
        }))
    }

    /// Every decodable record in the providers namespace.
    pub fn scan_all(
        &self,
    ) -> Result<impl Iterator<Item = Result<ProviderRecord, StoreError>> + '_, StoreError> {
        let iter = self.store.query_prefix(NAMESPACE)?;
        Ok(iter.filter_map(|entry| match entry {
            Ok((key, value)) => match decode_entry(&key, &value) {
                Ok(record) => Some(Ok(record)),
                Err(e) => {
                    warn!(key = %String::from_utf8_lossy(&key), error = %e, "skipping undecodable provider record");
                    None
                }
            },
            Err(e) => Some(Err(e)),
        }))
    }

    /// Rebuild the full provider set of `content_id` from storage.
    pub fn load_set(&self, content_id: &ContentId) -> Result<ProviderSet, StoreError> {
        let mut set = ProviderSet::new(content_id.clone());
        for entry in self.scan_by_content_id(content_id)? {
            let (peer, last_seen) = entry?;
            set.insert(peer, last_seen);
        }
        Ok(set)
    }
}

fn decode_entry(key: &[u8], value: &[u8]) -> Result<ProviderRecord, DecodeError> {
    let (content_id, peer_id) = parse_provider_key(key)?;
    let last_seen = Timestamp::from_bytes(value)?;
    Ok(ProviderRecord {
        content_id,
        peer_id,
        last_seen,
    })
}
