//! Expiry sweep over the durable store.
//!
//! A sweep enumerates every persisted record rather than the cache, so a
//! claim that was evicted from memory long ago still expires on schedule.
//! Per-record failures are logged and counted; the pass always continues.
//!
//! The sweep itself is synchronous. The manager's control loop drives it from
//! its ticker so cache pruning stays serialized with claims and queries.

use std::collections::HashSet;
use std::time::Duration;

use provstore_types::{ContentId, Timestamp};
use tracing::{debug, info, warn};

use crate::cache::ProviderCache;
use crate::store::ProviderStore;

/// Outcome of one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records read from the store.
    pub scanned: usize,
    /// Records found past the validity window.
    pub expired: usize,
    /// Expired records successfully deleted.
    pub deleted: usize,
    /// Store errors encountered (failed reads or deletes).
    pub failed: usize,
    /// Peers removed from cache-resident sets.
    pub cache_pruned: usize,
}

pub struct Sweeper {
    validity: Duration,
}

impl Sweeper {
    pub fn new(validity: Duration) -> Self {
        Self { validity }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Delete every record older than `now - validity` and prune the cache to match.
    pub fn sweep(
        &self,
        store: &ProviderStore,
        cache: &mut ProviderCache,
        now: Timestamp,
    ) -> SweepReport {
        let mut report = SweepReport::default();
        let mut touched: HashSet<ContentId> = HashSet::new();

        let records = match store.scan_all() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "provider sweep could not enumerate the store");
                report.failed += 1;
                return report;
            }
        };

        for entry in records {
            let record = match entry {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "provider sweep failed to read a record");
                    report.failed += 1;
                    continue;
                }
            };
            report.scanned += 1;

            if !record.last_seen.is_expired(self.validity, now) {
                continue;
            }
            report.expired += 1;

            match store.delete(&record.content_id, &record.peer_id) {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    warn!(
                        cid = %record.content_id,
                        peer = %record.peer_id,
                        error = %e,
                        "failed to delete expired provider record"
                    );
                    report.failed += 1;
                }
            }
            touched.insert(record.content_id);
        }

        for content_id in &touched {
            report.cache_pruned += cache.remove_expired_peers(content_id, now, self.validity);
        }

        if report.expired > 0 || report.failed > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired,
                deleted = report.deleted,
                failed = report.failed,
                cache_pruned = report.cache_pruned,
                "provider sweep completed"
            );
        } else {
            debug!(scanned = report.scanned, "provider sweep: nothing expired");
        }
        report
    }
}
