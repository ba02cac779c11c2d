//! End-to-end behaviour of the provider manager over the in-memory store:
//! claims → cache → store fallback → expiry.

use std::sync::Arc;
use std::time::Duration;

use provstore_nullables::{NullClock, NullDatastore};
use provstore_providers::keys::provider_key;
use provstore_providers::{ProviderConfig, ProviderError, ProviderManager, ProviderStore};
use provstore_store::Datastore;
use provstore_types::{ContentId, PeerId, Timestamp};
use provstore_utils::{init_logging, LogFormat};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn cid(i: usize) -> ContentId {
    ContentId::from(format!("content-{i}").as_str())
}

/// Route manager logs through the shared subscriber; the first test to run installs it.
fn init_test_logging() {
    let _ = init_logging(LogFormat::Human, "warn");
}

fn start(store: &Arc<NullDatastore>, config: ProviderConfig) -> ProviderManager {
    init_test_logging();
    ProviderManager::new(PeerId::from("testing"), store.clone(), config).expect("valid config")
}

fn start_with_clock(
    store: &Arc<NullDatastore>,
    config: ProviderConfig,
    clock: &Arc<NullClock>,
) -> ProviderManager {
    init_test_logging();
    ProviderManager::with_clock(PeerId::from("testing"), store.clone(), config, clock.clone())
        .expect("valid config")
}

fn record_count(store: &Arc<NullDatastore>) -> usize {
    ProviderStore::new(store.clone())
        .scan_all()
        .expect("scan")
        .count()
}

fn secs(s: u64) -> Timestamp {
    Timestamp::from_nanos(s * 1_000_000_000)
}

// ---------------------------------------------------------------------------
// Claims and queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenarios_log_through_the_shared_subscriber() {
    let manager = start(&Arc::new(NullDatastore::new()), ProviderConfig::default());
    assert!(init_logging(LogFormat::Json, "warn").is_err());
    manager.shutdown().await;
}

#[tokio::test]
async fn claim_is_immediately_queryable() {
    let store = Arc::new(NullDatastore::new());
    let manager = start(&store, ProviderConfig::default());
    let content = ContentId::from("test");

    manager
        .record_claim(&content, &PeerId::from("testingprovider"))
        .await
        .unwrap();
    let providers = manager.query_providers(&content).await.unwrap();
    assert_eq!(providers, vec![PeerId::from("testingprovider")]);

    manager.shutdown().await;
}

#[tokio::test]
async fn repeated_claims_are_reported_once() {
    let store = Arc::new(NullDatastore::new());
    let manager = start(&store, ProviderConfig::default());
    let content = ContentId::from("test");
    let peer = PeerId::from("peer");

    for _ in 0..5 {
        manager.record_claim(&content, &peer).await.unwrap();
    }
    manager
        .record_claim(&content, &PeerId::from("other"))
        .await
        .unwrap();

    let mut providers = manager.query_providers(&content).await.unwrap();
    providers.sort();
    assert_eq!(providers, vec![PeerId::from("other"), peer]);
    assert_eq!(record_count(&store), 2);
}

#[tokio::test]
async fn unknown_content_has_no_providers() {
    let store = Arc::new(NullDatastore::new());
    let manager = start(&store, ProviderConfig::default());
    assert!(manager.query_providers(&cid(0)).await.unwrap().is_empty());
    assert_eq!(manager.cache_len().await.unwrap(), 0);
}

#[tokio::test]
async fn later_claim_replaces_stored_timestamp() {
    let store = Arc::new(NullDatastore::new());
    let clock = Arc::new(NullClock::new(secs(100)));
    let manager = start_with_clock(&store, ProviderConfig::default(), &clock);
    let content = cid(1);
    let peer = PeerId::from("peer");

    manager.record_claim(&content, &peer).await.unwrap();
    clock.advance(Duration::from_secs(30));
    manager.record_claim(&content, &peer).await.unwrap();

    let adapter = ProviderStore::new(store.clone());
    assert_eq!(adapter.get(&content, &peer).unwrap(), Some(secs(130)));
    assert_eq!(record_count(&store), 1);
}

#[tokio::test]
async fn claim_with_older_clock_keeps_newer_timestamp() {
    let store = Arc::new(NullDatastore::new());
    let clock = Arc::new(NullClock::new(secs(100)));
    let manager = start_with_clock(&store, ProviderConfig::default(), &clock);
    let content = cid(1);
    let peer = PeerId::from("peer");

    manager.record_claim(&content, &peer).await.unwrap();
    clock.set(secs(50));
    manager.record_claim(&content, &peer).await.unwrap();

    let adapter = ProviderStore::new(store.clone());
    assert_eq!(adapter.get(&content, &peer).unwrap(), Some(secs(100)));
    assert_eq!(store.put_count(), 1);
    assert_eq!(
        manager.query_providers(&content).await.unwrap(),
        vec![peer]
    );
}

// ---------------------------------------------------------------------------
// Cache eviction and store fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_content_id_survives_eviction() {
    let store = Arc::new(NullDatastore::new());
    let manager = start(&store, ProviderConfig::default().with_cache_capacity(10));
    let friend = PeerId::from("friend");

    for i in 0..100 {
        manager.record_claim(&cid(i), &friend).await.unwrap();
    }
    assert_eq!(manager.cache_len().await.unwrap(), 10);

    for i in 0..100 {
        let providers = manager.query_providers(&cid(i)).await.unwrap();
        assert_eq!(providers, vec![friend.clone()], "content {i}");
    }
    assert!(manager.cache_len().await.unwrap() <= 10);
}

#[tokio::test]
async fn evicted_content_is_served_from_store() {
    let store = Arc::new(NullDatastore::new());
    let manager = start(&store, ProviderConfig::default().with_cache_capacity(2));

    for i in 0..3 {
        manager.record_claim(&cid(i), &PeerId::from("p")).await.unwrap();
    }
    // cid(0) was evicted by cid(2); the store still answers for it.
    assert_eq!(
        manager.query_providers(&cid(0)).await.unwrap(),
        vec![PeerId::from("p")]
    );
    assert_eq!(manager.cache_len().await.unwrap(), 2);
}

#[tokio::test]
async fn claim_on_uncached_content_merges_persisted_peers() {
    let store = Arc::new(NullDatastore::new());
    let clock = Arc::new(NullClock::new(secs(1_000)));
    ProviderStore::new(store.clone())
        .put(&cid(7), &PeerId::from("earlier"), secs(990))
        .unwrap();

    let manager = start_with_clock(&store, ProviderConfig::default(), &clock);
    manager
        .record_claim(&cid(7), &PeerId::from("new"))
        .await
        .unwrap();

    // Served from the cache entry created by the claim.
    let mut providers = manager.query_providers(&cid(7)).await.unwrap();
    providers.sort();
    assert_eq!(providers, vec![PeerId::from("earlier"), PeerId::from("new")]);
}

#[tokio::test]
async fn corrupt_record_does_not_hide_others() {
    let store = Arc::new(NullDatastore::new());
    let manager = start(&store, ProviderConfig::default());
    let content = cid(3);

    manager
        .record_claim(&content, &PeerId::from("good"))
        .await
        .unwrap();
    store
        .put(&provider_key(&content, &PeerId::from("bad")), b"not a timestamp")
        .unwrap();

    // Fresh manager with a cold cache must read through the corrupt entry.
    manager.shutdown().await;
    let manager = start(&store, ProviderConfig::default());
    assert_eq!(
        manager.query_providers(&content).await.unwrap(),
        vec![PeerId::from("good")]
    );
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_write_leaves_cache_untouched() {
    let store = Arc::new(NullDatastore::new());
    let manager = start(&store, ProviderConfig::default());
    let content = cid(4);

    store.fail_puts(true);
    let result = manager.record_claim(&content, &PeerId::from("p")).await;
    assert!(matches!(result, Err(ProviderError::Store(_))));
    assert_eq!(manager.cache_len().await.unwrap(), 0);
    assert!(manager.query_providers(&content).await.unwrap().is_empty());

    // The manager stays usable once the store recovers.
    store.fail_puts(false);
    manager.record_claim(&content, &PeerId::from("p")).await.unwrap();
    assert_eq!(
        manager.query_providers(&content).await.unwrap(),
        vec![PeerId::from("p")]
    );
}

#[tokio::test]
async fn failed_write_on_cached_content_keeps_previous_state() {
    let store = Arc::new(NullDatastore::new());
    let manager = start(&store, ProviderConfig::default());
    let content = cid(5);

    manager.record_claim(&content, &PeerId::from("a")).await.unwrap();
    store.fail_puts(true);
    assert!(manager
        .record_claim(&content, &PeerId::from("b"))
        .await
        .is_err());

    assert_eq!(
        manager.query_providers(&content).await.unwrap(),
        vec![PeerId::from("a")]
    );
}

#[tokio::test]
async fn failed_scan_surfaces_on_query() {
    let store = Arc::new(NullDatastore::new());
    let manager = start(&store, ProviderConfig::default());

    store.fail_scans(true);
    let result = manager.query_providers(&cid(6)).await;
    assert!(matches!(result, Err(ProviderError::Store(_))));

    store.fail_scans(false);
    assert!(manager.query_providers(&cid(6)).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn providers_expire_after_validity_window() {
    let store = Arc::new(NullDatastore::new());
    let config = ProviderConfig::default()
        .with_provide_validity(Duration::from_millis(500))
        .with_cleanup_interval(Duration::from_millis(500));
    let manager = start(&store, config);
    let peers = [PeerId::from("a"), PeerId::from("b")];

    for i in 0..10 {
        manager.record_claim(&cid(i), &peers[0]).await.unwrap();
        manager.record_claim(&cid(i), &peers[1]).await.unwrap();
    }
    for i in 0..10 {
        assert_eq!(manager.query_providers(&cid(i)).await.unwrap().len(), 2);
    }

    // One validity window plus at least one full sweep interval, with slack
    // so the sweep that follows expiry has certainly run.
    tokio::time::sleep(Duration::from_millis(1_200)).await;

    for i in 0..10 {
        let out = manager.query_providers(&cid(i)).await.unwrap();
        assert!(out.is_empty(), "expected providers to be cleaned up, got {out:?}");
    }
    assert_eq!(manager.cache_len().await.unwrap(), 0);
    assert_eq!(record_count(&store), 0);

    manager.shutdown().await;
}

#[tokio::test]
async fn expired_claims_are_hidden_before_the_sweep() {
    let store = Arc::new(NullDatastore::new());
    let clock = Arc::new(NullClock::new(secs(1_000)));
    let config = ProviderConfig::default().with_provide_validity(Duration::from_secs(10));
    let manager = start_with_clock(&store, config, &clock);

    manager.record_claim(&cid(1), &PeerId::from("a")).await.unwrap();
    manager.record_claim(&cid(1), &PeerId::from("b")).await.unwrap();
    clock.advance(Duration::from_secs(11));

    // Filtered at read time, but a query never deletes.
    assert!(manager.query_providers(&cid(1)).await.unwrap().is_empty());
    assert_eq!(manager.cache_len().await.unwrap(), 1);
    assert_eq!(record_count(&store), 2);

    let report = manager.sweep_now().await.unwrap();
    assert_eq!(report.expired, 2);
    assert_eq!(report.deleted, 2);
    assert_eq!(report.cache_pruned, 2);
    assert_eq!(manager.cache_len().await.unwrap(), 0);
    assert_eq!(record_count(&store), 0);
}

#[tokio::test]
async fn sweep_expires_evicted_content() {
    let store = Arc::new(NullDatastore::new());
    let clock = Arc::new(NullClock::new(secs(1_000)));
    let config = ProviderConfig::default()
        .with_cache_capacity(2)
        .with_provide_validity(Duration::from_secs(10));
    let manager = start_with_clock(&store, config, &clock);

    for i in 0..20 {
        manager.record_claim(&cid(i), &PeerId::from("p")).await.unwrap();
    }
    clock.advance(Duration::from_secs(60));

    let report = manager.sweep_now().await.unwrap();
    assert_eq!(report.deleted, 20);
    assert!(store.is_empty());
    assert_eq!(manager.cache_len().await.unwrap(), 0);
}

#[tokio::test]
async fn refreshed_claim_outlives_sweep() {
    let store = Arc::new(NullDatastore::new());
    let clock = Arc::new(NullClock::new(secs(1_000)));
    let config = ProviderConfig::default().with_provide_validity(Duration::from_secs(10));
    let manager = start_with_clock(&store, config, &clock);
    let content = cid(2);

    manager.record_claim(&content, &PeerId::from("stale")).await.unwrap();
    manager.record_claim(&content, &PeerId::from("fresh")).await.unwrap();
    clock.advance(Duration::from_secs(8));
    manager.record_claim(&content, &PeerId::from("fresh")).await.unwrap();
    clock.advance(Duration::from_secs(5));

    let report = manager.sweep_now().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(
        manager.query_providers(&content).await.unwrap(),
        vec![PeerId::from("fresh")]
    );
    assert_eq!(manager.cache_len().await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_are_all_applied() {
    let store = Arc::new(NullDatastore::new());
    let manager = start(&store, ProviderConfig::default().with_cache_capacity(4));
    let content = cid(0);

    let mut tasks = Vec::new();
    for i in 0..32 {
        let manager = manager.clone();
        let content = content.clone();
        tasks.push(tokio::spawn(async move {
            let peer = PeerId::from(format!("peer-{}", i % 8).as_str());
            manager.record_claim(&content, &peer).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let providers = manager.query_providers(&content).await.unwrap();
    assert_eq!(providers.len(), 8);
    assert_eq!(record_count(&store), 8);
    manager.shutdown().await;
}
