//! End-to-end scenarios 4-5: concurrent compaction is serialized by the
//! lease lock, and an expired lease can be taken over by a new session.
use coldbase::CollectionConfig;
use coldbase_store::backends::MemoryBlobStore;
use coldbase_store::lock::{LeaseLock, LeaseOptions};
use coldbase_store::BlobStore;
use serde_json::json;

#[tokio::test]
async fn a_second_compaction_is_rejected_while_the_first_holds_the_lease() {
    let store = MemoryBlobStore::new();
    let config = CollectionConfig::new("contended").unwrap();

    let lock = LeaseLock::new(&store, config.lock_key());
    let lease = lock
        .acquire("p1", &LeaseOptions::default(), 0, 0)
        .await
        .unwrap();

    let err = coldbase::compact(&store, &config, "p2").await.unwrap_err();
    assert!(matches!(err, coldbase::Error::LockActive));

    lock.release(lease).await;
    coldbase::compact(&store, &config, "p2").await.unwrap();
}

#[tokio::test]
async fn an_expired_lease_is_taken_over_and_compaction_proceeds() {
    let store = MemoryBlobStore::new();
    let config = CollectionConfig::new("stale-lease").unwrap();

    let short_lease = LeaseOptions {
        lease_duration_ms: 0,
        adaptive: None,
    };
    let lock = LeaseLock::new(&store, config.lock_key());
    let lease = lock.acquire("p1", &short_lease, 0, 0).await.unwrap();
    std::mem::forget(lease); // simulate p1 crashing without releasing

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    // p2's compact() must succeed by taking over the expired lease rather
    // than raising LockActive.
    coldbase::compact(&store, &config, "p2").await.unwrap();
}

#[tokio::test]
async fn compact_then_compact_again_is_a_no_op() {
    let store: std::sync::Arc<dyn BlobStore> = std::sync::Arc::new(MemoryBlobStore::new());
    let config = CollectionConfig::new("idempotent")
        .unwrap()
        .with_auto_compact(coldbase::MaintenancePolicy::Disabled)
        .with_auto_vacuum(coldbase::MaintenancePolicy::Disabled, 0.0);
    let collection = coldbase::Collection::open(store.clone(), config.clone());

    collection.put(json!({"id": "1"})).await.unwrap();
    coldbase::compact(&*store, &config, "p1").await.unwrap();
    let after_first = store.get(&config.snapshot_key()).await.unwrap().unwrap().body;

    let result = coldbase::compact(&*store, &config, "p1").await.unwrap();
    assert_eq!(result.mutations_processed, 0);
    let after_second = store.get(&config.snapshot_key()).await.unwrap().unwrap().body;
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn vacuum_respects_a_small_cache_and_keeps_every_distinct_live_id() {
    let store: std::sync::Arc<dyn BlobStore> = std::sync::Arc::new(MemoryBlobStore::new());
    let config = CollectionConfig::new("overflow")
        .unwrap()
        .with_vacuum_cache_size(1)
        .with_auto_compact(coldbase::MaintenancePolicy::Disabled)
        .with_auto_vacuum(coldbase::MaintenancePolicy::Disabled, 0.0);
    let collection = coldbase::Collection::open(store.clone(), config.clone());

    collection.put(json!({"id": "a"})).await.unwrap();
    collection.put(json!({"id": "b"})).await.unwrap();
    collection.put(json!({"id": "c"})).await.unwrap();
    coldbase::compact(&*store, &config, "p1").await.unwrap();
    coldbase::vacuum(&*store, &config, "p1").await.unwrap();

    assert!(collection.get("a", None).await.unwrap().is_some());
    assert!(collection.get("b", None).await.unwrap().is_some());
    assert!(collection.get("c", None).await.unwrap().is_some());
}
