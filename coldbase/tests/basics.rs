//! End-to-end scenarios 1-3 from the testable properties: basic put/get/
//! delete, last-write-wins across snapshot and mutations, and TTL filtering.
use coldbase::{CollectionConfig, Collection, MaintenancePolicy};
use coldbase_store::backends::MemoryBlobStore;
use coldbase_store::BlobStore;
use serde_json::json;
use std::sync::Arc;

fn disabled_maintenance(config: CollectionConfig) -> CollectionConfig {
    config
        .with_auto_compact(MaintenancePolicy::Disabled)
        .with_auto_vacuum(MaintenancePolicy::Disabled, 0.0)
}

#[tokio::test]
async fn basic_put_get_delete() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let config = disabled_maintenance(CollectionConfig::new("users").unwrap());
    let collection = Collection::open(store, config);

    collection.put(json!({"id": "1", "name": "Alice"})).await.unwrap();
    assert_eq!(
        collection.get("1", None).await.unwrap(),
        Some(json!({"id": "1", "name": "Alice"}))
    );

    collection.delete("1").await.unwrap();
    assert_eq!(collection.get("1", None).await.unwrap(), None);
    assert_eq!(collection.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn last_write_wins_across_snapshot_and_mutations_then_survives_compact_and_vacuum() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let config = disabled_maintenance(CollectionConfig::new("docs").unwrap());

    store
        .put(&config.snapshot_key(), br#"["1",{"id":"1","v":1},100]"#.to_vec())
        .await
        .unwrap();

    let collection = Collection::open(store.clone(), config.clone());
    collection.put(json!({"id": "1", "v": 2})).await.unwrap();

    assert_eq!(collection.get("1", None).await.unwrap(), Some(json!({"id": "1", "v": 2})));

    coldbase::compact(&*store, &config, "p1").await.unwrap();
    assert_eq!(store.list_all(&config.mutation_prefix()).await.unwrap().len(), 0);
    let lines_after_compact = store.get(&config.snapshot_key()).await.unwrap().unwrap().body;
    assert_eq!(lines_after_compact.split(|&b| b == b'\n').count(), 2);

    coldbase::vacuum(&*store, &config, "p1").await.unwrap();
    let lines_after_vacuum = store.get(&config.snapshot_key()).await.unwrap().unwrap().body;
    assert_eq!(lines_after_vacuum.split(|&b| b == b'\n').count(), 1);
    assert!(String::from_utf8_lossy(&lines_after_vacuum).contains("\"v\":2"));
}

#[tokio::test]
async fn ttl_filters_expired_records_and_counts_correctly() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let config = disabled_maintenance(CollectionConfig::new("sessions").unwrap().with_ttl_field("exp"));
    let collection = Collection::open(store, config);

    let now = coldbase_store::timestamp::timestamp_now();
    collection.put(json!({"id": "a", "exp": now - 1000})).await.unwrap();
    collection.put(json!({"id": "b", "exp": now + 100_000})).await.unwrap();

    assert_eq!(collection.get("a", None).await.unwrap(), None);
    assert!(collection.get("b", None).await.unwrap().is_some());
    assert_eq!(collection.count(None).await.unwrap(), 1);
    assert_eq!(collection.delete_expired().await.unwrap(), 1);
}

#[tokio::test]
async fn batch_writes_share_one_timestamp_and_are_all_visible() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let config = disabled_maintenance(CollectionConfig::new("batched").unwrap());
    let collection = Collection::open(store, config);

    collection
        .batch(|b| {
            b.put(json!({"id": "1"}))?;
            b.put(json!({"id": "2"}))?;
            b.delete("3");
            Ok(())
        })
        .await
        .unwrap();

    assert!(collection.get("1", None).await.unwrap().is_some());
    assert!(collection.get("2", None).await.unwrap().is_some());
    assert!(collection.get("3", None).await.unwrap().is_none());
}

#[tokio::test]
async fn empty_collection_boundary_behavior() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let config = disabled_maintenance(CollectionConfig::new("empty").unwrap());
    let collection = Collection::open(store, config);

    assert_eq!(collection.read(None).await.unwrap().len(), 0);
    assert_eq!(collection.count(None).await.unwrap(), 0);
    assert_eq!(
        collection
            .find(coldbase::FindOptions::default())
            .await
            .unwrap()
            .len(),
        0
    );
}
