//! End-to-end scenario 6: cosine similarity search over a vector collection.
use coldbase::{Collection, CollectionConfig, MaintenancePolicy};
use coldbase::vector::{Metric, SearchOptions, VectorCollection, VectorConfig};
use coldbase_store::backends::MemoryBlobStore;
use coldbase_store::BlobStore;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn cosine_search_ranks_nearest_neighbors_first() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let config = CollectionConfig::new("embeddings")
        .unwrap()
        .with_auto_compact(MaintenancePolicy::Disabled)
        .with_auto_vacuum(MaintenancePolicy::Disabled, 0.0);
    let collection = Collection::open(store, config);
    let vectors = VectorCollection::new(collection, VectorConfig::new(3, Metric::Cosine));

    vectors.put(json!({"id": "a", "vector": [1.0, 0.0, 0.0]})).await.unwrap();
    vectors.put(json!({"id": "b", "vector": [0.0, 1.0, 0.0]})).await.unwrap();
    vectors.put(json!({"id": "c", "vector": [0.9, 0.1, 0.0]})).await.unwrap();

    let hits = vectors
        .search(
            vec![1.0, 0.0, 0.0],
            SearchOptions {
                limit: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].data["id"], "a");
    assert!((hits[0].score - 1.0).abs() < 1e-9);
    assert_eq!(hits[1].data["id"], "c");
    assert!(hits[1].score > 0.9);
}

#[tokio::test]
async fn euclidean_search_orders_by_ascending_distance() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let config = CollectionConfig::new("points")
        .unwrap()
        .with_auto_compact(MaintenancePolicy::Disabled)
        .with_auto_vacuum(MaintenancePolicy::Disabled, 0.0);
    let collection = Collection::open(store, config);
    let vectors = VectorCollection::new(collection, VectorConfig::new(2, Metric::Euclidean));

    vectors.put(json!({"id": "near", "vector": [1.0, 1.0]})).await.unwrap();
    vectors.put(json!({"id": "far", "vector": [10.0, 10.0]})).await.unwrap();

    let hits = vectors
        .search(vec![0.0, 0.0], SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(hits[0].data["id"], "near");
    assert_eq!(hits[1].data["id"], "far");
    assert!(hits[0].score < hits[1].score);
}

#[tokio::test]
async fn vector_normalization_is_idempotent() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let config = CollectionConfig::new("idempotent-vectors")
        .unwrap()
        .with_auto_compact(MaintenancePolicy::Disabled)
        .with_auto_vacuum(MaintenancePolicy::Disabled, 0.0);
    let collection = Collection::open(store, config);
    let vectors = VectorCollection::new(collection, VectorConfig::new(3, Metric::Cosine));

    vectors.put(json!({"id": "v", "vector": [3.0, 4.0, 0.0]})).await.unwrap();
    let stored_once = vectors.collection().get("v", None).await.unwrap().unwrap();

    vectors.put(stored_once.clone()).await.unwrap();
    let stored_twice = vectors.collection().get("v", None).await.unwrap().unwrap();

    assert_eq!(stored_once["vector"], stored_twice["vector"]);
}

#[tokio::test]
async fn rejects_a_vector_of_the_wrong_dimension() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let config = CollectionConfig::new("strict-dims")
        .unwrap()
        .with_auto_compact(MaintenancePolicy::Disabled)
        .with_auto_vacuum(MaintenancePolicy::Disabled, 0.0);
    let collection = Collection::open(store, config);
    let vectors = VectorCollection::new(collection, VectorConfig::new(3, Metric::Cosine));

    let err = vectors
        .put(json!({"id": "bad", "vector": [1.0, 2.0]}))
        .await
        .unwrap_err();
    assert!(matches!(err, coldbase::Error::VectorDimension { expected: 3, got: 2 }));
}
