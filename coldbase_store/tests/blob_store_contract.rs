//! Exercises both reference backends against the same contract: every
//! [`BlobStore`] implementation must agree on conditional-write semantics,
//! append semantics, and listing.
use coldbase_store::backends::{LocalFsBlobStore, MemoryBlobStore};
use coldbase_store::{BlobStore, Error};

async fn put_if_none_match_rejects_an_existing_key(store: &dyn BlobStore) {
    store.put_if_none_match("a", b"one".to_vec()).await.unwrap();
    let err = store.put_if_none_match("a", b"two".to_vec()).await.unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed));
    assert_eq!(store.get("a").await.unwrap().unwrap().body, b"one");
}

async fn put_if_match_rejects_a_stale_version(store: &dyn BlobStore) {
    let v1 = store.put_if_none_match("b", b"one".to_vec()).await.unwrap();
    let v2 = store.put_if_match("b", b"two".to_vec(), &v1).await.unwrap();
    let err = store.put_if_match("b", b"three".to_vec(), &v1).await.unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed));
    assert_eq!(store.get("b").await.unwrap().unwrap().body, b"two");
    store.put_if_match("b", b"three".to_vec(), &v2).await.unwrap();
}

async fn append_has_no_leading_newline_on_a_fresh_key(store: &dyn BlobStore) {
    store.append("c", b"first").await.unwrap();
    assert_eq!(store.get("c").await.unwrap().unwrap().body, b"first");
    store.append("c", b"second").await.unwrap();
    assert_eq!(store.get("c").await.unwrap().unwrap().body, b"first\nsecond");
}

async fn delete_is_idempotent_on_absent_keys(store: &dyn BlobStore) {
    store.delete(&["never-existed".to_string()]).await.unwrap();
}

async fn list_all_pages_through_every_matching_key(store: &dyn BlobStore) {
    for i in 0..10 {
        store.put(&format!("p.item.{}", i), vec![]).await.unwrap();
    }
    store.put("p.other", vec![]).await.unwrap();
    let mut keys = store.list_all("p.item.").await.unwrap();
    keys.sort();
    assert_eq!(keys.len(), 10);
    assert!(keys.iter().all(|k| k.starts_with("p.item.")));
}

async fn size_reflects_body_length_and_absence(store: &dyn BlobStore) {
    assert_eq!(store.size("missing").await.unwrap(), None);
    store.put("sized", b"12345".to_vec()).await.unwrap();
    assert_eq!(store.size("sized").await.unwrap(), Some(5));
}

#[tokio::test]
async fn memory_backend_satisfies_the_contract() {
    let store = MemoryBlobStore::new();
    put_if_none_match_rejects_an_existing_key(&store).await;
    put_if_match_rejects_a_stale_version(&store).await;
    append_has_no_leading_newline_on_a_fresh_key(&store).await;
    delete_is_idempotent_on_absent_keys(&store).await;
    list_all_pages_through_every_matching_key(&store).await;
    size_reflects_body_length_and_absence(&store).await;
}

#[tokio::test]
async fn local_fs_backend_satisfies_the_contract() {
    let dir = std::env::temp_dir().join(format!("coldbase-contract-test-{}", std::process::id()));
    let store = LocalFsBlobStore::open(&dir).await.unwrap();
    put_if_none_match_rejects_an_existing_key(&store).await;
    put_if_match_rejects_a_stale_version(&store).await;
    append_has_no_leading_newline_on_a_fresh_key(&store).await;
    delete_is_idempotent_on_absent_keys(&store).await;
    list_all_pages_through_every_matching_key(&store).await;
    size_reflects_body_length_and_absence(&store).await;
    LocalFsBlobStore::purge(&dir).await.unwrap();
}
