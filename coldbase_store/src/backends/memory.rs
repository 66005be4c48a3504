//! An in-memory blob store backed by a `HashMap`, mainly useful for tests.
use crate::blob_store::{Blob, BlobStore, Error, ListPage, Result, Version};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct Entry {
    body: Vec<u8>,
    version: u64,
}

/// An in-memory blob store. Every key lives in a single process's heap, so
/// this backend is only useful for tests and single-process demos, not for
/// the cross-process guarantees the lease lock is designed around.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Entry>>,
}

impl MemoryBlobStore {
    /// Creates an empty in-memory blob store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn version_of(n: u64) -> Version {
    Version(n.to_string())
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        let version = blobs.get(key).map_or(0, |e| e.version) + 1;
        blobs.insert(key.to_string(), Entry { body, version });
        Ok(())
    }

    async fn put_if_none_match(&self, key: &str, body: Vec<u8>) -> Result<Version> {
        let mut blobs = self.blobs.write().await;
        if blobs.contains_key(key) {
            return Err(Error::PreconditionFailed);
        }
        blobs.insert(key.to_string(), Entry { body, version: 1 });
        Ok(version_of(1))
    }

    async fn put_if_match(&self, key: &str, body: Vec<u8>, version: &Version) -> Result<Version> {
        let mut blobs = self.blobs.write().await;
        match blobs.get(key) {
            Some(entry) if version_of(entry.version) == *version => {
                let new_version = entry.version + 1;
                blobs.insert(key.to_string(), Entry { body, version: new_version });
                Ok(version_of(new_version))
            }
            _ => Err(Error::PreconditionFailed),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(key).map(|e| Blob {
            body: e.body.clone(),
            version: version_of(e.version),
        }))
    }

    async fn list(&self, prefix: &str, cursor: Option<&str>) -> Result<ListPage> {
        let blobs = self.blobs.read().await;
        let mut keys: Vec<String> = blobs
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        let start = match cursor {
            Some(c) => keys.partition_point(|k| k.as_str() <= c),
            None => 0,
        };
        Ok(ListPage {
            keys: keys[start..].to_vec(),
            next_cursor: None,
        })
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        for key in keys {
            blobs.remove(key);
        }
        Ok(())
    }

    async fn size(&self, key: &str) -> Result<Option<u64>> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(key).map(|e| e.body.len() as u64))
    }

    async fn append(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        let version = blobs.get(key).map_or(0, |e| e.version) + 1;
        let body = match blobs.get(key) {
            Some(e) if !e.body.is_empty() => {
                let mut body = e.body.clone();
                body.push(b'\n');
                body.extend_from_slice(data);
                body
            }
            _ => data.to_vec(),
        };
        blobs.insert(key.to_string(), Entry { body, version });
        Ok(())
    }
}
