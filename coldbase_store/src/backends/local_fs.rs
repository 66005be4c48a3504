//! A blob store backed by plain files in a local directory.
//!
//! This backend exists to exercise the [`BlobStore`] contract against a real
//! filesystem and to let Coldbase run outside of a cloud object store (the
//! "local filesystem exposing the same primitives" target named in scope).
//! It only guarantees conditional-write safety *within a single process*: a
//! real multi-process deployment needs a backend with native
//! compare-and-swap, such as S3's conditional `PutObject` or Azure's
//! `If-Match` headers.
use crate::blob_store::{Blob, BlobStore, Error, ListPage, Result, Version};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// A blob store backed by files in `base_dir`, one file per key.
pub struct LocalFsBlobStore {
    base_dir: PathBuf,
    cas_lock: Mutex<()>,
}

impl LocalFsBlobStore {
    /// Opens (creating if necessary) a blob store rooted at `base_dir`.
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;
        Ok(Self {
            base_dir,
            cas_lock: Mutex::new(()),
        })
    }

    /// Deletes the entire directory and its contents.
    pub async fn purge(base_dir: impl AsRef<Path>) -> Result<()> {
        match fs::remove_dir_all(base_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }

    async fn version_of(path: &Path) -> Result<Option<Version>> {
        match fs::metadata(path).await {
            Ok(meta) => {
                let mtime = meta
                    .modified()?
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos();
                Ok(Some(Version(format!("{}-{}", mtime, meta.len()))))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobStore for LocalFsBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        fs::write(self.path_for(key), body).await?;
        Ok(())
    }

    async fn put_if_none_match(&self, key: &str, body: Vec<u8>) -> Result<Version> {
        use std::io::ErrorKind;
        let _guard = self.cas_lock.lock().await;
        let path = self.path_for(key);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::PreconditionFailed)
            }
            Err(e) => return Err(e.into()),
        }
        fs::write(&path, body).await?;
        Self::version_of(&path)
            .await?
            .ok_or(Error::PreconditionFailed)
    }

    async fn put_if_match(&self, key: &str, body: Vec<u8>, version: &Version) -> Result<Version> {
        let _guard = self.cas_lock.lock().await;
        let path = self.path_for(key);
        let current = Self::version_of(&path).await?;
        if current.as_ref() != Some(version) {
            return Err(Error::PreconditionFailed);
        }
        fs::write(&path, body).await?;
        Self::version_of(&path)
            .await?
            .ok_or(Error::PreconditionFailed)
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(body) => {
                let version = Self::version_of(&path).await?.ok_or(Error::NotFound(key.to_string()))?;
                Ok(Some(Blob { body, version }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str, cursor: Option<&str>) -> Result<ListPage> {
        let mut keys = Vec::new();
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ListPage::default())
            }
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) {
                    keys.push(name.to_string());
                }
            }
        }
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
        for key in keys {
            match fs::remove_file(self.path_for(key)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn size(&self, key: &str) -> Result<Option<u64>> {
        match fs::metadata(self.path_for(key)).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, key: &str, data: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let path = self.path_for(key);
        let existing_len = fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        if existing_len > 0 {
            file.write_all(b"\n").await?;
        }
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }
}
