//! The abstract Blob Store contract that the rest of Coldbase is built on.
//!
//! A conforming blob store is a flat, key-addressed byte store with two
//! conditional-write primitives (`put_if_none_match`, `put_if_match`) that
//! the [lease lock](crate::lock) depends on. Concrete cloud adapters (S3,
//! Azure Blob, ...) are external collaborators and not part of this crate;
//! only the two reference backends needed to exercise the contract live
//! here, see [`crate::backends`].
use async_trait::async_trait;
use std::{fmt, io};

/// A specialized `Result` type for blob store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for blob store operations.
#[derive(Debug)]
pub enum Error {
    /// Caused by local file IO (only returned by [`crate::backends::LocalFsBlobStore`]).
    Io(io::Error),
    /// A `put_if_none_match` or `put_if_match` lost a conditional-write race.
    PreconditionFailed,
    /// The requested key does not exist.
    NotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "blob store IO error: {}", e),
            Error::PreconditionFailed => write!(f, "precondition failed"),
            Error::NotFound(key) => write!(f, "key not found: {}", key),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// An opaque version token returned by conditional writes (an ETag or a
/// filesystem mtime, depending on the backend).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(pub String);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The body and version of a blob returned by [`BlobStore::get`].
#[derive(Debug, Clone)]
pub struct Blob {
    /// The raw bytes stored under the key.
    pub body: Vec<u8>,
    /// The version of the blob at the time it was read.
    pub version: Version,
}

/// One page of a [`BlobStore::list`] call.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// The keys found on this page, in backend-defined (unspecified) order.
    pub keys: Vec<String>,
    /// A cursor to pass to the next call to continue listing, `None` if this
    /// was the last page.
    pub next_cursor: Option<String>,
}

/// A flat, key-addressed blob store.
///
/// All keys are utf-8 strings. Implementations must be safe to call
/// concurrently from multiple tasks; the engine never serializes access to
/// the store itself, only to the maintenance lease (see
/// [`crate::lock::LeaseLock`]).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Unconditionally overwrites (or creates) `key` with `body`.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// Creates `key` with `body`, failing with [`Error::PreconditionFailed`]
    /// if the key already exists.
    async fn put_if_none_match(&self, key: &str, body: Vec<u8>) -> Result<Version>;

    /// Overwrites `key` with `body` iff its current version is `version`,
    /// failing with [`Error::PreconditionFailed`] otherwise (including if
    /// the key is absent).
    async fn put_if_match(&self, key: &str, body: Vec<u8>, version: &Version) -> Result<Version>;

    /// Reads the current body and version of `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Blob>>;

    /// Lists up to one page of keys starting with `prefix`. Order is
    /// unspecified; callers wanting a complete enumeration must follow
    /// `next_cursor` until it is `None`, or use [`BlobStore::list_all`].
    async fn list(&self, prefix: &str, cursor: Option<&str>) -> Result<ListPage>;

    /// Deletes `keys`. Idempotent: absent keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<()>;

    /// Returns the content length of `key` in bytes, or `None` if absent.
    async fn size(&self, key: &str) -> Result<Option<u64>>;

    /// Logically appends `data` to `key`.
    ///
    /// If `key` exists and is non-empty, the result is `old content + "\n" +
    /// data`. If `key` is absent or empty, the result is just `data` (no
    /// leading newline). Implementations may realize this as
    /// download-modify-upload or as a native append/multipart operation.
    async fn append(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Pages through `list(prefix, ..)` until exhausted and returns every key.
    async fn list_all(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.list(prefix, cursor.as_deref()).await?;
            keys.extend(page.keys);
            match page.next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(keys)
    }
}
