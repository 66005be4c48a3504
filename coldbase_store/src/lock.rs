//! A lease-based distributed lock over a single blob, used to serialize
//! compaction and vacuum across arbitrary concurrent processes without a
//! coordinator (§4.1). Built entirely on the two conditional-write
//! primitives of [`BlobStore`].
use crate::blob_store::{BlobStore, Version};
use crate::timestamp::timestamp_now;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The error type for lock operations.
#[derive(Debug)]
pub enum Error {
    /// Another session holds a live (non-expired) lease.
    LockActive,
    /// The underlying blob store failed.
    Store(crate::blob_store::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::LockActive => write!(f, "lock is held by another session"),
            Error::Store(e) => write!(f, "lock store error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => Some(e),
            Error::LockActive => None,
        }
    }
}

impl From<crate::blob_store::Error> for Error {
    fn from(e: crate::blob_store::Error) -> Self {
        Error::Store(e)
    }
}

/// A specialized `Result` type for lock operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockMeta {
    session_id: String,
    expires_at: u64,
}

/// Parameters controlling how long a lease is requested for.
#[derive(Debug, Clone)]
pub struct LeaseOptions {
    /// Base lease duration in milliseconds.
    pub lease_duration_ms: u64,
    /// If `Some`, the lease is extended by `file_size * per_byte +
    /// mutation_count * per_mutation`, capped at `max_lease_duration_ms`.
    pub adaptive: Option<AdaptiveLease>,
}

/// Knobs for the optional adaptive lease extension.
#[derive(Debug, Clone)]
pub struct AdaptiveLease {
    /// Hard ceiling on the computed lease duration.
    pub max_lease_duration_ms: u64,
    /// Extra milliseconds granted per byte of the file under maintenance.
    pub lease_per_byte: f64,
    /// Extra milliseconds granted per pending mutation.
    pub lease_per_mutation: f64,
}

impl Default for LeaseOptions {
    fn default() -> Self {
        Self {
            lease_duration_ms: 30_000,
            adaptive: None,
        }
    }
}

impl LeaseOptions {
    fn compute_duration(&self, file_size: u64, mutation_count: usize) -> u64 {
        match &self.adaptive {
            Some(a) => {
                let extra = (file_size as f64) * a.lease_per_byte
                    + (mutation_count as f64) * a.lease_per_mutation;
                ((self.lease_duration_ms as f64 + extra).round() as u64).min(a.max_lease_duration_ms)
            }
            None => self.lease_duration_ms,
        }
    }
}

/// A held lease on a `C.lock` blob. Dropping this without calling
/// [`LeaseLock::release`] simply lets the lease expire naturally; no
/// background heartbeat is required (§9 design notes).
pub struct Lease {
    key: String,
    session_id: String,
    version: Version,
}

/// Acquires and releases the lease lock for a single lock blob key.
pub struct LeaseLock<'a> {
    store: &'a dyn BlobStore,
    key: String,
}

impl<'a> LeaseLock<'a> {
    /// Creates a lock manager for the lock blob at `key` (conventionally
    /// `"{collection}.lock"`).
    pub fn new(store: &'a dyn BlobStore, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Attempts to acquire the lease for `session_id`, following the
    /// acquire procedure of §4.1: a fresh `put_if_none_match`, and on
    /// contention, a takeover of an expired lease via `put_if_match`.
    pub async fn acquire(
        &self,
        session_id: &str,
        options: &LeaseOptions,
        file_size: u64,
        mutation_count: usize,
    ) -> Result<Lease> {
        let duration = options.compute_duration(file_size, mutation_count);
        let now = timestamp_now();
        let meta = LockMeta {
            session_id: session_id.to_string(),
            expires_at: now + duration,
        };
        let body = serde_json::to_vec(&meta).expect("lock meta always serializes");

        match self.store.put_if_none_match(&self.key, body.clone()).await {
            Ok(version) => {
                debug!("acquired fresh lease {} for {}", session_id, self.key);
                return Ok(Lease {
                    key: self.key.clone(),
                    session_id: session_id.to_string(),
                    version,
                });
            }
            Err(crate::blob_store::Error::PreconditionFailed) => {}
            Err(e) => return Err(e.into()),
        }

        let existing = self.store.get(&self.key).await?;
        let existing = match existing {
            Some(blob) => blob,
            None => {
                // The lock was deleted between our failed create and this
                // read; retry the create once.
                return match self.store.put_if_none_match(&self.key, body).await {
                    Ok(version) => Ok(Lease {
                        key: self.key.clone(),
                        session_id: session_id.to_string(),
                        version,
                    }),
                    Err(_) => Err(Error::LockActive),
                };
            }
        };

        let current: LockMeta = serde_json::from_slice(&existing.body).map_err(|_| Error::LockActive)?;
        if timestamp_now() > current.expires_at {
            match self
                .store
                .put_if_match(&self.key, body, &existing.version)
                .await
            {
                Ok(version) => {
                    debug!("took over expired lease for {}", self.key);
                    Ok(Lease {
                        key: self.key.clone(),
                        session_id: session_id.to_string(),
                        version,
                    })
                }
                Err(_) => Err(Error::LockActive),
            }
        } else {
            Err(Error::LockActive)
        }
    }

    /// Releases `lease` by writing `expires_at = 0` under its held version.
    /// The lock blob itself is left in place (not deleted) so the next
    /// `put_if_match` takeover path still has a key to act on. Failures are
    /// logged and swallowed: the lease will expire naturally regardless.
    pub async fn release(&self, lease: Lease) {
        let meta = LockMeta {
            session_id: lease.session_id.clone(),
            expires_at: 0,
        };
        let body = serde_json::to_vec(&meta).expect("lock meta always serializes");
        if let Err(e) = self
            .store
            .put_if_match(&lease.key, body, &lease.version)
            .await
        {
            warn!(
                "failed to release lease for {} (will expire naturally): {}",
                lease.key, e
            );
        }
    }
}
