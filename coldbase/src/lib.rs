//! Coldbase: a serverless-first, log-structured document database built
//! directly on a [`coldbase_store::BlobStore`].
//!
//! A [`Collection`] is a named set of JSON documents persisted as an
//! append-only mutation log plus a periodically compacted snapshot
//! (`C.jsonl`). Reads merge the snapshot with any pending mutations and
//! resolve conflicts by last-write-wins on a process-local monotonic
//! timestamp. [`maintenance::after_write`] triggers compaction and vacuum in
//! the background according to each collection's [`config::MaintenancePolicy`].
//! [`vector::VectorCollection`] adds brute-force similarity search on top of
//! the same storage model.
#![deny(unsafe_code)]

pub mod collection;
pub mod config;
mod index_file;
mod maintenance;
mod record;
mod retry;
mod compactor;
pub mod vector;

pub use collection::{BatchBuilder, Collection, FindOptions};
pub use compactor::{compact, vacuum, CompactResult, VacuumResult};
pub use config::{BloomConfig, CollectionConfig, MaintenancePolicy};
pub use record::Record;
pub use retry::{retry_with_backoff, RetryOptions};
pub use vector::{Metric, SearchHit, SearchOptions, VectorCollection, VectorConfig};

use std::fmt;

/// A specialized `Result` type for Coldbase operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for Coldbase operations, spanning collection-level
/// validation, storage contract violations, and the wrapped errors of the
/// underlying blob store and lease lock.
#[derive(Debug)]
pub enum Error {
    /// A record or query failed validation (bad id, bad `where` clause, ...).
    Validation(String),
    /// A mutation batch exceeded `maxMutationSize`.
    SizeLimit { size: usize, max: usize },
    /// A vector write or query did not match the collection's configured
    /// dimension.
    VectorDimension { expected: usize, got: usize },
    /// A vector write or query contained a non-finite or non-numeric
    /// element.
    InvalidVector(String),
    /// The maintenance lease is held by another session.
    LockActive,
    /// A conditional write lost its race.
    PreconditionFailed,
    /// The underlying blob store failed.
    Store(coldbase_store::Error),
    /// Any other failure (serialization, a malformed on-disk artifact),
    /// carried as a message rather than a typed variant.
    Engine(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "validation error: {}", msg),
            Error::SizeLimit { size, max } => {
                write!(f, "mutation batch of {} bytes exceeds the {} byte limit", size, max)
            }
            Error::VectorDimension { expected, got } => {
                write!(f, "expected a {}-dimensional vector, got {}", expected, got)
            }
            Error::InvalidVector(msg) => write!(f, "invalid vector: {}", msg),
            Error::LockActive => write!(f, "maintenance lock is held by another session"),
            Error::PreconditionFailed => write!(f, "conditional write failed its precondition"),
            Error::Store(e) => write!(f, "blob store error: {}", e),
            Error::Engine(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<coldbase_store::Error> for Error {
    fn from(e: coldbase_store::Error) -> Self {
        match e {
            coldbase_store::Error::PreconditionFailed => Error::PreconditionFailed,
            other => Error::Store(other),
        }
    }
}

impl From<coldbase_store::lock::Error> for Error {
    fn from(e: coldbase_store::lock::Error) -> Self {
        match e {
            coldbase_store::lock::Error::LockActive => Error::LockActive,
            coldbase_store::lock::Error::Store(store_err) => Error::from(store_err),
        }
    }
}
