//! # Blob store contract and log-structured storage primitives for Coldbase.
//!
//! This crate defines the [`BlobStore`] trait, the conditional-write
//! contract every cloud object store (S3, Azure Blob, GCS) and every local
//! reference backend must satisfy, plus the primitives the higher-level
//! `coldbase` crate builds a document database on top of:
//!
//!   - a lease-based distributed lock over a single blob ([`lock`])
//!   - monotonic millisecond timestamps for last-write-wins conflicts
//!     ([`timestamp`])
//!   - a bloom filter of live ids ([`bloom`])
//!   - a bounded LRU used by vacuum to dedup without unbounded memory
//!     ([`lru`])
//!   - an NDJSON line splitter and a bounded-parallelism fan-out helper
//!     ([`stream_utils`])
//!
//! Two reference [`BlobStore`] implementations are provided in [`backends`]:
//! an in-memory store for tests, and a local-filesystem store for running a
//! single Coldbase process against a local directory.
#![deny(unsafe_code)]

pub mod backends;
pub mod blob_store;
pub mod bloom;
pub mod lock;
pub mod lru;
pub mod stream_utils;
pub mod timestamp;

pub use blob_store::{Blob, BlobStore, Error, ListPage, Result, Version};
