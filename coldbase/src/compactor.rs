//! The compactor: merging mutation blobs into the snapshot (§4.2), deduping
//! and garbage-collecting the snapshot (§4.3), and rebuilding the index and
//! bloom filter (§4.4). Both operations run under the lease lock.
use crate::config::CollectionConfig;
use crate::record::{decode_mutation_batch, Record};
use crate::{Error, Result};
use coldbase_store::bloom::BloomFilter;
use coldbase_store::lock::LeaseLock;
use coldbase_store::lru::Lru;
use coldbase_store::stream_utils::{bounded_for_each, split_lines};
use coldbase_store::BlobStore;
use log::{debug, warn};
use std::collections::HashSet;
use std::time::Instant;

/// The outcome of a successful [`compact`].
#[derive(Debug, Clone, Default)]
pub struct CompactResult {
    /// Number of mutation blobs merged into the snapshot.
    pub mutations_processed: usize,
    /// Wall-clock duration of the whole operation.
    pub duration_ms: u64,
    /// Whether the index was rebuilt (false only if `useIndex` is disabled).
    pub index_built: bool,
    /// Whether the bloom filter was rebuilt (false only if `useBloomFilter`
    /// is disabled).
    pub bloom_built: bool,
}

/// The outcome of a successful [`vacuum`].
#[derive(Debug, Clone, Default)]
pub struct VacuumResult {
    /// Number of snapshot lines dropped (duplicates and tombstones).
    pub records_removed: usize,
    /// Wall-clock duration of the whole operation.
    pub duration_ms: u64,
}

/// Merges every currently visible `C.mutation.*` blob into `C.jsonl` and
/// deletes them, then rebuilds the index and bloom filter. Acquires and
/// releases the lease lock internally.
pub async fn compact(
    store: &dyn BlobStore,
    config: &CollectionConfig,
    session_id: &str,
) -> Result<CompactResult> {
    let started = Instant::now();
    let lock = LeaseLock::new(store, config.lock_key());
    let file_size = store.size(&config.snapshot_key()).await?.unwrap_or(0);
    let mutation_count = store.list_all(&config.mutation_prefix()).await?.len();
    let lease = lock
        .acquire(session_id, config.lease_options(), file_size, mutation_count)
        .await?;

    let result = run_compaction(store, config).await;
    lock.release(lease).await;

    let mut result = result?;
    result.duration_ms = started.elapsed().as_millis() as u64;
    debug!(
        "compacted {}: {} mutations merged in {}ms",
        config.name(),
        result.mutations_processed,
        result.duration_ms
    );
    Ok(result)
}

async fn run_compaction(store: &dyn BlobStore, config: &CollectionConfig) -> Result<CompactResult> {
    let mut mutations_processed = 0;
    loop {
        let keys = store.list_all(&config.mutation_prefix()).await?;
        if keys.is_empty() {
            break;
        }

        let bodies = bounded_for_each(keys.clone(), config.parallelism(), |key| {
            let store = store;
            async move { (key.clone(), store.get(&key).await) }
        })
        .await;

        let mut buffer = String::new();
        for (key, body) in bodies {
            let body = match body {
                Ok(Some(blob)) => blob.body,
                Ok(None) => continue, // concurrently deleted, nothing to merge
                Err(e) => return Err(e.into()),
            };
            let records = match decode_mutation_batch(&body) {
                Ok(records) => records,
                Err(e) => {
                    warn!("skipping malformed mutation blob {}: {}", key, e);
                    Vec::new()
                }
            };
            for record in &records {
                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(&record.to_line());
                mutations_processed += 1;
            }
            if buffer.len() >= config.copy_buffer_size() {
                store.append(&config.snapshot_key(), buffer.as_bytes()).await?;
                buffer.clear();
            }
        }
        if !buffer.is_empty() {
            store.append(&config.snapshot_key(), buffer.as_bytes()).await?;
        }

        for chunk in keys.chunks(config.delete_chunk_size()) {
            store.delete(chunk).await?;
        }
    }

    let (index_built, bloom_built) = rebuild_index_and_bloom(store, config).await?;
    Ok(CompactResult {
        mutations_processed,
        duration_ms: 0,
        index_built,
        bloom_built,
    })
}

/// Dedups and garbage-collects `C.jsonl` so each live id appears at most
/// once, using a bounded LRU plus an overflow set to stay within
/// `vacuumCacheSize` memory regardless of id cardinality (§4.3, I8).
pub async fn vacuum(
    store: &dyn BlobStore,
    config: &CollectionConfig,
    session_id: &str,
) -> Result<VacuumResult> {
    let started = Instant::now();
    let lock = LeaseLock::new(store, config.lock_key());
    let file_size = store.size(&config.snapshot_key()).await?.unwrap_or(0);
    // vacuum makes two passes over the snapshot, so its lease runs roughly
    // 2x a compaction's estimate for the same file size.
    let lease = lock
        .acquire(session_id, config.lease_options(), file_size * 2, 0)
        .await?;

    let result = run_vacuum(store, config).await;
    lock.release(lease).await;

    let mut result = result?;
    result.duration_ms = started.elapsed().as_millis() as u64;
    debug!(
        "vacuumed {}: {} records removed in {}ms",
        config.name(),
        result.records_removed,
        result.duration_ms
    );
    Ok(result)
}

#[derive(Clone, Copy)]
struct LruEntry {
    line_num: u64,
    deleted: bool,
}

async fn run_vacuum(store: &dyn BlobStore, config: &CollectionConfig) -> Result<VacuumResult> {
    let snapshot = match store.get(&config.snapshot_key()).await? {
        Some(blob) => blob.body,
        None => {
            return Ok(VacuumResult {
                records_removed: 0,
                duration_ms: 0,
            })
        }
    };

    let mut lru: Lru<String, LruEntry> = Lru::new(config.vacuum_cache_size());
    let mut overflow: HashSet<String> = HashSet::new();

    // Pass 1: track each id's last-seen line and whether it was a tombstone.
    for (line_num, line) in split_lines(&snapshot).enumerate() {
        let record = match Record::parse_line(line.bytes) {
            Ok(record) => record,
            Err(_) => continue,
        };
        if let Some((evicted_id, _)) = lru.insert(
            record.id.clone(),
            LruEntry {
                line_num: line_num as u64,
                deleted: record.is_tombstone(),
            },
        ) {
            overflow.insert(evicted_id);
        }
    }

    // Pass 2: keep exactly the lines that pass 1 identified as winners.
    let mut total_lines = 0usize;
    let mut kept_lines = 0usize;
    let mut buffer = String::new();
    for (line_num, line) in split_lines(&snapshot).enumerate() {
        total_lines += 1;
        let record = match Record::parse_line(line.bytes) {
            Ok(record) => record,
            Err(_) => continue,
        };
        let keep = if overflow.contains(&record.id) {
            !record.is_tombstone()
        } else {
            match lru.get(&record.id) {
                Some(entry) => entry.line_num == line_num as u64 && !entry.deleted,
                None => false,
            }
        };
        if keep {
            if !buffer.is_empty() {
                buffer.push('\n');
            }
            buffer.push_str(std::str::from_utf8(line.bytes).unwrap_or_default());
            kept_lines += 1;
            if buffer.len() >= config.copy_buffer_size() {
                store.append(&config.snapshot_tmp_key(), buffer.as_bytes()).await?;
                buffer.clear();
            }
        }
    }
    if !buffer.is_empty() {
        store.append(&config.snapshot_tmp_key(), buffer.as_bytes()).await?;
    }

    // Swap C.jsonl.tmp into C.jsonl, streaming it back via buffered appends
    // rather than reloading the whole post-vacuum snapshot into memory.
    store.put(&config.snapshot_key(), Vec::new()).await?;
    if let Some(tmp) = store.get(&config.snapshot_tmp_key()).await? {
        for chunk in tmp.body.chunks(config.copy_buffer_size()) {
            store.append(&config.snapshot_key(), chunk).await?;
        }
    }
    store
        .delete(&[config.snapshot_tmp_key()])
        .await?;

    rebuild_index_and_bloom(store, config).await?;

    Ok(VacuumResult {
        records_removed: total_lines.saturating_sub(kept_lines),
        duration_ms: 0,
    })
}

/// Rebuilds `C.idx` and `C.bloom` in a single streaming pass over
/// `C.jsonl`, per §4.4. Returns which of the two artifacts were written.
pub async fn rebuild_index_and_bloom(
    store: &dyn BlobStore,
    config: &CollectionConfig,
) -> Result<(bool, bool)> {
    if !config.use_index() && !config.use_bloom_filter() {
        return Ok((false, false));
    }
    let snapshot = match store.get(&config.snapshot_key()).await? {
        Some(blob) => blob.body,
        None => Vec::new(),
    };

    let mut index = crate::index_file::SnapshotIndex::new();
    let bloom_cfg = config.bloom();
    let mut bloom = BloomFilter::with_capacity(bloom_cfg.expected_items, bloom_cfg.false_positive_rate);

    for line in split_lines(&snapshot) {
        let record = match Record::parse_line(line.bytes) {
            Ok(record) => record,
            Err(_) => continue,
        };
        if record.is_tombstone() {
            continue;
        }
        if config.use_index() {
            index.insert(
                record.id.clone(),
                crate::index_file::IndexEntry {
                    offset: line.offset as u64,
                    length: line.length as u64,
                },
            );
        }
        if config.use_bloom_filter() {
            bloom.insert(record.id.as_bytes());
        }
    }

    if config.use_index() {
        store.put(&config.index_key(), index.to_bytes()).await?;
    }
    if config.use_bloom_filter() {
        let data = bloom.to_data();
        let body = serde_json::to_vec(&data).map_err(|e| Error::Engine(e.to_string()))?;
        store.put(&config.bloom_key(), body).await?;
    }
    Ok((config.use_index(), config.use_bloom_filter()))
}
