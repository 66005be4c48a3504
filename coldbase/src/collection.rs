//! The collection read/write engine: `put`/`delete`/`batch` funnel into
//! `_writeMutations` (§4.5); `get`/`get_many`/`find`/`count`/`read` funnel
//! into a single internal async iterator over snapshot + pending mutations
//! (§4.6).
use crate::config::CollectionConfig;
use crate::maintenance;
use crate::record::{decode_mutation_batch, encode_mutation_batch, Record};
use crate::retry::retry_with_backoff;
use crate::{Error, Result};
use coldbase_store::bloom::{BloomFilter, BloomFilterData};
use coldbase_store::stream_utils::{bounded_for_each, split_lines};
use coldbase_store::timestamp::{timestamp_now, MonotonicClock};
use coldbase_store::BlobStore;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::index_file::SnapshotIndex;

/// Builds up the ops of one atomic mutation batch inside a [`Collection::batch`]
/// call.
#[derive(Default)]
pub struct BatchBuilder {
    items: Vec<(String, Option<Value>)>,
}

impl BatchBuilder {
    /// Adds a `put` to the batch. `data` must contain a string `id` field
    /// matching `data["id"]`.
    pub fn put(&mut self, data: Value) -> Result<&mut Self> {
        let id = extract_id(&data)?;
        self.items.push((id, Some(data)));
        Ok(self)
    }

    /// Adds a `delete` (tombstone write) to the batch.
    pub fn delete(&mut self, id: impl Into<String>) -> &mut Self {
        self.items.push((id.into(), None));
        self
    }
}

fn extract_id(data: &Value) -> Result<String> {
    data.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Validation("record data must contain a string \"id\" field".into()))
}

/// Options for [`Collection::find`].
#[derive(Default)]
pub struct FindOptions<'a> {
    /// Keep only records whose fields match every field of `where_`.
    pub where_: Option<&'a Value>,
    /// Keep only records for which `filter` returns `true`.
    pub filter: Option<&'a dyn Fn(&Value) -> bool>,
    /// Skip this many matches before collecting results.
    pub offset: usize,
    /// Keep at most this many matches.
    pub limit: Option<usize>,
    /// Time-travel bound: ignore mutations with a larger `ts`.
    pub at: Option<u64>,
}

/// The read/write engine for a single collection, holding the process-local
/// caches described in §5: `cachedIndex`, `cachedBloomFilter` and
/// `cachedMainFileContent`, invalidated synchronously on every local write.
pub struct Collection {
    store: Arc<dyn BlobStore>,
    config: Arc<CollectionConfig>,
    clock: MonotonicClock,
    session_id: String,
    cached_snapshot: AsyncMutex<Option<Vec<u8>>>,
    cached_index: AsyncMutex<Option<SnapshotIndex>>,
    cached_bloom: AsyncMutex<Option<BloomFilter>>,
    // Whether zero mutation blobs were pending the last time this was
    // checked. Populated by one `list` call on first use after open or after
    // a local write, then trusted until the next `invalidate_caches()` (I6:
    // valid at the moment of load).
    cached_mutation_free: AsyncMutex<Option<bool>>,
}

impl Collection {
    /// Opens a collection against `store` with the given configuration. Does
    /// not touch storage until the first read or write.
    pub fn open(store: Arc<dyn BlobStore>, config: CollectionConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            clock: MonotonicClock::default(),
            session_id: Uuid::new_v4().to_string(),
            cached_snapshot: AsyncMutex::new(None),
            cached_index: AsyncMutex::new(None),
            cached_bloom: AsyncMutex::new(None),
            cached_mutation_free: AsyncMutex::new(None),
        }
    }

    /// The collection's configuration.
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Writes a single record. `data` must contain a string `id` field equal
    /// to the outer id.
    pub async fn put(&self, data: Value) -> Result<()> {
        let id = extract_id(&data)?;
        self.write_mutations(vec![(id, Some(data))]).await?;
        Ok(())
    }

    /// Writes a tombstone for `id`.
    pub async fn delete(&self, id: impl Into<String>) -> Result<()> {
        self.write_mutations(vec![(id.into(), None)]).await?;
        Ok(())
    }

    /// Runs `f` against a [`BatchBuilder`] and writes every queued op as one
    /// atomic mutation blob sharing a single `ts` (L5).
    pub async fn batch<F>(&self, f: F) -> Result<usize>
    where
        F: FnOnce(&mut BatchBuilder) -> Result<()>,
    {
        let mut builder = BatchBuilder::default();
        f(&mut builder)?;
        if builder.items.is_empty() {
            return Ok(0);
        }
        self.write_mutations(builder.items).await
    }

    async fn write_mutations(&self, items: Vec<(String, Option<Value>)>) -> Result<usize> {
        let ts = self.clock.next().await;
        let records: Vec<Record> = items
            .into_iter()
            .map(|(id, data)| Record { id, data, ts })
            .collect();
        let body = encode_mutation_batch(&records);
        if body.len() > self.config.max_mutation_size() {
            return Err(Error::SizeLimit {
                size: body.len(),
                max: self.config.max_mutation_size(),
            });
        }

        let store = self.store.clone();
        let prefix = self.config.mutation_prefix();
        let attempt = move || {
            let store = store.clone();
            let key = format!("{}{}-{}", prefix, ts, Uuid::new_v4());
            let body = body.clone();
            async move { store.put(&key, body).await }
        };
        match self.config.retry_options() {
            Some(options) => retry_with_backoff(options, attempt).await?,
            None => attempt().await?,
        }

        self.invalidate_caches().await;
        debug!("wrote {} record(s) to {}", records.len(), self.config.name());

        let mutation_count_hint = self
            .store
            .list_all(&self.config.mutation_prefix())
            .await
            .map(|keys| keys.len())
            .unwrap_or(0);
        maintenance::after_write(
            self.store.clone(),
            self.config.clone(),
            self.session_id.clone(),
            mutation_count_hint,
        );

        Ok(records.len())
    }

    async fn invalidate_caches(&self) {
        *self.cached_snapshot.lock().await = None;
        *self.cached_index.lock().await = None;
        *self.cached_bloom.lock().await = None;
        *self.cached_mutation_free.lock().await = None;
    }

    /// Whether zero mutation blobs were pending the last time this was
    /// checked, issuing at most one `list` call between writes (P5).
    async fn mutation_free_at_load(&self) -> Result<bool> {
        let mut cached = self.cached_mutation_free.lock().await;
        if cached.is_none() {
            let count = self.store.list_all(&self.config.mutation_prefix()).await?.len();
            *cached = Some(count == 0);
        }
        Ok(cached.unwrap_or(false))
    }

    async fn snapshot_body(&self) -> Result<Vec<u8>> {
        let mut cached = self.cached_snapshot.lock().await;
        if cached.is_none() {
            let body = match self.store.get(&self.config.snapshot_key()).await? {
                Some(blob) => blob.body,
                None => Vec::new(),
            };
            *cached = Some(body);
        }
        Ok(cached.clone().unwrap_or_default())
    }

    async fn load_index(&self) -> Result<Option<SnapshotIndex>> {
        let mut cached = self.cached_index.lock().await;
        if cached.is_none() {
            if let Some(blob) = self.store.get(&self.config.index_key()).await? {
                *cached = SnapshotIndex::from_bytes(&blob.body).ok();
            }
        }
        Ok(cached.clone())
    }

    async fn load_bloom(&self) -> Result<Option<BloomFilter>> {
        let mut cached = self.cached_bloom.lock().await;
        if cached.is_none() {
            if let Some(blob) = self.store.get(&self.config.bloom_key()).await? {
                if let Ok(data) = serde_json::from_slice::<BloomFilterData>(&blob.body) {
                    *cached = BloomFilter::from_data(&data).ok();
                }
            }
        }
        Ok(cached.clone())
    }

    /// Streams every record visible to this collection: snapshot lines
    /// first, then pending mutation blobs in listing order. `at`, if set,
    /// bounds the read to records with `ts <= at` (used for time-travel
    /// reads and to let vector search and `find` share one pass).
    pub async fn read(&self, at: Option<u64>) -> Result<Vec<Record>> {
        // Snapshot the mutation keys before touching C.jsonl, so a
        // concurrent compaction deleting a mutation blob mid-iteration can
        // never make us miss a record that was visible when we started.
        let mutation_keys = self.store.list_all(&self.config.mutation_prefix()).await?;

        let mut out = Vec::new();
        let snapshot = self.snapshot_body().await?;
        for line in split_lines(&snapshot) {
            if let Ok(record) = Record::parse_line(line.bytes) {
                out.push(record);
            }
        }

        for chunk in mutation_keys.chunks(50) {
            let chunk: Vec<String> = chunk.to_vec();
            let store = self.store.clone();
            let prefix = self.config.mutation_prefix();
            let results = bounded_for_each(chunk, 10, move |key| {
                let store = store.clone();
                let mutation_ts = mutation_key_ts(&key, &prefix);
                async move {
                    if let (Some(at), Some(mutation_ts)) = (at, mutation_ts) {
                        if mutation_ts > at {
                            return Ok(None);
                        }
                    }
                    store.get(&key).await
                }
            })
            .await;
            for result in results {
                match result {
                    Ok(Some(blob)) => {
                        if let Ok(records) = decode_mutation_batch(&blob.body) {
                            for record in records {
                                if at.map_or(false, |at| record.ts > at) {
                                    continue;
                                }
                                out.push(record);
                            }
                        }
                    }
                    Ok(None) => continue, // compaction removed it concurrently
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(out)
    }

    /// Resolves the current value of `id`, or `None` if absent, tombstoned,
    /// or TTL-expired. Uses the bloom filter and byte-offset index fast
    /// paths when `at` is unset and no mutation is pending (I6).
    pub async fn get(&self, id: &str, at: Option<u64>) -> Result<Option<Value>> {
        if at.is_none() && self.mutation_free_at_load().await? {
            if self.config.use_bloom_filter() {
                if let Some(bloom) = self.load_bloom().await? {
                    if !bloom.might_contain(id.as_bytes()) {
                        return Ok(None);
                    }
                }
            }
            if self.config.use_index() {
                if let Some(index) = self.load_index().await? {
                    return Ok(match index.get(id) {
                        Some(entry) => {
                            let snapshot = self.snapshot_body().await?;
                            let start = entry.offset as usize;
                            let end = start + entry.length as usize;
                            if end <= snapshot.len() {
                                Record::parse_line(&snapshot[start..end])
                                    .ok()
                                    .and_then(|record| self.finalize(record))
                            } else {
                                None
                            }
                        }
                        None => None,
                    });
                }
            }
        }
        let records = self.read(at).await?;
        let latest = latest_by_id(records);
        Ok(latest.get(id).cloned().and_then(|record| self.finalize(record)))
    }

    /// Resolves the current value of every id in `ids` in a single `read()`
    /// pass.
    pub async fn get_many(&self, ids: &[String]) -> Result<HashMap<String, Value>> {
        let wanted: std::collections::HashSet<&str> = ids.iter().map(String::as_str).collect();
        let records = self.read(None).await?;
        let latest = latest_by_id(records);
        let mut out = HashMap::new();
        for (id, record) in latest {
            if wanted.contains(id.as_str()) {
                if let Some(data) = self.finalize(record) {
                    out.insert(id, data);
                }
            }
        }
        Ok(out)
    }

    /// Builds the latest-per-id map from `read(at)`, filters by
    /// `where`/`filter`, skips `offset`, then truncates to `limit`.
    pub async fn find(&self, options: FindOptions<'_>) -> Result<Vec<Value>> {
        let records = self.read(options.at).await?;
        let latest = latest_by_id(records);
        let mut matches: Vec<Value> = latest
            .into_values()
            .filter_map(|record| self.finalize(record))
            .filter(|data| options.where_.map_or(true, |w| matches_where(data, w)))
            .filter(|data| options.filter.map_or(true, |f| f(data)))
            .collect();
        if options.offset >= matches.len() {
            matches.clear();
        } else {
            matches.drain(0..options.offset);
        }
        if let Some(limit) = options.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    /// `find` without a predicate, returning only the count.
    pub async fn count(&self, at: Option<u64>) -> Result<usize> {
        self.find(FindOptions {
            at,
            ..Default::default()
        })
        .await
        .map(|matches| matches.len())
    }

    /// Writes a tombstone for every currently-expired id. Physical removal
    /// from the snapshot still requires a subsequent vacuum.
    pub async fn delete_expired(&self) -> Result<usize> {
        let ttl_field = match self.config.ttl_field() {
            Some(field) => field.to_string(),
            None => return Ok(0),
        };
        let now = timestamp_now();
        let records = self.read(None).await?;
        let latest = latest_by_id(records);
        let mut expired = Vec::new();
        for (id, record) in latest {
            if record.is_tombstone() {
                continue;
            }
            if let Some(data) = &record.data {
                if data.get(&ttl_field).and_then(Value::as_u64).map_or(false, |exp| exp < now) {
                    expired.push(id);
                }
            }
        }
        if expired.is_empty() {
            return Ok(0);
        }
        let items: Vec<(String, Option<Value>)> = expired.iter().cloned().map(|id| (id, None)).collect();
        self.write_mutations(items).await?;
        Ok(expired.len())
    }

    /// Drops tombstones, TTL-expired records, and unwraps live data.
    pub(crate) fn finalize(&self, record: Record) -> Option<Value> {
        if record.is_tombstone() {
            return None;
        }
        let data = record.data?;
        if self.is_expired(&data) {
            return None;
        }
        Some(data)
    }

    fn is_expired(&self, data: &Value) -> bool {
        match self.config.ttl_field() {
            Some(field) => data
                .get(field)
                .and_then(Value::as_u64)
                .map_or(false, |exp| exp < timestamp_now()),
            None => false,
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }
}

fn mutation_key_ts(key: &str, prefix: &str) -> Option<u64> {
    key.strip_prefix(prefix)?.split('-').next()?.parse().ok()
}

/// Reduces a stream of records to the latest-per-id map by `ts`, per I2:
/// last-write-wins including across snapshot and mutations, regardless of
/// stream order.
pub(crate) fn latest_by_id(records: Vec<Record>) -> HashMap<String, Record> {
    let mut latest: HashMap<String, Record> = HashMap::with_capacity(records.len());
    for record in records {
        match latest.get(&record.id) {
            Some(existing) if existing.ts >= record.ts => {}
            _ => {
                latest.insert(record.id.clone(), record);
            }
        }
    }
    latest
}

/// Partial-object equality match: `data` matches `where_` iff every field of
/// `where_` is present in `data` with an equal value.
pub(crate) fn matches_where(data: &Value, where_: &Value) -> bool {
    let (Value::Object(data), Value::Object(where_)) = (data, where_) else {
        return false;
    };
    where_.iter().all(|(key, value)| data.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldbase_store::backends::MemoryBlobStore;
    use serde_json::json;

    fn collection() -> Collection {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let config = CollectionConfig::new("users").unwrap().with_auto_compact(crate::config::MaintenancePolicy::Disabled).with_auto_vacuum(crate::config::MaintenancePolicy::Disabled, 0.0);
        Collection::open(store, config)
    }

    #[tokio::test]
    async fn basic_put_get_delete() {
        let c = collection();
        c.put(json!({"id": "1", "name": "Alice"})).await.unwrap();
        assert_eq!(c.get("1", None).await.unwrap(), Some(json!({"id": "1", "name": "Alice"})));
        c.delete("1").await.unwrap();
        assert_eq!(c.get("1", None).await.unwrap(), None);
        assert_eq!(c.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn last_write_wins_across_snapshot_and_mutation() {
        let c = collection();
        c.store()
            .put(&c.config().snapshot_key(), br#"["1",{"id":"1","v":1},100]"#.to_vec())
            .await
            .unwrap();
        c.invalidate_caches().await;
        c.write_mutations(vec![("1".to_string(), Some(json!({"id": "1", "v": 2})))])
            .await
            .unwrap();
        assert_eq!(c.get("1", None).await.unwrap(), Some(json!({"id": "1", "v": 2})));
    }

    #[tokio::test]
    async fn ttl_filters_expired_records() {
        let c_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let config = CollectionConfig::new("sessions")
            .unwrap()
            .with_ttl_field("exp")
            .with_auto_compact(crate::config::MaintenancePolicy::Disabled)
            .with_auto_vacuum(crate::config::MaintenancePolicy::Disabled, 0.0);
        let c = Collection::open(c_store, config);
        let now = timestamp_now();
        c.put(json!({"id": "a", "exp": now - 1000})).await.unwrap();
        c.put(json!({"id": "b", "exp": now + 100_000})).await.unwrap();
        assert_eq!(c.get("a", None).await.unwrap(), None);
        assert!(c.get("b", None).await.unwrap().is_some());
        assert_eq!(c.count(None).await.unwrap(), 1);
        assert_eq!(c.delete_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn batch_shares_one_timestamp() {
        let c = collection();
        c.batch(|b| {
            b.put(json!({"id": "1"}))?;
            b.put(json!({"id": "2"}))?;
            Ok(())
        })
        .await
        .unwrap();
        let records = c.read(None).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ts, records[1].ts);
    }
}
