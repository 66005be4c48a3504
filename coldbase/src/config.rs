//! Per-collection configuration, declared up front at construction time
//! (§9 design notes: "prefer the constructor form") rather than through
//! mutable setters, so that reads and writes against one [`crate::Collection`]
//! always see a consistent policy.
use crate::record::validate_collection_name;
use crate::retry::RetryOptions;
use coldbase_store::lock::LeaseOptions;

/// How a maintenance operation (compaction or vacuum) is triggered after a
/// write, see §4.7.
#[derive(Debug, Clone)]
pub enum MaintenancePolicy {
    /// Never run automatically.
    Disabled,
    /// Run unconditionally after every write.
    Always,
    /// Run with probability `probability`, additionally gated on
    /// `mutation_threshold` pending mutation blobs when it is nonzero.
    /// Retries up to `max_retries` times on failure (excluding
    /// `LockActiveError`, which is skipped silently) with exponential
    /// backoff starting at `retry_delay_ms`.
    Probabilistic {
        /// Roll threshold in `[0, 1]`.
        probability: f64,
        /// Minimum number of currently listed mutation blobs required to
        /// fire, or `0` to disable the threshold gate.
        mutation_threshold: usize,
        /// Retry attempts after the first failed run.
        max_retries: u32,
        /// Base delay before the first retry.
        retry_delay_ms: u64,
    },
}

impl MaintenancePolicy {
    /// The recommended serverless preset for `autoCompact`.
    pub fn recommended_compact() -> Self {
        MaintenancePolicy::Probabilistic {
            probability: 0.10,
            mutation_threshold: 5,
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }

    /// The recommended serverless preset for `autoVacuum`.
    pub fn recommended_vacuum() -> Self {
        MaintenancePolicy::Probabilistic {
            probability: 0.01,
            mutation_threshold: 0,
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

/// Bloom filter sizing parameters.
#[derive(Debug, Clone)]
pub struct BloomConfig {
    /// The number of ids the filter is sized for.
    pub expected_items: usize,
    /// The target false-positive rate.
    pub false_positive_rate: f64,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            expected_items: 10_000,
            false_positive_rate: 0.01,
        }
    }
}

/// Fixed, immutable configuration for one collection.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    name: String,
    max_mutation_size: usize,
    ttl_field: Option<String>,
    use_index: bool,
    use_bloom_filter: bool,
    bloom: BloomConfig,
    vacuum_cache_size: usize,
    parallelism: usize,
    copy_buffer_size: usize,
    delete_chunk_size: usize,
    lease_options: LeaseOptions,
    retry_options: Option<RetryOptions>,
    auto_compact: MaintenancePolicy,
    auto_vacuum: MaintenancePolicy,
    after_compact_probability: f64,
}

impl CollectionConfig {
    /// Validates `name` and creates a config with the recommended serverless
    /// defaults described in §4.7.
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        validate_collection_name(&name)?;
        Ok(Self {
            name,
            max_mutation_size: 10_000_000,
            ttl_field: None,
            use_index: true,
            use_bloom_filter: true,
            bloom: BloomConfig::default(),
            vacuum_cache_size: 100_000,
            parallelism: 5,
            copy_buffer_size: 64 * 1024,
            delete_chunk_size: 100,
            lease_options: LeaseOptions::default(),
            retry_options: Some(RetryOptions::default()),
            auto_compact: MaintenancePolicy::recommended_compact(),
            auto_vacuum: MaintenancePolicy::recommended_vacuum(),
            after_compact_probability: 0.10,
        })
    }

    /// Sets the maximum serialized size of a mutation batch.
    pub fn with_max_mutation_size(mut self, bytes: usize) -> Self {
        self.max_mutation_size = bytes;
        self
    }

    /// Declares the field holding a unix-millis expiry, enabling TTL
    /// filtering on reads.
    pub fn with_ttl_field(mut self, field: impl Into<String>) -> Self {
        self.ttl_field = Some(field.into());
        self
    }

    /// Toggles the byte-offset index fast path.
    pub fn with_index(mut self, enabled: bool) -> Self {
        self.use_index = enabled;
        self
    }

    /// Toggles the bloom filter fast path and its sizing.
    pub fn with_bloom_filter(mut self, enabled: bool, bloom: BloomConfig) -> Self {
        self.use_bloom_filter = enabled;
        self.bloom = bloom;
        self
    }

    /// Sets the bounded LRU capacity vacuum uses to dedup without holding
    /// the whole id set in memory.
    pub fn with_vacuum_cache_size(mut self, entries: usize) -> Self {
        self.vacuum_cache_size = entries;
        self
    }

    /// Sets the bounded fan-out used for concurrent blob fetches.
    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = n;
        self
    }

    /// Sets the in-memory buffer size flushed via `append` during
    /// compaction/vacuum.
    pub fn with_copy_buffer_size(mut self, bytes: usize) -> Self {
        self.copy_buffer_size = bytes;
        self
    }

    /// Sets how many processed mutation keys are deleted per `delete` call.
    pub fn with_delete_chunk_size(mut self, n: usize) -> Self {
        self.delete_chunk_size = n;
        self
    }

    /// Sets the lease parameters used to acquire `C.lock`.
    pub fn with_lease_options(mut self, options: LeaseOptions) -> Self {
        self.lease_options = options;
        self
    }

    /// Sets the retry policy wrapping mutation writes, or `None` to fail
    /// fast on the first transient error.
    pub fn with_retry_options(mut self, options: Option<RetryOptions>) -> Self {
        self.retry_options = options;
        self
    }

    /// Sets the `autoCompact` policy.
    pub fn with_auto_compact(mut self, policy: MaintenancePolicy) -> Self {
        self.auto_compact = policy;
        self
    }

    /// Sets the `autoVacuum` policy and its `afterCompactProbability` roll.
    pub fn with_auto_vacuum(mut self, policy: MaintenancePolicy, after_compact_probability: f64) -> Self {
        self.auto_vacuum = policy;
        self.after_compact_probability = after_compact_probability;
        self
    }

    /// The collection's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The maximum serialized size of a mutation batch.
    pub fn max_mutation_size(&self) -> usize {
        self.max_mutation_size
    }

    /// The TTL field name, if configured.
    pub fn ttl_field(&self) -> Option<&str> {
        self.ttl_field.as_deref()
    }

    /// Whether the byte-offset index fast path is enabled.
    pub fn use_index(&self) -> bool {
        self.use_index
    }

    /// Whether the bloom filter fast path is enabled.
    pub fn use_bloom_filter(&self) -> bool {
        self.use_bloom_filter
    }

    /// The bloom filter sizing parameters.
    pub fn bloom(&self) -> &BloomConfig {
        &self.bloom
    }

    /// The bounded LRU capacity used by vacuum.
    pub fn vacuum_cache_size(&self) -> usize {
        self.vacuum_cache_size
    }

    /// The bounded fan-out used for concurrent blob fetches.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// The in-memory buffer size flushed via `append`.
    pub fn copy_buffer_size(&self) -> usize {
        self.copy_buffer_size
    }

    /// How many processed mutation keys are deleted per `delete` call.
    pub fn delete_chunk_size(&self) -> usize {
        self.delete_chunk_size
    }

    /// The lease parameters used to acquire `C.lock`.
    pub fn lease_options(&self) -> &LeaseOptions {
        &self.lease_options
    }

    /// The retry policy wrapping mutation writes.
    pub fn retry_options(&self) -> Option<&RetryOptions> {
        self.retry_options.as_ref()
    }

    /// The `autoCompact` policy.
    pub fn auto_compact(&self) -> &MaintenancePolicy {
        &self.auto_compact
    }

    /// The `autoVacuum` policy.
    pub fn auto_vacuum(&self) -> &MaintenancePolicy {
        &self.auto_vacuum
    }

    /// The probability of a follow-up vacuum after a successful auto-compact.
    pub fn after_compact_probability(&self) -> f64 {
        self.after_compact_probability
    }

    /// The `C.jsonl` snapshot blob key.
    pub fn snapshot_key(&self) -> String {
        format!("{}.jsonl", self.name)
    }

    /// The `C.jsonl.tmp` scratch blob key used by vacuum.
    pub fn snapshot_tmp_key(&self) -> String {
        format!("{}.jsonl.tmp", self.name)
    }

    /// The prefix every mutation blob of this collection shares.
    pub fn mutation_prefix(&self) -> String {
        format!("{}.mutation.", self.name)
    }

    /// The `C.lock` blob key.
    pub fn lock_key(&self) -> String {
        format!("{}.lock", self.name)
    }

    /// The `C.idx` blob key.
    pub fn index_key(&self) -> String {
        format!("{}.idx", self.name)
    }

    /// The `C.bloom` blob key.
    pub fn bloom_key(&self) -> String {
        format!("{}.bloom", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_names_up_front() {
        assert!(CollectionConfig::new("bad name").is_err());
        assert!(CollectionConfig::new("good-name_1").is_ok());
    }

    #[test]
    fn derives_blob_keys_from_the_name() {
        let config = CollectionConfig::new("users").unwrap();
        assert_eq!(config.snapshot_key(), "users.jsonl");
        assert_eq!(config.mutation_prefix(), "users.mutation.");
        assert_eq!(config.lock_key(), "users.lock");
        assert_eq!(config.index_key(), "users.idx");
        assert_eq!(config.bloom_key(), "users.bloom");
    }
}
