//! A bloom filter of live ids, sized from the standard formula and
//! serializable as a base64 bit array plus its sizing parameters.
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A counting-free bloom filter over `&[u8]` keys.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<bool>,
    num_hashes: u32,
    expected_items: usize,
    false_positive_rate: f64,
}

/// The wire format for `C.bloom`: the bit array plus the two parameters it
/// was sized from, so a filter can be reconstructed without re-deriving
/// `num_hashes` from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloomFilterData {
    /// Base64-encoded bit array, one byte per 8 bits.
    pub bits_base64: String,
    /// Total number of bits in the filter.
    pub num_bits: usize,
    /// Number of hash functions used per insert/lookup.
    pub num_hashes: u32,
    /// The capacity the filter was sized for.
    pub expected_items: usize,
    /// The target false-positive rate the filter was sized for.
    pub false_positive_rate: f64,
}

impl BloomFilter {
    /// Sizes a new, empty bloom filter for `expected_items` entries at a
    /// target `false_positive_rate`, using the standard formulas
    /// `m = -(n ln p) / (ln 2)^2` and `k = (m/n) ln 2`.
    pub fn with_capacity(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(f64::MIN_POSITIVE, 0.9999);
        let m = (-(n * p.ln()) / (std::f64::consts::LN_2.powi(2))).ceil().max(8.0);
        let k = ((m / n) * std::f64::consts::LN_2).round().max(1.0) as u32;
        Self {
            bits: vec![false; m as usize],
            num_hashes: k,
            expected_items,
            false_positive_rate,
        }
    }

    /// Adds `key` to the filter.
    pub fn insert(&mut self, key: &[u8]) {
        let len = self.bits.len();
        for idx in self.hash_indices(key) {
            self.bits[idx % len] = true;
        }
    }

    /// Returns `true` if `key` may have been inserted (false positives are
    /// possible, false negatives are not).
    pub fn might_contain(&self, key: &[u8]) -> bool {
        let len = self.bits.len();
        self.hash_indices(key).all(|idx| self.bits[idx % len])
    }

    fn hash_indices(&self, key: &[u8]) -> impl Iterator<Item = usize> + '_ {
        let h1 = hash_with_seed(key, 0);
        let h2 = hash_with_seed(key, 1);
        (0..self.num_hashes).map(move |i| h1.wrapping_add((i as u64).wrapping_mul(h2)) as usize)
    }

    /// Serializes the filter to the wire format stored in `C.bloom`.
    pub fn to_data(&self) -> BloomFilterData {
        let mut bytes = vec![0u8; (self.bits.len() + 7) / 8];
        for (i, bit) in self.bits.iter().enumerate() {
            if *bit {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        BloomFilterData {
            bits_base64: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes),
            num_bits: self.bits.len(),
            num_hashes: self.num_hashes,
            expected_items: self.expected_items,
            false_positive_rate: self.false_positive_rate,
        }
    }

    /// Reconstructs a filter from its wire format.
    pub fn from_data(data: &BloomFilterData) -> Result<Self, base64::DecodeError> {
        let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &data.bits_base64)?;
        let mut bits = vec![false; data.num_bits];
        for i in 0..data.num_bits {
            if bytes.get(i / 8).map_or(false, |b| b & (1 << (i % 8)) != 0) {
                bits[i] = true;
            }
        }
        Ok(Self {
            bits,
            num_hashes: data.num_hashes,
            expected_items: data.expected_items,
            false_positive_rate: data.false_positive_rate,
        })
    }
}

fn hash_with_seed(key: &[u8], seed: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    key.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_keys_are_always_found() {
        let mut filter = BloomFilter::with_capacity(1000, 0.01);
        let keys: Vec<String> = (0..1000).map(|i| format!("key-{}", i)).collect();
        for k in &keys {
            filter.insert(k.as_bytes());
        }
        for k in &keys {
            assert!(filter.might_contain(k.as_bytes()));
        }
    }

    #[test]
    fn false_positive_rate_is_roughly_bounded() {
        let mut filter = BloomFilter::with_capacity(1000, 0.01);
        for i in 0..1000 {
            filter.insert(format!("present-{}", i).as_bytes());
        }
        let mut false_positives = 0;
        let trials = 5000;
        for i in 0..trials {
            if filter.might_contain(format!("absent-{}", i).as_bytes()) {
                false_positives += 1;
            }
        }
        let rate = false_positives as f64 / trials as f64;
        assert!(rate < 0.05, "false positive rate too high: {}", rate);
    }

    #[test]
    fn round_trips_through_wire_format() {
        let mut filter = BloomFilter::with_capacity(100, 0.05);
        filter.insert(b"alice");
        let data = filter.to_data();
        let restored = BloomFilter::from_data(&data).unwrap();
        assert!(restored.might_contain(b"alice"));
        assert!(!restored.might_contain(b"this-key-was-never-inserted"));
    }
}
