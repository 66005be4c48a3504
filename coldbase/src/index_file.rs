//! The byte-offset index `C.idx`, valid only when zero mutation blobs exist
//! for the collection (I6). Offsets and lengths are in bytes, the Open
//! Question resolution recorded in `SPEC_FULL.md`.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The byte span of one live record's NDJSON line inside `C.jsonl`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Byte offset of the line's first byte.
    pub offset: u64,
    /// Length of the line in bytes, not including the trailing newline.
    pub length: u64,
}

/// The complete byte-offset index over one collection's snapshot. Tombstoned
/// ids are omitted entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotIndex {
    entries: HashMap<String, IndexEntry>,
}

impl SnapshotIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the span of a live id, overwriting any prior entry.
    pub fn insert(&mut self, id: String, entry: IndexEntry) {
        self.entries.insert(id, entry);
    }

    /// Looks up the span of a live id.
    pub fn get(&self, id: &str) -> Option<IndexEntry> {
        self.entries.get(id).copied()
    }

    /// The number of live ids tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no ids are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the index to the wire format stored in `C.idx`.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("a SnapshotIndex always serializes")
    }

    /// Parses an index from its wire format.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_wire_format() {
        let mut index = SnapshotIndex::new();
        index.insert("a".to_string(), IndexEntry { offset: 0, length: 10 });
        index.insert("b".to_string(), IndexEntry { offset: 11, length: 20 });
        let bytes = index.to_bytes();
        let restored = SnapshotIndex::from_bytes(&bytes).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get("a").unwrap().offset, 0);
        assert_eq!(restored.get("b").unwrap().length, 20);
        assert!(restored.get("c").is_none());
    }
}
