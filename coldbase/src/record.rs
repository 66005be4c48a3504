//! The wire format shared by snapshot lines and mutation batches: a record
//! is `[id, data, ts]`, serialized as a JSON array rather than an object so
//! that NDJSON lines stay compact.
use serde::de::{self, Deserializer};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single persisted record: an id, its data (`None` for a tombstone), and
/// the monotonic millisecond timestamp it was written at.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The record's id. Matches the outer `id` of `data` when `data` is
    /// present.
    pub id: String,
    /// The record's data, or `None` if this is a tombstone.
    pub data: Option<Value>,
    /// Monotonic millisecond timestamp assigned at write time.
    pub ts: u64,
}

impl Record {
    /// Creates a live record.
    pub fn new(id: impl Into<String>, data: Value, ts: u64) -> Self {
        Self {
            id: id.into(),
            data: Some(data),
            ts,
        }
    }

    /// Creates a tombstone for `id`.
    pub fn tombstone(id: impl Into<String>, ts: u64) -> Self {
        Self {
            id: id.into(),
            data: None,
            ts,
        }
    }

    /// Returns `true` if this record marks its id as deleted.
    pub fn is_tombstone(&self) -> bool {
        self.data.is_none()
    }

    /// Encodes the record as a single NDJSON line (no trailing newline).
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).expect("a Record always serializes")
    }

    /// Parses a single NDJSON line. Older two-element `[id, data]` lines
    /// (written before `ts` existed) are accepted with `ts` defaulting to 0.
    pub fn parse_line(line: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(line)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(3)?;
        tup.serialize_element(&self.id)?;
        tup.serialize_element(&self.data)?;
        tup.serialize_element(&self.ts)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let elems = Vec::<Value>::deserialize(deserializer)?;
        let mut iter = elems.into_iter();
        let id = match iter.next() {
            Some(Value::String(s)) => s,
            Some(_) => return Err(de::Error::custom("record id must be a string")),
            None => return Err(de::Error::custom("record is missing an id")),
        };
        let data = match iter.next() {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        };
        let ts = iter.next().and_then(|v| v.as_u64()).unwrap_or(0);
        Ok(Record { id, data, ts })
    }
}

/// Validates a collection name against `^[A-Za-z0-9][A-Za-z0-9_-]*$`,
/// length 1-64, so that it can never collide with the `.jsonl`,
/// `.mutation.`, `.lock`, `.idx` or `.bloom` suffixes used for a
/// collection's blobs.
pub fn validate_collection_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 64 {
        return Err(format!(
            "collection name must be 1-64 bytes long, got {}",
            name.len()
        ));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphanumeric() {
        return Err(format!(
            "collection name must start with a letter or digit, got '{}'",
            first
        ));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-')) {
        return Err(format!(
            "collection name contains disallowed character '{}'",
            bad
        ));
    }
    Ok(())
}

/// Encodes a mutation batch: a JSON array of one or more records, written
/// atomically as a single blob.
pub fn encode_mutation_batch(records: &[Record]) -> Vec<u8> {
    serde_json::to_vec(records).expect("a mutation batch always serializes")
}

/// Decodes a mutation batch blob body into its records.
pub fn decode_mutation_batch(body: &[u8]) -> serde_json::Result<Vec<Record>> {
    serde_json::from_slice(body)
}
