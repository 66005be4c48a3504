//! Brute-force vector similarity search on top of a [`Collection`] (§4.8):
//! every write is validated against a fixed dimension and, for the cosine
//! metric, L2-normalized in place; every search folds the collection down to
//! its latest live records and scores them against the query vector.
use crate::collection::{latest_by_id, matches_where, Collection};
use crate::{Error, Result};
use serde_json::Value;

/// The similarity metric a [`VectorCollection`] scores with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Cosine similarity. Vectors are L2-normalized on write and query by
    /// default, reducing this to a dot product.
    Cosine,
    /// Euclidean (L2) distance. Lower is more similar.
    Euclidean,
    /// Raw dot product, with no implicit normalization.
    DotProduct,
}

/// Fixed configuration for a [`VectorCollection`].
#[derive(Debug, Clone)]
pub struct VectorConfig {
    dimension: usize,
    metric: Metric,
    normalize: bool,
}

impl VectorConfig {
    /// Creates a config for `dimension`-length vectors scored by `metric`.
    /// Normalization defaults to `true` for [`Metric::Cosine`] and `false`
    /// otherwise.
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            dimension,
            normalize: metric == Metric::Cosine,
            metric,
        }
    }

    /// Overrides the default normalize-on-write/query behavior.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// The configured vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The configured similarity metric.
    pub fn metric(&self) -> Metric {
        self.metric
    }
}

/// Options for [`VectorCollection::search`].
#[derive(Default)]
pub struct SearchOptions<'a> {
    /// Keep at most this many results, highest-scoring first (lowest first
    /// for [`Metric::Euclidean`]).
    pub limit: Option<usize>,
    /// Drop results scoring below `threshold` (above, for euclidean
    /// distance).
    pub threshold: Option<f64>,
    /// Keep only records whose fields match every field of `where_`.
    pub where_: Option<&'a Value>,
    /// Keep only records for which `filter` returns `true`.
    pub filter: Option<&'a dyn Fn(&Value) -> bool>,
    /// Include the stored `vector` field in results (stripped by default).
    pub include_vector: bool,
    /// Time-travel bound, forwarded to the underlying read.
    pub at: Option<u64>,
}

/// One scored search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The similarity score (distance, for [`Metric::Euclidean`]).
    pub score: f64,
    /// The record's data.
    pub data: Value,
}

/// A [`Collection`] whose records carry a `vector` field of fixed dimension,
/// searchable by similarity.
pub struct VectorCollection {
    collection: Collection,
    vector: VectorConfig,
}

impl VectorCollection {
    /// Wraps `collection` with vector validation and search.
    pub fn new(collection: Collection, vector: VectorConfig) -> Self {
        Self { collection, vector }
    }

    /// The underlying collection.
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Validates `data["vector"]`, normalizes it in place if configured, and
    /// writes it.
    pub async fn put(&self, mut data: Value) -> Result<()> {
        let normalized = self.validate_and_normalize(data.get("vector"))?;
        set_vector_field(&mut data, normalized);
        self.collection.put(data).await
    }

    /// Writes a tombstone for `id`.
    pub async fn delete(&self, id: impl Into<String>) -> Result<()> {
        self.collection.delete(id).await
    }

    fn validate_and_normalize(&self, vector: Option<&Value>) -> Result<Vec<f64>> {
        let elements = vector
            .and_then(Value::as_array)
            .ok_or_else(|| Error::InvalidVector("record is missing a \"vector\" array field".into()))?;
        if elements.len() != self.vector.dimension {
            return Err(Error::VectorDimension {
                expected: self.vector.dimension,
                got: elements.len(),
            });
        }
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            let f = element
                .as_f64()
                .ok_or_else(|| Error::InvalidVector("vector elements must be numbers".into()))?;
            if !f.is_finite() {
                return Err(Error::InvalidVector("vector elements must be finite".into()));
            }
            values.push(f);
        }
        if self.vector.normalize {
            normalize(&mut values);
        }
        Ok(values)
    }

    /// Scores every live, non-expired record's `vector` field against
    /// `query`, filters by `threshold`/`where`/`filter`, sorts
    /// best-match-first, and truncates to `limit`.
    pub async fn search(&self, query: Vec<f64>, options: SearchOptions<'_>) -> Result<Vec<SearchHit>> {
        if query.len() != self.vector.dimension {
            return Err(Error::VectorDimension {
                expected: self.vector.dimension,
                got: query.len(),
            });
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidVector("query vector elements must be finite".into()));
        }
        let mut query = query;
        if self.vector.normalize {
            normalize(&mut query);
        }

        let records = self.collection.read(options.at).await?;
        let latest = latest_by_id(records);

        let mut scored = Vec::new();
        for record in latest.into_values() {
            let data = match self.collection.finalize(record) {
                Some(data) => data,
                None => continue,
            };
            if options.where_.map_or(false, |w| !matches_where(&data, w)) {
                continue;
            }
            if options.filter.map_or(false, |f| !f(&data)) {
                continue;
            }
            let vector: Option<Vec<f64>> = data
                .get("vector")
                .and_then(Value::as_array)
                .map(|elems| elems.iter().filter_map(Value::as_f64).collect());
            let vector = match vector {
                Some(v) if v.len() == self.vector.dimension => v,
                _ => continue,
            };
            let score = self.vector.metric.score(&query, &vector);
            if let Some(threshold) = options.threshold {
                let passes = match self.vector.metric {
                    Metric::Euclidean => score <= threshold,
                    _ => score >= threshold,
                };
                if !passes {
                    continue;
                }
            }
            let mut data = data;
            if !options.include_vector {
                if let Value::Object(map) = &mut data {
                    map.remove("vector");
                }
            }
            scored.push(SearchHit { score, data });
        }

        match self.vector.metric {
            Metric::Euclidean => scored.sort_by(|a, b| a.score.total_cmp(&b.score)),
            _ => scored.sort_by(|a, b| b.score.total_cmp(&a.score)),
        }
        if let Some(limit) = options.limit {
            scored.truncate(limit);
        }
        Ok(scored)
    }
}

impl Metric {
    fn score(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Metric::Cosine | Metric::DotProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Metric::Euclidean => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt(),
        }
    }
}

fn normalize(values: &mut [f64]) {
    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

fn set_vector_field(data: &mut Value, values: Vec<f64>) {
    let array = values
        .into_iter()
        .map(|v| serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null))
        .collect();
    data["vector"] = Value::Array(array);
}
