use async_trait::async_trait;
use fathom_types::{Payload, PayloadKind};
use thiserror::Error;

pub mod qdrant;
pub use qdrant::QdrantVectorIndex;

pub mod memory;
pub use memory::InMemoryVectorIndex;

/// Collection holding example query patterns.
pub const PATTERN_COLLECTION: &str = "semantic_models";
/// Collection holding column descriptors.
pub const COLUMN_COLLECTION: &str = "schema_columns";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),
    #[error("collection '{collection}' expects {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },
    #[error("collection '{collection}' holds {expected:?} payloads, got {actual:?}")]
    PayloadMismatch {
        collection: String,
        expected: PayloadKind,
        actual: PayloadKind,
    },
    #[error("collection '{0}' has no payload kind registered; call ensure_collection first")]
    Unprepared(String),
    #[error("vector index unavailable: {0}")]
    Unavailable(String),
}

impl IndexError {
    /// Backend could not be reached; callers may degrade instead of failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, IndexError::Unavailable(_))
    }
}

/// One embedding record inserted into a collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub payload: Payload,
    pub score: f32,
}

/// Collection-oriented nearest-neighbour store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create `name` if missing. Existing collections with the same shape are a no-op.
    async fn ensure_collection(
        &self,
        name: &str,
        dimensions: usize,
        kind: PayloadKind,
    ) -> Result<(), IndexError>;

    /// Insert or replace points. Ids are de-duplicated by the caller.
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), IndexError>;

    /// Top-`k` points by cosine similarity, best first.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Index used when no backend is configured: every call is unavailable.
pub struct NullVectorIndex;

#[async_trait]
impl VectorIndex for NullVectorIndex {
    async fn ensure_collection(
        &self,
        _name: &str,
        _dimensions: usize,
        _kind: PayloadKind,
    ) -> Result<(), IndexError> {
        Err(IndexError::Unavailable("NullVectorIndex has no backend".into()))
    }

    async fn upsert(&self, _collection: &str, _points: Vec<Point>) -> Result<(), IndexError> {
        Err(IndexError::Unavailable("NullVectorIndex has no backend".into()))
    }

    async fn search(
        &self,
        _collection: &str,
        _query: &[f32],
        _k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        Err(IndexError::Unavailable("NullVectorIndex has no backend".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn null_index_is_unavailable() {
        let err = NullVectorIndex.search("x", &[1.0], 3).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
