use std::collections::HashMap;

use async_trait::async_trait;
use fathom_types::PayloadKind;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{cosine_similarity, IndexError, Point, SearchHit, VectorIndex};

struct Collection {
    dimensions: usize,
    kind: PayloadKind,
    /// Insertion order; doubles as the tie-breaker for equal scores.
    points: Vec<Point>,
    positions: HashMap<String, usize>,
}

/// In-process vector index with exact (brute-force) cosine search.
///
/// Collections are populated once at setup and only read while serving, so a
/// read-write lock keeps concurrent searches from blocking each other.
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of points in `collection` (debug hook).
    pub async fn len(&self, collection: &str) -> Option<usize> {
        let inner = self.collections.read().await;
        inner.get(collection).map(|c| c.points.len())
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dimensions: usize,
        kind: PayloadKind,
    ) -> Result<(), IndexError> {
        let mut inner = self.collections.write().await;
        if let Some(existing) = inner.get(name) {
            if existing.dimensions != dimensions {
                return Err(IndexError::DimensionMismatch {
                    collection: name.to_string(),
                    expected: existing.dimensions,
                    actual: dimensions,
                });
            }
            if existing.kind != kind {
                return Err(IndexError::PayloadMismatch {
                    collection: name.to_string(),
                    expected: existing.kind,
                    actual: kind,
                });
            }
            return Ok(());
        }
        debug!(collection = name, dimensions, ?kind, "created collection");
        inner.insert(
            name.to_string(),
            Collection {
                dimensions,
                kind,
                points: Vec::new(),
                positions: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), IndexError> {
        let mut inner = self.collections.write().await;
        let coll = inner
            .get_mut(collection)
            .ok_or_else(|| IndexError::UnknownCollection(collection.to_string()))?;

        // Validate the whole batch before touching the collection.
        for p in &points {
            if p.vector.len() != coll.dimensions {
                return Err(IndexError::DimensionMismatch {
                    collection: collection.to_string(),
                    expected: coll.dimensions,
                    actual: p.vector.len(),
                });
            }
            if p.payload.kind() != coll.kind {
                return Err(IndexError::PayloadMismatch {
                    collection: collection.to_string(),
                    expected: coll.kind,
                    actual: p.payload.kind(),
                });
            }
        }

        for p in points {
            match coll.positions.get(&p.id) {
                Some(&pos) => coll.points[pos] = p,
                None => {
                    coll.positions.insert(p.id.clone(), coll.points.len());
                    coll.points.push(p);
                }
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let inner = self.collections.read().await;
        let coll = inner
            .get(collection)
            .ok_or_else(|| IndexError::UnknownCollection(collection.to_string()))?;
        if query.len() != coll.dimensions {
            return Err(IndexError::DimensionMismatch {
                collection: collection.to_string(),
                expected: coll.dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = coll
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, cosine_similarity(query, &p.vector)))
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let p = &coll.points[i];
                SearchHit {
                    id: p.id.clone(),
                    payload: p.payload.clone(),
                    score,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use fathom_types::{ColumnPayload, ColumnType, Payload, PatternPayload};

    use super::*;

    fn column(name: &str) -> Payload {
        Payload::Column(ColumnPayload {
            table: "accounts".into(),
            column: name.into(),
            column_type: ColumnType::Numeric,
            description: None,
            unit: None,
            aggregable: None,
        })
    }

    fn point(id: &str, vector: Vec<f32>) -> Point {
        Point {
            id: id.into(),
            vector,
            payload: column(id),
        }
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let index = InMemoryVectorIndex::new();
        index.ensure_collection("c", 2, PayloadKind::Column).await.unwrap();
        index.upsert("c", vec![point("a", vec![1.0, 0.0])]).await.unwrap();
        index.ensure_collection("c", 2, PayloadKind::Column).await.unwrap();
        assert_eq!(index.len("c").await, Some(1));

        let err = index.ensure_collection("c", 3, PayloadKind::Column).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_with_insertion_order_ties() {
        let index = InMemoryVectorIndex::new();
        index.ensure_collection("c", 2, PayloadKind::Column).await.unwrap();
        index
            .upsert(
                "c",
                vec![
                    point("orthogonal", vec![0.0, 1.0]),
                    point("first_tie", vec![1.0, 1.0]),
                    point("exact", vec![1.0, 0.0]),
                    point("second_tie", vec![2.0, 2.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("c", &[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "first_tie", "second_tie"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_id_in_place() {
        let index = InMemoryVectorIndex::new();
        index.ensure_collection("c", 2, PayloadKind::Column).await.unwrap();
        index.upsert("c", vec![point("a", vec![0.0, 1.0])]).await.unwrap();
        index.upsert("c", vec![point("a", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(index.len("c").await, Some(1));
        let hits = index.search("c", &[1.0, 0.0], 1).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unknown_collection_and_bad_dimensions_are_errors() {
        let index = InMemoryVectorIndex::new();
        let err = index.search("missing", &[1.0], 1).await.unwrap_err();
        assert!(matches!(err, IndexError::UnknownCollection(_)));

        index.ensure_collection("c", 2, PayloadKind::Column).await.unwrap();
        let err = index.search("c", &[1.0, 0.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 2, actual: 3, .. }));

        let err = index.upsert("c", vec![point("a", vec![1.0])]).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn payload_schema_is_enforced_at_insert() {
        let index = InMemoryVectorIndex::new();
        index.ensure_collection("c", 2, PayloadKind::Column).await.unwrap();
        let wrong = Point {
            id: "p".into(),
            vector: vec![1.0, 0.0],
            payload: Payload::Pattern(PatternPayload {
                pattern_id: "p".into(),
                name: "n".into(),
                description: "d".into(),
                sql: "SELECT 1".into(),
                tables: Vec::new(),
                operations: Vec::new(),
            }),
        };
        let err = index.upsert("c", vec![wrong]).await.unwrap_err();
        assert!(matches!(err, IndexError::PayloadMismatch { .. }));
        assert_eq!(index.len("c").await, Some(0));
    }
}
