use std::collections::HashMap;

use async_trait::async_trait;
use fathom_types::{Payload, PayloadKind};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{IndexError, Point, SearchHit, VectorIndex};

/// Qdrant-backed vector index (REST API).
///
/// Qdrant only accepts integer or UUID point ids, so string ids are mapped to
/// UUIDv5 and the original id travels in the payload. Ties between equal
/// scores follow Qdrant's ordering rather than insertion order.
pub struct QdrantVectorIndex {
    client: reqwest::Client,
    base_url: String,
    /// Collections seen by this process: dimensionality and, once
    /// `ensure_collection` ran here, payload kind. Upserts need the kind.
    known: RwLock<HashMap<String, (usize, Option<PayloadKind>)>>,
}

impl QdrantVectorIndex {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            known: RwLock::new(HashMap::new()),
        }
    }

    fn point_uuid(id: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes())
    }

    fn unavailable(e: impl std::fmt::Display) -> IndexError {
        IndexError::Unavailable(format!("qdrant: {e}"))
    }

    /// Dimensionality of a remote collection, `None` if it does not exist.
    async fn fetch_dimensions(&self, name: &str) -> Result<Option<usize>, IndexError> {
        let url = format!("{}/collections/{}", self.base_url, name);
        let resp = self.client.get(&url).send().await.map_err(Self::unavailable)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::unavailable(format!("status {}", resp.status())));
        }
        let info: CollectionInfoResponse = resp.json().await.map_err(Self::unavailable)?;
        Ok(Some(info.result.config.params.vectors.size))
    }

    async fn dimensions_of(&self, name: &str) -> Result<(usize, Option<PayloadKind>), IndexError> {
        if let Some(entry) = self.known.read().await.get(name) {
            return Ok(*entry);
        }
        match self.fetch_dimensions(name).await? {
            Some(dim) => {
                self.known.write().await.insert(name.to_string(), (dim, None));
                Ok((dim, None))
            }
            None => Err(IndexError::UnknownCollection(name.to_string())),
        }
    }
}

#[derive(Deserialize)]
struct CollectionInfoResponse {
    result: CollectionInfo,
}

#[derive(Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    vectors: VectorParams,
}

#[derive(Serialize, Deserialize)]
struct VectorParams {
    size: usize,
    #[serde(default = "cosine")]
    distance: String,
}

fn cosine() -> String {
    "Cosine".into()
}

#[derive(Serialize)]
struct CreateCollectionRequest {
    vectors: VectorParams,
}

#[derive(Serialize, Deserialize)]
struct StoredPayload {
    point_id: String,
    #[serde(flatten)]
    payload: Payload,
}

#[derive(Serialize)]
struct UpsertPoint {
    id: Uuid,
    vector: Vec<f32>,
    payload: StoredPayload,
}

#[derive(Serialize)]
struct UpsertRequest {
    points: Vec<UpsertPoint>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    result: Vec<SearchResult>,
}

#[derive(Deserialize, Debug)]
struct SearchResult {
    score: f32,
    #[serde(default)]
    payload: serde_json::Value,
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dimensions: usize,
        kind: PayloadKind,
    ) -> Result<(), IndexError> {
        match self.fetch_dimensions(name).await? {
            Some(existing) if existing != dimensions => {
                return Err(IndexError::DimensionMismatch {
                    collection: name.to_string(),
                    expected: existing,
                    actual: dimensions,
                });
            }
            Some(_) => {}
            None => {
                let url = format!("{}/collections/{}", self.base_url, name);
                let body = CreateCollectionRequest {
                    vectors: VectorParams {
                        size: dimensions,
                        distance: cosine(),
                    },
                };
                let resp = self
                    .client
                    .put(&url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(Self::unavailable)?;
                if !resp.status().is_success() {
                    return Err(Self::unavailable(format!(
                        "create collection status {}",
                        resp.status()
                    )));
                }
                debug!(collection = name, dimensions, "created qdrant collection");
            }
        }
        self.known
            .write()
            .await
            .insert(name.to_string(), (dimensions, Some(kind)));
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), IndexError> {
        let (dimensions, kind) = self.dimensions_of(collection).await?;
        let Some(kind) = kind else {
            return Err(IndexError::Unprepared(collection.to_string()));
        };
        let mut body = UpsertRequest {
            points: Vec::with_capacity(points.len()),
        };
        for p in points {
            if p.vector.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    collection: collection.to_string(),
                    expected: dimensions,
                    actual: p.vector.len(),
                });
            }
            if p.payload.kind() != kind {
                return Err(IndexError::PayloadMismatch {
                    collection: collection.to_string(),
                    expected: kind,
                    actual: p.payload.kind(),
                });
            }
            body.points.push(UpsertPoint {
                id: Self::point_uuid(&p.id),
                vector: p.vector,
                payload: StoredPayload {
                    point_id: p.id,
                    payload: p.payload,
                },
            });
        }
        if body.points.is_empty() {
            return Ok(());
        }

        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, collection
        );
        let resp = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;
        if !resp.status().is_success() {
            return Err(Self::unavailable(format!("upsert status {}", resp.status())));
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let (dimensions, _) = self.dimensions_of(collection).await?;
        if query.len() != dimensions {
            return Err(IndexError::DimensionMismatch {
                collection: collection.to_string(),
                expected: dimensions,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, collection
        );
        let body = SearchRequest {
            vector: query,
            limit: k,
            with_payload: true,
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;
        if resp.status() == StatusCode::NOT_FOUND {
            self.known.write().await.remove(collection);
            return Err(IndexError::UnknownCollection(collection.to_string()));
        }
        if !resp.status().is_success() {
            return Err(Self::unavailable(format!("search status {}", resp.status())));
        }
        let parsed: SearchResponse = resp.json().await.map_err(Self::unavailable)?;

        let mut hits = Vec::with_capacity(parsed.result.len());
        for item in parsed.result {
            // Points written by other tools are skipped rather than failing the search.
            let Ok(stored) = serde_json::from_value::<StoredPayload>(item.payload) else {
                debug!(collection, "skipping point with foreign payload");
                continue;
            };
            hits.push(SearchHit {
                id: stored.point_id,
                payload: stored.payload,
                score: item.score,
            });
        }
        Ok(hits)
    }
}
