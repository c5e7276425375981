use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{EmbedError, EmbeddingModel, ModelLoader};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Sentence-embedding model behind an OpenAI-compatible `/embeddings` endpoint
/// (text-embeddings-inference, vLLM, infinity, ...).
pub struct HttpEmbeddingModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dim: usize,
}

impl HttpEmbeddingModel {
    async fn request(
        client: &reqwest::Client,
        base_url: &str,
        model: &str,
        text: &str,
    ) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/embeddings", base_url.trim_end_matches('/'));
        let body = EmbeddingRequest {
            model,
            input: vec![text],
        };
        let resp = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Model(format!("HTTP error: {e}")))?;
        if !resp.status().is_success() {
            return Err(EmbedError::Model(format!("HTTP status: {}", resp.status())));
        }
        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| EmbedError::Model(format!("parse error: {e}")))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::Model("empty embedding response".into()))
    }
}

#[async_trait]
impl EmbeddingModel for HttpEmbeddingModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Self::request(&self.client, &self.base_url, &self.model, text).await
    }
}

/// Loads an [`HttpEmbeddingModel`] by probing the endpoint once.
pub struct HttpModelLoader {
    base_url: String,
    model: String,
    expected_dim: Option<usize>,
}

impl HttpModelLoader {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            expected_dim: None,
        }
    }

    /// Fail loading unless the served model produces `dim`-length vectors.
    pub fn expect_dimensions(mut self, dim: usize) -> Self {
        self.expected_dim = Some(dim);
        self
    }
}

#[async_trait]
impl ModelLoader for HttpModelLoader {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>, EmbedError> {
        let client = reqwest::Client::new();
        let probe =
            HttpEmbeddingModel::request(&client, &self.base_url, &self.model, "dimension probe").await?;
        let dim = probe.len();
        if dim == 0 {
            return Err(EmbedError::Model("endpoint returned an empty vector".into()));
        }
        if let Some(expected) = self.expected_dim {
            if expected != dim {
                return Err(EmbedError::DimensionMismatch {
                    expected,
                    actual: dim,
                });
            }
        }
        debug!(url = %self.base_url, model = %self.model, dim, "probed embedding endpoint");
        Ok(Arc::new(HttpEmbeddingModel {
            client,
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            dim,
        }))
    }
}
