use std::sync::Arc;

use async_trait::async_trait;
use fathom_cache::{normalize, ResultCache};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

pub mod hashing;
pub use hashing::{hash_embed, HashingModel};

pub mod http;
pub use http::{HttpEmbeddingModel, HttpModelLoader};

#[derive(Clone, Debug, Error)]
pub enum EmbedError {
    /// Model initialization failed earlier; not retried.
    #[error("embedder unavailable: {0}")]
    Unavailable(String),
    #[error("embedding model error: {0}")]
    Model(String),
    #[error("embedding dimension mismatch; expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// A loaded text → vector model.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn name(&self) -> &str;
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// One-time, expensive model setup.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>, EmbedError>;
}

/// Cached embedder. The model is loaded at most once per instance; a failed
/// load is remembered and every later call reports `Unavailable`.
pub struct Embedder {
    loader: Box<dyn ModelLoader>,
    model: OnceCell<Result<Arc<dyn EmbeddingModel>, String>>,
    cache: Arc<ResultCache>,
}

impl Embedder {
    pub fn new(loader: impl ModelLoader + 'static, cache: Arc<ResultCache>) -> Self {
        Self {
            loader: Box::new(loader),
            model: OnceCell::new(),
            cache,
        }
    }

    /// Load the model. Later calls are no-ops returning the first outcome.
    pub async fn initialize(&self) -> Result<(), EmbedError> {
        self.model().await.map(|_| ())
    }

    async fn model(&self) -> Result<&Arc<dyn EmbeddingModel>, EmbedError> {
        let slot = self
            .model
            .get_or_init(|| async {
                match self.loader.load().await {
                    Ok(model) => {
                        info!(
                            model = model.name(),
                            dims = model.dimensions(),
                            "embedding model loaded"
                        );
                        Ok(model)
                    }
                    Err(e) => {
                        error!(error = %e, "embedding model failed to load");
                        Err(e.to_string())
                    }
                }
            })
            .await;
        slot.as_ref()
            .map_err(|msg| EmbedError::Unavailable(msg.clone()))
    }

    /// Dimensionality of the loaded model, `None` before a successful load.
    pub fn dimensions(&self) -> Option<usize> {
        self.model
            .get()
            .and_then(|slot| slot.as_ref().ok())
            .map(|m| m.dimensions())
    }

    /// Embed `text`, consulting the embedding cache first.
    pub async fn embed(&self, text: &str) -> Result<Arc<[f32]>, EmbedError> {
        if let Some(vector) = self.cache.get_embedding(text) {
            debug!("embedding cache hit");
            return Ok(vector);
        }

        let model = self.model().await?;
        let vector = model.embed(&normalize(text)).await?;
        if vector.len() != model.dimensions() {
            return Err(EmbedError::DimensionMismatch {
                expected: model.dimensions(),
                actual: vector.len(),
            });
        }

        let vector: Arc<[f32]> = Arc::from(vector);
        self.cache.set_embedding(text, Arc::clone(&vector));
        Ok(vector)
    }
}
