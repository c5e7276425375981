use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fathom_context::RetrieverConfig;
use fathom_store::{COLUMN_COLLECTION, PATTERN_COLLECTION};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

/// Engine configuration. Every field has a default, so a YAML file only
/// needs the keys it changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dimensions: usize,
    /// OpenAI-compatible embeddings endpoint; the offline hashing model is
    /// used when unset.
    pub url: Option<String>,
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: 384,
            url: None,
            model: "sentence-transformers/all-MiniLM-L6-v2".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Qdrant REST endpoint; an in-process index is used when unset.
    pub qdrant_url: Option<String>,
    pub pattern_collection: String,
    pub column_collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            qdrant_url: None,
            pattern_collection: PATTERN_COLLECTION.into(),
            column_collection: COLUMN_COLLECTION.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub pattern_top_k: usize,
    pub column_top_k: usize,
    pub expansion_depth: usize,
    pub chars_per_token: usize,
    pub token_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            pattern_top_k: 5,
            column_top_k: 10,
            expansion_depth: 2,
            chars_per_token: fathom_context::DEFAULT_CHARS_PER_TOKEN,
            token_budget: fathom_context::DEFAULT_TOKEN_BUDGET,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub embedding_ttl_secs: u64,
    pub context_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            embedding_ttl_secs: fathom_cache::DEFAULT_EMBEDDING_TTL.as_secs(),
            context_ttl_secs: fathom_cache::DEFAULT_CONTEXT_TTL.as_secs(),
        }
    }
}

impl CacheConfig {
    pub fn embedding_ttl(&self) -> Duration {
        Duration::from_secs(self.embedding_ttl_secs)
    }

    pub fn context_ttl(&self) -> Duration {
        Duration::from_secs(self.context_ttl_secs)
    }
}

impl EngineConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply `FATHOM_*` environment overrides.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup` (the environment in production).
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("FATHOM_EMBED_DIM") {
            self.embedding.dimensions = parse_count("FATHOM_EMBED_DIM", &v)?;
        }
        if let Some(v) = non_empty("FATHOM_QDRANT_URL") {
            self.index.qdrant_url = Some(v);
        }
        if let Some(v) = non_empty("FATHOM_EMBEDDING_URL") {
            self.embedding.url = Some(v);
        }
        if let Some(v) = non_empty("FATHOM_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = non_empty("FATHOM_TOKEN_BUDGET") {
            self.retrieval.token_budget = parse_count("FATHOM_TOKEN_BUDGET", &v)?;
        }
        Ok(self)
    }

    pub fn retriever(&self) -> RetrieverConfig {
        RetrieverConfig {
            pattern_top_k: self.retrieval.pattern_top_k,
            column_top_k: self.retrieval.column_top_k,
            expansion_depth: self.retrieval.expansion_depth,
            chars_per_token: self.retrieval.chars_per_token,
            pattern_collection: self.index.pattern_collection.clone(),
            column_collection: self.index.column_collection.clone(),
        }
    }
}

fn parse_count(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        })
}
