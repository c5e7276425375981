use std::sync::Arc;

use fathom_cache::ResultCache;
use fathom_context::{CatalogIndexer, ContextError, IndexReport, SemanticRetriever};
use fathom_embed::{Embedder, HashingModel, HttpModelLoader};
use fathom_schema::{DescribeMode, SchemaSnapshot};
use fathom_store::{InMemoryVectorIndex, QdrantVectorIndex, VectorIndex};
use fathom_types::{RetrievedContext, ValidationResult};
use fathom_validate::SqlValidator;
use thiserror::Error;
use tracing::{info, warn};

pub mod config;
pub use config::{ConfigError, EngineConfig};

pub mod pipeline;
pub use pipeline::{Answer, GeneratedSql, QueryExecutor, Row, SqlGenerator};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("sql generation failed: {0}")]
    Generation(String),
    #[error("query execution failed: {0}")]
    Execution(String),
}

/// Wires the schema registry, embedder, vector index, caches, retriever and
/// validator into one engine.
pub struct FathomEngine {
    schema: Arc<SchemaSnapshot>,
    cache: Arc<ResultCache>,
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
    retriever: SemanticRetriever,
    validator: SqlValidator,
    config: EngineConfig,
}

impl FathomEngine {
    pub fn new(
        config: EngineConfig,
        schema: Arc<SchemaSnapshot>,
        cache: Arc<ResultCache>,
        embedder: Arc<Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let retriever = SemanticRetriever::new(
            schema.clone(),
            embedder.clone(),
            index.clone(),
            cache.clone(),
            config.retriever(),
        );
        let validator = SqlValidator::new(schema.clone());
        Self {
            schema,
            cache,
            embedder,
            index,
            retriever,
            validator,
            config,
        }
    }

    /// Build an engine over the built-in catalog. Qdrant is used when
    /// `index.qdrant_url` is set, an HTTP embedding service when
    /// `embedding.url` is set; otherwise everything stays in-process.
    pub fn from_config(config: EngineConfig) -> Self {
        let cache = Arc::new(ResultCache::new(
            config.cache.embedding_ttl(),
            config.cache.context_ttl(),
        ));

        let dimensions = config.embedding.dimensions;
        let embedder = match config.embedding.url.as_deref() {
            Some(url) if !url.is_empty() => Embedder::new(
                HttpModelLoader::new(url, config.embedding.model.clone())
                    .expect_dimensions(dimensions),
                cache.clone(),
            ),
            _ => Embedder::new(HashingModel::new(dimensions), cache.clone()),
        };

        let index: Arc<dyn VectorIndex> = match config.index.qdrant_url.as_deref() {
            Some(url) if !url.is_empty() => Arc::new(QdrantVectorIndex::new(url)),
            _ => Arc::new(InMemoryVectorIndex::new()),
        };

        Self::new(config, fathom_schema::load(), cache, Arc::new(embedder), index)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<SchemaSnapshot> {
        &self.schema
    }

    /// Populate both vector collections from the catalog and pattern library.
    pub async fn index_catalog(&self) -> Result<IndexReport, EngineError> {
        let indexer = CatalogIndexer::new(self.embedder.clone(), self.index.clone())
            .with_collections(
                self.config.index.pattern_collection.clone(),
                self.config.index.column_collection.clone(),
            );
        Ok(indexer.index(&self.schema, fathom_schema::patterns()).await?)
    }

    /// `index_catalog` for callers that can run degraded: an unreachable
    /// embedder or index yields `None` instead of an error.
    pub async fn try_index_catalog(&self) -> Result<Option<IndexReport>, EngineError> {
        match self.index_catalog().await {
            Ok(report) => Ok(Some(report)),
            Err(EngineError::Context(e)) if e.is_unavailable() => {
                warn!(error = %e, "semantic layer unavailable, catalog not indexed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn build_context(
        &self,
        text: &str,
        token_budget: usize,
    ) -> Result<Arc<RetrievedContext>, EngineError> {
        Ok(self.retriever.build_context(text, token_budget).await?)
    }

    /// `build_context` with the configured token budget.
    pub async fn context(&self, text: &str) -> Result<Arc<RetrievedContext>, EngineError> {
        self.build_context(text, self.config.retrieval.token_budget).await
    }

    pub fn validate(&self, sql: &str) -> ValidationResult {
        self.validator.validate(sql)
    }

    pub fn describe_schema(&self, mode: DescribeMode) -> String {
        self.schema.describe(mode)
    }

    /// Drop expired cache entries; returns how many were removed.
    pub fn sweep_caches(&self) -> usize {
        self.cache.sweep_expired()
    }

    /// Context → generate → validate → (one regeneration with feedback if
    /// invalid) → execute when valid.
    pub async fn answer(
        &self,
        question: &str,
        generator: &dyn SqlGenerator,
        executor: &dyn QueryExecutor,
    ) -> Result<Answer, EngineError> {
        let context = self.context(question).await?;

        let mut generated = generator.generate(question, &context.document).await?;
        let mut validation = self.validate(&generated.sql);
        let mut attempts = 1;

        if !validation.valid {
            warn!(errors = validation.errors.len(), "generated sql invalid, regenerating");
            let prompt = pipeline::with_feedback(&context.document, &validation);
            generated = generator.generate(question, &prompt).await?;
            validation = self.validate(&generated.sql);
            attempts += 1;
        }

        let rows = if validation.valid {
            Some(executor.execute(&generated.sql).await?)
        } else {
            warn!(errors = ?validation.errors, "sql still invalid after regeneration, not executing");
            None
        };

        info!(
            attempts,
            valid = validation.valid,
            rows = rows.as_ref().map(Vec::len),
            "answer pipeline finished"
        );

        Ok(Answer {
            sql: generated.sql,
            reasoning: generated.reasoning,
            validation,
            rows,
            context,
            attempts,
        })
    }
}
