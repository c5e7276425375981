use std::sync::Arc;

use fathom_cache::{normalize, ResultCache};
use fathom_classifier::{sql_matches_intent, IntentClassifier, KeywordClassifier};
use fathom_embed::Embedder;
use fathom_schema::{DescribeMode, SchemaSnapshot};
use fathom_store::{IndexError, SearchHit, VectorIndex, COLUMN_COLLECTION, PATTERN_COLLECTION};
use fathom_types::{Intent, Payload, RetrievedContext, ScoredColumn, ScoredPattern};
use tracing::{debug, info, warn};

use crate::expansion::{expand_relationships, MAX_EXPANSION_DEPTH};
use crate::render::{estimate_tokens, fit_to_budget, ContextParts};
use crate::{ContextError, DEFAULT_CHARS_PER_TOKEN};

#[derive(Clone, Debug)]
pub struct RetrieverConfig {
    pub pattern_top_k: usize,
    pub column_top_k: usize,
    /// Relationship hops to follow; values above `MAX_EXPANSION_DEPTH` are capped.
    pub expansion_depth: usize,
    pub chars_per_token: usize,
    pub pattern_collection: String,
    pub column_collection: String,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            pattern_top_k: 5,
            column_top_k: 10,
            expansion_depth: MAX_EXPANSION_DEPTH,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            pattern_collection: PATTERN_COLLECTION.to_string(),
            column_collection: COLUMN_COLLECTION.to_string(),
        }
    }
}

pub struct SemanticRetriever {
    schema: Arc<SchemaSnapshot>,
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<ResultCache>,
    classifier: Arc<dyn IntentClassifier>,
    config: RetrieverConfig,
}

impl SemanticRetriever {
    pub fn new(
        schema: Arc<SchemaSnapshot>,
        embedder: Arc<Embedder>,
        index: Arc<dyn VectorIndex>,
        cache: Arc<ResultCache>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            schema,
            embedder,
            index,
            cache,
            classifier: Arc::new(KeywordClassifier),
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Build the context document for `query` within `token_budget`.
    ///
    /// A semantic layer outage (embedder or index unavailable) yields a
    /// degraded context built from the core schema description instead of an
    /// error. Degraded contexts are never cached.
    pub async fn build_context(
        &self,
        query: &str,
        token_budget: usize,
    ) -> Result<Arc<RetrievedContext>, ContextError> {
        let normalized = normalize(query);
        if normalized.is_empty() {
            return Err(ContextError::EmptyQuery);
        }

        let cache_key = format!("{token_budget} {normalized}");
        if let Some(hit) = self.cache.get_context(&cache_key) {
            debug!(query = %normalized, "context cache hit");
            return Ok(hit);
        }
        debug!(query = %normalized, "context cache miss");

        let intent = self.classifier.classify(&normalized);

        let (models, columns) = match self.search(&normalized).await {
            Ok(found) => found,
            Err(e) if e.is_unavailable() => {
                warn!(error = %e, "semantic layer unavailable, using core schema");
                return Ok(Arc::new(self.degraded(intent, token_budget)));
            }
            Err(e) => return Err(e),
        };

        let models = self.filter_by_intent(models, intent);
        let depth = self.config.expansion_depth;
        let schema = &self.schema;
        let context = fit_to_budget(
            ContextParts {
                intent,
                models,
                columns,
            },
            token_budget,
            self.config.chars_per_token,
            |cols: &[ScoredColumn]| {
                let mut tables: Vec<&str> = Vec::new();
                for c in cols {
                    if !tables.contains(&c.column.table.as_str()) {
                        tables.push(&c.column.table);
                    }
                }
                expand_relationships(schema, &tables, depth)
            },
        );

        info!(
            %intent,
            models = context.models.len(),
            columns = context.columns.len(),
            relationships = context.relationships.len(),
            tokens = context.estimated_tokens,
            truncated = context.truncated,
            "context built"
        );

        let context = Arc::new(context);
        self.cache.set_context(&cache_key, Arc::clone(&context));
        Ok(context)
    }

    /// Embed once, then query both collections concurrently.
    async fn search(
        &self,
        query: &str,
    ) -> Result<(Vec<ScoredPattern>, Vec<ScoredColumn>), ContextError> {
        let vector = self.embedder.embed(query).await?;
        let (pattern_hits, column_hits) = tokio::join!(
            self.index.search(
                &self.config.pattern_collection,
                &vector,
                self.config.pattern_top_k
            ),
            self.index.search(
                &self.config.column_collection,
                &vector,
                self.config.column_top_k
            ),
        );
        let (pattern_hits, column_hits) = both(pattern_hits, column_hits)?;

        let models: Vec<ScoredPattern> = pattern_hits
            .into_iter()
            .filter_map(|hit| match hit.payload {
                Payload::Pattern(pattern) => Some(ScoredPattern {
                    pattern,
                    score: hit.score,
                }),
                Payload::Column(_) => None,
            })
            .collect();
        let columns: Vec<ScoredColumn> = column_hits
            .into_iter()
            .filter_map(|hit| match hit.payload {
                Payload::Column(column) => Some(ScoredColumn {
                    column,
                    score: hit.score,
                }),
                Payload::Pattern(_) => None,
            })
            .collect();

        debug!(
            top_pattern = models.first().map(|m| m.pattern.pattern_id.as_str()),
            top_score = models.first().map(|m| m.score),
            patterns = models.len(),
            columns = columns.len(),
            "semantic search ranked"
        );
        Ok((models, columns))
    }

    /// Keep patterns whose SQL uses a construct matching `intent`, unless that
    /// would leave nothing.
    fn filter_by_intent(&self, models: Vec<ScoredPattern>, intent: Intent) -> Vec<ScoredPattern> {
        if intent == Intent::Unknown {
            return models;
        }
        let matching: Vec<ScoredPattern> = models
            .iter()
            .filter(|m| sql_matches_intent(&m.pattern.sql, intent))
            .cloned()
            .collect();
        if matching.is_empty() {
            debug!(%intent, "intent filter would empty the pattern set, skipped");
            models
        } else {
            matching
        }
    }

    fn degraded(&self, intent: Intent, token_budget: usize) -> RetrievedContext {
        let document = self.schema.describe(DescribeMode::Core);
        let estimated_tokens = estimate_tokens(&document, self.config.chars_per_token);
        let truncated = estimated_tokens > token_budget;
        if truncated {
            warn!(
                budget = token_budget,
                estimated_tokens,
                "core schema description exceeds the token budget"
            );
        }
        RetrievedContext {
            intent,
            models: Vec::new(),
            columns: Vec::new(),
            relationships: Vec::new(),
            document,
            estimated_tokens,
            truncated,
            degraded: true,
        }
    }
}

/// Join two concurrent search results, preferring to report an availability
/// failure over a usage error so the caller can degrade.
fn both(
    a: Result<Vec<SearchHit>, IndexError>,
    b: Result<Vec<SearchHit>, IndexError>,
) -> Result<(Vec<SearchHit>, Vec<SearchHit>), IndexError> {
    match (a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(e), _) if e.is_unavailable() => Err(e),
        (_, Err(e)) if e.is_unavailable() => Err(e),
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use fathom_embed::HashingModel;
    use fathom_store::InMemoryVectorIndex;

    use super::*;
    use crate::CatalogIndexer;

    struct Always(Intent);

    impl IntentClassifier for Always {
        fn classify(&self, _text: &str) -> Intent {
            self.0
        }
    }

    async fn retriever() -> SemanticRetriever {
        let schema = fathom_schema::load();
        let cache = Arc::new(ResultCache::default());
        let embedder = Arc::new(Embedder::new(HashingModel::new(384), Arc::clone(&cache)));
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        CatalogIndexer::new(Arc::clone(&embedder), Arc::clone(&index))
            .index(&schema, fathom_schema::patterns())
            .await
            .unwrap();
        SemanticRetriever::new(schema, embedder, index, cache, RetrieverConfig::default())
    }

    #[tokio::test]
    async fn empty_query_is_a_usage_error() {
        let r = retriever().await;
        assert!(matches!(
            r.build_context("   \n", 600).await,
            Err(ContextError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn intent_filter_keeps_matching_patterns() {
        let r = retriever().await.with_classifier(Arc::new(Always(Intent::Count)));
        let ctx = r.build_context("accounts per type", 10_000).await.unwrap();
        assert_eq!(ctx.intent, Intent::Count);
        assert!(!ctx.models.is_empty());
        assert!(ctx
            .models
            .iter()
            .all(|m| m.pattern.sql.to_ascii_uppercase().contains("COUNT(")));
    }

    #[tokio::test]
    async fn intent_filter_is_skipped_when_it_would_empty_the_set() {
        let r = retriever().await;
        let models = vec![ScoredPattern {
            pattern: fathom_types::PatternPayload {
                pattern_id: "p".into(),
                name: "n".into(),
                description: "d".into(),
                sql: "SELECT ticker FROM securities".into(),
                tables: vec!["securities".into()],
                operations: Vec::new(),
            },
            score: 0.5,
        }];
        let kept = r.filter_by_intent(models.clone(), Intent::Count);
        assert_eq!(kept, models);
    }

    #[tokio::test]
    async fn matched_tables_bring_their_join_paths() {
        let r = retriever().await;
        let ctx = r
            .build_context("holdings market value quantity of shares held", 10_000)
            .await
            .unwrap();
        assert!(ctx.columns.iter().any(|c| c.column.table == "holdings"));
        assert!(ctx
            .relationships
            .iter()
            .any(|e| e.from_table == "holdings" && e.to_table == "securities"));
        assert!(ctx.relationships.iter().all(|e| e.depth <= MAX_EXPANSION_DEPTH));
        assert!(ctx.document.contains("Join paths:"));
    }

    #[test]
    fn availability_errors_win_when_joining_results() {
        let err = both(
            Err(IndexError::UnknownCollection("x".into())),
            Err(IndexError::Unavailable("down".into())),
        )
        .unwrap_err();
        assert!(err.is_unavailable());
    }
}
