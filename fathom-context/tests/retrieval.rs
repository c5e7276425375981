use std::sync::Arc;

use async_trait::async_trait;
use fathom_cache::ResultCache;
use fathom_context::{
    pattern_point_id, CatalogIndexer, ContextError, RetrieverConfig, SemanticRetriever,
};
use fathom_embed::{EmbedError, Embedder, EmbeddingModel, HashingModel, ModelLoader};
use fathom_schema::DescribeMode;
use fathom_store::{IndexError, InMemoryVectorIndex, NullVectorIndex, VectorIndex, PATTERN_COLLECTION};

struct Fixture {
    retriever: SemanticRetriever,
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<ResultCache>,
}

async fn indexed() -> Fixture {
    let schema = fathom_schema::load();
    let cache = Arc::new(ResultCache::default());
    let embedder = Arc::new(Embedder::new(HashingModel::new(384), Arc::clone(&cache)));
    let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
    CatalogIndexer::new(Arc::clone(&embedder), Arc::clone(&index))
        .index(&schema, fathom_schema::patterns())
        .await
        .unwrap();
    let retriever = SemanticRetriever::new(
        schema,
        Arc::clone(&embedder),
        Arc::clone(&index),
        Arc::clone(&cache),
        RetrieverConfig::default(),
    );
    Fixture {
        retriever,
        embedder,
        index,
        cache,
    }
}

fn ranking(ctx: &fathom_types::RetrievedContext) -> (Vec<String>, Vec<String>) {
    (
        ctx.models.iter().map(|m| m.pattern.pattern_id.clone()).collect(),
        ctx.columns
            .iter()
            .map(|c| format!("{}.{}", c.column.table, c.column.column))
            .collect(),
    )
}

#[tokio::test]
async fn every_pattern_is_top_hit_for_its_own_source() {
    let f = indexed().await;
    for pattern in fathom_schema::patterns() {
        let vector = f.embedder.embed(pattern.embedding_text).await.unwrap();
        let hits = f.index.search(PATTERN_COLLECTION, &vector, 1).await.unwrap();
        assert_eq!(hits[0].id, pattern_point_id(pattern.id), "{}", pattern.id);
    }
}

#[tokio::test]
async fn every_pattern_leads_its_own_context() {
    let f = indexed().await;
    for pattern in fathom_schema::patterns() {
        let ctx = f
            .retriever
            .build_context(pattern.embedding_text, 10_000)
            .await
            .unwrap();
        assert_eq!(ctx.models[0].pattern.pattern_id, pattern.id);
    }
}

#[tokio::test]
async fn repeated_queries_are_deterministic_and_cached() {
    let f = indexed().await;
    let q = "total balance for each customer";
    let first = f.retriever.build_context(q, 600).await.unwrap();
    let second = f.retriever.build_context(q, 600).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    f.cache.contexts().clear();
    let rebuilt = f.retriever.build_context(q, 600).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
    assert_eq!(ranking(&first), ranking(&rebuilt));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_match_sequential_results() {
    let queries = [
        "total balance for each customer",
        "top 10 securities by market value",
        "monthly transaction volume this year",
        "how many accounts are there",
        "total balance for each customer",
        "top 10 securities by market value",
    ];

    let sequential = indexed().await;
    let mut expected = Vec::new();
    for q in queries {
        let ctx = sequential.retriever.build_context(q, 600).await.unwrap();
        expected.push((ranking(&ctx), ctx.document.clone()));
    }

    let shared = indexed().await;
    let retriever = Arc::new(shared.retriever);
    let handles: Vec<_> = queries
        .into_iter()
        .map(|q| {
            let retriever = Arc::clone(&retriever);
            tokio::spawn(async move { retriever.build_context(q, 600).await })
        })
        .collect();

    for (handle, (ranked, document)) in handles.into_iter().zip(&expected) {
        let ctx = handle.await.unwrap().unwrap();
        assert!(!ctx.degraded);
        assert_eq!(&ranking(&ctx), ranked);
        assert_eq!(&ctx.document, document);
    }
    assert_eq!(shared.cache.contexts().len(), 4);
}

#[tokio::test]
async fn default_budget_is_respected() {
    let f = indexed().await;
    let ctx = f
        .retriever
        .build_context("top 10 funds by ytd return with their holdings", 600)
        .await
        .unwrap();
    assert!(ctx.estimated_tokens <= 600);
    assert!(!ctx.degraded);
}

#[tokio::test]
async fn index_outage_degrades_to_core_schema() {
    let schema = fathom_schema::load();
    let cache = Arc::new(ResultCache::default());
    let embedder = Arc::new(Embedder::new(HashingModel::new(384), Arc::clone(&cache)));
    let retriever = SemanticRetriever::new(
        Arc::clone(&schema),
        embedder,
        Arc::new(NullVectorIndex),
        Arc::clone(&cache),
        RetrieverConfig::default(),
    );

    let ctx = retriever.build_context("how many accounts", 600).await.unwrap();
    assert!(ctx.degraded);
    assert!(ctx.is_empty());
    assert!(ctx.relationships.is_empty());
    assert_eq!(ctx.document, schema.describe(DescribeMode::Core));
    assert!(cache.contexts().is_empty(), "degraded contexts are not cached");
}

struct BrokenLoader;

#[async_trait]
impl ModelLoader for BrokenLoader {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>, EmbedError> {
        Err(EmbedError::Model("weights missing".into()))
    }
}

#[tokio::test]
async fn embedder_outage_degrades_to_core_schema() {
    let cache = Arc::new(ResultCache::default());
    let retriever = SemanticRetriever::new(
        fathom_schema::load(),
        Arc::new(Embedder::new(BrokenLoader, Arc::clone(&cache))),
        Arc::new(InMemoryVectorIndex::new()),
        cache,
        RetrieverConfig::default(),
    );
    for _ in 0..2 {
        let ctx = retriever.build_context("largest positions", 600).await.unwrap();
        assert!(ctx.degraded);
    }
}

#[tokio::test]
async fn missing_collection_is_a_usage_error() {
    let cache = Arc::new(ResultCache::default());
    let retriever = SemanticRetriever::new(
        fathom_schema::load(),
        Arc::new(Embedder::new(HashingModel::new(16), Arc::clone(&cache))),
        Arc::new(InMemoryVectorIndex::new()),
        cache,
        RetrieverConfig::default(),
    );
    let err = retriever.build_context("largest positions", 600).await.unwrap_err();
    assert!(matches!(
        err,
        ContextError::Index(IndexError::UnknownCollection(_))
    ));
}
