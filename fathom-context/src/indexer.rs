use std::sync::Arc;

use fathom_embed::{EmbedError, Embedder};
use fathom_schema::{column_descriptor_text, QueryPattern, SchemaSnapshot};
use fathom_store::{Point, VectorIndex, COLUMN_COLLECTION, PATTERN_COLLECTION};
use fathom_types::{Payload, PayloadKind};
use tracing::info;

use crate::{column_point_id, pattern_point_id, ContextError};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IndexReport {
    pub patterns: usize,
    pub columns: usize,
}

/// Setup-time population of the pattern and column collections.
pub struct CatalogIndexer {
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
    pattern_collection: String,
    column_collection: String,
}

impl CatalogIndexer {
    pub fn new(embedder: Arc<Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            pattern_collection: PATTERN_COLLECTION.to_string(),
            column_collection: COLUMN_COLLECTION.to_string(),
        }
    }

    pub fn with_collections(
        mut self,
        pattern_collection: impl Into<String>,
        column_collection: impl Into<String>,
    ) -> Self {
        self.pattern_collection = pattern_collection.into();
        self.column_collection = column_collection.into();
        self
    }

    /// Embed every pattern source and column descriptor and upsert them.
    /// Safe to re-run: points are keyed by pattern id and `table.column`.
    pub async fn index(
        &self,
        schema: &SchemaSnapshot,
        patterns: &[QueryPattern],
    ) -> Result<IndexReport, ContextError> {
        self.embedder.initialize().await?;
        let dimensions = self
            .embedder
            .dimensions()
            .ok_or_else(|| EmbedError::Unavailable("model reported no dimensionality".into()))?;

        self.index
            .ensure_collection(&self.pattern_collection, dimensions, PayloadKind::Pattern)
            .await?;
        self.index
            .ensure_collection(&self.column_collection, dimensions, PayloadKind::Column)
            .await?;

        let mut pattern_points = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let vector = self.embedder.embed(pattern.embedding_text).await?;
            pattern_points.push(Point {
                id: pattern_point_id(pattern.id),
                vector: vector.to_vec(),
                payload: Payload::Pattern(pattern.payload()),
            });
        }

        let mut column_points = Vec::new();
        for table in schema.tables() {
            for column in &table.columns {
                let text = column_descriptor_text(table, column);
                let vector = self.embedder.embed(&text).await?;
                column_points.push(Point {
                    id: column_point_id(&table.name, &column.name),
                    vector: vector.to_vec(),
                    payload: Payload::Column(table.column_payload(column)),
                });
            }
        }

        let report = IndexReport {
            patterns: pattern_points.len(),
            columns: column_points.len(),
        };
        self.index
            .upsert(&self.pattern_collection, pattern_points)
            .await?;
        self.index
            .upsert(&self.column_collection, column_points)
            .await?;

        info!(
            patterns = report.patterns,
            columns = report.columns,
            dimensions,
            "catalog indexed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use fathom_cache::ResultCache;
    use fathom_embed::HashingModel;
    use fathom_store::{InMemoryVectorIndex, NullVectorIndex};

    use super::*;

    #[tokio::test]
    async fn indexes_every_pattern_and_column() {
        let schema = fathom_schema::load();
        let index = Arc::new(InMemoryVectorIndex::new());
        let embedder = Arc::new(Embedder::new(
            HashingModel::new(64),
            Arc::new(ResultCache::default()),
        ));
        let indexer = CatalogIndexer::new(embedder, index.clone());

        let report = indexer
            .index(&schema, fathom_schema::patterns())
            .await
            .unwrap();
        let columns: usize = schema.tables().iter().map(|t| t.columns.len()).sum();
        assert_eq!(report.patterns, fathom_schema::patterns().len());
        assert_eq!(report.columns, columns);
        assert_eq!(index.len(COLUMN_COLLECTION).await, Some(columns));

        // Re-indexing replaces points instead of duplicating them.
        indexer
            .index(&schema, fathom_schema::patterns())
            .await
            .unwrap();
        assert_eq!(
            index.len(PATTERN_COLLECTION).await,
            Some(fathom_schema::patterns().len())
        );
    }

    #[tokio::test]
    async fn unavailable_backend_is_reported() {
        let embedder = Arc::new(Embedder::new(
            HashingModel::new(8),
            Arc::new(ResultCache::default()),
        ));
        let indexer = CatalogIndexer::new(embedder, Arc::new(NullVectorIndex));
        let err = indexer
            .index(&fathom_schema::load(), fathom_schema::patterns())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
