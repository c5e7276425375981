//! Semantic Retriever: indexes the catalog into the vector store and turns a
//! question into a token-bounded, schema-grounded context document.

use fathom_embed::EmbedError;
use fathom_store::IndexError;
use thiserror::Error;

pub mod expansion;
pub mod indexer;
pub mod render;
pub mod retriever;

pub use expansion::{expand_relationships, MAX_EXPANSION_DEPTH};
pub use indexer::{CatalogIndexer, IndexReport};
pub use render::{estimate_tokens, fit_to_budget, render, ContextParts};
pub use retriever::{RetrieverConfig, SemanticRetriever};

pub const DEFAULT_TOKEN_BUDGET: usize = 600;
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("query is empty")]
    EmptyQuery,
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl ContextError {
    /// Semantic layer is down; the retriever answers with a degraded context
    /// instead of this error.
    pub fn is_unavailable(&self) -> bool {
        match self {
            ContextError::EmptyQuery => false,
            ContextError::Embed(e) => matches!(e, EmbedError::Unavailable(_) | EmbedError::Model(_)),
            ContextError::Index(e) => e.is_unavailable(),
        }
    }
}

/// Point id for a pattern in the pattern collection.
pub fn pattern_point_id(pattern_id: &str) -> String {
    format!("pattern:{pattern_id}")
}

/// Point id for a column in the column collection.
pub fn column_point_id(table: &str, column: &str) -> String {
    format!("column:{table}.{column}")
}
