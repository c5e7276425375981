//! Collaborators consumed by the answer pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use fathom_types::{RetrievedContext, ValidationResult};
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSql {
    pub sql: String,
    pub reasoning: String,
}

/// Text-to-SQL model. `context` is the rendered context document, followed
/// by correction feedback on a regeneration attempt.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, question: &str, context: &str) -> Result<GeneratedSql, EngineError>;
}

/// Read-only database access. Only called with validated SQL.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, EngineError>;
}

#[derive(Debug)]
pub struct Answer {
    pub sql: String,
    pub reasoning: String,
    pub validation: ValidationResult,
    /// `None` when the final SQL failed validation and was not executed.
    pub rows: Option<Vec<Row>>,
    pub context: Arc<RetrievedContext>,
    pub attempts: usize,
}

/// Prompt context for a regeneration: the original document plus the
/// validator's correction hint.
pub(crate) fn with_feedback(document: &str, validation: &ValidationResult) -> String {
    format!("{document}\n\n{}", validation.feedback())
}
