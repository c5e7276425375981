use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a catalog column.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Uuid,
    Text,
    Integer,
    Numeric,
    Date,
    Timestamp,
    Boolean,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Uuid => "uuid",
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Numeric => "numeric",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Boolean => "boolean",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Numeric)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of the kind of question being asked.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Count,
    Join,
    Aggregate,
    TimeBased,
    Rank,
    Filter,
    Unknown,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::Count => "COUNT",
            Intent::Join => "JOIN",
            Intent::Aggregate => "AGGREGATE",
            Intent::TimeBased => "TIME_BASED",
            Intent::Rank => "RANK",
            Intent::Filter => "FILTER",
            Intent::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

//
// Vector index payloads
//

/// Payload schema carried by a collection. Checked on every upsert.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Pattern,
    Column,
}

/// Example query pattern as stored in the `semantic_models` collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternPayload {
    pub pattern_id: String,
    pub name: String,
    pub description: String,
    pub sql: String,
    pub tables: Vec<String>,
    pub operations: Vec<String>,
}

/// Column descriptor as stored in the `schema_columns` collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnPayload {
    pub table: String,
    pub column: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub aggregable: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Pattern(PatternPayload),
    Column(ColumnPayload),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Pattern(_) => PayloadKind::Pattern,
            Payload::Column(_) => PayloadKind::Column,
        }
    }
}

//
// Retrieval output
//

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredPattern {
    pub pattern: PatternPayload,
    pub score: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredColumn {
    pub column: ColumnPayload,
    pub score: f32,
}

/// One join-path hint discovered while walking the relationship graph.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    /// Hop count from the nearest seed table (1 = direct relationship).
    pub depth: usize,
}

/// Per-call output of the retriever. Rebuilt on every cache miss.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub intent: Intent,
    pub models: Vec<ScoredPattern>,
    pub columns: Vec<ScoredColumn>,
    pub relationships: Vec<RelationshipEdge>,
    pub document: String,
    pub estimated_tokens: usize,
    /// Entries were dropped (or the document still exceeds the budget).
    pub truncated: bool,
    /// Semantic layer was unavailable; `document` is the core schema text.
    pub degraded: bool,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.columns.is_empty()
    }
}

//
// Validation output
//

/// Table reference extracted from FROM / JOIN / INTO.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TableReference {
    pub name: String,
    pub alias: Option<String>,
}

/// Select-list column reference; `column` is `*` for star projections.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ColumnReference {
    pub qualifier: Option<String>,
    pub column: String,
    /// Upper-cased aggregation function, when the column sits inside one.
    pub aggregate: Option<String>,
    pub distinct: bool,
}

impl ColumnReference {
    pub fn is_star(&self) -> bool {
        self.column == "*"
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub tables: Vec<TableReference>,
    pub columns: Vec<ColumnReference>,
}

impl ValidationResult {
    /// Natural-language correction hint for a regeneration attempt.
    pub fn feedback(&self) -> String {
        let mut out = String::new();
        if self.errors.is_empty() && self.warnings.is_empty() && self.suggestions.is_empty() {
            return out;
        }
        out.push_str("The previous SQL query has problems:\n");
        for e in &self.errors {
            out.push_str("- Error: ");
            out.push_str(e);
            out.push('\n');
        }
        for w in &self.warnings {
            out.push_str("- Warning: ");
            out.push_str(w);
            out.push('\n');
        }
        for s in &self.suggestions {
            out.push_str("- Hint: ");
            out.push_str(s);
            out.push('\n');
        }
        out.push_str("Rewrite the query using only the tables and columns listed in the context.");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_internally_tagged() {
        let p = Payload::Column(ColumnPayload {
            table: "accounts".into(),
            column: "balance".into(),
            column_type: ColumnType::Numeric,
            description: None,
            unit: Some("USD".into()),
            aggregable: Some(true),
        });
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["kind"], "column");
        assert_eq!(v["column_type"], "numeric");
        assert_eq!(p.kind(), PayloadKind::Column);
    }

    #[test]
    fn feedback_lists_every_problem() {
        let res = ValidationResult {
            valid: false,
            errors: vec!["unknown table 'acounts'".into()],
            warnings: vec!["LIMIT without ORDER BY".into()],
            suggestions: vec!["did you mean FROM".into()],
            ..Default::default()
        };
        let text = res.feedback();
        assert!(text.contains("Error: unknown table 'acounts'"));
        assert!(text.contains("Warning: LIMIT without ORDER BY"));
        assert!(text.contains("Hint: did you mean FROM"));
    }

    #[test]
    fn feedback_is_empty_for_clean_result() {
        let res = ValidationResult {
            valid: true,
            ..Default::default()
        };
        assert!(res.feedback().is_empty());
    }
}
