use std::fmt::Write as _;

use fathom_types::{Intent, RelationshipEdge, RetrievedContext, ScoredColumn, ScoredPattern};
use tracing::{debug, warn};

/// Ranked retrieval output before rendering and budget enforcement.
#[derive(Clone, Debug)]
pub struct ContextParts {
    pub intent: Intent,
    pub models: Vec<ScoredPattern>,
    pub columns: Vec<ScoredColumn>,
}

/// Rough token estimate: characters divided by `chars_per_token`, rounded up.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    text.chars().count().div_ceil(chars_per_token.max(1))
}

/// Render the prompt document. Columns are grouped by table in order of their
/// first appearance.
pub fn render(
    intent: Intent,
    models: &[ScoredPattern],
    columns: &[ScoredColumn],
    relationships: &[RelationshipEdge],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Question intent: {intent}");

    if !models.is_empty() {
        out.push_str("\nRelevant query examples:\n");
        for (i, m) in models.iter().enumerate() {
            let p = &m.pattern;
            let _ = writeln!(out, "{}. {}: {}", i + 1, p.name, p.description);
            let _ = writeln!(out, "   SQL: {}", p.sql);
        }
    }

    if !columns.is_empty() {
        out.push_str("\nRelevant columns:\n");
        let mut tables: Vec<&str> = Vec::new();
        for c in columns {
            if !tables.contains(&c.column.table.as_str()) {
                tables.push(&c.column.table);
            }
        }
        for table in tables {
            let _ = writeln!(out, "Table {table}:");
            for c in columns.iter().filter(|c| c.column.table == table) {
                let col = &c.column;
                let _ = write!(out, "  - {} ({}", col.column, col.column_type);
                if let Some(unit) = &col.unit {
                    let _ = write!(out, ", {unit}");
                }
                out.push(')');
                if let Some(desc) = &col.description {
                    let _ = write!(out, ": {desc}");
                }
                out.push('\n');
            }
        }
    }

    if !relationships.is_empty() {
        out.push_str("\nJoin paths:\n");
        for e in relationships {
            let _ = writeln!(
                out,
                "  - {}.{} -> {}.{}",
                e.from_table, e.from_column, e.to_table, e.to_column
            );
        }
    }
    out
}

/// Render `parts` within `budget` estimated tokens.
///
/// Over budget, the lowest-scored pattern is dropped first until none remain,
/// then the lowest-scored column. `relate` re-derives the relationship edges
/// from the surviving columns after every drop. When even the empty document
/// is over budget the result is flagged `truncated` and returned as is.
pub fn fit_to_budget<F>(
    parts: ContextParts,
    budget: usize,
    chars_per_token: usize,
    relate: F,
) -> RetrievedContext
where
    F: Fn(&[ScoredColumn]) -> Vec<RelationshipEdge>,
{
    let ContextParts {
        intent,
        mut models,
        mut columns,
    } = parts;
    models.sort_by(|a, b| b.score.total_cmp(&a.score));
    columns.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut truncated = false;
    loop {
        let relationships = relate(&columns);
        let document = render(intent, &models, &columns, &relationships);
        let estimated_tokens = estimate_tokens(&document, chars_per_token);

        let over = estimated_tokens > budget;
        if over && (models.pop().is_some() || columns.pop().is_some()) {
            truncated = true;
            continue;
        }
        if over {
            warn!(budget, estimated_tokens, "empty context exceeds the token budget");
            truncated = true;
        } else if truncated {
            debug!(
                budget,
                estimated_tokens,
                models = models.len(),
                columns = columns.len(),
                "context truncated to fit budget"
            );
        }

        return RetrievedContext {
            intent,
            models,
            columns,
            relationships,
            document,
            estimated_tokens,
            truncated,
            degraded: false,
        };
    }
}
