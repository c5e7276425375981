use fathom_context::{estimate_tokens, expand_relationships, fit_to_budget, render, ContextParts};
use fathom_types::{
    ColumnPayload, ColumnType, Intent, PatternPayload, ScoredColumn, ScoredPattern,
};
use proptest::prelude::*;

const TABLES: &[&str] = &["accounts", "holdings", "securities", "transactions"];

fn parts(model_scores: &[f32], column_scores: &[f32]) -> ContextParts {
    let models = model_scores
        .iter()
        .enumerate()
        .map(|(i, &score)| ScoredPattern {
            pattern: PatternPayload {
                pattern_id: format!("p{i}"),
                name: format!("pattern {i}"),
                description: "Number of accounts per account type".into(),
                sql: "SELECT account_type, COUNT(*) FROM accounts GROUP BY account_type".into(),
                tables: vec!["accounts".into()],
                operations: vec!["COUNT".into(), "GROUP BY".into()],
            },
            score,
        })
        .collect();
    let columns = column_scores
        .iter()
        .enumerate()
        .map(|(i, &score)| ScoredColumn {
            column: ColumnPayload {
                table: TABLES[i % TABLES.len()].into(),
                column: format!("c{i}"),
                column_type: ColumnType::Numeric,
                description: Some("Some measured amount".into()),
                unit: Some("USD".into()),
                aggregable: Some(true),
            },
            score,
        })
        .collect();
    ContextParts {
        intent: Intent::Aggregate,
        models,
        columns,
    }
}

/// Indices ordered the way the retriever ranks them: score descending, ties
/// in input order.
fn ranked(scores: &[f32]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));
    idx
}

proptest! {
    #[test]
    fn budget_holds_and_lowest_ranked_go_first(
        model_scores in prop::collection::vec(0.0f32..1.0, 0..6),
        column_scores in prop::collection::vec(0.0f32..1.0, 0..12),
        budget in 0usize..500,
    ) {
        let schema = fathom_schema::load();
        let ctx = fit_to_budget(parts(&model_scores, &column_scores), budget, 4, |cols| {
            let mut tables: Vec<&str> = Vec::new();
            for c in cols {
                if !tables.contains(&c.column.table.as_str()) {
                    tables.push(&c.column.table);
                }
            }
            expand_relationships(&schema, &tables, 2)
        });

        let empty = estimate_tokens(&render(Intent::Aggregate, &[], &[], &[]), 4);
        if empty <= budget {
            prop_assert!(ctx.estimated_tokens <= budget);
        } else {
            prop_assert!(ctx.truncated);
        }
        prop_assert_eq!(ctx.estimated_tokens, estimate_tokens(&ctx.document, 4));

        let kept_models: Vec<String> = ctx.models.iter().map(|m| m.pattern.pattern_id.clone()).collect();
        let expected_models: Vec<String> = ranked(&model_scores)
            .into_iter()
            .take(kept_models.len())
            .map(|i| format!("p{i}"))
            .collect();
        prop_assert_eq!(kept_models, expected_models);

        let kept_columns: Vec<String> = ctx.columns.iter().map(|c| c.column.column.clone()).collect();
        let expected_columns: Vec<String> = ranked(&column_scores)
            .into_iter()
            .take(kept_columns.len())
            .map(|i| format!("c{i}"))
            .collect();
        prop_assert_eq!(kept_columns, expected_columns);

        // Columns are only touched once every pattern is gone.
        if ctx.columns.len() < column_scores.len() {
            prop_assert!(ctx.models.is_empty());
        }
        let dropped = ctx.models.len() < model_scores.len() || ctx.columns.len() < column_scores.len();
        if dropped {
            prop_assert!(ctx.truncated);
        }
        prop_assert!(!ctx.degraded);
    }
}
