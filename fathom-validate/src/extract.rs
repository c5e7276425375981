//! Structural extraction: table references and select-list columns.

use regex::Regex;
use std::sync::LazyLock;

use fathom_types::{ColumnReference, TableReference};

use crate::scan::{
    depth_at, find_top_level, matching_paren, read_identifier, split_top_level, RE_CTE,
    RE_TABLE_KEYWORD,
};

static RE_AGGREGATE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(COUNT|SUM|AVG|MIN|MAX)\s*\(\s*(DISTINCT\s+)?(?:([A-Za-z_]\w*)\.)?(\*|[A-Za-z_]\w*)\s*\)",
    )
    .ok()
});
static RE_BARE_COLUMN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:([A-Za-z_]\w*)\.)?(\*|[A-Za-z_]\w*)$").ok());
static RE_ALIAS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)^(.+?)\s+(?:AS\s+)?([A-Za-z_]\w*)$").ok());
static RE_SET_QUANTIFIER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*(?:DISTINCT\s+ON\s*\([^)]*\)|DISTINCT|ALL)\s+").ok());

/// Words that end a table reference instead of aliasing it.
const CLAUSE_WORDS: &[&str] = &[
    "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "OUTER", "NATURAL", "ON",
    "USING", "GROUP", "ORDER", "LIMIT", "OFFSET", "HAVING", "UNION", "INTERSECT", "EXCEPT",
    "WINDOW", "FETCH", "SET", "VALUES", "SELECT", "FROM", "AS", "LATERAL", "RETURNING", "AND",
    "OR", "WITH", "END", "THEN", "ELSE", "WHEN",
];

/// Bare words in a select list that are values, not columns.
const VALUE_WORDS: &[&str] = &[
    "NULL",
    "TRUE",
    "FALSE",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "LOCALTIMESTAMP",
];

fn is_clause_word(word: &str) -> bool {
    CLAUSE_WORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// What a FROM / JOIN item reads from.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Source {
    Table(TableReference),
    /// `(SELECT ...) alias`; its columns are not known to the catalog.
    Derived(Option<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct FromItem {
    pub source: Source,
    /// Belongs to the main query rather than a nested subquery.
    pub top_level: bool,
}

/// Optional `[AS] alias` at `pos`.
fn read_alias(sql: &str, pos: usize) -> (Option<String>, usize) {
    if let Some((word, after)) = read_identifier(sql, pos) {
        if word.eq_ignore_ascii_case("AS") {
            if let Some((alias, after_alias)) = read_identifier(sql, after) {
                return (Some(alias.to_string()), after_alias);
            }
        } else if !is_clause_word(word) && !word.contains('.') {
            return (Some(word.to_string()), after);
        }
    }
    (None, pos)
}

fn skip_lateral(sql: &str, pos: usize) -> usize {
    match read_identifier(sql, pos) {
        Some((word, after)) if word.eq_ignore_ascii_case("LATERAL") => after,
        _ => pos,
    }
}

/// Every item after FROM / JOIN / INTO, including comma-separated FROM lists
/// and items inside subqueries. Schema-qualified names keep only their last
/// segment.
pub(crate) fn from_items(sql: &str) -> Vec<FromItem> {
    let Some(re) = RE_TABLE_KEYWORD.as_ref() else {
        return Vec::new();
    };
    let mut items = Vec::new();
    for m in re.find_iter(sql) {
        let top_level = depth_at(sql, m.start()) == 0;
        let mut pos = m.end();
        loop {
            pos = skip_lateral(sql, pos);
            let rest = &sql[pos..];
            let open = pos + (rest.len() - rest.trim_start().len());

            let source = if sql.as_bytes().get(open) == Some(&b'(') {
                let Some(close) = matching_paren(sql, open) else {
                    break;
                };
                let (alias, after) = read_alias(sql, close + 1);
                pos = after;
                Source::Derived(alias)
            } else {
                let Some((name, after_name)) = read_identifier(sql, pos) else {
                    break;
                };
                if is_clause_word(name) {
                    break;
                }
                let name = name.rsplit('.').next().unwrap_or(name).to_string();
                let (alias, after) = read_alias(sql, after_name);
                pos = after;
                Source::Table(TableReference { name, alias })
            };
            items.push(FromItem { source, top_level });

            let rest = &sql[pos..];
            match rest.trim_start().strip_prefix(',') {
                Some(stripped) => pos = sql.len() - stripped.len(),
                None => break,
            }
        }
    }
    items
}

/// Catalog-facing table references among `items`.
pub(crate) fn table_references(items: &[FromItem]) -> Vec<TableReference> {
    items
        .iter()
        .filter_map(|item| match &item.source {
            Source::Table(t) => Some(t.clone()),
            Source::Derived(_) => None,
        })
        .collect()
}

/// Names introduced by a leading `WITH` clause.
pub(crate) fn cte_names(sql: &str) -> Vec<String> {
    let trimmed = sql.trim_start();
    let leads_with = trimmed
        .get(..4)
        .is_some_and(|w| w.eq_ignore_ascii_case("WITH"));
    if !leads_with {
        return Vec::new();
    }
    // Only the prelude before the main SELECT can declare names.
    let prelude_end = find_top_level(sql, "SELECT", 0).unwrap_or(sql.len());
    let prelude = &sql[..prelude_end];
    RE_CTE
        .as_ref()
        .map(|re| {
            re.captures_iter(prelude)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// The main query's select list.
pub(crate) struct SelectClause<'a> {
    pub list: &'a str,
    pub has_from: bool,
}

/// Locate the top-level `SELECT ... FROM` of the main query.
pub(crate) fn select_clause(sql: &str) -> Option<SelectClause<'_>> {
    let select = find_top_level(sql, "SELECT", 0)?;
    let start = select + "SELECT".len();
    match find_top_level(sql, "FROM", start) {
        Some(from) => Some(SelectClause {
            list: &sql[start..from],
            has_from: true,
        }),
        None => Some(SelectClause {
            list: &sql[start..],
            has_from: false,
        }),
    }
}

fn strip_alias(item: &str) -> &str {
    let Some(caps) = RE_ALIAS.as_ref().and_then(|re| re.captures(item)) else {
        return item;
    };
    match (caps.get(1), caps.get(2)) {
        (Some(expr), Some(alias)) if !is_clause_word(alias.as_str()) => expr.as_str().trim_end(),
        _ => item,
    }
}

/// Column references in a select list. Bare (optionally qualified) columns
/// and simple aggregate calls are returned; literals and other expressions
/// are skipped.
pub(crate) fn column_references(list: &str) -> Vec<ColumnReference> {
    let list = match RE_SET_QUANTIFIER.as_ref() {
        Some(re) => re.replace(list, "").into_owned(),
        None => list.to_string(),
    };

    let mut refs = Vec::new();
    for item in split_top_level(&list, ',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let expr = strip_alias(item);

        if let Some(caps) = RE_BARE_COLUMN.as_ref().and_then(|re| re.captures(expr)) {
            let column = caps.get(2).map_or("", |m| m.as_str());
            if VALUE_WORDS.iter().any(|w| w.eq_ignore_ascii_case(column)) {
                continue;
            }
            refs.push(ColumnReference {
                qualifier: caps.get(1).map(|m| m.as_str().to_string()),
                column: column.to_string(),
                aggregate: None,
                distinct: false,
            });
            continue;
        }

        if let Some(re) = RE_AGGREGATE.as_ref() {
            for caps in re.captures_iter(expr) {
                refs.push(ColumnReference {
                    qualifier: caps.get(3).map(|m| m.as_str().to_string()),
                    column: caps.get(4).map_or("", |m| m.as_str()).to_string(),
                    aggregate: caps.get(1).map(|m| m.as_str().to_ascii_uppercase()),
                    distinct: caps.get(2).is_some(),
                });
            }
        }
    }
    refs
}
