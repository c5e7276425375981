//! Structural SQL validation against the schema catalog.
//!
//! Validation never fails: every problem lands in the returned
//! [`ValidationResult`]. Errors block execution, warnings and suggestions are
//! advisory and feed the correction hint sent back to the SQL generator.

#![forbid(unsafe_code)]

mod extract;
mod scan;

use std::collections::HashMap;
use std::sync::Arc;

use fathom_schema::{ColumnSpec, SchemaSnapshot, TableDescriptor};
use fathom_types::{ColumnReference, ColumnType, TableReference, ValidationResult};
use tracing::debug;

use crate::extract::{FromItem, Source};
use crate::scan::{edit_distance, matches, RE_FORBIDDEN, RE_LIMIT, RE_ORDER_BY, RE_WORD};

/// Tables large enough that an unbounded `SELECT *` is worth a warning.
pub const HIGH_VOLUME_TABLES: &[&str] = &["transactions", "price_history", "holdings", "fund_holdings"];

/// Frequent keyword misspellings and their intended keyword.
const KEYWORD_TYPOS: &[(&str, &str)] = &[
    ("FORM", "FROM"),
    ("FRON", "FROM"),
    ("SELCT", "SELECT"),
    ("SLECT", "SELECT"),
    ("SELET", "SELECT"),
    ("WHRE", "WHERE"),
    ("WHER", "WHERE"),
    ("WEHRE", "WHERE"),
    ("GRUOP", "GROUP"),
    ("GROPU", "GROUP"),
    ("ODER", "ORDER"),
    ("ORDR", "ORDER"),
    ("JION", "JOIN"),
    ("LIMT", "LIMIT"),
    ("LIMTI", "LIMIT"),
    ("HAIVNG", "HAVING"),
    ("HAVNG", "HAVING"),
    ("DISTICT", "DISTINCT"),
];

const ALL_AGGREGATES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX"];

/// Aggregates a column type supports.
fn allowed_aggregates(column_type: ColumnType) -> &'static [&'static str] {
    match column_type {
        ColumnType::Text | ColumnType::Uuid | ColumnType::Boolean => &["COUNT"],
        ColumnType::Date | ColumnType::Timestamp => &["COUNT", "MIN", "MAX"],
        ColumnType::Integer | ColumnType::Numeric => ALL_AGGREGATES,
    }
}

/// Sources visible to the main query, keyed by lowercase name and alias.
/// `None` marks a name whose columns are unknown (CTEs, derived tables,
/// unknown tables).
struct Scope<'s> {
    by_name: HashMap<String, Option<&'s TableDescriptor>>,
    tables: Vec<&'s TableDescriptor>,
    opaque: bool,
}

pub struct SqlValidator {
    schema: Arc<SchemaSnapshot>,
}

impl SqlValidator {
    pub fn new(schema: Arc<SchemaSnapshot>) -> Self {
        Self { schema }
    }

    pub fn validate(&self, sql: &str) -> ValidationResult {
        let mut res = ValidationResult::default();
        if sql.trim().is_empty() {
            res.errors.push("SQL is empty".into());
            return res;
        }

        self.check_safety(sql, &mut res);

        let prepared = scan::prepare(sql);
        let body = prepared.trim().trim_end_matches(';').trim_end();
        if body.contains(';') {
            res.errors
                .push("multiple statements are not allowed; send a single SELECT".into());
        }

        let items = extract::from_items(body);
        res.tables = extract::table_references(&items);
        match extract::select_clause(body) {
            Some(clause) => {
                if !clause.has_from {
                    res.errors.push("missing FROM clause".into());
                }
                res.columns = extract::column_references(clause.list);
            }
            None => res
                .errors
                .push("only read-only SELECT queries are supported".into()),
        }

        let ctes = extract::cte_names(body);
        let tables = res.tables.clone();
        self.check_tables_exist(&tables, &ctes, &mut res);
        let scope = self.outer_scope(&items, &ctes);
        for column in res.columns.clone() {
            self.check_column(&column, &scope, &mut res);
        }

        self.check_keyword_typos(body, &mut res);
        self.check_row_limits(body, &scope, &mut res);

        res.suggestions.dedup();
        res.valid = res.errors.is_empty();
        debug!(
            valid = res.valid,
            errors = res.errors.len(),
            warnings = res.warnings.len(),
            tables = res.tables.len(),
            columns = res.columns.len(),
            "validated sql"
        );
        res
    }

    /// Forbidden statements anywhere in the text, literals and comments included.
    fn check_safety(&self, sql: &str, res: &mut ValidationResult) {
        let Some(re) = RE_FORBIDDEN.as_ref() else {
            return;
        };
        let mut seen: Vec<String> = Vec::new();
        for m in re.find_iter(sql) {
            let keyword = m.as_str().to_ascii_uppercase();
            if !seen.contains(&keyword) {
                res.errors.push(format!(
                    "forbidden keyword {keyword}: only read-only queries may be executed"
                ));
                seen.push(keyword);
            }
        }
    }

    /// Every referenced table, subqueries included, must be a catalog table
    /// or a CTE.
    fn check_tables_exist(&self, tables: &[TableReference], ctes: &[String], res: &mut ValidationResult) {
        for table in tables {
            let is_cte = ctes.iter().any(|c| c.eq_ignore_ascii_case(&table.name));
            if is_cte || self.schema.get_table(&table.name).is_some() {
                continue;
            }
            let error = format!(
                "unknown table '{}'; available tables: {}",
                table.name,
                self.schema.table_names().join(", ")
            );
            if res.errors.contains(&error) {
                continue;
            }
            res.errors.push(error);
            if let Some(near) = self.nearest_table(&table.name) {
                res.suggestions
                    .push(format!("did you mean table '{near}' instead of '{}'?", table.name));
            }
        }
    }

    /// Sources visible to the main select list. Tables read only inside
    /// subqueries do not own its columns.
    fn outer_scope<'s>(&'s self, items: &[FromItem], ctes: &[String]) -> Scope<'s> {
        let mut scope = Scope {
            by_name: HashMap::new(),
            tables: Vec::new(),
            opaque: false,
        };
        for item in items.iter().filter(|i| i.top_level) {
            let (names, descriptor) = match &item.source {
                Source::Derived(alias) => (vec![alias.as_deref()], None),
                Source::Table(table) => {
                    let is_cte = ctes.iter().any(|c| c.eq_ignore_ascii_case(&table.name));
                    let descriptor = if is_cte {
                        None
                    } else {
                        self.schema.get_table(&table.name)
                    };
                    (vec![Some(table.name.as_str()), table.alias.as_deref()], descriptor)
                }
            };

            if descriptor.is_none() {
                scope.opaque = true;
            }
            for name in names.into_iter().flatten() {
                scope.by_name.insert(name.to_ascii_lowercase(), descriptor);
            }
            if let Some(t) = descriptor {
                if !scope.tables.iter().any(|s| s.name == t.name) {
                    scope.tables.push(t);
                }
            }
        }
        scope
    }

    fn nearest_table(&self, name: &str) -> Option<&str> {
        self.schema
            .table_names()
            .into_iter()
            .map(|t| (edit_distance(t, name), t))
            .filter(|(d, _)| *d <= 2)
            .min_by_key(|(d, _)| *d)
            .map(|(_, t)| t)
    }

    /// Resolve a column reference to its owning table and check it exists.
    fn resolve<'s>(
        &self,
        column: &ColumnReference,
        scope: &Scope<'s>,
        res: &mut ValidationResult,
    ) -> Option<(&'s TableDescriptor, Option<&'s ColumnSpec>)> {
        let owner = match &column.qualifier {
            Some(q) => match scope.by_name.get(&q.to_ascii_lowercase()) {
                Some(Some(t)) => *t,
                Some(None) => return None,
                None => {
                    res.suggestions.push(format!(
                        "qualifier '{q}' in '{q}.{}' is neither a table in the query nor a declared alias",
                        column.column
                    ));
                    return None;
                }
            },
            None if scope.opaque || column.is_star() => return None,
            None => match scope.tables.as_slice() {
                [] => return None,
                [only] => *only,
                many => {
                    let owners: Vec<&TableDescriptor> = many
                        .iter()
                        .copied()
                        .filter(|t| t.column(&column.column).is_some())
                        .collect();
                    match owners.as_slice() {
                        [one] => *one,
                        [] => {
                            let available: Vec<String> = many
                                .iter()
                                .flat_map(|t| t.columns.iter().map(move |c| format!("{}.{}", t.name, c.name)))
                                .collect();
                            res.errors.push(format!(
                                "unknown column '{}' in any of the queried tables; available columns: {}",
                                column.column,
                                available.join(", ")
                            ));
                            return None;
                        }
                        several => {
                            let names: Vec<&str> = several.iter().map(|t| t.name.as_str()).collect();
                            res.warnings.push(format!(
                                "ambiguous column '{}' exists in {}; qualify it with a table alias",
                                column.column,
                                names.join(", ")
                            ));
                            return None;
                        }
                    }
                }
            },
        };

        if column.is_star() {
            return Some((owner, None));
        }
        match owner.column(&column.column) {
            Some(spec) => Some((owner, Some(spec))),
            None => {
                res.errors.push(format!(
                    "unknown column '{}' on table '{}'; available columns: {}",
                    column.column,
                    owner.name,
                    owner.column_names().join(", ")
                ));
                let near = owner
                    .columns
                    .iter()
                    .map(|c| (edit_distance(&c.name, &column.column), c.name.as_str()))
                    .filter(|(d, _)| *d <= 2)
                    .min_by_key(|(d, _)| *d);
                if let Some((_, near)) = near {
                    res.suggestions
                        .push(format!("did you mean column '{near}' instead of '{}'?", column.column));
                }
                None
            }
        }
    }

    fn check_column(&self, column: &ColumnReference, scope: &Scope<'_>, res: &mut ValidationResult) {
        if let (Some(agg), true) = (&column.aggregate, column.is_star()) {
            if agg != "COUNT" {
                res.errors
                    .push(format!("{agg}(*) is not allowed; only COUNT(*) accepts '*'"));
            }
            return;
        }

        let Some((table, Some(spec))) = self.resolve(column, scope, res) else {
            return;
        };
        let Some(agg) = &column.aggregate else {
            return;
        };

        let allowed = allowed_aggregates(spec.column_type);
        if !allowed.contains(&agg.as_str()) {
            res.errors.push(format!(
                "{agg}({}.{}) is not allowed: {} columns support {} only",
                table.name,
                spec.name,
                spec.column_type,
                allowed.join(", ")
            ));
        } else if spec.aggregable == Some(false) && matches!(agg.as_str(), "SUM" | "AVG") {
            res.warnings.push(format!(
                "{}.{} is not meant to be aggregated with {agg}",
                table.name, spec.name
            ));
        }
    }

    fn check_keyword_typos(&self, sql: &str, res: &mut ValidationResult) {
        let Some(re) = RE_WORD.as_ref() else {
            return;
        };
        for word in re.find_iter(sql) {
            let upper = word.as_str().to_ascii_uppercase();
            if let Some((typo, keyword)) = KEYWORD_TYPOS.iter().find(|(t, _)| *t == upper) {
                let hint = format!("'{}' looks like a misspelling of {keyword}; did you mean {keyword}?", word.as_str());
                if !res.suggestions.contains(&hint) {
                    debug!(typo, "keyword misspelling");
                    res.suggestions.push(hint);
                }
            }
        }
    }

    fn check_row_limits(&self, sql: &str, scope: &Scope<'_>, res: &mut ValidationResult) {
        let has_limit = matches(&RE_LIMIT, sql);
        if has_limit && !matches(&RE_ORDER_BY, sql) {
            res.warnings
                .push("LIMIT without ORDER BY returns an arbitrary subset of rows".into());
        }
        if has_limit {
            return;
        }

        for column in res.columns.iter().filter(|c| c.is_star() && c.aggregate.is_none()) {
            let targets: Vec<&TableDescriptor> = match &column.qualifier {
                Some(q) => scope
                    .by_name
                    .get(&q.to_ascii_lowercase())
                    .copied()
                    .flatten()
                    .into_iter()
                    .collect(),
                None => scope.tables.clone(),
            };
            for t in targets {
                if HIGH_VOLUME_TABLES.contains(&t.name.as_str()) {
                    let warning = format!("SELECT * on large table '{}' without LIMIT", t.name);
                    if !res.warnings.contains(&warning) {
                        res.warnings.push(warning);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SqlValidator {
        SqlValidator::new(fathom_schema::load())
    }

    #[test]
    fn empty_sql_is_invalid() {
        let res = validator().validate("  ");
        assert!(!res.valid);
    }

    #[test]
    fn every_forbidden_keyword_is_reported_once() {
        let res = validator().validate("DROP TABLE accounts; drop table customers; TRUNCATE holdings");
        let forbidden: Vec<_> = res.errors.iter().filter(|e| e.starts_with("forbidden")).collect();
        assert_eq!(forbidden.len(), 2);
        assert!(res.errors.iter().any(|e| e.contains("multiple statements")));
    }

    #[test]
    fn trailing_semicolon_is_fine() {
        let res = validator().validate("SELECT ticker FROM securities ;  ");
        assert!(res.valid, "{:?}", res.errors);
    }

    #[test]
    fn aliases_resolve_owning_tables() {
        let res = validator().validate(
            "SELECT s.ticker, h.market_value FROM holdings h JOIN securities s ON s.security_id = h.security_id ORDER BY h.market_value DESC LIMIT 10",
        );
        assert!(res.valid, "{:?}", res.errors);
        assert!(res.warnings.is_empty(), "{:?}", res.warnings);

        let res = validator().validate("SELECT h.ticker FROM holdings h");
        assert!(!res.valid);
        assert!(res.errors[0].contains("'ticker' on table 'holdings'"));
    }

    #[test]
    fn unqualified_columns_in_joins() {
        // ticker lives only in securities.
        let res = validator().validate(
            "SELECT ticker, market_value FROM holdings h JOIN securities s ON s.security_id = h.security_id",
        );
        assert!(res.valid, "{:?}", res.errors);

        // security_id exists on both sides.
        let res = validator().validate(
            "SELECT security_id FROM holdings h JOIN securities s ON s.security_id = h.security_id",
        );
        assert!(res.valid);
        assert!(res.warnings.iter().any(|w| w.contains("ambiguous column 'security_id'")));

        let res = validator().validate(
            "SELECT colour FROM holdings h JOIN securities s ON s.security_id = h.security_id",
        );
        assert!(!res.valid);
        assert!(res.errors[0].contains("colour"));
    }

    #[test]
    fn unknown_table_gets_a_near_match() {
        let res = validator().validate("SELECT balance FROM acounts");
        assert!(!res.valid);
        assert!(res.errors[0].contains("unknown table 'acounts'"));
        assert!(res.suggestions.iter().any(|s| s.contains("'accounts'")));
    }

    #[test]
    fn foreign_qualifiers_are_suggestions() {
        let res = validator().validate("SELECT x.balance FROM accounts a");
        assert!(res.valid);
        assert!(res.suggestions.iter().any(|s| s.contains("qualifier 'x'")));
    }

    #[test]
    fn aggregation_typing() {
        let v = validator();
        assert!(v.validate("SELECT COUNT(DISTINCT ticker) FROM securities").valid);
        assert!(v.validate("SELECT MAX(opened_on) FROM accounts").valid);
        assert!(!v.validate("SELECT AVG(opened_on) FROM accounts").valid);
        assert!(!v.validate("SELECT SUM(account_id) FROM accounts").valid);
        assert!(!v.validate("SELECT SUM(*) FROM accounts").valid);

        let res = v.validate("SELECT SUM(morningstar_rating) FROM funds");
        assert!(res.valid);
        assert!(res.warnings.iter().any(|w| w.contains("funds.morningstar_rating")));
    }

    #[test]
    fn ctes_are_opaque_but_allowed() {
        let res = validator().validate(
            "WITH big AS (SELECT account_id, balance FROM accounts WHERE balance > 100000) SELECT account_id FROM big",
        );
        assert!(res.valid, "{:?}", res.errors);
    }

    #[test]
    fn subquery_tables_do_not_own_outer_columns() {
        let v = validator();
        let res = v.validate(
            "SELECT full_name FROM customers WHERE customer_id IN (SELECT customer_id FROM accounts WHERE balance > 0)",
        );
        assert!(res.valid, "{:?}", res.errors);
        assert_eq!(res.tables.len(), 2);

        // balance lives on accounts, which only the subquery reads.
        let res = v.validate(
            "SELECT balance FROM customers WHERE customer_id IN (SELECT customer_id FROM accounts)",
        );
        assert!(!res.valid);
        assert!(res.errors[0].contains("'balance' on table 'customers'"), "{:?}", res.errors);

        let res = v.validate("SELECT total FROM (SELECT SUM(balance) AS total FROM acounts) t");
        assert!(!res.valid);
        assert!(res.errors[0].contains("unknown table 'acounts'"));
    }

    #[test]
    fn row_limit_warnings() {
        let v = validator();
        let res = v.validate("SELECT * FROM transactions");
        assert!(res.valid);
        assert!(res.warnings.iter().any(|w| w.contains("large table 'transactions'")));

        let res = v.validate("SELECT * FROM customers");
        assert!(res.warnings.is_empty());

        let res = v.validate("SELECT ticker FROM securities LIMIT 5");
        assert!(res.warnings.iter().any(|w| w.contains("LIMIT without ORDER BY")));
    }

    #[test]
    fn function_arguments_are_not_tables() {
        let res = validator().validate(
            "SELECT EXTRACT(YEAR FROM transaction_date) AS yr, SUM(amount) FROM transactions GROUP BY 1",
        );
        assert!(res.valid, "{:?}", res.errors);
        assert_eq!(res.tables.len(), 1);
    }

    #[test]
    fn extracted_references_are_returned() {
        let res = validator().validate("SELECT a.balance FROM public.accounts AS a");
        assert_eq!(res.tables[0].name, "accounts");
        assert_eq!(res.tables[0].alias.as_deref(), Some("a"));
        assert_eq!(res.columns[0].qualifier.as_deref(), Some("a"));
    }
}
