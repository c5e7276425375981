#![forbid(unsafe_code)]

pub mod catalog;
pub mod macros;
pub mod patterns;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use fathom_types::{ColumnPayload, ColumnType};

pub use patterns::{patterns, QueryPattern};

/// Tables kept by the `core` description (token-reduction fallback).
pub const CORE_TABLES: &[&str] = &["accounts", "transactions", "securities", "holdings"];

/// Columns per table kept by the `core` description.
pub const CORE_COLUMN_LIMIT: usize = 8;

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub description: Option<String>,
    pub unit: Option<String>,
    /// `Some(false)` marks a column as explicitly non-aggregable.
    pub aggregable: Option<bool>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            description: None,
            unit: None,
            aggregable: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_aggregable(mut self, aggregable: bool) -> Self {
        self.aggregable = Some(aggregable);
        self
    }
}

/// Foreign-key style edge: `local_column` joins `target_table.target_column`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Relationship {
    pub local_column: String,
    pub target_table: String,
    pub target_column: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableDescriptor {
    pub name: String,
    pub description: String,
    /// Declaration order is preserved.
    pub columns: Vec<ColumnSpec>,
    pub relationships: Vec<Relationship>,
    pub sensitive_fields: Vec<String>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            columns: Vec::new(),
            relationships: Vec::new(),
            sensitive_fields: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_relationship(
        mut self,
        local_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        self.relationships.push(Relationship {
            local_column: local_column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
        });
        self
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Vector-index payload for one of this table's columns.
    pub fn column_payload(&self, column: &ColumnSpec) -> ColumnPayload {
        ColumnPayload {
            table: self.name.clone(),
            column: column.name.clone(),
            column_type: column.column_type,
            description: column.description.clone(),
            unit: column.unit.clone(),
            aggregable: column.aggregable,
        }
    }
}

/// Embedding source text for a column descriptor.
pub fn column_descriptor_text(table: &TableDescriptor, column: &ColumnSpec) -> String {
    let mut text = format!("{}.{}", table.name, column.name);
    if let Some(desc) = &column.description {
        let _ = write!(text, ": {desc}");
    }
    let _ = write!(text, " ({}", column.column_type);
    if let Some(unit) = &column.unit {
        let _ = write!(text, ", {unit}");
    }
    text.push(')');
    let _ = write!(text, " in table {}: {}", table.name, table.description);
    text
}

/// How much of the catalog `describe` renders.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DescribeMode {
    Full,
    Core,
}

/// Immutable catalog snapshot. Shared behind `Arc`; never mutated after build.
#[derive(Debug)]
pub struct SchemaSnapshot {
    tables: Vec<TableDescriptor>,
    by_name: HashMap<String, usize>,
}

impl SchemaSnapshot {
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        let by_name = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.to_ascii_lowercase(), i))
            .collect();
        Self { tables, by_name }
    }

    /// Case-insensitive table lookup. Unknown tables are `None`, not an error.
    pub fn get_table(&self, name: &str) -> Option<&TableDescriptor> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&i| &self.tables[i])
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnSpec> {
        self.get_table(table).and_then(|t| t.column(column))
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn check_integrity(&self) -> anyhow::Result<()> {
        macros::__check_catalog_invariants(self)
    }

    /// Render the catalog as prompt text.
    pub fn describe(&self, mode: DescribeMode) -> String {
        let mut out = String::from("Database schema:\n");
        let tables: Vec<&TableDescriptor> = match mode {
            DescribeMode::Full => self.tables.iter().collect(),
            DescribeMode::Core => CORE_TABLES
                .iter()
                .filter_map(|name| self.get_table(name))
                .collect(),
        };

        for table in tables {
            let _ = writeln!(out, "\nTable {}: {}", table.name, table.description);
            out.push_str("  Columns:\n");
            let limit = match mode {
                DescribeMode::Full => table.columns.len(),
                DescribeMode::Core => CORE_COLUMN_LIMIT,
            };
            for col in table.columns.iter().take(limit) {
                let _ = write!(out, "    - {} ({}", col.name, col.column_type);
                if let Some(unit) = &col.unit {
                    let _ = write!(out, ", {unit}");
                }
                out.push(')');
                if let Some(desc) = &col.description {
                    let _ = write!(out, ": {desc}");
                }
                out.push('\n');
            }
            if table.columns.len() > limit {
                let _ = writeln!(out, "    ... {} more columns", table.columns.len() - limit);
            }
            if mode == DescribeMode::Full && !table.relationships.is_empty() {
                out.push_str("  Relationships:\n");
                for rel in &table.relationships {
                    let _ = writeln!(
                        out,
                        "    - {}.{} -> {}.{}",
                        table.name, rel.local_column, rel.target_table, rel.target_column
                    );
                }
            }
        }
        out
    }
}

static SNAPSHOT: OnceLock<Arc<SchemaSnapshot>> = OnceLock::new();

/// Load the built-in financial catalog. Built on first call, frozen afterwards.
pub fn load() -> Arc<SchemaSnapshot> {
    SNAPSHOT
        .get_or_init(|| Arc::new(SchemaSnapshot::new(catalog::financial_tables())))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_is_memoized() {
        let a = load();
        let b = load();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn lookups_are_case_insensitive_and_absent_is_none() {
        let schema = load();
        assert!(schema.get_table("ACCOUNTS").is_some());
        assert!(schema.column("accounts", "Balance").is_some());
        assert!(schema.get_table("ledger").is_none());
        assert!(schema.column("accounts", "nope").is_none());
    }

    #[test]
    fn core_description_is_a_truncated_subset() {
        let schema = load();
        let full = schema.describe(DescribeMode::Full);
        let core = schema.describe(DescribeMode::Core);
        assert!(core.len() < full.len());
        assert!(core.contains("Table accounts"));
        assert!(!core.contains("Table fund_holdings"));
        assert!(full.contains("Table fund_holdings"));
        assert!(!core.contains("Relationships:"));
    }

    #[test]
    fn core_description_truncates_columns() {
        let mut table = TableDescriptor::new("accounts", "wide");
        for i in 0..12 {
            table = table.with_column(ColumnSpec::new(format!("c{i}"), ColumnType::Integer));
        }
        let schema = SchemaSnapshot::new(vec![table]);
        let core = schema.describe(DescribeMode::Core);
        assert!(core.contains("c7 (integer)"));
        assert!(!core.contains("c8 (integer)"));
        assert!(core.contains("4 more columns"));
    }

    #[test]
    fn descriptor_text_mentions_type_and_unit() {
        let schema = load();
        let table = schema.get_table("accounts").unwrap();
        let col = table.column("balance").unwrap();
        let text = column_descriptor_text(table, col);
        assert!(text.starts_with("accounts.balance"));
        assert!(text.contains("numeric, USD"));
    }
}
