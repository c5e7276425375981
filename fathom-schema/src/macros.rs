//! Macro that turns the catalog declarations into `TableDescriptor` values.

use std::collections::HashSet;

use crate::SchemaSnapshot;

/// Catalog integrity check (safety net for hand-written declarations).
///
/// Every relationship must point at a declared table and join columns that
/// exist on both sides; every sensitive field must be a declared column.
pub fn __check_catalog_invariants(snapshot: &SchemaSnapshot) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for table in snapshot.tables() {
        if !seen.insert(table.name.to_ascii_lowercase()) {
            anyhow::bail!("catalog declares table {} twice", table.name);
        }
        for rel in &table.relationships {
            if table.column(&rel.local_column).is_none() {
                anyhow::bail!(
                    "relationship {}.{} -> {}.{}: local column missing",
                    table.name,
                    rel.local_column,
                    rel.target_table,
                    rel.target_column
                );
            }
            let Some(target) = snapshot.get_table(&rel.target_table) else {
                anyhow::bail!(
                    "relationship {}.{} targets unknown table {}",
                    table.name,
                    rel.local_column,
                    rel.target_table
                );
            };
            if target.column(&rel.target_column).is_none() {
                anyhow::bail!(
                    "relationship {}.{} targets unknown column {}.{}",
                    table.name,
                    rel.local_column,
                    rel.target_table,
                    rel.target_column
                );
            }
        }
        for field in &table.sensitive_fields {
            if table.column(field).is_none() {
                anyhow::bail!("sensitive field {}.{} is not a column", table.name, field);
            }
        }
    }
    Ok(())
}

/// Map DSL token -> `ColumnType`.
#[macro_export]
macro_rules! __ty_to_column_type {
    ( Uuid ) => { ::fathom_types::ColumnType::Uuid };
    ( Text ) => { ::fathom_types::ColumnType::Text };
    ( Integer ) => { ::fathom_types::ColumnType::Integer };
    ( Numeric ) => { ::fathom_types::ColumnType::Numeric };
    ( Date ) => { ::fathom_types::ColumnType::Date };
    ( Timestamp ) => { ::fathom_types::ColumnType::Timestamp };
    ( Boolean ) => { ::fathom_types::ColumnType::Boolean };
}

/// Declarative catalog definitions. Generates `$fn_name() -> Vec<TableDescriptor>`
/// preserving declaration order for tables and columns.
#[macro_export]
macro_rules! define_catalog {
    (
        fn $fn_name:ident;
        $(
            table $tname:ident {
                description: $tdesc:literal,
                columns: {
                    $(
                        $cname:ident : $cty:ident , $cdesc:literal
                        $( , unit: $unit:literal )?
                        $( , aggregable: $agg:literal )?
                        ;
                    )*
                },
                relationships: [
                    $( $from:ident -> $to_table:ident . $to_col:ident ),* $(,)?
                ],
                sensitive: [ $( $sensitive:ident ),* $(,)? ] $(,)?
            }
        ),* $(,)?
    ) => {
        pub fn $fn_name() -> ::std::vec::Vec<$crate::TableDescriptor> {
            vec![
                $(
                    $crate::TableDescriptor {
                        name: stringify!($tname).to_string(),
                        description: $tdesc.to_string(),
                        columns: vec![
                            $(
                                $crate::ColumnSpec {
                                    name: stringify!($cname).to_string(),
                                    column_type: $crate::__ty_to_column_type!($cty),
                                    description: Some($cdesc.to_string()),
                                    unit: None $( .or(Some($unit.to_string())) )?,
                                    aggregable: None $( .or(Some($agg)) )?,
                                },
                            )*
                        ],
                        relationships: vec![
                            $(
                                $crate::Relationship {
                                    local_column: stringify!($from).to_string(),
                                    target_table: stringify!($to_table).to_string(),
                                    target_column: stringify!($to_col).to_string(),
                                },
                            )*
                        ],
                        sensitive_fields: vec![ $( stringify!($sensitive).to_string() ),* ],
                    },
                )*
            ]
        }
    };
}
