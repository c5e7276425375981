use std::collections::{HashSet, VecDeque};

use fathom_schema::SchemaSnapshot;
use fathom_types::RelationshipEdge;

/// Hard ceiling on relationship expansion, whatever the configuration says.
pub const MAX_EXPANSION_DEPTH: usize = 2;

/// Breadth-first walk of the relationship graph starting at `seeds`.
///
/// Relationships are followed in both directions, but every edge is reported
/// as declared (`from_table` is the table holding the foreign key). Each edge
/// appears once, keyed on (from, to, join key), at the hop count where it was
/// first reached. Unknown seed tables are ignored.
pub fn expand_relationships(
    schema: &SchemaSnapshot,
    seeds: &[&str],
    max_depth: usize,
) -> Vec<RelationshipEdge> {
    let max_depth = max_depth.min(MAX_EXPANSION_DEPTH);
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    for seed in seeds {
        if let Some(table) = schema.get_table(seed) {
            if visited.insert(table.name.clone()) {
                queue.push_back((table.name.clone(), 0));
            }
        }
    }

    let mut seen: HashSet<(String, String, String, String)> = HashSet::new();
    let mut edges = Vec::new();

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for table in schema.tables() {
            for rel in &table.relationships {
                let outgoing = table.name == current;
                let incoming = rel.target_table == current;
                if !outgoing && !incoming {
                    continue;
                }
                let key = (
                    table.name.clone(),
                    rel.local_column.clone(),
                    rel.target_table.clone(),
                    rel.target_column.clone(),
                );
                if seen.insert(key) {
                    edges.push(RelationshipEdge {
                        from_table: table.name.clone(),
                        from_column: rel.local_column.clone(),
                        to_table: rel.target_table.clone(),
                        to_column: rel.target_column.clone(),
                        depth: depth + 1,
                    });
                }
                let neighbour = if outgoing { &rel.target_table } else { &table.name };
                if visited.insert(neighbour.clone()) {
                    queue.push_back((neighbour.clone(), depth + 1));
                }
            }
        }
    }
    edges
}
