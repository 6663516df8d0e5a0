//! Join path resolution over the schema's join graph.
//!
//! Path search is a breadth-first walk that visits incident edges in
//! declaration order, so identical plans always produce identical joins.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use super::{CompileError, CompileResult};
use crate::schema::{JoinEdge, JoinKind, SchemaGraph};
use crate::sql::expr::Expr;
use crate::sql::query::{Join, JoinType, TableRef};

/// One emitted join: the newly introduced table and its condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedJoin {
    pub table: String,
    pub kind: JoinKind,
    pub on: Expr,
}

impl ResolvedJoin {
    pub fn to_join(&self) -> Join {
        Join {
            join_type: match self.kind {
                JoinKind::Inner => JoinType::Inner,
                JoinKind::Left => JoinType::Left,
            },
            table: TableRef::new(&self.table).into(),
            on: Some(self.on.clone()),
        }
    }
}

pub struct JoinResolver<'a> {
    schema: &'a SchemaGraph,
}

impl<'a> JoinResolver<'a> {
    pub fn new(schema: &'a SchemaGraph) -> Self {
        Self { schema }
    }

    /// Edges on the shortest path from `start` to `target`, start side first.
    pub fn find_path(&self, start: &str, target: &str) -> CompileResult<Vec<&'a JoinEdge>> {
        let edges = self.schema.edges();
        Ok(self
            .path_indices(start, target)?
            .into_iter()
            .map(|i| &edges[i])
            .collect())
    }

    fn path_indices(&self, start: &str, target: &str) -> CompileResult<Vec<usize>> {
        let start_node = self.node(start)?;
        let target_node = self.node(target)?;
        if start_node == target_node {
            return Ok(vec![]);
        }

        let graph = self.schema.graph();
        let mut visited: HashSet<NodeIndex> = HashSet::from([start_node]);
        let mut parents: HashMap<NodeIndex, (NodeIndex, usize)> = HashMap::new();
        let mut queue = VecDeque::from([start_node]);

        'search: while let Some(current) = queue.pop_front() {
            let mut incident: Vec<_> = graph.edges(current).collect();
            incident.sort_by_key(|e| *e.weight());

            for edge in incident {
                let next = if edge.source() == current {
                    edge.target()
                } else {
                    edge.source()
                };
                if !visited.insert(next) {
                    continue;
                }
                tracing::trace!(from = %graph[current], to = %graph[next], edge = *edge.weight(), "visit");
                parents.insert(next, (current, *edge.weight()));
                if next == target_node {
                    break 'search;
                }
                queue.push_back(next);
            }
        }

        if !parents.contains_key(&target_node) {
            return Err(CompileError::NoJoinPath {
                from: start.into(),
                to: target.into(),
            });
        }

        let mut path = vec![];
        let mut node = target_node;
        while let Some(&(parent, edge)) = parents.get(&node) {
            path.push(edge);
            node = parent;
        }
        path.reverse();
        Ok(path)
    }

    fn node(&self, table: &str) -> CompileResult<NodeIndex> {
        self.schema
            .node_index(table)
            .ok_or_else(|| CompileError::UnknownTable(table.into()))
    }

    /// Order `edges` so that every join references only tables already
    /// present, starting from `base`.
    ///
    /// Edges whose endpoints are both present are dropped as implied.
    pub fn emit(&self, base: &str, edges: &[&JoinEdge]) -> CompileResult<Vec<ResolvedJoin>> {
        let mut present: HashSet<&str> = HashSet::from([base]);
        let mut remaining: Vec<&JoinEdge> = edges.to_vec();
        let mut joins = vec![];

        while !remaining.is_empty() {
            let mut progressed = false;
            let mut stuck = vec![];

            for edge in remaining {
                let left = present.contains(edge.left_table.as_str());
                let right = present.contains(edge.right_table.as_str());
                let introduced = match (left, right) {
                    (true, false) => &edge.right_table,
                    (false, true) => &edge.left_table,
                    (true, true) => {
                        progressed = true;
                        continue;
                    }
                    (false, false) => {
                        stuck.push(edge);
                        continue;
                    }
                };
                joins.push(ResolvedJoin {
                    table: introduced.clone(),
                    kind: edge.kind,
                    on: edge.on_clause(),
                });
                present.insert(introduced.as_str());
                progressed = true;
            }

            remaining = stuck;
            if !progressed {
                break;
            }
        }

        if !remaining.is_empty() {
            let tables: BTreeSet<String> = remaining
                .iter()
                .flat_map(|e| [e.left_table.clone(), e.right_table.clone()])
                .collect();
            return Err(CompileError::UnresolvableJoinOrder {
                tables: tables.into_iter().collect(),
            });
        }

        Ok(joins)
    }

    /// Minimal joins connecting `base` to every table in `required`.
    ///
    /// Paths are collected in sorted table order and deduplicated before
    /// emission.
    pub fn resolve(&self, base: &str, required: &BTreeSet<String>) -> CompileResult<Vec<ResolvedJoin>> {
        let mut needed: Vec<&JoinEdge> = vec![];
        for table in required {
            for edge in self.find_path(base, table)? {
                if !needed.contains(&edge) {
                    needed.push(edge);
                }
            }
        }

        let joins = self.emit(base, &needed)?;
        tracing::debug!(
            base,
            joined = ?joins.iter().map(|j| j.table.as_str()).collect::<Vec<_>>(),
            "resolved join path"
        );
        Ok(joins)
    }
}
