//! Schema Graph and Metric Catalog.
//!
//! Static description of the reporting database: tables with their roles and
//! special columns, the declared join edges between them, and the canonical
//! metric definitions. Built once and shared read-only by every compile.
//!
//! The join edges also form an undirected petgraph graph used by the join
//! resolver. Edge weights are declaration indices, which is what keeps path
//! search deterministic.

pub mod loader;
mod metrics;
mod restaurant;

use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sql::expr::{func, lit_str, table_col, Expr, ExprExt};

pub use loader::{load_catalog, parse_catalog};
pub use metrics::{MetricCatalog, MetricDef};
pub use restaurant::restaurant_catalog;

// =============================================================================
// Errors
// =============================================================================

/// Failed lookup against the schema or metric catalog.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown metric: {0}")]
    UnknownMetric(String),
}

pub type LookupResult<T> = Result<T, LookupError>;

/// Error building or loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file not found: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("failed to read catalog: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("duplicate table: {0}")]
    DuplicateTable(String),

    #[error("duplicate metric: {0}")]
    DuplicateMetric(String),

    #[error("join edge {left} -> {right} references an unknown table")]
    InvalidJoin { left: String, right: String },

    #[error("{owner} references unknown table {table}")]
    UnknownReference { owner: String, table: String },

    #[error("invalid expression for metric {metric}: {reason}")]
    InvalidExpression { metric: String, reason: String },
}

// =============================================================================
// Tables
// =============================================================================

/// Whether a table holds events or describes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableRole {
    Fact,
    Dimension,
}

/// Self-referential tree stored in a single table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub id: String,
    pub parent: String,
    pub label: String,
}

/// A table and its special columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub role: TableRole,
    pub primary_key: String,
    /// Tenant-scoping column.
    pub scope_column: Option<String>,
    /// Canonical date column.
    pub date_column: Option<String>,
    /// Soft-cancellation flag; NULL counts as not canceled.
    pub cancel_column: Option<String>,
    /// Table that supplies the date column and tenant scope for this one.
    pub anchor: Option<String>,
    pub hierarchy: Option<Hierarchy>,
}

impl TableSpec {
    fn new(name: &str, role: TableRole) -> Self {
        Self {
            name: name.into(),
            role,
            primary_key: "uuid".into(),
            scope_column: None,
            date_column: None,
            cancel_column: None,
            anchor: None,
            hierarchy: None,
        }
    }

    pub fn fact(name: &str) -> Self {
        Self::new(name, TableRole::Fact)
    }

    pub fn dimension(name: &str) -> Self {
        Self::new(name, TableRole::Dimension)
    }

    pub fn with_scope(mut self, column: &str) -> Self {
        self.scope_column = Some(column.into());
        self
    }

    pub fn with_date(mut self, column: &str) -> Self {
        self.date_column = Some(column.into());
        self
    }

    pub fn with_cancel(mut self, column: &str) -> Self {
        self.cancel_column = Some(column.into());
        self
    }

    pub fn with_anchor(mut self, table: &str) -> Self {
        self.anchor = Some(table.into());
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: Hierarchy) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }
}

// =============================================================================
// Joins
// =============================================================================

/// How a join edge is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
}

/// A declared foreign-key relationship. Directionless for path search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEdge {
    pub left_table: String,
    pub left_key: String,
    pub right_table: String,
    pub right_key: String,
    pub kind: JoinKind,
}

impl JoinEdge {
    pub fn new(left_table: &str, left_key: &str, right_table: &str, right_key: &str, kind: JoinKind) -> Self {
        Self {
            left_table: left_table.into(),
            left_key: left_key.into(),
            right_table: right_table.into(),
            right_key: right_key.into(),
            kind,
        }
    }

    /// `left.left_key = right.right_key`
    pub fn on_clause(&self) -> Expr {
        table_col(&self.left_table, &self.left_key).eq(table_col(&self.right_table, &self.right_key))
    }
}

/// The transactional table and the predicate marking a finished transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedState {
    pub table: String,
    pub column: String,
    pub value: String,
}

impl CompletedState {
    /// `<qualifier>.<column> = '<value>'`
    pub fn predicate(&self, qualifier: &str) -> Expr {
        table_col(qualifier, &self.column).eq(lit_str(&self.value))
    }
}

// =============================================================================
// Schema Graph
// =============================================================================

/// Immutable schema description plus its join connectivity graph.
#[derive(Debug, Clone)]
pub struct SchemaGraph {
    tables: Vec<TableSpec>,
    table_index: HashMap<String, usize>,
    edges: Vec<JoinEdge>,
    completed: Option<CompletedState>,
    graph: UnGraph<String, usize>,
    node_indices: HashMap<String, NodeIndex>,
}

impl SchemaGraph {
    /// Build a schema, rejecting duplicate tables and edges or anchors that
    /// name unknown tables.
    pub fn new(
        tables: Vec<TableSpec>,
        edges: Vec<JoinEdge>,
        completed: Option<CompletedState>,
    ) -> Result<Self, CatalogError> {
        let mut table_index = HashMap::new();
        let mut graph = UnGraph::new_undirected();
        let mut node_indices = HashMap::new();

        for (i, table) in tables.iter().enumerate() {
            if table_index.insert(table.name.clone(), i).is_some() {
                return Err(CatalogError::DuplicateTable(table.name.clone()));
            }
            node_indices.insert(table.name.clone(), graph.add_node(table.name.clone()));
        }

        for table in &tables {
            if let Some(anchor) = &table.anchor {
                if !table_index.contains_key(anchor) {
                    return Err(CatalogError::UnknownReference {
                        owner: table.name.clone(),
                        table: anchor.clone(),
                    });
                }
            }
        }

        for (i, edge) in edges.iter().enumerate() {
            match (
                node_indices.get(&edge.left_table),
                node_indices.get(&edge.right_table),
            ) {
                (Some(&left), Some(&right)) => {
                    graph.add_edge(left, right, i);
                }
                _ => {
                    return Err(CatalogError::InvalidJoin {
                        left: edge.left_table.clone(),
                        right: edge.right_table.clone(),
                    })
                }
            }
        }

        if let Some(state) = &completed {
            if !table_index.contains_key(&state.table) {
                return Err(CatalogError::UnknownReference {
                    owner: "completed_state".into(),
                    table: state.table.clone(),
                });
            }
        }

        Ok(Self {
            tables,
            table_index,
            edges,
            completed,
            graph,
            node_indices,
        })
    }

    /// Resolve a table name to its spec.
    pub fn table(&self, name: &str) -> LookupResult<&TableSpec> {
        self.table_index
            .get(name)
            .map(|&i| &self.tables[i])
            .ok_or_else(|| LookupError::UnknownTable(name.into()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table_index.contains_key(name)
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables.iter()
    }

    /// Join edges in declaration order.
    pub fn edges(&self) -> &[JoinEdge] {
        &self.edges
    }

    pub fn completed_state(&self) -> Option<&CompletedState> {
        self.completed.as_ref()
    }

    /// Undirected connectivity graph; edge weights index [`SchemaGraph::edges`].
    pub fn graph(&self) -> &UnGraph<String, usize> {
        &self.graph
    }

    pub fn node_index(&self, table: &str) -> Option<NodeIndex> {
        self.node_indices.get(table).copied()
    }

    /// The table whose scoping column governs `table`: its anchor if declared.
    pub fn scope_table(&self, table: &str) -> LookupResult<&TableSpec> {
        let spec = self.table(table)?;
        match &spec.anchor {
            Some(anchor) => self.table(anchor),
            None => Ok(spec),
        }
    }

    /// Table and column carrying the canonical date for `table`, falling
    /// back to the anchor's date column.
    pub fn date_source(&self, table: &str) -> LookupResult<Option<(&TableSpec, &str)>> {
        let spec = self.table(table)?;
        if let Some(column) = &spec.date_column {
            return Ok(Some((spec, column.as_str())));
        }
        match &spec.anchor {
            Some(anchor) => {
                let anchor = self.table(anchor)?;
                Ok(anchor.date_column.as_deref().map(|column| (anchor, column)))
            }
            None => Ok(None),
        }
    }

    /// `LOWER(t.scope) = LOWER(<placeholder>)`, if the table is scoped.
    pub fn scoping_predicate(&self, table: &str, placeholder: &Expr) -> LookupResult<Option<Expr>> {
        let spec = self.table(table)?;
        Ok(spec.scope_column.as_ref().map(|column| {
            func("LOWER", vec![table_col(&spec.name, column)])
                .eq(func("LOWER", vec![placeholder.clone()]))
        }))
    }

    /// `t.cancel IS NOT TRUE`, if the table declares a cancellation flag.
    pub fn cancellation_predicate(&self, table: &str) -> LookupResult<Option<Expr>> {
        let spec = self.table(table)?;
        Ok(spec
            .cancel_column
            .as_ref()
            .map(|column| table_col(&spec.name, column).is_not_true()))
    }

    /// Default filters for a table: scoping predicate, then cancellation
    /// predicate when declared.
    pub fn default_filters(&self, table: &str, placeholder: &Expr) -> LookupResult<Vec<Expr>> {
        let mut filters = vec![];
        filters.extend(self.scoping_predicate(table, placeholder)?);
        filters.extend(self.cancellation_predicate(table)?);
        Ok(filters)
    }
}

/// Schema plus metrics: everything the compiler needs to know about the data.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub schema: SchemaGraph,
    pub metrics: MetricCatalog,
}
