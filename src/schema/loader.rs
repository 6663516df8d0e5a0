//! TOML catalog files.
//!
//! A catalog file replaces the built-in restaurant catalog. Metric
//! expressions and filters are written as SQL and parsed into the tree.
//!
//! ```toml
//! [completed_state]
//! table = "sales"
//! column = "sale_state"
//! value = "CLOSED"
//!
//! [[tables]]
//! name = "sales"
//! role = "fact"
//! scope_column = "restaurant"
//! date_column = "created_at"
//!
//! [[tables]]
//! name = "items"
//! role = "fact"
//! scope_column = "restaurant"
//! cancel_column = "canceled"
//! anchor = "sales"
//!
//! [[joins]]
//! left_table = "items"
//! left_key = "sale_id"
//! right_table = "sales"
//! right_key = "uuid"
//! kind = "inner"
//!
//! [[metrics]]
//! key = "item_revenue"
//! base_table = "items"
//! expression = "SUM(items.price * items.quantity)"
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::{
    Catalog, CatalogError, CompletedState, Hierarchy, JoinEdge, JoinKind, MetricCatalog, MetricDef,
    SchemaGraph, TableRole, TableSpec,
};
use crate::sql::parse::parse_expr;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    completed_state: Option<CompletedState>,
    #[serde(default)]
    tables: Vec<TableEntry>,
    #[serde(default)]
    joins: Vec<JoinEntry>,
    #[serde(default)]
    metrics: Vec<MetricEntry>,
}

#[derive(Debug, Deserialize)]
struct TableEntry {
    name: String,
    role: TableRole,
    #[serde(default = "default_primary_key")]
    primary_key: String,
    scope_column: Option<String>,
    date_column: Option<String>,
    cancel_column: Option<String>,
    anchor: Option<String>,
    hierarchy: Option<Hierarchy>,
}

fn default_primary_key() -> String {
    "uuid".into()
}

#[derive(Debug, Deserialize)]
struct JoinEntry {
    left_table: String,
    left_key: String,
    right_table: String,
    right_key: String,
    #[serde(default = "default_join_kind")]
    kind: JoinKind,
}

fn default_join_kind() -> JoinKind {
    JoinKind::Inner
}

#[derive(Debug, Deserialize)]
struct MetricEntry {
    key: String,
    base_table: String,
    expression: String,
    #[serde(default)]
    extra_filters: Vec<String>,
    description: Option<String>,
}

/// Load a catalog from a TOML file.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog, CatalogError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CatalogError::FileNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    parse_catalog(&content)
}

/// Parse a catalog from TOML text.
pub fn parse_catalog(content: &str) -> Result<Catalog, CatalogError> {
    let file: CatalogFile = toml::from_str(content)?;

    let tables = file
        .tables
        .into_iter()
        .map(|t| TableSpec {
            name: t.name,
            role: t.role,
            primary_key: t.primary_key,
            scope_column: t.scope_column,
            date_column: t.date_column,
            cancel_column: t.cancel_column,
            anchor: t.anchor,
            hierarchy: t.hierarchy,
        })
        .collect();

    let edges = file
        .joins
        .into_iter()
        .map(|j| JoinEdge {
            left_table: j.left_table,
            left_key: j.left_key,
            right_table: j.right_table,
            right_key: j.right_key,
            kind: j.kind,
        })
        .collect();

    let schema = SchemaGraph::new(tables, edges, file.completed_state)?;

    let metrics = file
        .metrics
        .into_iter()
        .map(metric_from_entry)
        .collect::<Result<Vec<_>, _>>()?;
    let metrics = MetricCatalog::new(metrics, &schema)?;

    tracing::debug!(
        tables = schema.tables().count(),
        metrics = metrics.len(),
        "loaded catalog"
    );

    Ok(Catalog { schema, metrics })
}

fn metric_from_entry(entry: MetricEntry) -> Result<MetricDef, CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidExpression {
        metric: entry.key.clone(),
        reason,
    };

    let expression = parse_expr(&entry.expression).map_err(|e| invalid(e.to_string()))?;
    let extra_filters = entry
        .extra_filters
        .iter()
        .map(|f| parse_expr(f).map_err(|e| invalid(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MetricDef {
        key: entry.key.clone(),
        base_table: entry.base_table.clone(),
        expression,
        extra_filters,
        description: entry.description.clone(),
    })
}
