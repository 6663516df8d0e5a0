//! Canonical metric definitions.

use std::collections::HashMap;

use super::{CatalogError, LookupError, LookupResult, SchemaGraph};
use crate::sql::expr::Expr;

/// A named aggregation over a base table.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDef {
    pub key: String,
    pub base_table: String,
    /// Pure aggregation, e.g. `SUM(sales.total)`.
    pub expression: Expr,
    /// Predicates appended to WHERE whenever the metric is compiled.
    pub extra_filters: Vec<Expr>,
    pub description: Option<String>,
}

impl MetricDef {
    pub fn new(key: &str, base_table: &str, expression: Expr) -> Self {
        Self {
            key: key.into(),
            base_table: base_table.into(),
            expression,
            extra_filters: vec![],
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The per-row value of a `SUM(...)` metric.
    pub fn sum_argument(&self) -> Option<&Expr> {
        match &self.expression {
            Expr::Function { name, args, distinct: false } if name.eq_ignore_ascii_case("sum") => {
                match args.as_slice() {
                    [arg] => Some(arg),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn validate(&self, schema: &SchemaGraph) -> Result<(), CatalogError> {
        if !schema.contains(&self.base_table) {
            return Err(CatalogError::UnknownReference {
                owner: format!("metric {}", self.key),
                table: self.base_table.clone(),
            });
        }
        if !self.expression.contains_aggregate() {
            return Err(self.invalid("expression must be an aggregation"));
        }
        let has_subquery = std::iter::once(&self.expression)
            .chain(self.extra_filters.iter())
            .any(|e| e.any(&|node| node.subquery().is_some()));
        if has_subquery {
            return Err(self.invalid("subqueries are not allowed"));
        }
        if self.extra_filters.iter().any(|f| f.contains_aggregate()) {
            return Err(self.invalid("extra filters must not aggregate"));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> CatalogError {
        CatalogError::InvalidExpression {
            metric: self.key.clone(),
            reason: reason.into(),
        }
    }
}

/// One definition per metric key, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    metrics: Vec<MetricDef>,
    index: HashMap<String, usize>,
}

impl MetricCatalog {
    pub fn new(metrics: Vec<MetricDef>, schema: &SchemaGraph) -> Result<Self, CatalogError> {
        let mut index = HashMap::new();
        for (i, metric) in metrics.iter().enumerate() {
            if index.insert(metric.key.clone(), i).is_some() {
                return Err(CatalogError::DuplicateMetric(metric.key.clone()));
            }
            metric.validate(schema)?;
        }
        Ok(Self { metrics, index })
    }

    /// Resolve a metric key.
    pub fn get(&self, key: &str) -> LookupResult<&MetricDef> {
        self.index
            .get(key)
            .map(|&i| &self.metrics[i])
            .ok_or_else(|| LookupError::UnknownMetric(key.into()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDef> {
        self.metrics.iter()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
