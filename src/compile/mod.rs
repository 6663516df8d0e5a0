//! Query Plan to parameterized SQL.
//!
//! ```text
//! QueryPlan → validate → metric lookup ─┬─ trend fast path ─┐
//!                                       └─ standard path ───┴→ Query → SQL + params
//! ```
//!
//! Parameter values never appear in the SQL text. They are returned by name
//! in [`BuiltQuery::params`] for the execution layer to bind.

pub mod join;
mod standard;
mod trend;

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::plan::{PlanError, QueryPlan};
use crate::schema::{Catalog, LookupError};
use crate::sql::dialect::Postgres;
use crate::sql::params::placeholder_names;

pub use join::{JoinResolver, ResolvedJoin};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while compiling a plan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("no join path from '{from}' to '{to}'")]
    NoJoinPath { from: String, to: String },

    #[error("unable to order joins; remaining tables: {}", tables.join(", "))]
    UnresolvableJoinOrder { tables: Vec<String> },

    #[error("no date column configured for base table '{table}'")]
    MissingDateColumn { table: String },

    #[error("table '{table}' has no tenant scoping column")]
    MissingScopeColumn { table: String },

    #[error("invalid comparison spec: {reason}")]
    InvalidComparisonSpec { reason: String },

    #[error("date range starts after it ends: {start} > {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("plan has no tenant")]
    MissingTenant,

    #[error("trend query not supported: {reason}")]
    UnsupportedTrend { reason: String },
}

pub type CompileResult<T> = Result<T, CompileError>;

impl From<LookupError> for CompileError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::UnknownTable(name) => CompileError::UnknownTable(name),
            LookupError::UnknownMetric(key) => CompileError::UnknownMetric(key),
        }
    }
}

impl From<PlanError> for CompileError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::InvalidComparisonSpec { reason } => {
                CompileError::InvalidComparisonSpec { reason }
            }
            PlanError::InvalidDateRange { start, end } => {
                CompileError::InvalidDateRange { start, end }
            }
            PlanError::EmptyTenant => CompileError::MissingTenant,
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// A value bound to a named placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Date(NaiveDate),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(s) => write!(f, "{}", s),
            ParamValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.into())
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(d: NaiveDate) -> Self {
        ParamValue::Date(d)
    }
}

pub type Params = BTreeMap<String, ParamValue>;

/// Final SQL text plus its named parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Params,
}

// ============================================================================
// Options
// ============================================================================

/// Defaults for the trend fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendDefaults {
    pub recent_weeks: u32,
    pub prior_weeks: u32,
    pub limit: u64,
}

impl Default for TrendDefaults {
    fn default() -> Self {
        Self {
            recent_weeks: 2,
            prior_weeks: 2,
            limit: 5,
        }
    }
}

/// Options for compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Placeholder name carrying the tenant value.
    pub tenant_param: String,
    pub trend: TrendDefaults,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            tenant_param: "restaurant".into(),
            trend: TrendDefaults::default(),
        }
    }
}

impl CompileOptions {
    pub fn with_tenant_param(mut self, name: &str) -> Self {
        self.tenant_param = name.into();
        self
    }

    pub fn with_trend_defaults(mut self, trend: TrendDefaults) -> Self {
        self.trend = trend;
        self
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Compile a plan against a catalog.
///
/// # Example
///
/// ```ignore
/// use querygate::compile::{compile, CompileOptions};
/// use querygate::plan::{QueryPlan, TimeGrain};
/// use querygate::schema::restaurant_catalog;
///
/// let catalog = restaurant_catalog()?;
/// let plan = QueryPlan::new("gross_sales", "sales", "Cafe Roma")
///     .with_time_grain(TimeGrain::Day);
/// let built = compile(&plan, &catalog, &CompileOptions::default())?;
/// println!("{}", built.sql);
/// ```
pub fn compile(
    plan: &QueryPlan,
    catalog: &Catalog,
    options: &CompileOptions,
) -> CompileResult<BuiltQuery> {
    plan.validate()?;
    catalog.schema.table(&plan.base_table)?;
    let metric = catalog.metrics.get(&plan.metric)?;

    let mut params = Params::new();
    params.insert(
        options.tenant_param.clone(),
        ParamValue::Text(plan.restaurant.clone()),
    );

    let line_item = catalog.schema.table(&metric.base_table)?.anchor.is_some();
    let query = match plan.complete_weeks_trend() {
        Some(spec) if line_item => {
            tracing::debug!(metric = %metric.key, "compiling trend fast path");
            trend::build(plan, spec, metric, &catalog.schema, options)?
        }
        _ => {
            tracing::debug!(metric = %metric.key, grain = ?plan.time_grain, "compiling plan");
            standard::build(plan, metric, &catalog.schema, options, &mut params)?
        }
    };

    let sql = query.to_sql(&Postgres);
    let referenced = placeholder_names(&sql);
    params.retain(|name, _| referenced.contains(name));

    Ok(BuiltQuery { sql, params })
}
