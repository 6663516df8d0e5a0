//! Normalizer - business rewrites for externally generated SQL.
//!
//! Input is a [`SafetyResult`], so a statement can only be normalized after
//! it passed the Safety Gate. The parsed statement is converted into the
//! internal tree once, every pass runs against that tree in a fixed order,
//! and the result is rendered back to PostgreSQL text:
//!
//! ```text
//! scope → completed_state → relative_week → banned_column → product_revenue
//! ```
//!
//! A pass either rewrites and continues, no-ops when it does not apply, or
//! fails the whole normalization. Every pass is idempotent.

mod passes;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use thiserror::Error;

use crate::schema::{Catalog, LookupError};
use crate::safety::SafetyResult;
use crate::sql::dialect::Postgres;
use crate::sql::params;
use crate::sql::parse::convert_query;
use crate::sql::query::Query;

pub use passes::{
    BannedColumnPass, CompletedStatePass, ProductRevenuePass, RelativeWeekPass, ScopePass,
};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("SQL must reference the %({param})s parameter for tenant scoping")]
    MissingScopeParam { param: String },

    #[error("SQL reading {table} must filter on {filter}")]
    MissingRequiredFilter { table: String, filter: String },

    #[error("cannot normalize: {0}")]
    Unsupported(String),
}

pub type NormalizeResult<T> = Result<T, NormalizeError>;

// ============================================================================
// Rules
// ============================================================================

/// A deprecated column and its canonical replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannedColumn {
    pub table: String,
    pub column: String,
    pub replacement: String,
}

/// Which metrics and dimension drive product-revenue canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductRevenueRule {
    pub dimension_table: String,
    pub name_column: String,
    /// Metric whose aggregate gets replaced.
    pub gross_metric: String,
    /// Metric supplying the replacement aggregate.
    pub line_metric: String,
}

impl Default for ProductRevenueRule {
    fn default() -> Self {
        Self {
            dimension_table: "products".into(),
            name_column: "name".into(),
            gross_metric: "gross_sales".into(),
            line_metric: "item_revenue".into(),
        }
    }
}

/// Tunable inputs of the pass chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerRules {
    /// Lowercase phrases in the question that trigger the relative-week rewrite.
    pub relative_week_phrases: Vec<String>,
    /// Candidate tables for the relative-week rewrite, in priority order.
    pub relative_week_tables: Vec<String>,
    pub banned_columns: Vec<BannedColumn>,
    pub product_revenue: ProductRevenueRule,
}

impl Default for NormalizerRules {
    fn default() -> Self {
        Self {
            relative_week_phrases: vec![
                "last completed week".into(),
                "last complete week".into(),
                "last full week".into(),
                "last week".into(),
            ],
            relative_week_tables: vec!["sales".into(), "payments".into()],
            banned_columns: vec![BannedColumn {
                table: "sales".into(),
                column: "closed_at".into(),
                replacement: "created_at".into(),
            }],
            product_revenue: ProductRevenueRule::default(),
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Source of "today" for date-relative rewrites.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local calendar date of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// A clock stuck on one day.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

// ============================================================================
// Passes
// ============================================================================

/// Per-call inputs shared by every pass.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub question: &'a str,
    pub today: NaiveDate,
}

/// One rewrite or check step.
pub trait NormalizerPass: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns whether the statement was rewritten.
    fn apply(&self, query: &mut Query, ctx: &PassContext<'_>) -> NormalizeResult<bool>;
}

/// Output of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub sql: String,
    /// Passes that rewrote the statement, in order.
    pub applied: Vec<&'static str>,
}

pub struct Normalizer {
    passes: Vec<Box<dyn NormalizerPass>>,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("passes", &self.pass_names())
            .finish()
    }
}

impl Normalizer {
    /// The standard chain for `catalog`.
    pub fn new(
        catalog: &Catalog,
        tenant_param: &str,
        rules: &NormalizerRules,
    ) -> Result<Self, LookupError> {
        let passes: Vec<Box<dyn NormalizerPass>> = vec![
            Box::new(ScopePass::new(tenant_param)),
            Box::new(CompletedStatePass::new(catalog.schema.completed_state().cloned())),
            Box::new(RelativeWeekPass::new(&catalog.schema, rules)?),
            Box::new(BannedColumnPass::new(rules.banned_columns.clone())),
            Box::new(ProductRevenuePass::new(catalog, &rules.product_revenue)?),
        ];
        Ok(Self::from_passes(passes))
    }

    /// A custom chain.
    pub fn from_passes(passes: Vec<Box<dyn NormalizerPass>>) -> Self {
        Self {
            passes,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run the chain over a statement that passed the gate.
    pub fn normalize(&self, safe: &SafetyResult, question: &str) -> NormalizeResult<Normalized> {
        let Statement::Query(parsed) = safe.statement() else {
            return Err(NormalizeError::Unsupported("statement is not a query".into()));
        };
        let mut query =
            convert_query(parsed).map_err(|e| NormalizeError::Unsupported(e.to_string()))?;

        let ctx = PassContext {
            question,
            today: self.clock.today(),
        };

        let mut applied = vec![];
        for pass in &self.passes {
            if pass.apply(&mut query, &ctx)? {
                tracing::debug!(pass = pass.name(), "normalizer pass applied");
                applied.push(pass.name());
            }
        }

        Ok(Normalized {
            sql: params::unmask(&query.to_sql(&Postgres)),
            applied,
        })
    }
}
