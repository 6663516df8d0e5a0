//! One entry point for both directions of SQL.
//!
//! [`Gateway`] owns the catalog and everything derived from settings. Plans
//! go through [`Gateway::compile`]. Externally produced SQL goes through
//! [`Gateway::check_sql`], which runs the safety gate and then the normalizer.

use thiserror::Error;

use crate::compile::{self, BuiltQuery, CompileError, CompileOptions};
use crate::config::{Settings, SettingsError};
use crate::normalize::{Clock, NormalizeError, Normalized, Normalizer};
use crate::plan::QueryPlan;
use crate::safety::{SafetyGate, SafetyResult, UnsafeSqlError};
use crate::schema::{load_catalog, restaurant_catalog, Catalog, CatalogError, LookupError};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("normalizer rules reference the catalog incorrectly: {0}")]
    Rules(#[from] LookupError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("rejected SQL: {0}")]
    Unsafe(#[from] UnsafeSqlError),

    #[error("rejected SQL: {0}")]
    Normalize(#[from] NormalizeError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// SQL that passed the gate and the normalizer.
#[derive(Debug, Clone)]
pub struct CheckedSql {
    pub safety: SafetyResult,
    pub normalized: Normalized,
}

impl CheckedSql {
    /// The statement to execute.
    pub fn sql(&self) -> &str {
        &self.normalized.sql
    }
}

#[derive(Debug)]
pub struct Gateway {
    catalog: Catalog,
    options: CompileOptions,
    gate: SafetyGate,
    normalizer: Normalizer,
}

impl Gateway {
    /// Build from settings, loading the configured catalog or the built-in one.
    pub fn new(settings: &Settings) -> GatewayResult<Self> {
        settings.validate()?;
        let catalog = match settings.catalog_path()? {
            Some(path) => load_catalog(path)?,
            None => restaurant_catalog()?,
        };
        Self::with_catalog(catalog, settings)
    }

    /// Build around an already loaded catalog.
    pub fn with_catalog(catalog: Catalog, settings: &Settings) -> GatewayResult<Self> {
        let gate = SafetyGate::new(settings.safety.policy(&catalog.schema));
        let normalizer = Normalizer::new(&catalog, &settings.tenant.param, &settings.normalizer)?;
        tracing::debug!(
            tables = catalog.schema.tables().count(),
            passes = ?normalizer.pass_names(),
            "gateway ready"
        );
        Ok(Self {
            options: settings.compile_options(),
            catalog,
            gate,
            normalizer,
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.normalizer = self.normalizer.with_clock(clock);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn compile(&self, plan: &QueryPlan) -> GatewayResult<BuiltQuery> {
        Ok(compile::compile(plan, &self.catalog, &self.options)?)
    }

    /// Gate then normalize. `question` drives the question-dependent rewrites.
    pub fn check_sql(&self, text: &str, question: &str) -> GatewayResult<CheckedSql> {
        let safety = self.gate.validate(text).inspect_err(|err| {
            tracing::warn!(error = %err, "safety gate rejected SQL");
        })?;
        let normalized = self
            .normalizer
            .normalize(&safety, question)
            .inspect_err(|err| {
                tracing::warn!(error = %err, "normalizer rejected SQL");
            })?;
        Ok(CheckedSql { safety, normalized })
    }
}
