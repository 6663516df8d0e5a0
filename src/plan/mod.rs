//! Query Plan - structured analytical intent.
//!
//! A plan is produced per request by an upstream generator (usually as
//! JSON), validated, and consumed once by the compiler.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural problems with a plan, detected before compilation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("invalid comparison spec: {reason}")]
    InvalidComparisonSpec { reason: String },

    #[error("date range starts after it ends: {start} > {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("plan has no tenant")]
    EmptyTenant,
}

/// Bucket size for the period column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGrain {
    #[default]
    None,
    Day,
    Week,
    Month,
}

impl TimeGrain {
    /// Unit passed to `DATE_TRUNC`, if the grain buckets at all.
    pub fn trunc_unit(self) -> Option<&'static str> {
        match self {
            TimeGrain::None => None,
            TimeGrain::Day => Some("day"),
            TimeGrain::Week => Some("week"),
            TimeGrain::Month => Some("month"),
        }
    }
}

/// Inclusive start, inclusive whole end day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

/// A column to break the metric out by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl Dimension {
    pub fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Output column name, `<table>_<column>` unless aliased.
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) if !alias.is_empty() => alias.clone(),
            _ => format!("{}_{}", self.table, self.column),
        }
    }
}

/// Ranking basis for trend queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RankBy {
    #[default]
    #[serde(rename = "delta")]
    Delta,
    #[serde(rename = "percent_change", alias = "pct_change")]
    PercentChange,
}

/// Week-over-week trend parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrendSpec {
    #[serde(default)]
    pub complete_weeks: bool,
    #[serde(default)]
    pub recent_weeks: Option<u32>,
    #[serde(default)]
    pub prior_weeks: Option<u32>,
    #[serde(default)]
    pub rank_by: Option<RankBy>,
}

impl TrendSpec {
    pub fn complete_weeks(recent_weeks: u32, prior_weeks: u32, rank_by: RankBy) -> Self {
        Self {
            complete_weeks: true,
            recent_weeks: Some(recent_weeks),
            prior_weeks: Some(prior_weeks),
            rank_by: Some(rank_by),
        }
    }
}

/// Structured analytical intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub metric: String,
    pub base_table: String,
    /// Tenant identifier, bound as the scoping parameter.
    pub restaurant: String,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    /// Period starts to compare; exactly two when present.
    #[serde(default)]
    pub comparison_dates: Option<Vec<NaiveDate>>,
    /// Period ends matching `comparison_dates`.
    #[serde(default)]
    pub comparison_ends: Option<Vec<NaiveDate>>,
    #[serde(default)]
    pub time_grain: TimeGrain,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub trend: Option<TrendSpec>,
}

impl QueryPlan {
    pub fn new(metric: &str, base_table: &str, restaurant: &str) -> Self {
        Self {
            metric: metric.into(),
            base_table: base_table.into(),
            restaurant: restaurant.into(),
            date_range: None,
            comparison_dates: None,
            comparison_ends: None,
            time_grain: TimeGrain::None,
            dimensions: vec![],
            limit: None,
            trend: None,
        }
    }

    /// Deserialize a plan from generator JSON.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some(DateRange::new(start, end));
        self
    }

    pub fn with_time_grain(mut self, grain: TimeGrain) -> Self {
        self.time_grain = grain;
        self
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn with_comparison(mut self, dates: Vec<NaiveDate>, ends: Option<Vec<NaiveDate>>) -> Self {
        self.comparison_dates = Some(dates);
        self.comparison_ends = ends;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_trend(mut self, trend: TrendSpec) -> Self {
        self.trend = Some(trend);
        self
    }

    /// Row limit; zero counts as unset.
    pub fn effective_limit(&self) -> Option<u64> {
        self.limit.filter(|&n| n > 0)
    }

    /// Trend parameters, only when complete-weeks ranking was requested.
    pub fn complete_weeks_trend(&self) -> Option<&TrendSpec> {
        self.trend.as_ref().filter(|t| t.complete_weeks)
    }

    /// Check the cardinality rules that serde cannot express.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.restaurant.trim().is_empty() {
            return Err(PlanError::EmptyTenant);
        }

        if let Some(DateRange {
            start: Some(start),
            end: Some(end),
        }) = self.date_range
        {
            if start > end {
                return Err(PlanError::InvalidDateRange { start, end });
            }
        }

        match (&self.comparison_dates, &self.comparison_ends) {
            (Some(dates), _) if dates.len() != 2 => Err(PlanError::InvalidComparisonSpec {
                reason: format!("expected exactly 2 comparison dates, got {}", dates.len()),
            }),
            (Some(dates), Some(ends)) if ends.len() != dates.len() => {
                Err(PlanError::InvalidComparisonSpec {
                    reason: format!(
                        "{} comparison end dates for {} comparison dates",
                        ends.len(),
                        dates.len()
                    ),
                })
            }
            (None, Some(_)) => Err(PlanError::InvalidComparisonSpec {
                reason: "comparison end dates given without comparison dates".into(),
            }),
            _ => Ok(()),
        }
    }
}
