//! Trend fast path: week-over-week ranking of line-item revenue.
//!
//! ```text
//! bounds  start of the current calendar week
//! s       completed, scoped transactions inside the whole window
//! agg     per-dimension revenue split into recent and prior windows
//! ranked  delta and percent change
//! ```
//!
//! The week boundary is computed by the database (`DATE_TRUNC('week', NOW())`)
//! so the compiled text is identical for identical plans.

use super::{CompileError, CompileOptions, CompileResult};
use crate::plan::{Dimension, QueryPlan, RankBy, TrendSpec};
use crate::schema::{JoinEdge, MetricDef, SchemaGraph};
use crate::sql::expr::{
    case_when, col, func, interval, lit_int, lit_null, lit_str, param, paren, sum, table_col, Expr,
    ExprExt,
};
use crate::sql::query::{Cte, OrderByExpr, Query, SelectExpr, TableRef};

const BOUNDS: &str = "bounds";
const WEEK_START: &str = "week_start_current";
const WINDOW: &str = "s";
const AGG: &str = "agg";
const RANKED: &str = "ranked";

/// The dimension ranked when the plan names none.
fn default_dimension() -> Dimension {
    Dimension::new("products", "name").with_alias("product")
}

/// The edge joining `a` and `b`, oriented as `(a_key, b_key)`.
fn key_pair<'s>(schema: &'s SchemaGraph, a: &str, b: &str) -> Option<(&'s str, &'s str)> {
    schema.edges().iter().find_map(|e: &JoinEdge| {
        if e.left_table == a && e.right_table == b {
            Some((e.left_key.as_str(), e.right_key.as_str()))
        } else if e.right_table == a && e.left_table == b {
            Some((e.right_key.as_str(), e.left_key.as_str()))
        } else {
            None
        }
    })
}

/// `(bounds.week_start_current - INTERVAL '<days> days')`
fn weeks_before_boundary(weeks: u32) -> Expr {
    paren(
        table_col(BOUNDS, WEEK_START).sub(interval(&format!("{} days", u64::from(weeks) * 7))),
    )
}

pub(super) fn build(
    plan: &QueryPlan,
    spec: &TrendSpec,
    metric: &MetricDef,
    schema: &SchemaGraph,
    options: &CompileOptions,
) -> CompileResult<Query> {
    let line = schema.table(&metric.base_table)?;
    let anchor = match &line.anchor {
        Some(anchor) => schema.table(anchor)?,
        None => {
            return Err(CompileError::UnsupportedTrend {
                reason: format!("{} has no anchor table", line.name),
            })
        }
    };

    let revenue = metric
        .sum_argument()
        .cloned()
        .ok_or_else(|| CompileError::UnsupportedTrend {
            reason: format!("metric {} is not a plain SUM", metric.key),
        })?;

    let date_column = anchor
        .date_column
        .as_deref()
        .ok_or_else(|| CompileError::MissingDateColumn {
            table: anchor.name.clone(),
        })?;

    let (line_key, anchor_key) =
        key_pair(schema, &line.name, &anchor.name).ok_or_else(|| CompileError::NoJoinPath {
            from: line.name.clone(),
            to: anchor.name.clone(),
        })?;

    let recent_weeks = spec
        .recent_weeks
        .filter(|&n| n > 0)
        .unwrap_or(options.trend.recent_weeks);
    let prior_weeks = spec
        .prior_weeks
        .filter(|&n| n > 0)
        .unwrap_or(options.trend.prior_weeks);
    let limit = plan.effective_limit().unwrap_or(options.trend.limit);
    let rank_by = spec.rank_by.unwrap_or_default();

    let dimension = plan.dimensions.first().cloned().unwrap_or_else(default_dimension);
    schema.table(&dimension.table)?;

    tracing::debug!(recent_weeks, prior_weeks, limit, ?rank_by, dimension = %dimension.output_name(), "trend window");

    // bounds
    let bounds = Query::new().select(vec![func("DATE_TRUNC", vec![lit_str("week"), func("NOW", vec![])])
        .cast_to("timestamp")
        .alias(WEEK_START)]);

    // s: scoped, completed transactions in the whole window
    let anchor_date = table_col(&anchor.name, date_column);
    let tenant = param(&options.tenant_param);
    let mut window = Query::new()
        .select(vec![
            table_col(&anchor.name, anchor_key),
            table_col(&anchor.name, date_column),
        ])
        .from(TableRef::new(&anchor.name))
        .cross_join(TableRef::new(BOUNDS));
    let scoping = schema
        .scoping_predicate(&anchor.name, &tenant)?
        .ok_or_else(|| CompileError::MissingScopeColumn {
            table: anchor.name.clone(),
        })?;
    window.add_filter(scoping);
    if let Some(state) = schema.completed_state() {
        if state.table == anchor.name {
            window.add_filter(state.predicate(&anchor.name));
        }
    }
    window.add_filter(
        anchor_date
            .clone()
            .gte(weeks_before_boundary(recent_weeks + prior_weeks)),
    );
    window.add_filter(anchor_date.lt(table_col(BOUNDS, WEEK_START)));

    // agg: revenue per dimension key, split at the recent boundary
    let (group_key, final_join) = if dimension.table == line.name {
        (dimension.column.clone(), None)
    } else {
        let (fk, pk) =
            key_pair(schema, &line.name, &dimension.table).ok_or_else(|| {
                CompileError::UnsupportedTrend {
                    reason: format!(
                        "{} is not directly joined to {}",
                        dimension.table, line.name
                    ),
                }
            })?;
        (fk.to_string(), Some(pk.to_string()))
    };

    let window_date = table_col(WINDOW, date_column);
    let recent_start = weeks_before_boundary(recent_weeks);
    let split = |in_window: Expr| sum(case_when(vec![(in_window, revenue.clone())], Some(lit_int(0))));

    let mut agg = Query::new()
        .select(vec![
            table_col(&line.name, &group_key).alias(&group_key),
            split(window_date.clone().gte(recent_start.clone())).alias("recent_rev"),
            split(window_date.lt(recent_start)).alias("prior_rev"),
        ])
        .from(TableRef::new(WINDOW))
        .inner_join(
            TableRef::new(&line.name),
            table_col(&line.name, line_key).eq(table_col(WINDOW, anchor_key)),
        )
        .cross_join(TableRef::new(BOUNDS));
    if let Some(cancel) = schema.cancellation_predicate(&line.name)? {
        agg.add_filter(cancel);
    }
    for filter in &metric.extra_filters {
        agg.add_filter(filter.clone());
    }
    let agg = agg.group_by(vec![table_col(&line.name, &group_key)]);

    // ranked
    let delta = col("recent_rev").sub(col("prior_rev"));
    let ranked = Query::new()
        .select(vec![
            SelectExpr::new(col(&group_key)),
            SelectExpr::new(col("recent_rev")),
            SelectExpr::new(col("prior_rev")),
            delta.clone().alias("delta"),
            case_when(
                vec![(col("prior_rev").eq(lit_int(0)), lit_null())],
                Some(paren(delta).div(col("prior_rev"))),
            )
            .alias("pct_change"),
        ])
        .from(TableRef::new(AGG));

    // final projection
    let label = match &final_join {
        Some(_) => table_col(&dimension.table, &dimension.column),
        None => table_col(RANKED, &group_key),
    };
    let mut query = Query::new()
        .with_cte(Cte::new(BOUNDS, bounds))
        .with_cte(Cte::new(WINDOW, window))
        .with_cte(Cte::new(AGG, agg))
        .with_cte(Cte::new(RANKED, ranked))
        .select(vec![
            label.alias(&dimension.output_name()),
            SelectExpr::new(col("recent_rev")),
            SelectExpr::new(col("prior_rev")),
            SelectExpr::new(col("delta")),
            SelectExpr::new(col("pct_change")),
        ])
        .from(TableRef::new(RANKED));
    if let Some(pk) = final_join {
        query = query.left_join(
            TableRef::new(&dimension.table),
            table_col(&dimension.table, &pk).eq(table_col(RANKED, &group_key)),
        );
    }

    let order = match rank_by {
        RankBy::Delta => OrderByExpr::desc(col("delta")),
        RankBy::PercentChange => OrderByExpr::desc(col("pct_change")).nulls_last(),
    };

    Ok(query.order_by(vec![order]).limit(limit))
}
