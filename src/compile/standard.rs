//! Standard path: select list, joins, predicates, grouping, ordering.

use std::collections::BTreeSet;

use super::join::{JoinResolver, ResolvedJoin};
use super::{CompileError, CompileOptions, CompileResult, ParamValue, Params};
use crate::plan::{QueryPlan, TimeGrain};
use crate::schema::{MetricDef, SchemaGraph};
use crate::sql::expr::{col, func, interval, lit_str, param, paren, table_col, Expr, ExprExt};
use crate::sql::query::{FromItem, OrderByExpr, Query, SelectExpr, TableRef};

const PERIOD: &str = "period";
const VALUE: &str = "value";

/// `%(name)s::date`
fn date_param(name: &str) -> Expr {
    param(name).cast_to("date")
}

/// `(%(name)s::date + INTERVAL '1 day')`, the exclusive bound of a whole day.
fn day_after(name: &str) -> Expr {
    paren(date_param(name).add(interval("1 day")))
}

pub(super) fn build(
    plan: &QueryPlan,
    metric: &MetricDef,
    schema: &SchemaGraph,
    options: &CompileOptions,
    params: &mut Params,
) -> CompileResult<Query> {
    let base = metric.base_table.as_str();

    let (date_table, date_column) =
        schema
            .date_source(base)?
            .ok_or_else(|| CompileError::MissingDateColumn {
                table: base.into(),
            })?;
    let date_table = date_table.name.clone();
    let date_expr = table_col(&date_table, date_column);

    let scope_table = schema.scope_table(base)?.name.clone();

    // Select list and grouping keys
    let mut select: Vec<SelectExpr> = vec![];
    let mut group_by: Vec<Expr> = vec![];

    if let Some(unit) = plan.time_grain.trunc_unit() {
        let period = func("DATE_TRUNC", vec![lit_str(unit), date_expr.clone()]);
        select.push(period.clone().alias(PERIOD));
        group_by.push(period);
    }

    for dim in &plan.dimensions {
        schema.table(&dim.table)?;
        let expr = table_col(&dim.table, &dim.column);
        select.push(expr.clone().alias(&dim.output_name()));
        group_by.push(expr);
    }

    select.push(metric.expression.clone().alias(VALUE));

    // Joins
    let mut required: BTreeSet<String> = BTreeSet::new();
    required.insert(base.to_string());
    required.insert(date_table.clone());
    required.insert(scope_table.clone());
    required.extend(plan.dimensions.iter().map(|d| d.table.clone()));

    let joins = JoinResolver::new(schema).resolve(base, &required)?;

    let mut from = FromItem::new(TableRef::new(base));
    from.joins = joins.iter().map(ResolvedJoin::to_join).collect();
    let mut query = Query::new().select(select);
    query.from = vec![from];

    let joined: BTreeSet<&str> = std::iter::once(base)
        .chain(joins.iter().map(|j| j.table.as_str()))
        .collect();

    // Predicates
    let tenant = param(&options.tenant_param);
    let scoping = schema
        .scoping_predicate(&scope_table, &tenant)?
        .ok_or_else(|| CompileError::MissingScopeColumn {
            table: scope_table.clone(),
        })?;
    query.add_filter(scoping);

    if let Some(state) = schema.completed_state() {
        if joined.contains(state.table.as_str()) {
            query.add_filter(state.predicate(&state.table));
        }
    }

    if let Some(cancel) = schema.cancellation_predicate(base)? {
        query.add_filter(cancel);
    }

    for filter in &metric.extra_filters {
        query.add_filter(filter.clone());
    }

    if let Some(range) = &plan.date_range {
        if let Some(start) = range.start {
            params.insert("start_date".into(), ParamValue::Date(start));
            query.add_filter(date_expr.clone().gte(date_param("start_date")));
        }
        if let Some(end) = range.end {
            params.insert("end_date".into(), ParamValue::Date(end));
            query.add_filter(date_expr.clone().lt(day_after("end_date")));
        }
    }

    if let Some(filter) = comparison_filter(plan, &date_expr, params)? {
        query.add_filter(filter);
    }

    // Grouping, ordering, limit
    let has_period = plan.time_grain != TimeGrain::None;
    let limit = plan.effective_limit();

    query = query.group_by(group_by);
    if has_period {
        query = query.order_by(vec![OrderByExpr::asc(col(PERIOD))]);
    } else if limit.is_some() {
        query = query.order_by(vec![OrderByExpr::desc(col(VALUE))]);
    }
    if let Some(n) = limit {
        query = query.limit(n);
    }

    Ok(query)
}

/// Restrict rows to the two compared periods.
///
/// Week and month grains compare whole buckets by their truncated start.
/// Month comparisons with end dates additionally restrict each bucket to
/// its own sub-range (month-to-date against prior month-to-date). Day and
/// ungrouped comparisons pick the two calendar days.
fn comparison_filter(
    plan: &QueryPlan,
    date_expr: &Expr,
    params: &mut Params,
) -> CompileResult<Option<Expr>> {
    let dates = match &plan.comparison_dates {
        Some(dates) => dates,
        None => return Ok(None),
    };
    let [first, second] = dates.as_slice() else {
        return Err(CompileError::InvalidComparisonSpec {
            reason: format!("expected exactly 2 comparison dates, got {}", dates.len()),
        });
    };

    let unit = match plan.time_grain {
        TimeGrain::Week | TimeGrain::Month => plan.time_grain.trunc_unit(),
        TimeGrain::Day | TimeGrain::None => None,
    };

    let Some(unit) = unit else {
        params.insert("cmp_date_1".into(), ParamValue::Date(*first));
        params.insert("cmp_date_2".into(), ParamValue::Date(*second));
        let day = func("DATE", vec![date_expr.clone()]);
        return Ok(Some(
            day.in_list(vec![date_param("cmp_date_1"), date_param("cmp_date_2")]),
        ));
    };

    params.insert("cmp_start_1".into(), ParamValue::Date(*first));
    params.insert("cmp_start_2".into(), ParamValue::Date(*second));
    let bucket = func("DATE_TRUNC", vec![lit_str(unit), date_expr.clone()]);
    let mut filter = bucket.in_list(vec![date_param("cmp_start_1"), date_param("cmp_start_2")]);

    if plan.time_grain == TimeGrain::Month {
        if let Some(ends) = &plan.comparison_ends {
            let [end_1, end_2] = ends.as_slice() else {
                return Err(CompileError::InvalidComparisonSpec {
                    reason: format!("expected exactly 2 comparison end dates, got {}", ends.len()),
                });
            };
            params.insert("cmp_end_1".into(), ParamValue::Date(*end_1));
            params.insert("cmp_end_2".into(), ParamValue::Date(*end_2));

            let range = |start: &str, end: &str| {
                paren(
                    date_expr
                        .clone()
                        .gte(date_param(start))
                        .and(date_expr.clone().lt(day_after(end))),
                )
            };
            let either = paren(range("cmp_start_1", "cmp_end_1").or(range("cmp_start_2", "cmp_end_2")));
            filter = filter.and(either);
        }
    }

    Ok(Some(filter))
}
