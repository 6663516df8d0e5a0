use chrono::{Datelike, Duration, NaiveDate};

use super::{edit_conjuncts, TableScope};
use crate::normalize::{NormalizeResult, NormalizerPass, NormalizerRules, PassContext};
use crate::schema::{LookupError, SchemaGraph};
use crate::sql::expr::{lit_date, table_col, Expr, ExprExt};
use crate::sql::query::Query;

/// Rewrites the date window to last Monday-to-Monday when the question asks
/// about last week.
///
/// Existing predicates on the date column, or on a banned column that stands
/// for it, are dropped. The new window takes the place of the first dropped
/// predicate:
/// `col >= DATE '<last monday>' AND col < DATE '<this monday>'`.
#[derive(Debug, Clone)]
pub struct RelativeWeekPass {
    phrases: Vec<String>,
    /// In priority order.
    targets: Vec<DateTarget>,
}

#[derive(Debug, Clone)]
struct DateTarget {
    table: String,
    column: String,
    /// Banned columns rewritten to `column` later in the chain.
    aliases: Vec<String>,
}

impl DateTarget {
    fn is_window_predicate(&self, expr: &Expr, scope: &TableScope) -> bool {
        std::iter::once(&self.column)
            .chain(self.aliases.iter())
            .any(|column| scope.mentions(expr, column))
    }
}

impl RelativeWeekPass {
    pub fn new(schema: &SchemaGraph, rules: &NormalizerRules) -> Result<Self, LookupError> {
        let mut targets = vec![];
        for table in &rules.relative_week_tables {
            let Some(column) = &schema.table(table)?.date_column else {
                continue;
            };
            let aliases = rules
                .banned_columns
                .iter()
                .filter(|b| &b.table == table && &b.replacement == column)
                .map(|b| b.column.clone())
                .collect();
            targets.push(DateTarget {
                table: table.clone(),
                column: column.clone(),
                aliases,
            });
        }
        Ok(Self {
            phrases: rules
                .relative_week_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            targets,
        })
    }

    fn triggered(&self, question: &str) -> bool {
        let question = question.to_lowercase();
        self.phrases.iter().any(|p| question.contains(p.as_str()))
    }
}

/// Mondays starting last week and this week.
pub(crate) fn last_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let this_monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    (this_monday - Duration::days(7), this_monday)
}

impl NormalizerPass for RelativeWeekPass {
    fn name(&self) -> &'static str {
        "relative_week"
    }

    fn apply(&self, query: &mut Query, ctx: &PassContext<'_>) -> NormalizeResult<bool> {
        if !self.triggered(ctx.question) {
            return Ok(false);
        }
        let Some(target) = self.targets.iter().find(|t| query.reads_table(&t.table)) else {
            return Ok(false);
        };

        let (start, end) = last_week(ctx.today);
        let mut rewritten = false;
        query.for_each_query_mut(&mut |q| {
            let Some(scope) = TableScope::of(q, &target.table) else {
                return;
            };
            let date = table_col(&scope.binding, &target.column);
            let window = [date.clone().gte(lit_date(start)), date.lt(lit_date(end))];
            edit_conjuncts(q, |conjuncts| {
                let before = conjuncts.clone();
                let at = conjuncts
                    .iter()
                    .position(|c| target.is_window_predicate(c, &scope));
                conjuncts.retain(|c| !target.is_window_predicate(c, &scope));
                let at = at.unwrap_or(conjuncts.len());
                for (offset, predicate) in window.into_iter().enumerate() {
                    conjuncts.insert(at + offset, predicate);
                }
                rewritten |= *conjuncts != before;
            });
        });
        Ok(rewritten)
    }
}
