use super::{edit_conjuncts, TableScope};
use crate::normalize::{NormalizeResult, NormalizerPass, PassContext, ProductRevenueRule};
use crate::schema::{Catalog, LookupError};
use crate::sql::expr::{coalesce, lit_int, table_col, BinaryOperator, Expr, ExprExt};
use crate::sql::query::Query;

/// Canonicalizes revenue when the statement filters on an exact product name.
///
/// When triggered, in every query of the statement:
/// - the gross-sales aggregate is replaced with the line-item aggregate
///   where the line-item table is read,
/// - a not-canceled predicate on the line-item table is ensured,
/// - `name = 'x'` becomes `name ILIKE 'x'`,
/// - aggregates in the select list default to zero.
#[derive(Debug, Clone)]
pub struct ProductRevenuePass {
    dimension_table: String,
    name_column: String,
    /// Table and column summed by the gross metric, when it is `SUM(col)`.
    gross_column: Option<(String, String)>,
    gross: Expr,
    line_table: String,
    line: Expr,
    line_cancel: Option<String>,
}

impl ProductRevenuePass {
    pub fn new(catalog: &Catalog, rule: &ProductRevenueRule) -> Result<Self, LookupError> {
        let gross = catalog.metrics.get(&rule.gross_metric)?;
        let line = catalog.metrics.get(&rule.line_metric)?;
        let line_spec = catalog.schema.table(&line.base_table)?;

        let gross_column = match gross.sum_argument() {
            Some(Expr::Column {
                table: Some(table),
                column,
            }) => Some((table.clone(), column.clone())),
            _ => None,
        };

        Ok(Self {
            dimension_table: rule.dimension_table.clone(),
            name_column: rule.name_column.clone(),
            gross_column,
            gross: gross.expression.clone(),
            line_table: line_spec.name.clone(),
            line: line.expression.clone(),
            line_cancel: line_spec.cancel_column.clone(),
        })
    }

    fn triggered(&self, query: &Query) -> bool {
        query.queries().into_iter().any(|q| {
            let Some(scope) = TableScope::of(q, &self.dimension_table) else {
                return false;
            };
            q.exprs()
                .into_iter()
                .any(|e| e.any(&|node| self.name_equality(node, &scope).is_some()))
        })
    }

    /// For `name = x` or `x = name`, the operands ordered column first.
    fn name_equality<'e>(&self, node: &'e Expr, scope: &TableScope) -> Option<(&'e Expr, &'e Expr)> {
        let Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } = node
        else {
            return None;
        };
        if scope.is_column(left, &self.name_column) {
            Some((left, right))
        } else if scope.is_column(right, &self.name_column) {
            Some((right, left))
        } else {
            None
        }
    }

    /// `gross_scope` is how the current query names the gross metric's table.
    fn is_gross(&self, node: &Expr, gross_scope: Option<&TableScope>) -> bool {
        let Some((table, column)) = &self.gross_column else {
            return *node == self.gross;
        };
        let Expr::Function {
            name,
            args,
            distinct: false,
        } = node
        else {
            return false;
        };
        if !name.eq_ignore_ascii_case("sum") || args.len() != 1 {
            return false;
        }
        match gross_scope {
            Some(scope) => scope.is_column(&args[0], column),
            None => args[0] == table_col(table, column),
        }
    }

    /// The line-item aggregate, qualified the way `binding` names the table.
    fn line_expr(&self, binding: &str) -> Expr {
        let mut expr = self.line.clone();
        expr.rewrite(&mut |node| match node {
            Expr::Column {
                table: Some(t),
                column,
            } if t.eq_ignore_ascii_case(&self.line_table) => Some(Expr::Column {
                table: Some(binding.to_string()),
                column: column.clone(),
            }),
            _ => None,
        });
        expr
    }

    fn rewrite_query(&self, q: &mut Query) {
        if let Some(line_scope) = TableScope::of(q, &self.line_table) {
            let replacement = self.line_expr(&line_scope.binding);
            let gross_scope = self
                .gross_column
                .as_ref()
                .and_then(|(table, _)| TableScope::of(q, table));
            for expr in q.exprs_mut() {
                expr.rewrite(&mut |node| {
                    self.is_gross(node, gross_scope.as_ref())
                        .then(|| replacement.clone())
                });
            }

            if let Some(cancel) = &self.line_cancel {
                let present = q
                    .where_clause
                    .as_ref()
                    .is_some_and(|w| line_scope.mentions(w, cancel));
                if !present {
                    let predicate = table_col(&line_scope.binding, cancel).is_not_true();
                    edit_conjuncts(q, |conjuncts| conjuncts.push(predicate));
                }
            }
        }

        if let Some(dim_scope) = TableScope::of(q, &self.dimension_table) {
            for expr in q.exprs_mut() {
                expr.rewrite(&mut |node| {
                    self.name_equality(node, &dim_scope)
                        .map(|(column, value)| column.clone().ilike(value.clone()))
                });
            }
        }

        for item in q.select.iter_mut() {
            if item.expr.is_aggregate() {
                let aggregate = std::mem::replace(&mut item.expr, lit_int(0));
                item.expr = coalesce(vec![aggregate, lit_int(0)]);
            }
        }
    }
}

impl NormalizerPass for ProductRevenuePass {
    fn name(&self) -> &'static str {
        "product_revenue"
    }

    fn apply(&self, query: &mut Query, _ctx: &PassContext<'_>) -> NormalizeResult<bool> {
        if !self.triggered(query) {
            return Ok(false);
        }
        query.for_each_query_mut(&mut |q| self.rewrite_query(q));
        Ok(true)
    }
}
