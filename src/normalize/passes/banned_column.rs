use super::TableScope;
use crate::normalize::{BannedColumn, NormalizeResult, NormalizerPass, PassContext};
use crate::sql::expr::Expr;
use crate::sql::query::Query;

/// Replaces references to unreliable columns with their canonical ones.
#[derive(Debug, Clone)]
pub struct BannedColumnPass {
    rules: Vec<BannedColumn>,
}

impl BannedColumnPass {
    pub fn new(rules: Vec<BannedColumn>) -> Self {
        Self { rules }
    }
}

impl NormalizerPass for BannedColumnPass {
    fn name(&self) -> &'static str {
        "banned_column"
    }

    fn apply(&self, query: &mut Query, _ctx: &PassContext<'_>) -> NormalizeResult<bool> {
        let mut replaced = 0;
        for rule in &self.rules {
            query.for_each_query_mut(&mut |q| {
                let Some(scope) = TableScope::of(q, &rule.table) else {
                    return;
                };
                for expr in q.exprs_mut() {
                    replaced += expr.rewrite(&mut |node| match node {
                        Expr::Column { table, .. } if scope.is_column(node, &rule.column) => {
                            Some(Expr::Column {
                                table: table.clone(),
                                column: rule.replacement.clone(),
                            })
                        }
                        _ => None,
                    });
                }
            });
        }
        Ok(replaced > 0)
    }
}
