//! The standard normalizer passes.

mod banned_column;
mod completed;
mod product_revenue;
mod relative_week;
mod scope;

pub use banned_column::BannedColumnPass;
pub use completed::CompletedStatePass;
pub use product_revenue::ProductRevenuePass;
pub use relative_week::RelativeWeekPass;
pub use scope::ScopePass;

use crate::sql::expr::Expr;
use crate::sql::query::Query;
use crate::sql::rewrite::{join_conjunction, split_conjunction};

/// How one query refers to a table it reads directly.
#[derive(Debug, Clone)]
pub(crate) struct TableScope {
    /// Every name that qualifies the table's columns here.
    pub qualifiers: Vec<String>,
    /// Name to qualify new column references with.
    pub binding: String,
    /// Unqualified columns resolve to this table (it is the only relation).
    pub unqualified_ok: bool,
}

impl TableScope {
    pub fn of(query: &Query, table: &str) -> Option<Self> {
        let tables = query.named_tables();
        let own = tables.iter().find(|t| t.table.eq_ignore_ascii_case(table))?;
        let sources: usize = query.from.iter().map(|f| f.sources().count()).sum();
        Some(Self {
            qualifiers: query.qualifiers_for(table),
            binding: own.binding().to_string(),
            unqualified_ok: sources == 1,
        })
    }

    pub fn is_column(&self, expr: &Expr, column: &str) -> bool {
        expr.is_column_of(&self.qualifiers, column, self.unqualified_ok)
    }

    pub fn mentions(&self, expr: &Expr, column: &str) -> bool {
        expr.mentions_column(&self.qualifiers, column, self.unqualified_ok)
    }
}

/// Rebuild `query`'s WHERE clause from its conjuncts.
pub(crate) fn edit_conjuncts(query: &mut Query, edit: impl FnOnce(&mut Vec<Expr>)) {
    let mut conjuncts = query
        .where_clause
        .take()
        .map(split_conjunction)
        .unwrap_or_default();
    edit(&mut conjuncts);
    query.where_clause = join_conjunction(conjuncts);
}
