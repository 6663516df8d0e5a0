use super::TableScope;
use crate::normalize::{NormalizeError, NormalizeResult, NormalizerPass, PassContext};
use crate::schema::CompletedState;
use crate::sql::expr::{BinaryOperator, Expr, Literal};
use crate::sql::query::{JoinType, Query, TableSource};
use crate::sql::rewrite::split_conjunction;

/// Statements reading the transactional table must filter it to completed
/// transactions. Check only.
///
/// Every query block that reads the table must carry the predicate as a
/// top-level conjunct of its WHERE clause, of an inner join condition, or of
/// the condition joining the table itself. Negated or OR-ed forms do not
/// count.
#[derive(Debug, Clone)]
pub struct CompletedStatePass {
    state: Option<CompletedState>,
}

impl CompletedStatePass {
    pub fn new(state: Option<CompletedState>) -> Self {
        Self { state }
    }
}

/// `<col> = '<value>'` in either operand order.
fn is_completed_check(expr: &Expr, scope: &TableScope, state: &CompletedState) -> bool {
    if let Expr::Paren(inner) = expr {
        return is_completed_check(inner, scope, state);
    }
    let Expr::BinaryOp {
        left,
        op: BinaryOperator::Eq,
        right,
    } = expr
    else {
        return false;
    };
    let is_value = |e: &Expr| matches!(e, Expr::Literal(Literal::String(s)) if s.eq_ignore_ascii_case(&state.value));
    (scope.is_column(left, &state.column) && is_value(right))
        || (scope.is_column(right, &state.column) && is_value(left))
}

/// Whether `query` restricts `state.table` to completed rows.
fn block_carries_state(query: &Query, scope: &TableScope, state: &CompletedState) -> bool {
    let joins_state_table = |source: &TableSource| {
        matches!(source, TableSource::Named(t) if t.table.eq_ignore_ascii_case(&state.table))
    };
    let join_conditions = query.from.iter().flat_map(|item| {
        item.joins
            .iter()
            .filter(|j| j.join_type == JoinType::Inner || joins_state_table(&j.table))
            .filter_map(|j| j.on.as_ref())
    });
    query
        .where_clause
        .iter()
        .chain(join_conditions)
        .flat_map(|condition| split_conjunction(condition.clone()))
        .any(|conjunct| is_completed_check(&conjunct, scope, state))
}

impl NormalizerPass for CompletedStatePass {
    fn name(&self) -> &'static str {
        "completed_state"
    }

    fn apply(&self, query: &mut Query, _ctx: &PassContext<'_>) -> NormalizeResult<bool> {
        let Some(state) = &self.state else {
            return Ok(false);
        };
        if !query.reads_table(&state.table) {
            return Ok(false);
        }

        let blocks: Vec<(&Query, TableScope)> = query
            .queries()
            .into_iter()
            .filter_map(|q| TableScope::of(q, &state.table).map(|scope| (q, scope)))
            .collect();
        // Reads only through relations the tree does not model cannot be verified
        let carried = !blocks.is_empty()
            && blocks
                .iter()
                .all(|(q, scope)| block_carries_state(q, scope, state));

        if carried {
            Ok(false)
        } else {
            Err(NormalizeError::MissingRequiredFilter {
                table: state.table.clone(),
                filter: format!("{}.{} = '{}'", state.table, state.column, state.value),
            })
        }
    }
}
