//! Tree traversal and rewrite operations.
//!
//! Normalizer passes work against these primitives: visiting every node of a
//! kind, replacing nodes in place, splitting a predicate into conjuncts and
//! joining them back, and enumerating every query nested in a statement
//! (CTE bodies, set-operation branches, derived tables and subqueries).

use regex::Regex;

use super::expr::{BinaryOperator, Expr, ExprExt};
use super::params;
use super::query::{FromItem, Query, TableRef, TableSource};

const AGGREGATES: &[&str] = &["sum", "count", "avg", "min", "max"];

// =============================================================================
// Expression traversal
// =============================================================================

impl Expr {
    /// Direct child expressions. Subqueries are not entered.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column { .. }
            | Expr::Literal(_)
            | Expr::Param(_)
            | Expr::Interval(_)
            | Expr::Star { .. }
            | Expr::Raw(_)
            | Expr::Subquery(_)
            | Expr::Exists { .. } => vec![],
            Expr::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::UnaryOp { expr, .. }
            | Expr::InSubquery { expr, .. }
            | Expr::IsNull { expr, .. }
            | Expr::IsBool { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::Paren(expr) => vec![expr.as_ref()],
            Expr::Function { args, .. } => args.iter().collect(),
            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let mut out: Vec<&Expr> = operand.iter().map(|e| e.as_ref()).collect();
                for (when, then) in when_clauses {
                    out.push(when);
                    out.push(then);
                }
                out.extend(else_clause.iter().map(|e| e.as_ref()));
                out
            }
            Expr::In { expr, values, .. } => {
                let mut out: Vec<&Expr> = vec![expr.as_ref()];
                out.extend(values.iter());
                out
            }
            Expr::Between {
                expr, low, high, ..
            } => vec![expr.as_ref(), low.as_ref(), high.as_ref()],
        }
    }

    /// Mutable counterpart of [`Expr::children`].
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Column { .. }
            | Expr::Literal(_)
            | Expr::Param(_)
            | Expr::Interval(_)
            | Expr::Star { .. }
            | Expr::Raw(_)
            | Expr::Subquery(_)
            | Expr::Exists { .. } => vec![],
            Expr::BinaryOp { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Expr::UnaryOp { expr, .. }
            | Expr::InSubquery { expr, .. }
            | Expr::IsNull { expr, .. }
            | Expr::IsBool { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::Paren(expr) => vec![expr.as_mut()],
            Expr::Function { args, .. } => args.iter_mut().collect(),
            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let mut out: Vec<&mut Expr> = operand.iter_mut().map(|e| e.as_mut()).collect();
                for (when, then) in when_clauses.iter_mut() {
                    out.push(when);
                    out.push(then);
                }
                out.extend(else_clause.iter_mut().map(|e| e.as_mut()));
                out
            }
            Expr::In { expr, values, .. } => {
                let mut out: Vec<&mut Expr> = vec![expr.as_mut()];
                out.extend(values.iter_mut());
                out
            }
            Expr::Between {
                expr, low, high, ..
            } => vec![expr.as_mut(), low.as_mut(), high.as_mut()],
        }
    }

    /// The query this node embeds, if any.
    pub fn subquery(&self) -> Option<&Query> {
        match self {
            Expr::Subquery(q) | Expr::Exists { subquery: q, .. } | Expr::InSubquery { subquery: q, .. } => {
                Some(q.as_ref())
            }
            _ => None,
        }
    }

    fn subquery_mut(&mut self) -> Option<&mut Query> {
        match self {
            Expr::Subquery(q) | Expr::Exists { subquery: q, .. } | Expr::InSubquery { subquery: q, .. } => {
                Some(q.as_mut())
            }
            _ => None,
        }
    }

    /// Pre-order visit of this expression and its descendants.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Whether any node satisfies `pred`.
    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.any(pred))
    }

    /// Find all nodes matching `pred`, pre-order.
    pub fn find_all(&self, pred: &dyn Fn(&Expr) -> bool) -> Vec<&Expr> {
        let mut out = vec![];
        self.walk(&mut |e| {
            if pred(e) {
                out.push(e);
            }
        });
        out
    }

    /// Replace nodes top-down. When `f` returns a replacement its subtree is
    /// not visited again; otherwise traversal continues into the children.
    pub fn rewrite(&mut self, f: &mut dyn FnMut(&Expr) -> Option<Expr>) -> usize {
        if let Some(replacement) = f(self) {
            *self = replacement;
            return 1;
        }
        self.children_mut().into_iter().map(|c| c.rewrite(f)).sum()
    }

    /// `SUM`, `COUNT`, `AVG`, `MIN` or `MAX` call.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expr::Function { name, .. } if AGGREGATES.contains(&name.to_ascii_lowercase().as_str()))
    }

    /// Whether an aggregate call appears anywhere in this expression.
    pub fn contains_aggregate(&self) -> bool {
        self.any(&|e| e.is_aggregate())
    }

    /// Whether this is a column reference to `column` through one of
    /// `qualifiers`, or unqualified when `unqualified_ok` is set.
    pub fn is_column_of(&self, qualifiers: &[String], column: &str, unqualified_ok: bool) -> bool {
        match self {
            Expr::Column { table, column: c } if c.eq_ignore_ascii_case(column) => match table {
                Some(t) => qualifiers.iter().any(|q| q.eq_ignore_ascii_case(t)),
                None => unqualified_ok,
            },
            _ => false,
        }
    }

    /// Whether any column reference inside matches [`Expr::is_column_of`].
    pub fn mentions_column(&self, qualifiers: &[String], column: &str, unqualified_ok: bool) -> bool {
        self.any(&|e| e.is_column_of(qualifiers, column, unqualified_ok))
    }
}

// =============================================================================
// Conjunctions
// =============================================================================

/// Split a predicate into its AND-ed conjuncts, looking through parentheses
/// that only group further conjunctions.
pub fn split_conjunction(expr: Expr) -> Vec<Expr> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let mut out = split_conjunction(*left);
            out.extend(split_conjunction(*right));
            out
        }
        Expr::Paren(inner)
            if matches!(
                inner.as_ref(),
                Expr::BinaryOp {
                    op: BinaryOperator::And,
                    ..
                }
            ) =>
        {
            split_conjunction(*inner)
        }
        other => vec![other],
    }
}

/// Join conjuncts with AND. Disjunctions are parenthesized so precedence
/// survives the join.
pub fn join_conjunction(conjuncts: Vec<Expr>) -> Option<Expr> {
    conjuncts
        .into_iter()
        .map(|c| match c {
            Expr::BinaryOp {
                op: BinaryOperator::Or,
                ..
            } => Expr::Paren(Box::new(c)),
            other => other,
        })
        .reduce(|acc, c| acc.and(c))
}

// =============================================================================
// Query traversal
// =============================================================================

impl FromItem {
    fn sources_mut(&mut self) -> impl Iterator<Item = &mut TableSource> {
        std::iter::once(&mut self.source).chain(self.joins.iter_mut().map(|j| &mut j.table))
    }
}

impl Query {
    /// This query's own expressions: select items, join conditions, WHERE,
    /// GROUP BY, HAVING and ORDER BY. Nested queries are not entered.
    pub fn exprs(&self) -> Vec<&Expr> {
        let mut out: Vec<&Expr> = self.select.iter().map(|s| &s.expr).collect();
        for item in &self.from {
            out.extend(item.joins.iter().filter_map(|j| j.on.as_ref()));
        }
        out.extend(self.where_clause.iter());
        out.extend(self.group_by.iter());
        out.extend(self.having.iter());
        out.extend(self.order_by.iter().map(|o| &o.expr));
        out
    }

    /// Mutable counterpart of [`Query::exprs`].
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        let mut out: Vec<&mut Expr> = self.select.iter_mut().map(|s| &mut s.expr).collect();
        for item in self.from.iter_mut() {
            out.extend(item.joins.iter_mut().filter_map(|j| j.on.as_mut()));
        }
        out.extend(self.where_clause.iter_mut());
        out.extend(self.group_by.iter_mut());
        out.extend(self.having.iter_mut());
        out.extend(self.order_by.iter_mut().map(|o| &mut o.expr));
        out
    }

    /// Queries directly nested in this one.
    fn child_queries(&self) -> Vec<&Query> {
        let mut out: Vec<&Query> = self.with.iter().map(|cte| cte.query.as_ref()).collect();
        if let Some(op) = &self.set_op {
            out.push(&op.left);
            out.push(&op.right);
        }
        for item in &self.from {
            for source in item.sources() {
                if let TableSource::Derived { query, .. } = source {
                    out.push(query);
                }
            }
        }
        for expr in self.exprs() {
            expr.walk(&mut |e| {
                if let Some(q) = e.subquery() {
                    out.push(q);
                }
            });
        }
        out
    }

    /// This query followed by every query nested inside it, pre-order.
    pub fn queries(&self) -> Vec<&Query> {
        let mut out = vec![self];
        for child in self.child_queries() {
            out.extend(child.queries());
        }
        out
    }

    /// Apply `f` to this query and then to every nested query.
    pub fn try_for_each_query_mut<E>(
        &mut self,
        f: &mut dyn FnMut(&mut Query) -> Result<(), E>,
    ) -> Result<(), E> {
        f(self)?;
        for cte in self.with.iter_mut() {
            cte.query.try_for_each_query_mut(f)?;
        }
        if let Some(op) = self.set_op.as_mut() {
            op.left.try_for_each_query_mut(f)?;
            op.right.try_for_each_query_mut(f)?;
        }
        for item in self.from.iter_mut() {
            for source in item.sources_mut() {
                if let TableSource::Derived { query, .. } = source {
                    query.try_for_each_query_mut(f)?;
                }
            }
        }
        for expr in self.exprs_mut() {
            for_each_subquery_mut(expr, f)?;
        }
        Ok(())
    }

    /// Infallible form of [`Query::try_for_each_query_mut`].
    pub fn for_each_query_mut(&mut self, f: &mut dyn FnMut(&mut Query)) {
        let _ = self.try_for_each_query_mut::<std::convert::Infallible>(&mut |q| {
            f(q);
            Ok(())
        });
    }

    /// Named tables in this query's own FROM clause and joins.
    pub fn named_tables(&self) -> Vec<&TableRef> {
        self.from
            .iter()
            .flat_map(|item| item.sources())
            .filter_map(|source| match source {
                TableSource::Named(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Names columns of `table` may be qualified with in this query.
    /// Empty when the table is not in this query's FROM clause.
    pub fn qualifiers_for(&self, table: &str) -> Vec<String> {
        let mut out: Vec<String> = vec![];
        for t in self.named_tables() {
            if t.table.eq_ignore_ascii_case(table) {
                for name in [t.table.as_str(), t.binding()] {
                    if !out.iter().any(|q| q == name) {
                        out.push(name.to_string());
                    }
                }
            }
        }
        out
    }

    /// Whether `table` is read anywhere in the statement, including nested
    /// queries and relations kept as raw text.
    pub fn reads_table(&self, table: &str) -> bool {
        self.queries().into_iter().any(|q| {
            !q.qualifiers_for(table).is_empty()
                || q.raw_fragments().iter().any(|raw| raw_reads_table(raw, table))
        })
    }

    /// Whether the bind parameter `name` is referenced anywhere.
    pub fn references_param(&self, name: &str) -> bool {
        self.queries().into_iter().any(|q| {
            q.exprs().into_iter().any(|e| {
                e.any(&|node| match node {
                    Expr::Param(p) => p == name,
                    Expr::Raw(text) => params::text_mentions(text, name),
                    _ => false,
                })
            }) || q.raw_fragments().iter().any(|raw| params::text_mentions(raw, name))
        })
    }

    /// Raw text held by this query's own relations and expressions.
    fn raw_fragments(&self) -> Vec<&str> {
        let mut out = vec![];
        for item in &self.from {
            for source in item.sources() {
                if let TableSource::Raw(text) = source {
                    out.push(text.as_str());
                }
            }
        }
        for expr in self.exprs() {
            expr.walk(&mut |e| {
                if let Expr::Raw(text) = e {
                    out.push(text.as_str());
                }
            });
        }
        out
    }
}

fn for_each_subquery_mut<E>(
    expr: &mut Expr,
    f: &mut dyn FnMut(&mut Query) -> Result<(), E>,
) -> Result<(), E> {
    if let Some(q) = expr.subquery_mut() {
        q.try_for_each_query_mut(f)?;
    }
    for child in expr.children_mut() {
        for_each_subquery_mut(child, f)?;
    }
    Ok(())
}

/// Whether raw SQL text reads `table` through FROM or JOIN.
fn raw_reads_table(text: &str, table: &str) -> bool {
    let pattern = format!(
        r"(?i)\b(from|join)\s+(\w+\.)?{}\b",
        regex::escape(table)
    );
    Regex::new(&pattern).is_ok_and(|re| re.is_match(text))
}
