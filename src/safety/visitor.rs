//! Walks every node of a parsed statement looking for forbidden operations.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use sqlparser::ast::{Expr, ObjectName, Query, SetExpr, Statement, Visitor};

use super::policy::{Operation, SafetyPolicy};
use super::UnsafeSqlError;

pub(super) struct SafetyVisitor<'a> {
    policy: &'a SafetyPolicy,
    ctes: BTreeSet<String>,
    pub(super) has_limit: bool,
}

impl<'a> SafetyVisitor<'a> {
    pub(super) fn new(policy: &'a SafetyPolicy) -> Self {
        Self {
            policy,
            ctes: BTreeSet::new(),
            has_limit: false,
        }
    }
}

fn forbidden(operation: Operation) -> ControlFlow<UnsafeSqlError> {
    ControlFlow::Break(UnsafeSqlError::ForbiddenStatement { operation })
}

fn selects_into(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::SetOperation { left, right, .. } => selects_into(left) || selects_into(right),
        _ => false,
    }
}

impl Visitor for SafetyVisitor<'_> {
    type Break = UnsafeSqlError;

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        if let Statement::Query(_) = statement {
            return ControlFlow::Continue(());
        }
        let text = statement.to_string();
        let keyword = text.split_whitespace().next().unwrap_or_default();
        forbidden(Operation::from_keyword(keyword))
    }

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if !query.locks.is_empty() {
            return forbidden(Operation::LockingRead);
        }
        if selects_into(&query.body) {
            return forbidden(Operation::SelectInto);
        }
        if let Some(with) = &query.with {
            self.ctes
                .extend(with.cte_tables.iter().map(|cte| cte.alias.name.value.to_lowercase()));
        }
        if query.limit.is_some() || query.fetch.is_some() {
            self.has_limit = true;
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        let parts: Vec<String> = relation.0.iter().map(|i| i.value.to_lowercase()).collect();
        if self.policy.allows_relation(&parts, &self.ctes) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(UnsafeSqlError::DisallowedRelation {
                relation: parts.join("."),
            })
        }
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if let Expr::Function(function) = expr {
            if let Some(name) = function.name.0.last() {
                if self.policy.forbids_function(&name.value) {
                    return forbidden(Operation::Function(name.value.to_lowercase()));
                }
            }
        }
        ControlFlow::Continue(())
    }
}
