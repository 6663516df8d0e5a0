//! Safety Gate - only a single read-only SELECT gets through.
//!
//! The gate parses candidate text with sqlparser's PostgreSQL dialect, then
//! walks every node of the single statement:
//!
//! 1. Any non-query statement anywhere (including data-modifying CTEs) is a
//!    [`UnsafeSqlError::ForbiddenStatement`].
//! 2. `SELECT ... INTO`, locking reads and denylisted functions are
//!    forbidden too.
//! 3. Relations must satisfy the [`SafetyPolicy`].
//!
//! Only then is the top-level shape checked: a SELECT, optionally behind a
//! WITH block.

mod policy;
mod visitor;

use std::ops::ControlFlow;

use sqlparser::ast::{SetExpr, Statement, Visit};
use thiserror::Error;

use crate::sql::parse::{lex, parse_statements};

pub use policy::{Operation, SafetyPolicy, DEFAULT_FORBIDDEN_FUNCTIONS};
use visitor::SafetyVisitor;

/// Why candidate SQL was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnsafeSqlError {
    #[error("empty SQL")]
    EmptySql,

    #[error("SQL parse error: {0}")]
    ParseError(String),

    #[error("multiple SQL statements are not allowed (found {count})")]
    MultipleStatements { count: usize },

    #[error("only SELECT queries are allowed")]
    NotSelect,

    #[error("{operation} is not allowed")]
    ForbiddenStatement { operation: Operation },

    #[error("relation {relation} is not allowed")]
    DisallowedRelation { relation: String },
}

pub type GateResult<T> = Result<T, UnsafeSqlError>;

/// A statement that passed the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyResult {
    /// Input text without surrounding whitespace, comments or semicolons.
    pub normalized_sql: String,
    /// Whether a LIMIT or FETCH appears anywhere in the statement.
    pub has_limit: bool,
    statement: Statement,
}

impl SafetyResult {
    /// The parsed statement, with placeholders masked.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }
}

/// Validates candidate SQL against a [`SafetyPolicy`].
#[derive(Debug, Clone, Default)]
pub struct SafetyGate {
    policy: SafetyPolicy,
}

impl SafetyGate {
    pub fn new(policy: SafetyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    pub fn validate(&self, text: &str) -> GateResult<SafetyResult> {
        if text.trim().is_empty() {
            return Err(UnsafeSqlError::EmptySql);
        }

        let mut statements =
            parse_statements(text).map_err(|e| UnsafeSqlError::ParseError(e.to_string()))?;
        let statement = match statements.len() {
            0 => return Err(UnsafeSqlError::EmptySql),
            1 => statements.remove(0),
            count => return Err(UnsafeSqlError::MultipleStatements { count }),
        };

        let mut visitor = SafetyVisitor::new(&self.policy);
        if let ControlFlow::Break(err) = statement.visit(&mut visitor) {
            return Err(err);
        }

        if !is_select(&statement) {
            return Err(UnsafeSqlError::NotSelect);
        }

        Ok(SafetyResult {
            normalized_sql: normalize_text(text),
            has_limit: visitor.has_limit,
            statement,
        })
    }
}

/// Validate with the default policy.
pub fn validate_select_only(text: &str) -> GateResult<SafetyResult> {
    SafetyGate::default().validate(text)
}

fn is_select(statement: &Statement) -> bool {
    let Statement::Query(query) = statement else {
        return false;
    };
    let mut body = query.body.as_ref();
    loop {
        match body {
            SetExpr::Select(_) => return true,
            SetExpr::Query(inner) => body = inner.body.as_ref(),
            _ => return false,
        }
    }
}

/// The input from its first to its last significant token: surrounding
/// whitespace, comments and semicolons are dropped.
fn normalize_text(text: &str) -> String {
    let lexemes = lex(text).unwrap_or_default();
    let mut significant = lexemes.iter().filter(|l| !l.is_filler());
    let Some(first) = significant.next() else {
        return text.trim().to_string();
    };
    let end = significant.last().unwrap_or(first).range.end;
    text[first.range.start..end].to_string()
}
