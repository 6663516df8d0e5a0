//! SQL tree module.
//!
//! This module provides a type-safe SQL tree shared by the compiler and the
//! normalizer. It includes:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`rewrite`] - Traversal, find-all, replace and conjunction helpers
//! - [`parse`] - sqlparser AST to tree conversion
//! - [`params`] - `%(name)s` placeholder masking
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - PostgreSQL rendering rules

pub mod dialect;
pub mod expr;
pub mod params;
pub mod parse;
pub mod query;
pub mod rewrite;
pub mod token;

// Re-export commonly used types at the sql module level
pub use dialect::{Postgres, SqlDialect};
pub use expr::{
    case_when, coalesce, col, count_star, func, interval, lit_bool, lit_date, lit_float, lit_int,
    lit_null, lit_str, param, paren, star, sum, table_col, BinaryOperator, Expr, ExprExt, Literal,
    UnaryOperator,
};
pub use parse::{parse_expr, parse_query, ParseError};
pub use query::{
    Cte, FromItem, Join, JoinType, LimitOffset, NullsOrder, OrderByExpr, Query, SelectExpr,
    SetOpType, SetOperation, SortDir, TableRef, TableSource,
};
pub use rewrite::{join_conjunction, split_conjunction};
pub use token::{Token, TokenStream};
