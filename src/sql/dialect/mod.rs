//! SQL dialect definitions and formatting rules.
//!
//! Compiled and normalized statements target PostgreSQL with psycopg-style
//! named placeholders (`%(name)s`). The `SqlDialect` trait isolates every
//! rendering decision so tokens stay dialect-agnostic until serialization.
//!
//! ```ignore
//! use querygate::sql::dialect::{Postgres, SqlDialect};
//!
//! assert_eq!(Postgres.quote_identifier("sales"), "sales");
//! assert_eq!(Postgres.quote_identifier("order"), "\"order\"");
//! assert_eq!(Postgres.placeholder("restaurant"), "%(restaurant)s");
//! ```

pub mod helpers;
mod postgres;

pub use postgres::Postgres;

use super::token::{Token, TokenStream};

/// SQL dialect trait - defines how SQL constructs are rendered.
pub trait SqlDialect: std::fmt::Debug {
    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias) if the dialect requires it.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    /// Format a date literal: `DATE 'YYYY-MM-DD'`.
    fn format_date_literal(&self, date: &str) -> String {
        format!("DATE {}", self.quote_string(date))
    }

    /// Render a named bind parameter.
    fn placeholder(&self, name: &str) -> String;

    /// Suffix that casts the preceding operand: `::type`.
    fn cast_suffix(&self, data_type: &str) -> String {
        format!("::{}", data_type)
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        let mut ts = TokenStream::new();

        if let Some(lim) = limit {
            ts.push(Token::Limit)
                .space()
                .push(Token::LitInt(lim as i64));
        }

        if let Some(off) = offset {
            if limit.is_some() {
                ts.space();
            }
            ts.push(Token::Offset)
                .space()
                .push(Token::LitInt(off as i64));
        }

        ts
    }

    // =========================================================================
    // Operators
    // =========================================================================

    /// String concatenation operator.
    fn concat_operator(&self) -> &'static str {
        "||"
    }

    /// Whether this dialect supports NULLS FIRST/LAST in ORDER BY.
    fn supports_nulls_ordering(&self) -> bool {
        true
    }
}
