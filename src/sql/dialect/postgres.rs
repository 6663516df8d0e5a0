//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features used here:
//! - ANSI identifier quoting (`"`), applied only when folding or keywords require it
//! - Native boolean type (true/false)
//! - `expr::type` casts
//! - psycopg named placeholders (`%(name)s`)

use super::helpers;
use super::SqlDialect;

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        if helpers::is_bare_identifier(ident) && !helpers::is_reserved_postgres(ident) {
            ident.to_string()
        } else {
            helpers::quote_double(ident)
        }
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn placeholder(&self, name: &str) -> String {
        helpers::pyformat_placeholder(name)
    }
}
