//! Named placeholders in externally generated SQL.
//!
//! Statements arrive with psycopg placeholders (`%(restaurant)s`) that no SQL
//! parser accepts. Before parsing, each placeholder is swapped for a string
//! literal sentinel; after rendering, sentinels are swapped back. A sentinel
//! is an ordinary literal to the parser, so it survives every rewrite intact.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use sqlparser::tokenizer::Token;

use super::parse::lex;

const SENTINEL_PREFIX: &str = "__qg_param__";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\(([A-Za-z_][A-Za-z0-9_]*)\)s").unwrap());

static SENTINEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'__qg_param__([A-Za-z_][A-Za-z0-9_]*)'").unwrap());

/// Render the placeholder for `name`.
pub fn placeholder(name: &str) -> String {
    format!("%({})s", name)
}

/// `%(name)s` occurrences that are placeholders, not text inside a string
/// literal, quoted identifier or comment.
fn placeholders(sql: &str) -> impl Iterator<Item = Captures<'_>> {
    // Only those tokens (and operators like `>=%`) can span a `%` they do not start with
    let enclosing: Vec<Range<usize>> = lex(sql)
        .unwrap_or_default()
        .into_iter()
        .filter(|l| !matches!(l.token, Token::CustomBinaryOperator(_)))
        .map(|l| l.range)
        .collect();
    PLACEHOLDER.captures_iter(sql).filter(move |caps| {
        caps.get(0).is_some_and(|m| {
            !enclosing
                .iter()
                .any(|r| r.start < m.start() && m.start() < r.end)
        })
    })
}

/// Replace every `%(name)s` with a parseable string literal.
pub fn mask(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    for caps in placeholders(sql) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&sql[copied..whole.start()]);
        out.push_str(&format!("'{}{}'", SENTINEL_PREFIX, &caps[1]));
        copied = whole.end();
    }
    out.push_str(&sql[copied..]);
    out
}

/// Inverse of [`mask`] on rendered SQL.
pub fn unmask(sql: &str) -> String {
    SENTINEL
        .replace_all(sql, |caps: &Captures| placeholder(&caps[1]))
        .into_owned()
}

/// The parameter a sentinel literal value stands for, if it is one.
pub fn sentinel_name(value: &str) -> Option<&str> {
    value.strip_prefix(SENTINEL_PREFIX).filter(|name| {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Whether masked or rendered text contains a sentinel for `name`.
pub fn text_mentions(sql: &str, name: &str) -> bool {
    SENTINEL.captures_iter(sql).any(|caps| &caps[1] == name)
}

/// All placeholder names in raw SQL, sorted.
pub fn placeholder_names(sql: &str) -> BTreeSet<String> {
    placeholders(sql).map(|caps| caps[1].to_string()).collect()
}
