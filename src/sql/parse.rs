//! SQL text parser that converts the sqlparser AST into our tree.
//!
//! Parsing always goes through [`params::mask`], so `%(name)s` placeholders
//! come back as [`Expr::Param`] nodes. Constructs the typed tree does not
//! model are kept as [`Expr::Raw`] / [`TableSource::Raw`] text rendered by
//! sqlparser itself; clauses that cannot be carried that way are rejected.

use std::ops::Range;

use chrono::NaiveDate;
use sqlparser::ast as sql;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{self, Location, Tokenizer};
use thiserror::Error;

use super::expr::{BinaryOperator, Expr, Literal, UnaryOperator};
use super::params;
use super::query::{
    Cte, FromItem, Join, JoinType, LimitOffset, NullsOrder, OrderByExpr, Query, SelectExpr,
    SetOpType, SetOperation, SortDir, TableRef, TableSource,
};

/// Errors that can occur while parsing SQL text into the tree.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("SQL syntax error: {0}")]
    Syntax(String),

    #[error("expected a single expression: {0}")]
    NotAnExpression(String),

    #[error("expected a single query: {0}")]
    NotAQuery(String),

    #[error("unsupported SQL construct: {0}")]
    Unsupported(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

// =============================================================================
// Entry points
// =============================================================================

/// A token of raw SQL text and the bytes it spans.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lexeme {
    pub token: tokenizer::Token,
    pub range: Range<usize>,
}

impl Lexeme {
    /// Whitespace, comments and statement separators.
    pub fn is_filler(&self) -> bool {
        matches!(
            self.token,
            tokenizer::Token::Whitespace(_) | tokenizer::Token::SemiColon | tokenizer::Token::EOF
        )
    }
}

/// Tokenize raw text, keeping byte ranges into `text`.
///
/// `None` when the text does not tokenize (e.g. an unterminated literal).
pub(crate) fn lex(text: &str) -> Option<Vec<Lexeme>> {
    let tokens = Tokenizer::new(&PostgreSqlDialect {}, text)
        .tokenize_with_location()
        .ok()?;
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    // Locations count lines and chars from 1; the end location is exclusive
    let offset = |at: Location| -> usize {
        let Some(&start) = usize::try_from(at.line)
            .ok()
            .and_then(|line| line_starts.get(line.checked_sub(1)?))
        else {
            return text.len();
        };
        let column = usize::try_from(at.column).map_or(0, |c| c.saturating_sub(1));
        text[start..]
            .char_indices()
            .nth(column)
            .map_or(text.len(), |(i, _)| start + i)
    };
    Some(
        tokens
            .into_iter()
            .map(|t| Lexeme {
                range: offset(t.span.start)..offset(t.span.end),
                token: t.token,
            })
            .collect(),
    )
}

/// Parse SQL text (placeholders allowed) into sqlparser statements.
pub fn parse_statements(text: &str) -> ParseResult<Vec<sql::Statement>> {
    Parser::parse_sql(&PostgreSqlDialect {}, &params::mask(text))
        .map_err(|e| ParseError::Syntax(e.to_string()))
}

/// Parse a single query.
pub fn parse_query(text: &str) -> ParseResult<Query> {
    match parse_statements(text)?.as_slice() {
        [sql::Statement::Query(query)] => convert_query(query),
        _ => Err(ParseError::NotAQuery(text.to_string())),
    }
}

/// Parse a single scalar expression, e.g. a metric definition.
pub fn parse_expr(text: &str) -> ParseResult<Expr> {
    let statements = parse_statements(&format!("SELECT {}", text))
        .map_err(|_| ParseError::NotAnExpression(text.to_string()))?;
    let [sql::Statement::Query(query)] = statements.as_slice() else {
        return Err(ParseError::NotAnExpression(text.to_string()));
    };
    let sql::SetExpr::Select(select) = query.body.as_ref() else {
        return Err(ParseError::NotAnExpression(text.to_string()));
    };
    match select.projection.as_slice() {
        [sql::SelectItem::UnnamedExpr(expr)] if select.from.is_empty() => convert_expr(expr),
        _ => Err(ParseError::NotAnExpression(text.to_string())),
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Convert a parsed query.
pub fn convert_query(query: &sql::Query) -> ParseResult<Query> {
    if query.fetch.is_some() {
        return Err(ParseError::Unsupported("FETCH".into()));
    }
    if !query.limit_by.is_empty() {
        return Err(ParseError::Unsupported("LIMIT BY".into()));
    }
    if !query.locks.is_empty() {
        return Err(ParseError::Unsupported("locking clause".into()));
    }

    let mut out = convert_set_expr(&query.body)?;

    let wraps_outer_clauses = query.order_by.is_some() || query.limit.is_some() || query.offset.is_some();
    if wraps_outer_clauses && (!out.order_by.is_empty() || out.limit_offset.is_some()) {
        return Err(ParseError::Unsupported(
            "ORDER BY or LIMIT on a parenthesized query".into(),
        ));
    }

    if let Some(with) = &query.with {
        let mut ctes = with
            .cte_tables
            .iter()
            .map(|cte| convert_cte(cte, with.recursive))
            .collect::<ParseResult<Vec<_>>>()?;
        ctes.append(&mut out.with);
        out.with = ctes;
    }

    if let Some(order_by) = &query.order_by {
        out.order_by = order_by
            .exprs
            .iter()
            .map(convert_order_by)
            .collect::<ParseResult<Vec<_>>>()?;
    }

    let limit = query.limit.as_ref().map(convert_count).transpose()?;
    let offset = query
        .offset
        .as_ref()
        .map(|o| convert_count(&o.value))
        .transpose()?;
    if limit.is_some() || offset.is_some() {
        out.limit_offset = Some(LimitOffset { limit, offset });
    }

    Ok(out)
}

fn convert_set_expr(body: &sql::SetExpr) -> ParseResult<Query> {
    match body {
        sql::SetExpr::Select(select) => convert_select(select),
        sql::SetExpr::Query(query) => convert_query(query),
        sql::SetExpr::SetOperation {
            op,
            set_quantifier,
            left,
            right,
        } => {
            let op = match op {
                sql::SetOperator::Union => SetOpType::Union,
                sql::SetOperator::Intersect => SetOpType::Intersect,
                sql::SetOperator::Except => SetOpType::Except,
                #[allow(unreachable_patterns)]
                other => return Err(ParseError::Unsupported(other.to_string())),
            };
            let all = match set_quantifier {
                sql::SetQuantifier::All => true,
                sql::SetQuantifier::None | sql::SetQuantifier::Distinct => false,
                other => return Err(ParseError::Unsupported(other.to_string())),
            };
            Ok(Query {
                set_op: Some(Box::new(SetOperation::new(
                    convert_set_expr(left)?,
                    op,
                    all,
                    convert_set_expr(right)?,
                ))),
                ..Default::default()
            })
        }
        other => Err(ParseError::Unsupported(other.to_string())),
    }
}

fn convert_select(select: &sql::Select) -> ParseResult<Query> {
    if select.top.is_some() {
        return Err(ParseError::Unsupported("TOP".into()));
    }
    if select.into.is_some() {
        return Err(ParseError::Unsupported("SELECT INTO".into()));
    }
    if !select.named_window.is_empty() {
        return Err(ParseError::Unsupported("WINDOW clause".into()));
    }
    if select.qualify.is_some() {
        return Err(ParseError::Unsupported("QUALIFY".into()));
    }

    let distinct = match &select.distinct {
        None => false,
        Some(sql::Distinct::Distinct) => true,
        Some(sql::Distinct::On(_)) => return Err(ParseError::Unsupported("DISTINCT ON".into())),
    };

    let select_list = select
        .projection
        .iter()
        .map(convert_select_item)
        .collect::<ParseResult<Vec<_>>>()?;

    let mut from = Vec::with_capacity(select.from.len());
    for item in &select.from {
        from.push(FromItem {
            source: convert_table_factor(&item.relation)?,
            joins: item
                .joins
                .iter()
                .map(convert_join)
                .collect::<ParseResult<Vec<_>>>()?,
        });
    }

    let group_by = match &select.group_by {
        sql::GroupByExpr::Expressions(exprs, modifiers) if modifiers.is_empty() => exprs
            .iter()
            .map(convert_expr)
            .collect::<ParseResult<Vec<_>>>()?,
        other => return Err(ParseError::Unsupported(other.to_string())),
    };

    Ok(Query {
        select: select_list,
        distinct,
        from,
        where_clause: select.selection.as_ref().map(convert_expr).transpose()?,
        group_by,
        having: select.having.as_ref().map(convert_expr).transpose()?,
        ..Default::default()
    })
}

fn convert_select_item(item: &sql::SelectItem) -> ParseResult<SelectExpr> {
    Ok(match item {
        sql::SelectItem::UnnamedExpr(expr) => SelectExpr::new(convert_expr(expr)?),
        sql::SelectItem::ExprWithAlias { expr, alias } => SelectExpr {
            expr: convert_expr(expr)?,
            alias: Some(ident_name(alias)),
        },
        // wildcards, possibly with EXCLUDE/REPLACE options
        other => SelectExpr::new(Expr::Raw(other.to_string())),
    })
}

fn convert_cte(cte: &sql::Cte, recursive: bool) -> ParseResult<Cte> {
    if !cte.alias.columns.is_empty() {
        return Err(ParseError::Unsupported(format!(
            "column list on CTE {}",
            cte.alias.name
        )));
    }
    Ok(Cte {
        name: ident_name(&cte.alias.name),
        columns: None,
        query: Box::new(convert_query(&cte.query)?),
        recursive,
    })
}

fn convert_table_factor(factor: &sql::TableFactor) -> ParseResult<TableSource> {
    match factor {
        sql::TableFactor::Table {
            name,
            alias,
            args: None,
            ..
        } => {
            let alias = match alias {
                Some(a) if !a.columns.is_empty() => return Ok(TableSource::Raw(factor.to_string())),
                Some(a) => Some(ident_name(&a.name)),
                None => None,
            };
            let parts: Vec<String> = name.0.iter().map(ident_name).collect();
            let mut table = match parts.as_slice() {
                [table] => TableRef::new(table),
                [schema, table] => TableRef::new(table).with_schema(schema),
                _ => return Ok(TableSource::Raw(factor.to_string())),
            };
            table.alias = alias;
            Ok(TableSource::Named(table))
        }
        sql::TableFactor::Derived {
            lateral: false,
            subquery,
            alias,
            ..
        } => match alias {
            Some(a) if !a.columns.is_empty() => Ok(TableSource::Raw(factor.to_string())),
            _ => Ok(TableSource::Derived {
                query: Box::new(convert_query(subquery)?),
                alias: alias.as_ref().map(|a| ident_name(&a.name)),
            }),
        },
        other => Ok(TableSource::Raw(other.to_string())),
    }
}

fn convert_join(join: &sql::Join) -> ParseResult<Join> {
    let (join_type, constraint) = match &join.join_operator {
        sql::JoinOperator::Inner(c) => (JoinType::Inner, Some(c)),
        sql::JoinOperator::LeftOuter(c) => (JoinType::Left, Some(c)),
        sql::JoinOperator::RightOuter(c) => (JoinType::Right, Some(c)),
        sql::JoinOperator::FullOuter(c) => (JoinType::Full, Some(c)),
        sql::JoinOperator::CrossJoin { .. } => (JoinType::Cross, None),
        _ => return Err(ParseError::Unsupported(join.to_string())),
    };

    let on = match constraint {
        None | Some(sql::JoinConstraint::None) => None,
        Some(sql::JoinConstraint::On(expr)) => Some(convert_expr(expr)?),
        Some(_) => return Err(ParseError::Unsupported(join.to_string())),
    };

    Ok(Join {
        join_type,
        table: convert_table_factor(&join.relation)?,
        on,
    })
}

fn convert_order_by(order: &sql::OrderByExpr) -> ParseResult<OrderByExpr> {
    Ok(OrderByExpr {
        expr: convert_expr(&order.expr)?,
        dir: order
            .asc
            .map(|asc| if asc { SortDir::Asc } else { SortDir::Desc }),
        nulls: order.nulls_first.map(|first| {
            if first {
                NullsOrder::First
            } else {
                NullsOrder::Last
            }
        }),
    })
}

fn convert_count(expr: &sql::Expr) -> ParseResult<u64> {
    match expr {
        sql::Expr::Value(sql::Value::Number(n, _)) => n
            .parse::<u64>()
            .map_err(|_| ParseError::Unsupported(format!("row count {}", n))),
        other => Err(ParseError::Unsupported(format!("row count {}", other))),
    }
}

// =============================================================================
// Expressions
// =============================================================================

/// Convert a parsed expression.
pub fn convert_expr(expr: &sql::Expr) -> ParseResult<Expr> {
    let converted = match expr {
        sql::Expr::Identifier(ident) => Expr::Column {
            table: None,
            column: ident_name(ident),
        },

        sql::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [table, column] => Expr::Column {
                table: Some(ident_name(table)),
                column: ident_name(column),
            },
            _ => raw(expr),
        },

        sql::Expr::Value(value) => convert_value(value).unwrap_or_else(|| raw(expr)),

        sql::Expr::TypedString {
            data_type: sql::DataType::Date,
            ..
        } => date_literal(&expr.to_string()).unwrap_or_else(|| raw(expr)),

        sql::Expr::BinaryOp { left, op, right } => match convert_binary_op(op) {
            Some(op) => Expr::BinaryOp {
                left: Box::new(convert_expr(left)?),
                op,
                right: Box::new(convert_expr(right)?),
            },
            None => raw(expr),
        },

        sql::Expr::UnaryOp { op, expr: inner } => {
            let op = match op {
                sql::UnaryOperator::Not => UnaryOperator::Not,
                sql::UnaryOperator::Minus => UnaryOperator::Minus,
                _ => return Ok(raw(expr)),
            };
            Expr::UnaryOp {
                op,
                expr: Box::new(convert_expr(inner)?),
            }
        }

        sql::Expr::Nested(inner) => Expr::Paren(Box::new(convert_expr(inner)?)),

        sql::Expr::IsNull(inner) => is_null(inner, false)?,
        sql::Expr::IsNotNull(inner) => is_null(inner, true)?,
        sql::Expr::IsTrue(inner) => is_bool(inner, true, false)?,
        sql::Expr::IsNotTrue(inner) => is_bool(inner, true, true)?,
        sql::Expr::IsFalse(inner) => is_bool(inner, false, false)?,
        sql::Expr::IsNotFalse(inner) => is_bool(inner, false, true)?,

        sql::Expr::InList {
            expr: inner,
            list,
            negated,
        } => Expr::In {
            expr: Box::new(convert_expr(inner)?),
            values: list.iter().map(convert_expr).collect::<ParseResult<Vec<_>>>()?,
            negated: *negated,
        },

        sql::Expr::InSubquery {
            expr: inner,
            subquery,
            negated,
        } => Expr::InSubquery {
            expr: Box::new(convert_expr(inner)?),
            subquery: Box::new(convert_query(subquery)?),
            negated: *negated,
        },

        sql::Expr::Between {
            expr: inner,
            negated,
            low,
            high,
        } => Expr::Between {
            expr: Box::new(convert_expr(inner)?),
            low: Box::new(convert_expr(low)?),
            high: Box::new(convert_expr(high)?),
            negated: *negated,
        },

        sql::Expr::Like {
            negated,
            expr: inner,
            pattern,
            escape_char: None,
            ..
        } => Expr::BinaryOp {
            left: Box::new(convert_expr(inner)?),
            op: if *negated {
                BinaryOperator::NotLike
            } else {
                BinaryOperator::Like
            },
            right: Box::new(convert_expr(pattern)?),
        },

        sql::Expr::ILike {
            negated,
            expr: inner,
            pattern,
            escape_char: None,
            ..
        } => Expr::BinaryOp {
            left: Box::new(convert_expr(inner)?),
            op: if *negated {
                BinaryOperator::NotILike
            } else {
                BinaryOperator::ILike
            },
            right: Box::new(convert_expr(pattern)?),
        },

        sql::Expr::Cast {
            kind: sql::CastKind::Cast | sql::CastKind::DoubleColon,
            expr: inner,
            data_type,
            format: None,
            ..
        } => Expr::Cast {
            expr: Box::new(convert_expr(inner)?),
            data_type: data_type.to_string(),
        },

        sql::Expr::Interval(interval) => {
            match (
                interval.value.as_ref(),
                &interval.leading_field,
                &interval.last_field,
            ) {
                (sql::Expr::Value(sql::Value::SingleQuotedString(text)), None, None) => {
                    Expr::Interval(text.clone())
                }
                _ => raw(expr),
            }
        }

        sql::Expr::Function(function) => convert_function(function, expr)?,

        sql::Expr::Case {
            operand,
            conditions,
            results,
            else_result,
            ..
        } => Expr::Case {
            operand: match operand {
                Some(op) => Some(Box::new(convert_expr(op)?)),
                None => None,
            },
            when_clauses: conditions
                .iter()
                .zip(results.iter())
                .map(|(when, then)| Ok((convert_expr(when)?, convert_expr(then)?)))
                .collect::<ParseResult<Vec<_>>>()?,
            else_clause: match else_result {
                Some(e) => Some(Box::new(convert_expr(e)?)),
                None => None,
            },
        },

        sql::Expr::Exists { subquery, negated } => Expr::Exists {
            subquery: Box::new(convert_query(subquery)?),
            negated: *negated,
        },

        sql::Expr::Subquery(query) => Expr::Subquery(Box::new(convert_query(query)?)),

        _ => raw(expr),
    };
    Ok(converted)
}

fn convert_function(function: &sql::Function, whole: &sql::Expr) -> ParseResult<Expr> {
    let plain_call = function.over.is_none()
        && function.filter.is_none()
        && function.null_treatment.is_none()
        && function.within_group.is_empty()
        && matches!(function.parameters, sql::FunctionArguments::None);
    if !plain_call {
        return Ok(raw(whole));
    }

    // CURRENT_DATE and friends have no argument list at all
    let sql::FunctionArguments::List(list) = &function.args else {
        return Ok(raw(whole));
    };
    if !list.clauses.is_empty() {
        return Ok(raw(whole));
    }

    let mut args = Vec::with_capacity(list.args.len());
    for arg in &list.args {
        match arg {
            sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Expr(e)) => args.push(convert_expr(e)?),
            sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Wildcard) => {
                args.push(Expr::Star { table: None })
            }
            _ => return Ok(raw(whole)),
        }
    }

    Ok(Expr::Function {
        name: function.name.to_string(),
        args,
        distinct: matches!(
            list.duplicate_treatment,
            Some(sql::DuplicateTreatment::Distinct)
        ),
    })
}

fn convert_value(value: &sql::Value) -> Option<Expr> {
    match value {
        sql::Value::Number(n, _) => Some(match n.parse::<i64>() {
            Ok(i) => Expr::Literal(Literal::Int(i)),
            // keep decimals exactly as written
            Err(_) => Expr::Raw(n.clone()),
        }),
        sql::Value::SingleQuotedString(s) => Some(match params::sentinel_name(s) {
            Some(name) => Expr::Param(name.to_string()),
            None => Expr::Literal(Literal::String(s.clone())),
        }),
        sql::Value::Boolean(b) => Some(Expr::Literal(Literal::Bool(*b))),
        sql::Value::Null => Some(Expr::Literal(Literal::Null)),
        _ => None,
    }
}

fn convert_binary_op(op: &sql::BinaryOperator) -> Option<BinaryOperator> {
    Some(match op {
        sql::BinaryOperator::Plus => BinaryOperator::Plus,
        sql::BinaryOperator::Minus => BinaryOperator::Minus,
        sql::BinaryOperator::Multiply => BinaryOperator::Mul,
        sql::BinaryOperator::Divide => BinaryOperator::Div,
        sql::BinaryOperator::Modulo => BinaryOperator::Mod,
        sql::BinaryOperator::StringConcat => BinaryOperator::Concat,
        sql::BinaryOperator::Gt => BinaryOperator::Gt,
        sql::BinaryOperator::Lt => BinaryOperator::Lt,
        sql::BinaryOperator::GtEq => BinaryOperator::Gte,
        sql::BinaryOperator::LtEq => BinaryOperator::Lte,
        sql::BinaryOperator::Eq => BinaryOperator::Eq,
        sql::BinaryOperator::NotEq => BinaryOperator::Ne,
        sql::BinaryOperator::And => BinaryOperator::And,
        sql::BinaryOperator::Or => BinaryOperator::Or,
        _ => return None,
    })
}

fn is_null(inner: &sql::Expr, negated: bool) -> ParseResult<Expr> {
    Ok(Expr::IsNull {
        expr: Box::new(convert_expr(inner)?),
        negated,
    })
}

fn is_bool(inner: &sql::Expr, value: bool, negated: bool) -> ParseResult<Expr> {
    Ok(Expr::IsBool {
        expr: Box::new(convert_expr(inner)?),
        value,
        negated,
    })
}

/// `DATE 'YYYY-MM-DD'` as rendered by sqlparser.
fn date_literal(text: &str) -> Option<Expr> {
    let inner = text.strip_prefix("DATE '")?.strip_suffix('\'')?;
    NaiveDate::parse_from_str(inner, "%Y-%m-%d")
        .ok()
        .map(|d| Expr::Literal(Literal::Date(d)))
}

/// Unquoted identifiers fold to lower case, as PostgreSQL does.
fn ident_name(ident: &sql::Ident) -> String {
    if ident.quote_style.is_some() {
        ident.value.clone()
    } else {
        ident.value.to_lowercase()
    }
}

fn raw(expr: &sql::Expr) -> Expr {
    Expr::Raw(expr.to_string())
}
