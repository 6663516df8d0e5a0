//! Output tokens for compiled and normalized SQL.
//!
//! Keywords and operators have fixed text. Identifiers, literals, bind
//! parameters and casts are rendered by the [`SqlDialect`].

use super::dialect::SqlDialect;

/// One element of rendered SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    On,
    Join,
    Inner,
    Left,
    Right,
    Full,
    Outer,
    Cross,
    GroupBy,
    Having,
    OrderBy,
    Asc,
    Desc,
    NullsFirst,
    NullsLast,
    Case,
    When,
    Then,
    Else,
    End,
    In,
    Between,
    Like,
    ILike,
    Is,
    IsNull,
    IsNotNull,
    Exists,
    Distinct,
    All,
    Union,
    Intersect,
    Except,
    With,
    Recursive,
    Interval,
    True,
    False,
    Limit,
    Offset,

    // === Punctuation ===
    Comma,
    Dot,
    Star,
    LParen,
    RParen,

    // === Operators ===
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Concat,

    // === Whitespace / Formatting ===
    Space,
    Newline,
    Indent(usize),

    // === Dynamic Content ===
    /// Simple identifier (table, column, alias)
    Ident(String),
    /// Qualified identifier: schema.table or just table
    QualifiedIdent {
        schema: Option<String>,
        name: String,
    },
    /// Integer literal
    LitInt(i64),
    /// Float literal
    LitFloat(f64),
    /// String literal
    LitString(String),
    /// Boolean literal
    LitBool(bool),
    /// NULL literal
    LitNull,
    /// Calendar date literal, `YYYY-MM-DD`
    LitDate(String),
    /// Named bind parameter
    Param(String),
    /// Cast of the preceding operand to a type
    CastTo(String),

    /// Function name, rendered upper-case.
    FunctionName(String),

    // === Escape Hatch ===
    /// Raw SQL passed directly to output without escaping.
    ///
    /// # Security Warning
    ///
    /// **Never pass user input to this variant.** Raw text is only produced from
    /// trusted static fragments or from nodes that were already accepted by the
    /// safety gate's parser and re-rendered by it.
    Raw(String),
}

impl Token {
    /// Fixed text for keywords, punctuation and operators.
    ///
    /// Returns `None` for tokens whose rendering depends on the dialect or
    /// carries a value.
    pub fn fixed_text(&self) -> Option<&'static str> {
        let text = match self {
            Token::Select => "SELECT",
            Token::From => "FROM",
            Token::Where => "WHERE",
            Token::And => "AND",
            Token::Or => "OR",
            Token::Not => "NOT",
            Token::As => "AS",
            Token::On => "ON",
            Token::Join => "JOIN",
            Token::Inner => "INNER",
            Token::Left => "LEFT",
            Token::Right => "RIGHT",
            Token::Full => "FULL",
            Token::Outer => "OUTER",
            Token::Cross => "CROSS",
            Token::GroupBy => "GROUP BY",
            Token::Having => "HAVING",
            Token::OrderBy => "ORDER BY",
            Token::Asc => "ASC",
            Token::Desc => "DESC",
            Token::NullsFirst => "NULLS FIRST",
            Token::NullsLast => "NULLS LAST",
            Token::Case => "CASE",
            Token::When => "WHEN",
            Token::Then => "THEN",
            Token::Else => "ELSE",
            Token::End => "END",
            Token::In => "IN",
            Token::Between => "BETWEEN",
            Token::Like => "LIKE",
            Token::ILike => "ILIKE",
            Token::Is => "IS",
            Token::IsNull => "IS NULL",
            Token::IsNotNull => "IS NOT NULL",
            Token::Exists => "EXISTS",
            Token::Distinct => "DISTINCT",
            Token::All => "ALL",
            Token::Union => "UNION",
            Token::Intersect => "INTERSECT",
            Token::Except => "EXCEPT",
            Token::With => "WITH",
            Token::Recursive => "RECURSIVE",
            Token::Interval => "INTERVAL",
            Token::True => "TRUE",
            Token::False => "FALSE",
            Token::Limit => "LIMIT",
            Token::Offset => "OFFSET",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Star => "*",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Eq => "=",
            Token::Ne => "<>",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Lte => "<=",
            Token::Gte => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Mul => "*",
            Token::Div => "/",
            Token::Mod => "%",
            Token::Space => " ",
            Token::Newline => "\n",
            Token::LitNull => "NULL",
            _ => return None,
        };
        Some(text)
    }

    /// Append this token's SQL text for `dialect` to `out`.
    pub fn write_to(&self, out: &mut String, dialect: &dyn SqlDialect) {
        if let Some(text) = self.fixed_text() {
            out.push_str(text);
            return;
        }
        match self {
            Token::Concat => out.push_str(dialect.concat_operator()),
            Token::Indent(depth) => {
                for _ in 0..*depth {
                    out.push_str("  ");
                }
            }
            Token::Ident(name) => out.push_str(&dialect.quote_identifier(name)),
            Token::QualifiedIdent { schema, name } => {
                if let Some(schema) = schema {
                    out.push_str(&dialect.quote_identifier(schema));
                    out.push('.');
                }
                out.push_str(&dialect.quote_identifier(name));
            }
            Token::LitInt(n) => out.push_str(&n.to_string()),
            // NaN and infinities have no literal form
            Token::LitFloat(f) if !f.is_finite() => out.push_str("NULL"),
            Token::LitFloat(f) => out.push_str(ryu::Buffer::new().format(*f)),
            Token::LitString(s) => out.push_str(&dialect.quote_string(s)),
            Token::LitBool(b) => out.push_str(dialect.format_bool(*b)),
            Token::LitDate(d) => out.push_str(&dialect.format_date_literal(d)),
            Token::Param(name) => out.push_str(&dialect.placeholder(name)),
            Token::CastTo(data_type) => out.push_str(&dialect.cast_suffix(data_type)),
            Token::FunctionName(name) => out.push_str(&name.to_uppercase()),
            Token::Raw(sql) => out.push_str(sql),
            _ => {}
        }
    }

    /// Serialize this token on its own.
    pub fn serialize(&self, dialect: &dyn SqlDialect) -> String {
        let mut out = String::new();
        self.write_to(&mut out, dialect);
        out
    }
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    /// Render the whole stream into one SQL string.
    pub fn serialize(&self, dialect: &dyn SqlDialect) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            token.write_to(&mut out, dialect);
        }
        out
    }

    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn indent(&mut self, n: usize) -> &mut Self {
        self.push(Token::Indent(n))
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}
