//! Token kinds recognized by the restricted SQL grammar.

use std::fmt;

/// Reserved words understood by the parser (matched case-insensitively).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Select,
    From,
    Where,
    Group,
    By,
    As,
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    And,
    Or,
    Not,
    In,
    Like,
    Is,
    Null,
    Between,
}

impl Keyword {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Select => "SELECT",
            Keyword::From => "FROM",
            Keyword::Where => "WHERE",
            Keyword::Group => "GROUP",
            Keyword::By => "BY",
            Keyword::As => "AS",
            Keyword::Insert => "INSERT",
            Keyword::Into => "INTO",
            Keyword::Values => "VALUES",
            Keyword::Update => "UPDATE",
            Keyword::Set => "SET",
            Keyword::Delete => "DELETE",
            Keyword::And => "AND",
            Keyword::Or => "OR",
            Keyword::Not => "NOT",
            Keyword::In => "IN",
            Keyword::Like => "LIKE",
            Keyword::Is => "IS",
            Keyword::Null => "NULL",
            Keyword::Between => "BETWEEN",
        }
    }

    pub(crate) const ALL: [Keyword; 20] = [
        Keyword::Select,
        Keyword::From,
        Keyword::Where,
        Keyword::Group,
        Keyword::By,
        Keyword::As,
        Keyword::Insert,
        Keyword::Into,
        Keyword::Values,
        Keyword::Update,
        Keyword::Set,
        Keyword::Delete,
        Keyword::And,
        Keyword::Or,
        Keyword::Not,
        Keyword::In,
        Keyword::Like,
        Keyword::Is,
        Keyword::Null,
        Keyword::Between,
    ];

    /// Case-insensitive lookup of a bare word.
    #[must_use]
    pub fn lookup(word: &str) -> Option<Keyword> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(word))
    }
}

/// What the tokenizer is asked to match at a given position.
///
/// The tokenizer tries matchers in the declaration order of this enum, so `Eof`
/// has the highest priority and `Expression` the lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Whitespace,
    Operator,
    Comma,
    OpenParen,
    CloseParen,
    Star,
    Keyword(Keyword),
    Identifier,
    Value,
    ValueList,
    Expression,
}

impl TokenKind {
    pub(crate) fn priority(self) -> u8 {
        match self {
            TokenKind::Eof => 0,
            TokenKind::Whitespace => 1,
            TokenKind::Operator => 2,
            TokenKind::Comma => 3,
            TokenKind::OpenParen => 4,
            TokenKind::CloseParen => 5,
            TokenKind::Star => 6,
            TokenKind::Keyword(_) => 7,
            TokenKind::Identifier => 8,
            TokenKind::Value => 9,
            TokenKind::ValueList => 10,
            TokenKind::Expression => 11,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Eof => f.write_str("EOF"),
            TokenKind::Whitespace => f.write_str("whitespace"),
            TokenKind::Operator => f.write_str("operator"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::OpenParen => f.write_str("'('"),
            TokenKind::CloseParen => f.write_str("')'"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::Keyword(k) => f.write_str(k.as_str()),
            TokenKind::Identifier => f.write_str("identifier"),
            TokenKind::Value => f.write_str("value"),
            TokenKind::ValueList => f.write_str("value list"),
            TokenKind::Expression => f.write_str("expression"),
        }
    }
}

/// A literal or placeholder as written in the SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueToken {
    /// `?` placeholder, bound positionally at evaluation time.
    Placeholder,
    /// Single-quoted text with escapes removed.
    Quoted(String),
    /// Unquoted literal (number, boolean, `null`, bare word).
    Bare(String),
}

/// A matched token with its byte offset into the SQL text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
    /// Byte offset just past the token.
    pub end: usize,
    /// Decoded values for `Value` and `ValueList` tokens.
    pub values: Vec<ValueToken>,
}

impl Token {
    pub(crate) fn new(kind: TokenKind, text: &str, offset: usize) -> Self {
        Self {
            kind,
            text: text.to_string(),
            offset,
            end: offset + text.len(),
            values: Vec::new(),
        }
    }

    pub(crate) fn ending_at(mut self, end: usize) -> Self {
        self.end = end;
        self
    }

    pub(crate) fn with_values(mut self, values: Vec<ValueToken>) -> Self {
        self.values = values;
        self
    }
}
