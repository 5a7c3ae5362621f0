use std::fmt;

use super::token::TokenKind;

/// Failure to tokenize or parse a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub sql: String,
    pub offset: usize,
    pub expected: Vec<String>,
    pub message: Option<String>,
}

impl ParseError {
    pub(crate) fn illegal_token(sql: &str, offset: usize, expected: &[TokenKind]) -> Self {
        Self {
            sql: sql.to_string(),
            offset,
            expected: expected.iter().map(ToString::to_string).collect(),
            message: None,
        }
    }

    pub(crate) fn structural(sql: &str, offset: usize, message: impl Into<String>) -> Self {
        Self {
            sql: sql.to_string(),
            offset,
            expected: Vec::new(),
            message: Some(message.into()),
        }
    }

    /// Up to 20 characters of the SQL starting at the failing offset.
    #[must_use]
    pub fn fragment(&self) -> &str {
        let start = self.offset.min(self.sql.len());
        let mut end = (start + 20).min(self.sql.len());
        while !self.sql.is_char_boundary(end) {
            end -= 1;
        }
        &self.sql[start..end]
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{message} at offset {}", self.offset)?,
            None => write!(
                f,
                "illegal token at offset {} ({:?}), expected: [{}]",
                self.offset,
                self.fragment(),
                self.expected.join(", ")
            )?,
        }
        write!(f, " in: {}", self.sql)
    }
}

impl std::error::Error for ParseError {}
