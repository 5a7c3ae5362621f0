//! Matcher based tokenizer.
//!
//! The parser asks for the set of token kinds acceptable at the current position;
//! the [`Tokenizer`] tries the matching matchers in fixed priority order (see
//! [`TokenKind`]) and returns the first hit, or a [`ParseError`] carrying the offset
//! and the expected set.

use super::error::ParseError;
use super::token::{Keyword, Token, TokenKind, ValueToken};

const OPERATORS: [&str; 7] = [">=", "<=", "<>", "!=", "=", ">", "<"];

pub struct Tokenizer<'a> {
    sql: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    #[must_use]
    pub fn new(sql: &'a str) -> Self {
        Self { sql, pos: 0 }
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn sql(&self) -> &'a str {
        self.sql
    }

    fn bytes(&self) -> &'a [u8] {
        self.sql.as_bytes()
    }

    fn skip_whitespace(&mut self) {
        if let Some(len) = match_whitespace(self.bytes(), self.pos) {
            self.pos += len;
        }
    }

    /// Consume the highest priority token among `expected`.
    ///
    /// # Errors
    /// Returns a [`ParseError`] with the current offset when nothing in `expected` matches.
    pub fn next(&mut self, expected: &[TokenKind]) -> Result<Token, ParseError> {
        match self.peek(expected) {
            Some(token) => {
                self.pos = token.end;
                Ok(token)
            }
            None => {
                if !expected.contains(&TokenKind::Whitespace) {
                    self.skip_whitespace();
                }
                Err(ParseError::illegal_token(self.sql, self.pos, expected))
            }
        }
    }

    /// Match without consuming.
    #[must_use]
    pub fn peek(&self, expected: &[TokenKind]) -> Option<Token> {
        let mut start = self.pos;
        if !expected.contains(&TokenKind::Whitespace)
            && let Some(len) = match_whitespace(self.bytes(), start)
        {
            start += len;
        }
        let mut candidates = expected.to_vec();
        candidates.sort_by_key(|kind| kind.priority());
        candidates
            .into_iter()
            .find_map(|kind| self.try_match(kind, start))
    }

    /// Consume `expected` if it is next, otherwise leave the position untouched.
    pub fn accept(&mut self, expected: &[TokenKind]) -> Option<Token> {
        let token = self.peek(expected)?;
        self.pos = token.end;
        Some(token)
    }

    fn try_match(&self, kind: TokenKind, start: usize) -> Option<Token> {
        let bytes = self.bytes();
        match kind {
            TokenKind::Eof => (start >= bytes.len()).then(|| Token::new(kind, "", start)),
            TokenKind::Whitespace => match_whitespace(bytes, start)
                .map(|len| Token::new(kind, &self.sql[start..start + len], start)),
            TokenKind::Operator => OPERATORS
                .iter()
                .find(|op| bytes[start.min(bytes.len())..].starts_with(op.as_bytes()))
                .map(|op| Token::new(kind, op, start)),
            TokenKind::Comma => match_char(bytes, start, b',').then(|| Token::new(kind, ",", start)),
            TokenKind::OpenParen => {
                match_char(bytes, start, b'(').then(|| Token::new(kind, "(", start))
            }
            TokenKind::CloseParen => {
                match_char(bytes, start, b')').then(|| Token::new(kind, ")", start))
            }
            TokenKind::Star => match_char(bytes, start, b'*').then(|| Token::new(kind, "*", start)),
            TokenKind::Keyword(keyword) => match_keyword(bytes, start, keyword)
                .map(|len| Token::new(kind, &self.sql[start..start + len], start)),
            TokenKind::Identifier => self.match_identifier(start),
            TokenKind::Value => match_value(self.sql, start).map(|(len, value)| {
                Token::new(kind, &self.sql[start..start + len], start).with_values(vec![value])
            }),
            TokenKind::ValueList => self.match_value_list(start),
            TokenKind::Expression => {
                let end = find_closing_paren(bytes, start)?;
                Some(Token::new(kind, &self.sql[start + 1..end], start).ending_at(end + 1))
            }
        }
    }

    fn match_identifier(&self, start: usize) -> Option<Token> {
        let bytes = self.bytes();
        let first = *bytes.get(start)?;
        if first == b'`' || first == b'"' {
            let close = bytes[start + 1..].iter().position(|b| *b == first)? + start + 1;
            if close == start + 1 {
                return None;
            }
            return Some(
                Token::new(TokenKind::Identifier, &self.sql[start + 1..close], start)
                    .ending_at(close + 1),
            );
        }
        let len = bytes[start..]
            .iter()
            .take_while(|b| is_identifier_byte(**b))
            .count();
        let word = &self.sql[start..start + len];
        // bare grammar keywords need quoting to be used as names
        if len == 0 || Keyword::lookup(word).is_some() {
            return None;
        }
        Some(Token::new(TokenKind::Identifier, word, start))
    }

    fn match_value_list(&self, start: usize) -> Option<Token> {
        let bytes = self.bytes();
        let end = find_closing_paren(bytes, start)?;
        let mut values = Vec::new();
        let mut pos = start + 1;
        loop {
            pos += match_whitespace(bytes, pos).unwrap_or(0);
            let (len, value) = match_value(self.sql, pos)?;
            if pos + len > end {
                return None;
            }
            values.push(value);
            pos += len;
            pos += match_whitespace(bytes, pos).unwrap_or(0);
            if pos == end {
                break;
            }
            if !match_char(bytes, pos, b',') {
                return None;
            }
            pos += 1;
        }
        Some(Token::new(TokenKind::ValueList, &self.sql[start..=end], start).with_values(values))
    }
}

fn match_whitespace(bytes: &[u8], start: usize) -> Option<usize> {
    let len = bytes
        .get(start..)?
        .iter()
        .take_while(|b| b.is_ascii_whitespace())
        .count();
    (len > 0).then_some(len)
}

fn match_char(bytes: &[u8], start: usize, expected: u8) -> bool {
    bytes.get(start) == Some(&expected)
}

pub(crate) fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.'
}

fn match_keyword(bytes: &[u8], start: usize, keyword: Keyword) -> Option<usize> {
    let word = keyword.as_str().as_bytes();
    let candidate = bytes.get(start..start + word.len())?;
    if !candidate.eq_ignore_ascii_case(word) {
        return None;
    }
    match bytes.get(start + word.len()) {
        Some(b) if is_identifier_byte(*b) => None,
        _ => Some(word.len()),
    }
}

/// Match a single value: `?`, a single-quoted string (`\'` and `''` escapes), or an
/// unquoted run terminated by `,`, whitespace, or `)`.
fn match_value(sql: &str, start: usize) -> Option<(usize, ValueToken)> {
    let bytes = sql.as_bytes();
    match bytes.get(start)? {
        b'?' => Some((1, ValueToken::Placeholder)),
        b'\'' => {
            let mut out = String::new();
            let mut chars = sql[start + 1..].char_indices().peekable();
            while let Some((idx, ch)) = chars.next() {
                match ch {
                    '\\' if matches!(chars.peek(), Some((_, '\''))) => {
                        out.push('\'');
                        chars.next();
                    }
                    '\'' if matches!(chars.peek(), Some((_, '\''))) => {
                        out.push('\'');
                        chars.next();
                    }
                    '\'' => return Some((idx + 2, ValueToken::Quoted(out))),
                    other => out.push(other),
                }
            }
            None
        }
        b',' | b')' | b'(' => None,
        _ => {
            let len = bytes[start..]
                .iter()
                .take_while(|b| !(**b == b',' || **b == b')' || b.is_ascii_whitespace()))
                .count();
            (len > 0).then(|| (len, ValueToken::Bare(sql[start..start + len].to_string())))
        }
    }
}

/// Index of the `)` balancing the `(` at `start`, skipping quoted text.
pub(crate) fn find_closing_paren(bytes: &[u8], start: usize) -> Option<usize> {
    if bytes.get(start) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut idx = start;
    while idx < bytes.len() {
        let b = bytes[idx];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    idx += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(idx);
                    }
                }
                _ => {}
            },
        }
        idx += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_need_a_boundary() {
        let tokenizer = Tokenizer::new("from_date");
        assert!(
            tokenizer
                .peek(&[TokenKind::Keyword(Keyword::From)])
                .is_none()
        );
        let token = tokenizer
            .peek(&[TokenKind::Keyword(Keyword::From), TokenKind::Identifier])
            .unwrap();
        assert_eq!(token.kind, TokenKind::Identifier);
        assert_eq!(token.text, "from_date");
    }

    #[test]
    fn priority_prefers_keywords_over_identifiers() {
        let mut tokenizer = Tokenizer::new("  select id");
        let token = tokenizer
            .next(&[TokenKind::Identifier, TokenKind::Keyword(Keyword::Select)])
            .unwrap();
        assert_eq!(token.kind, TokenKind::Keyword(Keyword::Select));
        assert_eq!(token.offset, 2);
        let token = tokenizer.next(&[TokenKind::Identifier]).unwrap();
        assert_eq!(token.text, "id");
        assert!(tokenizer.next(&[TokenKind::Eof]).is_ok());
    }

    #[test]
    fn operators_match_longest_first() {
        let tokenizer = Tokenizer::new(">= 3");
        assert_eq!(tokenizer.peek(&[TokenKind::Operator]).unwrap().text, ">=");
        let tokenizer = Tokenizer::new("<>3");
        assert_eq!(tokenizer.peek(&[TokenKind::Operator]).unwrap().text, "<>");
    }

    #[test]
    fn quoted_values_handle_escapes() {
        let mut tokenizer = Tokenizer::new(r"'it\'s' 'a''b'");
        let first = tokenizer.next(&[TokenKind::Value]).unwrap();
        assert_eq!(first.values, vec![ValueToken::Quoted("it's".into())]);
        let second = tokenizer.next(&[TokenKind::Value]).unwrap();
        assert_eq!(second.values, vec![ValueToken::Quoted("a'b".into())]);
    }

    #[test]
    fn value_lists_split_on_commas() {
        let mut tokenizer = Tokenizer::new("(1, 'x,y', ?) tail");
        let token = tokenizer.next(&[TokenKind::ValueList]).unwrap();
        assert_eq!(
            token.values,
            vec![
                ValueToken::Bare("1".into()),
                ValueToken::Quoted("x,y".into()),
                ValueToken::Placeholder
            ]
        );
        assert_eq!(tokenizer.next(&[TokenKind::Identifier]).unwrap().text, "tail");
    }

    #[test]
    fn expressions_are_balanced() {
        let mut tokenizer = Tokenizer::new("(a, (b)) x");
        let token = tokenizer.next(&[TokenKind::Expression]).unwrap();
        assert_eq!(token.text, "a, (b)");
        assert_eq!(tokenizer.offset(), 8);
    }

    #[test]
    fn unbalanced_expression_is_an_error_with_offset() {
        let mut tokenizer = Tokenizer::new("x (a, b");
        tokenizer.next(&[TokenKind::Identifier]).unwrap();
        let err = tokenizer.next(&[TokenKind::Expression]).unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.expected, vec!["expression".to_string()]);
    }

    #[test]
    fn quoted_identifiers_are_unwrapped() {
        let mut tokenizer = Tokenizer::new("`order` x");
        let token = tokenizer.next(&[TokenKind::Identifier]).unwrap();
        assert_eq!(token.text, "order");
        assert_eq!(tokenizer.next(&[TokenKind::Identifier]).unwrap().text, "x");
    }
}
