//! Placeholder rewriting between the `?`, `?N` and `$N` forms.

use std::borrow::Cow;

use clap::ValueEnum;
use serde::Deserialize;

/// Placeholder syntax a dialect's driver accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaceholderStyle {
    /// Positional `?` (the form every DML provider and caller writes).
    #[default]
    Question,
    /// `$1`, `$2`, ...
    Dollar,
    /// `?1`, `?2`, ...
    NumberedQuestion,
}

/// Rewrite placeholders into the `target` style.
///
/// Bare `?` placeholders are numbered left to right; already numbered `?N`/`$N`
/// placeholders keep their number and only change sigil. Quoted strings, quoted
/// identifiers, comments and dollar-quoted blocks are copied untouched.
///
/// Returns a borrowed `Cow` when nothing changes.
#[must_use]
pub fn normalize_placeholders(sql: &str, target: PlaceholderStyle) -> Cow<'_, str> {
    if target == PlaceholderStyle::Question {
        return Cow::Borrowed(sql);
    }
    let sigil = if target == PlaceholderStyle::Dollar { '$' } else { '?' };
    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut next_position = 1usize;
    let mut idx = 0;

    while idx < bytes.len() {
        if let Some(end) = skip_literal(bytes, idx) {
            idx = end;
            continue;
        }
        let placeholder = match bytes[idx] {
            b'?' => true,
            b'$' => sigil == '?' && bytes.get(idx + 1).is_some_and(u8::is_ascii_digit),
            _ => false,
        };
        if !placeholder {
            idx += 1;
            continue;
        }
        let digits_end = skip_digits(bytes, idx + 1);
        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 8));
        buf.push_str(&sql[copied..idx]);
        buf.push(sigil);
        if digits_end > idx + 1 {
            buf.push_str(&sql[idx + 1..digits_end]);
        } else {
            buf.push_str(&next_position.to_string());
            next_position += 1;
        }
        idx = digits_end;
        copied = idx;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}

fn skip_digits(bytes: &[u8], start: usize) -> usize {
    start
        + bytes[start.min(bytes.len())..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
}

/// End (exclusive) of the quoted string, identifier, comment or dollar-quoted
/// block starting at `start`, or `None` when none starts there. Unterminated
/// ones run to the end of the input.
fn skip_literal(bytes: &[u8], start: usize) -> Option<usize> {
    let next = bytes.get(start + 1).copied();
    match bytes[start] {
        quote @ (b'\'' | b'"' | b'`') => Some(closing_quote(bytes, start, quote)),
        b'-' if next == Some(b'-') => Some(
            bytes[start..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |offset| start + offset + 1),
        ),
        b'/' if next == Some(b'*') => Some(block_comment_end(bytes, start)),
        b'$' => dollar_quote_end(bytes, start),
        _ => None,
    }
}

// doubled quote characters are escapes
fn closing_quote(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut idx = start + 1;
    while idx < bytes.len() {
        if bytes[idx] == quote {
            if bytes.get(idx + 1) == Some(&quote) {
                idx += 2;
                continue;
            }
            return idx + 1;
        }
        idx += 1;
    }
    bytes.len()
}

fn block_comment_end(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0u32;
    let mut idx = start;
    while idx + 1 < bytes.len() {
        match (bytes[idx], bytes[idx + 1]) {
            (b'/', b'*') => {
                depth += 1;
                idx += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                idx += 2;
                if depth == 0 {
                    return idx;
                }
            }
            _ => idx += 1,
        }
    }
    bytes.len()
}

fn dollar_quote_end(bytes: &[u8], start: usize) -> Option<usize> {
    let tag_len = bytes[start + 1..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();
    let tag_end = start + 1 + tag_len;
    if bytes.get(tag_end) != Some(&b'$') || bytes.get(start + 1).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    let delimiter = &bytes[start..=tag_end];
    let body = tag_end + 1;
    Some(
        bytes[body..]
            .windows(delimiter.len())
            .position(|window| window == delimiter)
            .map_or(bytes.len(), |offset| body + offset + delimiter.len()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_bare_placeholders_as_dollars() {
        let sql = "select * from t where a = ? and b = ?";
        let res = normalize_placeholders(sql, PlaceholderStyle::Dollar);
        assert_eq!(res, "select * from t where a = $1 and b = $2");
    }

    #[test]
    fn numbers_bare_placeholders_as_questions() {
        let sql = "insert into t values(?, ?)";
        let res = normalize_placeholders(sql, PlaceholderStyle::NumberedQuestion);
        assert_eq!(res, "insert into t values(?1, ?2)");
    }

    #[test]
    fn numbered_placeholders_keep_their_number() {
        let res = normalize_placeholders("a = $1 and b = $2", PlaceholderStyle::NumberedQuestion);
        assert_eq!(res, "a = ?1 and b = ?2");
        let res = normalize_placeholders("a = ?2 and b = ?1", PlaceholderStyle::Dollar);
        assert_eq!(res, "a = $2 and b = $1");
    }

    #[test]
    fn literals_and_comments_are_left_alone() {
        let sql = "select 'it''s ?', `a?` -- ?\n/* ? /* ? */ */ from t where a = ?";
        let res = normalize_placeholders(sql, PlaceholderStyle::Dollar);
        assert_eq!(
            res,
            "select 'it''s ?', `a?` -- ?\n/* ? /* ? */ */ from t where a = $1"
        );
    }

    #[test]
    fn dollar_quoted_blocks_are_left_alone() {
        let sql = "$fn$ select ? from t $fn$ where a = ?";
        let res = normalize_placeholders(sql, PlaceholderStyle::Dollar);
        assert_eq!(res, "$fn$ select ? from t $fn$ where a = $1");
    }

    #[test]
    fn question_style_borrows() {
        let res = normalize_placeholders("select * from t where a = ?", PlaceholderStyle::Question);
        assert!(matches!(res, Cow::Borrowed(_)));
        let res = normalize_placeholders("select 1", PlaceholderStyle::Dollar);
        assert!(matches!(res, Cow::Borrowed(_)));
    }

    #[test]
    fn multibyte_text_survives() {
        let sql = "update t set name = 'héllo', note = ? where id = ?";
        let res = normalize_placeholders(sql, PlaceholderStyle::NumberedQuestion);
        assert_eq!(res, "update t set name = 'héllo', note = ?1 where id = ?2");
    }
}
