//! Date layouts: Java-style `dateFormat` patterns converted to chrono strftime.

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::DatastoreError;
use crate::types::RowValues;

/// Convert a Java `SimpleDateFormat` pattern (`yyyy-MM-dd HH:mm:ss.SSS`) to a
/// chrono format string. Quoted text (`'T'`) is kept literally.
#[must_use]
pub fn convert_date_format(java: &str) -> String {
    let chars: Vec<char> = java.chars().collect();
    let mut out = String::with_capacity(java.len() * 2);
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        if ch == '\'' {
            idx += 1;
            if chars.get(idx) == Some(&'\'') {
                out.push('\'');
                idx += 1;
                continue;
            }
            while idx < chars.len() && chars[idx] != '\'' {
                push_literal(&mut out, chars[idx]);
                idx += 1;
            }
            idx += 1;
            continue;
        }
        let run = chars[idx..].iter().take_while(|c| **c == ch).count();
        idx += run;
        let spec = match (ch, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', _) => "%d",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', 1) => "%-M",
            ('m', _) => "%M",
            ('s', 1) => "%-S",
            ('s', _) => "%S",
            ('S', 1..=3) => "%3f",
            ('S', 4..=6) => "%6f",
            ('S', _) => "%9f",
            ('a', _) => "%p",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('Z', _) => "%z",
            ('X', 1..=2) => "%z",
            ('X', _) => "%:z",
            _ => {
                for _ in 0..run {
                    push_literal(&mut out, ch);
                }
                continue;
            }
        };
        out.push_str(spec);
    }
    out
}

fn push_literal(out: &mut String, ch: char) {
    if ch == '%' {
        out.push_str("%%");
    } else {
        out.push(ch);
    }
}

/// Reject layouts chrono cannot format.
///
/// # Errors
/// Returns `ConfigError` when `layout` contains an invalid specifier.
pub fn validate_layout(layout: &str) -> Result<(), DatastoreError> {
    if StrftimeItems::new(layout).any(|item| matches!(item, Item::Error)) {
        return Err(DatastoreError::ConfigError(format!(
            "invalid date layout {layout}"
        )));
    }
    Ok(())
}

/// Parse `text` with `layout`, accepting date-only layouts (midnight).
///
/// # Errors
/// Returns `BindingError` if `text` does not match `layout`.
pub fn parse_with_layout(text: &str, layout: &str) -> Result<NaiveDateTime, DatastoreError> {
    NaiveDateTime::parse_from_str(text, layout)
        .or_else(|_| NaiveDate::parse_from_str(text, layout).map(|d| d.and_time(Default::default())))
        .map_err(|e| DatastoreError::BindingError(format!("cannot parse {text:?} as {layout}: {e}")))
}

/// Text representation of a timestamp value under `layout`; other values pass through.
#[must_use]
pub fn format_with_layout(value: RowValues, layout: &str) -> RowValues {
    match value {
        RowValues::Timestamp(ts) => RowValues::Text(ts.format(layout).to_string()),
        other => other,
    }
}
