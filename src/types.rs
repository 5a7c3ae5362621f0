use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::DatastoreError;

/// Values that can be stored in a datastore row or used as statement parameters.
///
/// The same enum is shared by relational drivers, the file engine, and records:
/// ```rust
/// use datastore_middleware::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Zero value of its kind: `0`, `0.0`, empty text, `false`, empty blob, or NULL.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            RowValues::Int(i) => *i == 0,
            RowValues::Float(f) => *f == 0.0,
            RowValues::Text(s) => s.is_empty(),
            RowValues::Bool(b) => !*b,
            RowValues::Blob(b) => b.is_empty(),
            RowValues::JSON(v) => v.is_null(),
            RowValues::Timestamp(_) => false,
            RowValues::Null => true,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Try "YYYY-MM-DD HH:MM:SS.SSS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Numeric view used by comparisons and aggregates; numeric text is accepted.
    #[must_use]
    pub fn to_number(&self) -> Option<f64> {
        match self {
            RowValues::Int(_) | RowValues::Float(_) => self.as_float(),
            RowValues::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            RowValues::Text(s) => s.trim().parse::<f64>().ok(),
            RowValues::JSON(JsonValue::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    /// Convert a JSON document value into a row value.
    #[must_use]
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => RowValues::Null,
            JsonValue::Bool(b) => RowValues::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    RowValues::Int(i)
                } else {
                    RowValues::Float(n.as_f64().unwrap_or_default())
                }
            }
            JsonValue::String(s) => RowValues::Text(s.clone()),
            other => RowValues::JSON(other.clone()),
        }
    }

    /// Convert into a JSON value for NDJSON encoding.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            RowValues::Text(s) => JsonValue::String(s.clone()),
            RowValues::Bool(b) => JsonValue::Bool(*b),
            RowValues::Timestamp(ts) => JsonValue::String(ts.format(TIMESTAMP_FORMAT).to_string()),
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(v) => v.clone(),
            RowValues::Blob(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    /// Interpret an unquoted SQL or CSV token: integers, floats, booleans, `null`,
    /// anything else stays text.
    #[must_use]
    pub fn parse_literal(token: &str) -> Self {
        if token.eq_ignore_ascii_case("null") {
            return RowValues::Null;
        }
        if token.eq_ignore_ascii_case("true") {
            return RowValues::Bool(true);
        }
        if token.eq_ignore_ascii_case("false") {
            return RowValues::Bool(false);
        }
        if let Ok(i) = token.parse::<i64>() {
            return RowValues::Int(i);
        }
        if token.contains(['.', 'e', 'E'])
            && let Ok(f) = token.parse::<f64>()
            && f.is_finite()
        {
            return RowValues::Float(f);
        }
        RowValues::Text(token.to_string())
    }

    /// Render as an inline SQL literal (used when a strategy cannot bind parameters).
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            RowValues::Int(i) => i.to_string(),
            RowValues::Float(f) => f.to_string(),
            RowValues::Text(s) => quote_literal(s),
            RowValues::Bool(b) => b.to_string(),
            RowValues::Timestamp(ts) => quote_literal(&ts.format(TIMESTAMP_FORMAT).to_string()),
            RowValues::Null => "NULL".to_string(),
            RowValues::JSON(v) => quote_literal(&v.to_string()),
            RowValues::Blob(bytes) => {
                let mut out = String::with_capacity(bytes.len() * 2 + 3);
                out.push_str("X'");
                for b in bytes {
                    out.push_str(&format!("{b:02X}"));
                }
                out.push('\'');
                out
            }
        }
    }

    /// Type tolerant comparison: numbers compare numerically (numeric text included),
    /// timestamps chronologically, everything else by its text form. NULL sorts first.
    #[must_use]
    pub fn compare(&self, other: &RowValues) -> Ordering {
        match (self, other) {
            (RowValues::Null, RowValues::Null) => Ordering::Equal,
            (RowValues::Null, _) => Ordering::Less,
            (_, RowValues::Null) => Ordering::Greater,
            (RowValues::Bool(a), RowValues::Bool(b)) => a.cmp(b),
            (RowValues::Int(a), RowValues::Int(b)) => a.cmp(b),
            (RowValues::Timestamp(a), _) if other.as_timestamp().is_some() => {
                other.as_timestamp().map_or(Ordering::Equal, |b| a.cmp(&b))
            }
            (_, RowValues::Timestamp(b)) if self.as_timestamp().is_some() => {
                self.as_timestamp().map_or(Ordering::Equal, |a| a.cmp(b))
            }
            _ => match (self.to_number(), other.to_number()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => self.to_string().cmp(&other.to_string()),
            },
        }
    }

    /// Equality under [`RowValues::compare`].
    #[must_use]
    pub fn loosely_equals(&self, other: &RowValues) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl fmt::Display for RowValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValues::Int(i) => write!(f, "{i}"),
            RowValues::Float(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{}", *v as i64)
                } else {
                    write!(f, "{v}")
                }
            }
            RowValues::Text(s) => f.write_str(s),
            RowValues::Bool(b) => write!(f, "{b}"),
            RowValues::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            RowValues::Null => f.write_str("null"),
            RowValues::JSON(v) => write!(f, "{v}"),
            RowValues::Blob(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Conversion from a scanned value into a record field type.
///
/// Used by [`crate::table::Record::set_field`] implementations; lossless
/// widening (integer to float, `0`/`1` to bool, text to timestamp) is accepted.
pub trait FromRowValue: Sized {
    /// # Errors
    /// Returns `BindingError` when the value cannot represent `Self`.
    fn from_row_value(value: RowValues) -> Result<Self, DatastoreError>;
}

fn mismatch(value: &RowValues, target: &str) -> DatastoreError {
    DatastoreError::BindingError(format!("cannot convert {value:?} into {target}"))
}

impl FromRowValue for RowValues {
    fn from_row_value(value: RowValues) -> Result<Self, DatastoreError> {
        Ok(value)
    }
}

impl FromRowValue for i64 {
    fn from_row_value(value: RowValues) -> Result<Self, DatastoreError> {
        match &value {
            RowValues::Int(i) => Ok(*i),
            RowValues::Bool(b) => Ok(i64::from(*b)),
            RowValues::Text(s) => s.trim().parse().map_err(|_| mismatch(&value, "i64")),
            #[allow(clippy::cast_possible_truncation)]
            RowValues::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            _ => Err(mismatch(&value, "i64")),
        }
    }
}

impl FromRowValue for i32 {
    fn from_row_value(value: RowValues) -> Result<Self, DatastoreError> {
        let wide = i64::from_row_value(value)?;
        i32::try_from(wide).map_err(|_| mismatch(&RowValues::Int(wide), "i32"))
    }
}

impl FromRowValue for f64 {
    fn from_row_value(value: RowValues) -> Result<Self, DatastoreError> {
        value.to_number().ok_or_else(|| mismatch(&value, "f64"))
    }
}

impl FromRowValue for bool {
    fn from_row_value(value: RowValues) -> Result<Self, DatastoreError> {
        if let Some(b) = value.as_bool() {
            return Ok(*b);
        }
        if let RowValues::Int(i) = value {
            return Ok(i != 0);
        }
        match value.as_text() {
            Some(s) if s.eq_ignore_ascii_case("true") || s == "1" => Ok(true),
            Some(s) if s.eq_ignore_ascii_case("false") || s == "0" => Ok(false),
            _ => Err(mismatch(&value, "bool")),
        }
    }
}

impl FromRowValue for String {
    fn from_row_value(value: RowValues) -> Result<Self, DatastoreError> {
        match value {
            RowValues::Text(s) => Ok(s),
            RowValues::Blob(bytes) => {
                String::from_utf8(bytes).map_err(|e| DatastoreError::BindingError(e.to_string()))
            }
            RowValues::Null => Err(mismatch(&RowValues::Null, "String")),
            other => Ok(other.to_string()),
        }
    }
}

impl FromRowValue for NaiveDateTime {
    fn from_row_value(value: RowValues) -> Result<Self, DatastoreError> {
        value
            .as_timestamp()
            .ok_or_else(|| mismatch(&value, "NaiveDateTime"))
    }
}

impl FromRowValue for Vec<u8> {
    fn from_row_value(value: RowValues) -> Result<Self, DatastoreError> {
        match value {
            RowValues::Blob(bytes) => Ok(bytes),
            RowValues::Text(s) => Ok(s.into_bytes()),
            other => Err(mismatch(&other, "Vec<u8>")),
        }
    }
}

impl FromRowValue for JsonValue {
    fn from_row_value(value: RowValues) -> Result<Self, DatastoreError> {
        match value {
            RowValues::Text(s) => Ok(serde_json::from_str(&s)?),
            other => Ok(other.to_json()),
        }
    }
}

impl<T: FromRowValue> FromRowValue for Option<T> {
    fn from_row_value(value: RowValues) -> Result<Self, DatastoreError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_row_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_parsing() {
        assert_eq!(RowValues::parse_literal("42"), RowValues::Int(42));
        assert_eq!(RowValues::parse_literal("4.5"), RowValues::Float(4.5));
        assert_eq!(RowValues::parse_literal("NULL"), RowValues::Null);
        assert_eq!(RowValues::parse_literal("True"), RowValues::Bool(true));
        assert_eq!(RowValues::parse_literal("abc"), RowValues::Text("abc".into()));
        assert_eq!(RowValues::parse_literal("inf"), RowValues::Text("inf".into()));
    }

    #[test]
    fn comparison_tolerates_text_numbers() {
        assert!(RowValues::Int(3).loosely_equals(&RowValues::Text("3".into())));
        assert_eq!(
            RowValues::Float(2.5).compare(&RowValues::Int(3)),
            Ordering::Less
        );
        assert_eq!(
            RowValues::Text("b".into()).compare(&RowValues::Text("a".into())),
            Ordering::Greater
        );
        assert_eq!(RowValues::Null.compare(&RowValues::Int(0)), Ordering::Less);
    }

    #[test]
    fn sql_literals_escape_quotes() {
        assert_eq!(RowValues::Text("O'Neil".into()).to_sql_literal(), "'O''Neil'");
        assert_eq!(RowValues::Null.to_sql_literal(), "NULL");
        assert_eq!(RowValues::Blob(vec![0xAB, 0x01]).to_sql_literal(), "X'AB01'");
    }

    #[test]
    fn field_conversions_widen_losslessly() {
        assert_eq!(i64::from_row_value(RowValues::Text(" 12".into())).unwrap(), 12);
        assert!(bool::from_row_value(RowValues::Int(1)).unwrap());
        assert_eq!(f64::from_row_value(RowValues::Int(2)).unwrap(), 2.0);
        assert_eq!(Option::<i64>::from_row_value(RowValues::Null).unwrap(), None);
        assert!(i32::from_row_value(RowValues::Int(i64::MAX)).is_err());
        assert!(String::from_row_value(RowValues::Null).is_err());
    }

    #[test]
    fn json_round_trip_keeps_integers() {
        let v = serde_json::json!(7);
        assert_eq!(RowValues::from_json(&v), RowValues::Int(7));
        assert_eq!(RowValues::Int(7).to_json(), v);
    }
}
