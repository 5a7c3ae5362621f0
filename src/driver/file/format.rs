//! Line codecs for NDJSON, CSV and TSV tables.

use clap::ValueEnum;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::DatastoreError;
use crate::types::{RowValues, TIMESTAMP_FORMAT};

/// Ordered field list of one file record.
pub type FileRecord = Vec<(String, RowValues)>;

/// On-disk record format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Newline delimited JSON objects
    #[default]
    #[value(alias = "ndjson")]
    Json,
    /// Comma separated values with a header line
    Csv,
    /// Tab separated values with a header line
    Tsv,
}

impl FileFormat {
    #[must_use]
    pub fn ext(self) -> &'static str {
        match self {
            FileFormat::Json => "json",
            FileFormat::Csv => "csv",
            FileFormat::Tsv => "tsv",
        }
    }

    #[must_use]
    pub fn has_header(self) -> bool {
        !matches!(self, FileFormat::Json)
    }

    fn delimiter(self) -> char {
        match self {
            FileFormat::Tsv => '\t',
            _ => ',',
        }
    }
}

/// Decoded table contents: known columns (header order or first-seen order) and records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub columns: Vec<String>,
    pub records: Vec<FileRecord>,
}

impl Decoded {
    /// Add columns not seen yet; returns `true` when any were added.
    pub fn extend_columns<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) -> bool {
        let mut added = false;
        for name in names {
            if !self.columns.iter().any(|c| c == name) {
                self.columns.push(name.clone());
                added = true;
            }
        }
        added
    }
}

/// Format plus the timestamp layout used when writing values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    pub format: FileFormat,
    pub date_format: String,
}

impl Codec {
    #[must_use]
    pub fn new(format: FileFormat) -> Self {
        Self {
            format,
            date_format: TIMESTAMP_FORMAT.to_string(),
        }
    }

    #[must_use]
    pub fn with_date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = date_format.into();
        self
    }

    /// Decode a whole table body.
    ///
    /// # Errors
    /// Returns `JsonError` for a malformed NDJSON line.
    pub fn decode(&self, text: &str) -> Result<Decoded, DatastoreError> {
        let mut decoded = Decoded::default();
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        match self.format {
            FileFormat::Json => {
                for line in lines {
                    let object: Map<String, JsonValue> = serde_json::from_str(line)?;
                    let record: FileRecord = object
                        .iter()
                        .map(|(k, v)| (k.clone(), RowValues::from_json(v)))
                        .collect();
                    decoded.extend_columns(record.iter().map(|(k, _)| k));
                    decoded.records.push(record);
                }
            }
            FileFormat::Csv | FileFormat::Tsv => {
                let Some(header) = lines.next() else {
                    return Ok(decoded);
                };
                decoded.columns = self.decode_header(header);
                for line in lines {
                    let mut fields = split_fields(line, self.format.delimiter()).into_iter();
                    let record = decoded
                        .columns
                        .iter()
                        .map(|column| {
                            let value = fields.next().map_or(RowValues::Null, Field::into_value);
                            (column.clone(), value)
                        })
                        .collect();
                    decoded.records.push(record);
                }
            }
        }
        Ok(decoded)
    }

    #[must_use]
    pub fn decode_header(&self, line: &str) -> Vec<String> {
        split_fields(line, self.format.delimiter())
            .into_iter()
            .map(|field| field.text)
            .collect()
    }

    /// Header line for delimited formats, `None` for NDJSON.
    #[must_use]
    pub fn encode_header(&self, columns: &[String]) -> Option<String> {
        self.format.has_header().then(|| {
            columns
                .iter()
                .map(|c| quote(c))
                .collect::<Vec<_>>()
                .join(&self.format.delimiter().to_string())
        })
    }

    /// One record line without the trailing newline. Delimited formats follow
    /// `columns`; NDJSON keeps the record's own field order.
    ///
    /// # Errors
    /// Returns `JsonError` if the NDJSON object cannot be serialized.
    pub fn encode_record(
        &self,
        columns: &[String],
        record: &FileRecord,
    ) -> Result<String, DatastoreError> {
        match self.format {
            FileFormat::Json => {
                let object: Map<String, JsonValue> = record
                    .iter()
                    .map(|(k, v)| (k.clone(), self.json_value(v)))
                    .collect();
                Ok(serde_json::to_string(&object)?)
            }
            FileFormat::Csv | FileFormat::Tsv => Ok(columns
                .iter()
                .map(|column| {
                    record
                        .iter()
                        .find(|(k, _)| k == column)
                        .map_or_else(|| "null".to_string(), |(_, v)| self.delimited_value(v))
                })
                .collect::<Vec<_>>()
                .join(&self.format.delimiter().to_string())),
        }
    }

    /// Full table body including header and trailing newline.
    ///
    /// # Errors
    /// Propagates [`Codec::encode_record`] failures.
    pub fn encode_all(&self, decoded: &Decoded) -> Result<String, DatastoreError> {
        let mut out = String::new();
        if let Some(header) = self.encode_header(&decoded.columns) {
            out.push_str(&header);
            out.push('\n');
        }
        for record in &decoded.records {
            out.push_str(&self.encode_record(&decoded.columns, record)?);
            out.push('\n');
        }
        Ok(out)
    }

    fn json_value(&self, value: &RowValues) -> JsonValue {
        match value {
            RowValues::Timestamp(ts) => JsonValue::String(ts.format(&self.date_format).to_string()),
            other => other.to_json(),
        }
    }

    fn delimited_value(&self, value: &RowValues) -> String {
        match value {
            RowValues::Null => "null".to_string(),
            RowValues::Int(_) | RowValues::Float(_) | RowValues::Bool(_) => value.to_string(),
            RowValues::Timestamp(ts) => quote(&ts.format(&self.date_format).to_string()),
            other => quote(&other.to_string()),
        }
    }
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

struct Field {
    text: String,
    quoted: bool,
}

impl Field {
    fn into_value(self) -> RowValues {
        if self.quoted {
            RowValues::Text(self.text)
        } else if self.text.is_empty() {
            RowValues::Null
        } else {
            RowValues::parse_literal(&self.text)
        }
    }
}

fn split_fields(line: &str, delimiter: char) -> Vec<Field> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        let mut field = Field {
            text: String::new(),
            quoted: false,
        };
        let mut terminated = false;
        if chars.peek() == Some(&'"') {
            chars.next();
            field.quoted = true;
            while let Some(ch) = chars.next() {
                match ch {
                    '\\' => match chars.next() {
                        Some('n') => field.text.push('\n'),
                        Some('r') => field.text.push('\r'),
                        Some('t') => field.text.push('\t'),
                        Some(other) => field.text.push(other),
                        None => field.text.push('\\'),
                    },
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.text.push('"');
                    }
                    '"' => break,
                    other => field.text.push(other),
                }
            }
            // anything between the closing quote and the delimiter is dropped
            for ch in chars.by_ref() {
                if ch == delimiter {
                    terminated = true;
                    break;
                }
            }
        } else {
            for ch in chars.by_ref() {
                if ch == delimiter {
                    terminated = true;
                    break;
                }
                field.text.push(ch);
            }
        }
        fields.push(field);
        if !terminated {
            return fields;
        }
    }
}
