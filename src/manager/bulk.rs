//! Batched INSERT strategies.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use lazy_static::lazy_static;
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::dialect::{BulkInsertStrategy, LastInsertIdKind};
use crate::error::DatastoreError;
use crate::sql::SqlKind;
use crate::table::{DmlProvider, ParametrizedSql};
use crate::types::RowValues;

use super::Session;

lazy_static! {
    static ref INSERT_PARTS: Regex =
        Regex::new(r"(?is)^\s*INSERT\s+INTO\s+(.+?)\s*VALUES\s*(\(.*\))\s*;?\s*$").unwrap();
}

/// `INSERT INTO <target> VALUES <row>` split into its target and row group.
struct InsertParts<'a> {
    target: &'a str,
    row: &'a str,
}

impl<'a> InsertParts<'a> {
    fn parse(sql: &'a str) -> Result<Self, DatastoreError> {
        let captures = INSERT_PARTS.captures(sql).ok_or_else(|| {
            DatastoreError::Unsupported(format!("cannot batch statement {sql}"))
        })?;
        match (captures.get(1), captures.get(2)) {
            (Some(target), Some(row)) => Ok(Self {
                target: target.as_str(),
                row: row.as_str(),
            }),
            _ => Err(DatastoreError::Unsupported(format!(
                "cannot batch statement {sql}"
            ))),
        }
    }

    /// Row group without its outer parentheses.
    fn row_items(&self) -> &'a str {
        &self.row[1..self.row.len() - 1]
    }
}

/// Replace each `?` outside quoted text with the next value rendered by `render`.
///
/// # Errors
/// Returns `BindingError` when placeholders outnumber `values`.
pub fn inline_placeholders_with(
    sql: &str,
    values: &[RowValues],
    render: impl Fn(&RowValues) -> String,
) -> Result<String, DatastoreError> {
    let mut out = String::with_capacity(sql.len() + values.len() * 8);
    let mut values = values.iter();
    let mut quote: Option<char> = None;
    for ch in sql.chars() {
        match (quote, ch) {
            (Some(open), c) if c == open => {
                quote = None;
                out.push(c);
            }
            (Some(_), c) => out.push(c),
            (None, '\'' | '"' | '`') => {
                quote = Some(ch);
                out.push(ch);
            }
            (None, '?') => {
                let value = values.next().ok_or_else(|| {
                    DatastoreError::BindingError("missing value for '?' placeholder".into())
                })?;
                out.push_str(&render(value));
            }
            (None, c) => out.push(c),
        }
    }
    Ok(out)
}

/// [`inline_placeholders_with`] rendering SQL literals.
///
/// # Errors
/// Returns `BindingError` when placeholders outnumber `values`.
pub fn inline_placeholders(sql: &str, values: &[RowValues]) -> Result<String, DatastoreError> {
    inline_placeholders_with(sql, values, RowValues::to_sql_literal)
}

/// Field rendering for COPY LOCAL lines: `null`, bare numbers and booleans,
/// everything else single-quoted with line breaks removed.
fn copy_literal(value: &RowValues) -> String {
    match value {
        RowValues::Null => "null".to_string(),
        RowValues::Int(_) | RowValues::Float(_) | RowValues::Bool(_) => value.to_string(),
        other => {
            let text: String = other
                .to_string()
                .chars()
                .filter(|c| *c != '\n' && *c != '\r')
                .collect();
            format!("'{}'", text.replace('\'', "''"))
        }
    }
}

struct CopyFile {
    file: NamedTempFile,
    encoder: GzEncoder<std::fs::File>,
    lines: usize,
}

/// Accumulates insertable records and flushes them per strategy.
pub(crate) struct BatchInserter {
    strategy: BulkInsertStrategy,
    batch_size: usize,
    autoincrement: bool,
    id_kind: LastInsertIdKind,
    sql: String,
    values: Vec<RowValues>,
    indexes: Vec<usize>,
    copy: Option<CopyFile>,
    inserted: u64,
}

impl BatchInserter {
    pub(crate) fn new(
        strategy: BulkInsertStrategy,
        batch_size: usize,
        autoincrement: bool,
        id_kind: LastInsertIdKind,
    ) -> Self {
        Self {
            strategy,
            batch_size: batch_size.max(1),
            autoincrement,
            id_kind,
            sql: String::new(),
            values: Vec::new(),
            indexes: Vec::new(),
            copy: None,
            inserted: 0,
        }
    }

    /// Rows reported inserted by completed flushes.
    pub(crate) fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Add the statement for `items[index]`. Non-INSERT statements run
    /// immediately without touching the pending batch.
    pub(crate) async fn push<T>(
        &mut self,
        session: &mut Session<'_>,
        provider: &dyn DmlProvider<T>,
        items: &mut [T],
        index: usize,
        statement: ParametrizedSql,
    ) -> Result<(), DatastoreError> {
        if statement.kind != SqlKind::Insert {
            session.execute(&statement.sql, &statement.values).await?;
            return Ok(());
        }
        let parts = InsertParts::parse(&statement.sql)?;
        let first = self.indexes.is_empty();
        match self.strategy {
            BulkInsertStrategy::SingleRow => {
                self.sql = statement.sql.clone();
                self.values = statement.values;
            }
            BulkInsertStrategy::MultiRowValues => {
                if first {
                    self.sql = format!("INSERT INTO {} VALUES {}", parts.target, parts.row);
                } else {
                    self.sql.push(',');
                    self.sql.push_str(parts.row);
                }
                self.values.extend(statement.values);
            }
            BulkInsertStrategy::UnionAll => {
                let literals = inline_placeholders(parts.row_items(), &statement.values)?;
                if first {
                    self.sql = format!("INSERT INTO {} SELECT {literals}", parts.target);
                } else {
                    self.sql.push_str(" UNION ALL SELECT ");
                    self.sql.push_str(&literals);
                }
            }
            BulkInsertStrategy::InsertAll => {
                if first {
                    self.sql = format!("INSERT ALL INTO {} VALUES {}", parts.target, parts.row);
                } else {
                    self.sql
                        .push_str(&format!(" INTO {} VALUES {}", parts.target, parts.row));
                }
                self.values.extend(statement.values);
            }
            BulkInsertStrategy::CopyLocal => {
                let line = inline_placeholders_with(
                    parts.row_items(),
                    &statement.values,
                    copy_literal,
                )?;
                self.write_copy_line(parts.target, &line)?;
            }
        }
        self.indexes.push(index);
        // COPY LOCAL loads the whole pass from one file
        let full = match self.strategy {
            BulkInsertStrategy::SingleRow => true,
            BulkInsertStrategy::CopyLocal => false,
            _ => self.indexes.len() >= self.batch_size,
        };
        if full {
            self.flush(session, provider, items).await?;
        }
        Ok(())
    }

    fn write_copy_line(&mut self, target: &str, line: &str) -> Result<(), DatastoreError> {
        if self.copy.is_none() {
            let file = tempfile::Builder::new()
                .prefix("copy-local-")
                .suffix(".csv.gz")
                .tempfile()?;
            let encoder = GzEncoder::new(file.reopen()?, Compression::default());
            self.sql = format!(
                "COPY {target} FROM LOCAL '{}' GZIP DELIMITER ',' NULL AS 'null' ENCLOSED BY ''''",
                file.path().display()
            );
            self.copy = Some(CopyFile {
                file,
                encoder,
                lines: 0,
            });
        }
        if let Some(copy) = self.copy.as_mut() {
            // inlined items are joined by ", " which COPY would read as a leading space
            let fields: Vec<&str> = split_top_level(line);
            copy.encoder.write_all(fields.join(",").as_bytes())?;
            copy.encoder.write_all(b"\n")?;
            copy.lines += 1;
        }
        Ok(())
    }

    /// Execute whatever is pending and backfill autoincrement keys.
    pub(crate) async fn flush<T>(
        &mut self,
        session: &mut Session<'_>,
        provider: &dyn DmlProvider<T>,
        items: &mut [T],
    ) -> Result<(), DatastoreError> {
        if self.indexes.is_empty() {
            return Ok(());
        }
        let indexes = std::mem::take(&mut self.indexes);
        let values = std::mem::take(&mut self.values);
        let mut sql = std::mem::take(&mut self.sql);

        let result = if let Some(copy) = self.copy.take() {
            let CopyFile {
                file,
                encoder,
                lines,
            } = copy;
            encoder.finish()?.sync_all()?;
            debug!(path = %file.path().display(), lines, "copy local file written");
            let result = session.execute(&sql, &[]).await;
            drop(file);
            result?
        } else {
            if self.strategy == BulkInsertStrategy::InsertAll {
                sql.push_str(" SELECT 1 FROM DUAL");
            }
            session.execute(&sql, &values).await?
        };
        self.inserted += result.rows_affected;
        if self.autoincrement
            && let Some(reported) = result.last_insert_id
        {
            let first = self
                .id_kind
                .first_sequence(reported, indexes.len() as u64);
            for (offset, index) in indexes.into_iter().enumerate() {
                if let Some(item) = items.get_mut(index) {
                    provider.set_key(item, first + offset as i64)?;
                }
            }
        }
        Ok(())
    }
}

/// Split a rendered row on commas outside single quotes, trimming each field.
fn split_top_level(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '\'' => quoted = !quoted,
            ',' if !quoted => {
                fields.push(line[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    fields.push(line[start..].trim());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inlines_outside_quotes() {
        let sql = inline_placeholders(
            "?, '?', ?",
            &[RowValues::Text("it's".into()), RowValues::Null],
        )
        .unwrap();
        assert_eq!(sql, "'it''s', '?', NULL");
        assert!(inline_placeholders("?, ?", &[RowValues::Int(1)]).is_err());
    }

    #[test]
    fn copy_fields_strip_newlines() {
        let line = inline_placeholders_with(
            "?, ?, ?",
            &[
                RowValues::Int(1),
                RowValues::Text("a\nb, c".into()),
                RowValues::Null,
            ],
            copy_literal,
        )
        .unwrap();
        assert_eq!(split_top_level(&line), vec!["1", "'ab, c'", "null"]);
    }

    #[test]
    fn splits_insert_statements() {
        let parts = InsertParts::parse("INSERT INTO users(name, active) VALUES (?, ?)").unwrap();
        assert_eq!(parts.target, "users(name, active)");
        assert_eq!(parts.row, "(?, ?)");
        assert_eq!(parts.row_items(), "?, ?");
        assert!(InsertParts::parse("UPDATE t SET a = ?").is_err());
    }
}
