//! Row scanning and mapping of rows into application values.

use std::collections::HashMap;
use std::marker::PhantomData;

use crate::error::DatastoreError;
use crate::results::CustomDbRow;
use crate::table::{FieldMeta, Record};
use crate::types::RowValues;

/// Column names plus positional access to the current row.
pub trait Scanner {
    fn columns(&self) -> &[String];

    fn value(&self, index: usize) -> Option<&RowValues>;

    /// Copy the row into `dest` positionally.
    ///
    /// # Errors
    /// Returns `BindingError` when `dest` is longer than the row.
    fn scan(&self, dest: &mut [RowValues]) -> Result<(), DatastoreError> {
        for (index, slot) in dest.iter_mut().enumerate() {
            *slot = self.value(index).cloned().ok_or_else(|| {
                DatastoreError::BindingError(format!(
                    "scan destination has {} slots but the row has {} columns",
                    index + 1,
                    self.columns().len()
                ))
            })?;
        }
        Ok(())
    }
}

impl Scanner for CustomDbRow {
    fn columns(&self) -> &[String] {
        &self.column_names
    }

    fn value(&self, index: usize) -> Option<&RowValues> {
        self.get_by_index(index)
    }
}

/// Builds one value of `T` from the scanner's current row.
pub trait RecordMapper<T>: Send + Sync {
    /// # Errors
    /// Returns `BindingError` when a column cannot be converted.
    fn map(&self, scanner: &dyn Scanner) -> Result<T, DatastoreError>;
}

impl<T, F> RecordMapper<T> for F
where
    F: Fn(&dyn Scanner) -> Result<T, DatastoreError> + Send + Sync,
{
    fn map(&self, scanner: &dyn Scanner) -> Result<T, DatastoreError> {
        self(scanner)
    }
}

/// Maps columns onto [`Record`] fields by column name (case-insensitive),
/// applying value maps and date layouts. Unknown columns are ignored.
#[derive(Debug)]
pub struct MetadataRecordMapper<T> {
    fields: Vec<FieldMeta>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record + Default> MetadataRecordMapper<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: T::fields().into_iter().filter(|f| !f.transient).collect(),
            _record: PhantomData,
        }
    }

    fn field_for(&self, column: &str) -> Option<&FieldMeta> {
        self.fields
            .iter()
            .find(|f| f.column == column)
            .or_else(|| self.fields.iter().find(|f| f.column.eq_ignore_ascii_case(column)))
    }
}

impl<T: Record + Default> Default for MetadataRecordMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record + Default> RecordMapper<T> for MetadataRecordMapper<T> {
    fn map(&self, scanner: &dyn Scanner) -> Result<T, DatastoreError> {
        let mut record = T::default();
        for (index, column) in scanner.columns().iter().enumerate() {
            let (Some(field), Some(value)) = (self.field_for(column), scanner.value(index)) else {
                continue;
            };
            let value = field.from_column_value(value.clone())?;
            record.set_field(&field.name, value)?;
        }
        Ok(record)
    }
}

/// Column name to value.
#[derive(Debug, Default, Clone, Copy)]
pub struct MapRecordMapper;

impl RecordMapper<HashMap<String, RowValues>> for MapRecordMapper {
    fn map(&self, scanner: &dyn Scanner) -> Result<HashMap<String, RowValues>, DatastoreError> {
        Ok(scanner
            .columns()
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let value = scanner.value(index).cloned().unwrap_or(RowValues::Null);
                (column.clone(), value)
            })
            .collect())
    }
}

/// Positional values in column order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnarRecordMapper;

impl RecordMapper<Vec<RowValues>> for ColumnarRecordMapper {
    fn map(&self, scanner: &dyn Scanner) -> Result<Vec<RowValues>, DatastoreError> {
        let mut row = vec![RowValues::Null; scanner.columns().len()];
        scanner.scan(&mut row)?;
        Ok(row)
    }
}
