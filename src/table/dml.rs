use std::marker::PhantomData;
use std::sync::Arc;

use crate::dialect::ReservedQuoter;
use crate::error::DatastoreError;
use crate::sql::SqlKind;
use crate::types::RowValues;

use super::descriptor::TableDescriptor;
use super::record::{FieldMeta, Record};

/// SQL with `?` placeholders and its positional values.
#[derive(Debug, Clone, PartialEq)]
pub struct ParametrizedSql {
    pub sql: String,
    pub values: Vec<RowValues>,
    pub kind: SqlKind,
}

impl ParametrizedSql {
    #[must_use]
    pub fn new(sql: impl Into<String>, values: Vec<RowValues>, kind: SqlKind) -> Self {
        Self {
            sql: sql.into(),
            values,
            kind,
        }
    }

    /// An UPDATE binding nothing but its key values changes nothing.
    #[must_use]
    pub fn is_noop_update(&self, key_len: usize) -> bool {
        self.kind == SqlKind::Update && self.values.len() <= key_len
    }
}

/// Produces INSERT/UPDATE/DELETE statements and key access for `T`.
pub trait DmlProvider<T>: Send + Sync {
    fn descriptor(&self) -> &TableDescriptor;

    /// Primary key tuple of `item`, in the form stored in the table.
    fn key(&self, item: &T) -> Vec<RowValues>;

    /// Write a datastore-assigned sequence value into the first key field.
    ///
    /// # Errors
    /// Returns `BindingError` if the key field rejects the value.
    fn set_key(&self, item: &mut T, sequence: i64) -> Result<(), DatastoreError>;

    /// # Errors
    /// Returns `ConfigError` when `kind` needs key columns the table lacks.
    fn get(&self, kind: SqlKind, item: &T) -> Result<ParametrizedSql, DatastoreError>;
}

/// [`DmlProvider`] driven by [`Record::fields`] metadata with precomputed SQL.
#[derive(Debug)]
pub struct MetadataDmlProvider<T> {
    descriptor: Arc<TableDescriptor>,
    insert: Template,
    update: Template,
    delete: Template,
    key_fields: Vec<FieldMeta>,
    _record: PhantomData<fn() -> T>,
}

#[derive(Debug)]
struct Template {
    sql: String,
    fields: Vec<FieldMeta>,
}

impl<T: Record> MetadataDmlProvider<T> {
    /// Fields of `T` are matched to `descriptor` columns by column name; key and
    /// autoincrement flags come from the descriptor.
    #[must_use]
    pub fn new(descriptor: Arc<TableDescriptor>, quoter: Option<&ReservedQuoter>) -> Self {
        let quote = |name: &str| -> String {
            quoter.map_or_else(|| name.to_string(), |q| q.quote(name).into_owned())
        };
        let fields: Vec<FieldMeta> = T::fields()
            .into_iter()
            .filter(|f| !f.transient)
            .filter(|f| {
                descriptor.columns.is_empty()
                    || descriptor
                        .columns
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(&f.column))
            })
            .collect();
        let key_fields: Vec<FieldMeta> = descriptor
            .pk_columns
            .iter()
            .filter_map(|pk| {
                fields
                    .iter()
                    .find(|f| f.column.eq_ignore_ascii_case(pk))
                    .cloned()
            })
            .collect();
        let value_fields: Vec<FieldMeta> = fields
            .iter()
            .filter(|f| !descriptor.is_key(&f.column))
            .cloned()
            .collect();
        let insert_fields: Vec<FieldMeta> = fields
            .iter()
            .filter(|f| !(descriptor.autoincrement && descriptor.is_key(&f.column)))
            .cloned()
            .collect();

        let table = quote(&descriptor.table);
        let key_clause = key_fields
            .iter()
            .map(|f| format!("{} = ?", quote(&f.column)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let insert_sql = format!(
            "INSERT INTO {table}({}) VALUES ({})",
            insert_fields
                .iter()
                .map(|f| quote(&f.column))
                .collect::<Vec<_>>()
                .join(", "),
            vec!["?"; insert_fields.len()].join(", ")
        );
        let update_sql = format!(
            "UPDATE {table} SET {} WHERE {key_clause}",
            value_fields
                .iter()
                .map(|f| format!("{} = ?", quote(&f.column)))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let delete_sql = format!("DELETE FROM {table} WHERE {key_clause}");

        let mut update_fields = value_fields;
        update_fields.extend(key_fields.iter().cloned());
        Self {
            descriptor,
            insert: Template {
                sql: insert_sql,
                fields: insert_fields,
            },
            update: Template {
                sql: update_sql,
                fields: update_fields,
            },
            delete: Template {
                sql: delete_sql,
                fields: key_fields.clone(),
            },
            key_fields,
            _record: PhantomData,
        }
    }

    fn template(&self, kind: SqlKind) -> &Template {
        match kind {
            SqlKind::Insert => &self.insert,
            SqlKind::Update => &self.update,
            SqlKind::Delete => &self.delete,
        }
    }

    fn column_value(&self, field: &FieldMeta, item: &T) -> RowValues {
        field.to_column_value(item.get_field(&field.name).unwrap_or(RowValues::Null))
    }

    /// An all-zero key on insert is bound as NULL so the datastore assigns it.
    fn unassigned_key(&self, item: &T) -> bool {
        !self.key_fields.is_empty()
            && self
                .key_fields
                .iter()
                .all(|f| item.get_field(&f.name).is_none_or(|value| value.is_zero()))
    }
}

impl<T: Record> DmlProvider<T> for MetadataDmlProvider<T> {
    fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    fn key(&self, item: &T) -> Vec<RowValues> {
        self.key_fields
            .iter()
            .map(|f| self.column_value(f, item))
            .collect()
    }

    fn set_key(&self, item: &mut T, sequence: i64) -> Result<(), DatastoreError> {
        match self.key_fields.first() {
            Some(field) => item.set_field(&field.name, RowValues::Int(sequence)),
            None => Ok(()),
        }
    }

    fn get(&self, kind: SqlKind, item: &T) -> Result<ParametrizedSql, DatastoreError> {
        if kind != SqlKind::Insert && self.key_fields.is_empty() {
            return Err(DatastoreError::ConfigError(format!(
                "{kind} on {} needs primary key columns",
                self.descriptor.table
            )));
        }
        let template = self.template(kind);
        let null_key = kind == SqlKind::Insert && self.unassigned_key(item);
        let values = template
            .fields
            .iter()
            .map(|field| {
                if null_key && self.descriptor.is_key(&field.column) {
                    RowValues::Null
                } else {
                    self.column_value(field, item)
                }
            })
            .collect();
        Ok(ParametrizedSql::new(template.sql.clone(), values, kind))
    }
}
