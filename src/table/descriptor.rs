use crate::config::TableConfig;
use crate::dialect::ReservedQuoter;
use crate::error::DatastoreError;

use super::record::{FieldMeta, Record};

/// Column assumed to be the key when a record type marks none.
const DEFAULT_KEY_COLUMN: &str = "id";

/// Static metadata about one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDescriptor {
    pub table: String,
    pub columns: Vec<String>,
    /// Ordered primary key columns.
    pub pk_columns: Vec<String>,
    pub autoincrement: bool,
    pub order_columns: Vec<String>,
    /// Column layout for file tables; supplies `columns` when none are listed.
    pub schema: Option<serde_json::Value>,
    pub from_query: Option<String>,
    pub from_query_alias: Option<String>,
}

impl TableDescriptor {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_pk_columns<I, S>(mut self, pk_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pk_columns = pk_columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_autoincrement(mut self, autoincrement: bool) -> Self {
        self.autoincrement = autoincrement;
        self
    }

    #[must_use]
    pub fn with_from_query(mut self, query: impl Into<String>, alias: impl Into<String>) -> Self {
        self.from_query = Some(query.into());
        self.from_query_alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn from_config(config: &TableConfig) -> Self {
        Self {
            table: config.table.clone(),
            columns: if config.columns.is_empty() {
                config.schema.as_ref().map(schema_columns).unwrap_or_default()
            } else {
                config.columns.clone()
            },
            pk_columns: config.pk_columns.clone(),
            autoincrement: config.autoincrement,
            order_columns: config.order_columns.clone(),
            schema: config.schema.clone(),
            from_query: config.from_query.clone(),
            from_query_alias: config.from_query_alias.clone(),
        }
    }

    /// Derive the descriptor from a record type's field metadata.
    #[must_use]
    pub fn for_record<T: Record>(table: impl Into<String>) -> Self {
        let fields: Vec<FieldMeta> = T::fields().into_iter().filter(|f| !f.transient).collect();
        let mut pk_columns: Vec<String> = fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.column.clone())
            .collect();
        if pk_columns.is_empty()
            && let Some(id) = fields
                .iter()
                .find(|f| f.column.eq_ignore_ascii_case(DEFAULT_KEY_COLUMN))
        {
            pk_columns.push(id.column.clone());
        }
        Self {
            table: table.into(),
            columns: fields.iter().map(|f| f.column.clone()).collect(),
            pk_columns,
            autoincrement: fields.iter().any(|f| f.autoincrement),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_key(&self, column: &str) -> bool {
        self.pk_columns.iter().any(|pk| pk.eq_ignore_ascii_case(column))
    }

    /// Non-key columns in declaration order.
    #[must_use]
    pub fn value_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| !self.is_key(c))
            .map(String::as_str)
            .collect()
    }

    /// Key columns must exist and be a subset of the columns.
    ///
    /// # Errors
    /// Returns `ConfigError` describing the violated constraint.
    pub fn validate_for_persist(&self) -> Result<(), DatastoreError> {
        if self.pk_columns.is_empty() {
            return Err(DatastoreError::ConfigError(format!(
                "table {} has no primary key columns",
                self.table
            )));
        }
        if !self.columns.is_empty()
            && let Some(missing) = self
                .pk_columns
                .iter()
                .find(|pk| !self.columns.iter().any(|c| c.eq_ignore_ascii_case(pk)))
        {
            return Err(DatastoreError::ConfigError(format!(
                "primary key column {missing} is not a column of {}",
                self.table
            )));
        }
        Ok(())
    }

    /// `SELECT` over the whole table, or over `fromQuery` aliased when set.
    #[must_use]
    pub fn select_sql(&self, quoter: Option<&ReservedQuoter>) -> String {
        let quote = |name: &str| -> String {
            quoter.map_or_else(|| name.to_string(), |q| q.quote(name).into_owned())
        };
        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| quote(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let source = match &self.from_query {
            Some(query) => format!(
                "({query}) {}",
                self.from_query_alias.as_deref().unwrap_or(&self.table)
            ),
            None => quote(&self.table),
        };
        let mut sql = format!("SELECT {projection} FROM {source}");
        if !self.order_columns.is_empty() {
            let order = self
                .order_columns
                .iter()
                .map(|c| quote(c))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }
        sql
    }
}

/// Column names from a schema document: a list of names or `{"name": ..}`
/// objects, either bare or under `columns`.
fn schema_columns(schema: &serde_json::Value) -> Vec<String> {
    let list = schema.get("columns").unwrap_or(schema);
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(name) => Some(name.clone()),
                    other => other.get("name")?.as_str().map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default()
}
