use async_trait::async_trait;

use crate::config::Config;
use crate::driver::Connection;
use crate::error::DatastoreError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::{BulkInsertStrategy, Dialect, LastInsertIdKind};

const DEFAULT_SCHEMA: &str = "main";

/// `SQLite`: multi-row VALUES, rowid reported for the last row of a batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

fn first_column_text(rs: &ResultSet) -> Vec<String> {
    rs.results
        .iter()
        .filter_map(|row| row.get_by_index(0))
        .map(ToString::to_string)
        .collect()
}

fn schema_name(datastore: Option<&str>) -> Result<&str, DatastoreError> {
    let schema = datastore.filter(|d| !d.is_empty()).unwrap_or(DEFAULT_SCHEMA);
    if schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(schema)
    } else {
        Err(DatastoreError::ConfigError(format!(
            "invalid sqlite schema name {schema}"
        )))
    }
}

#[async_trait]
impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn insert_strategy(&self) -> BulkInsertStrategy {
        BulkInsertStrategy::MultiRowValues
    }

    fn last_insert_id_kind(&self) -> LastInsertIdKind {
        LastInsertIdKind::Last
    }

    fn supports_tuple_in(&self) -> bool {
        false
    }

    async fn get_datastores(
        &self,
        conn: &mut dyn Connection,
        _config: &Config,
    ) -> Result<Vec<String>, DatastoreError> {
        let rs = conn
            .query("SELECT name FROM pragma_database_list ORDER BY seq", &[])
            .await?;
        Ok(first_column_text(&rs))
    }

    async fn get_tables(
        &self,
        conn: &mut dyn Connection,
        _config: &Config,
        datastore: Option<&str>,
    ) -> Result<Vec<String>, DatastoreError> {
        let schema = schema_name(datastore)?;
        let sql = format!(
            "SELECT name FROM {schema}.sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
        );
        Ok(first_column_text(&conn.query(&sql, &[]).await?))
    }

    async fn get_columns(
        &self,
        conn: &mut dyn Connection,
        _config: &Config,
        table: &str,
    ) -> Result<Vec<String>, DatastoreError> {
        let rs = conn
            .query(
                "SELECT name FROM pragma_table_info(?) ORDER BY cid",
                &[RowValues::Text(table.to_string())],
            )
            .await?;
        Ok(first_column_text(&rs))
    }

    async fn get_sequence(
        &self,
        conn: &mut dyn Connection,
        _config: &Config,
        name: &str,
    ) -> Result<i64, DatastoreError> {
        let exists = conn
            .query(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
                &[],
            )
            .await?;
        if exists.is_empty() {
            return Ok(0);
        }
        let rs = conn
            .query(
                "SELECT seq FROM sqlite_sequence WHERE name = ?",
                &[RowValues::Text(name.to_string())],
            )
            .await?;
        Ok(rs
            .results
            .first()
            .and_then(|row| row.get_by_index(0))
            .and_then(|value| value.as_int().copied())
            .unwrap_or(0))
    }

    async fn drop_table(
        &self,
        conn: &mut dyn Connection,
        _config: &Config,
        table: &str,
    ) -> Result<(), DatastoreError> {
        conn.execute(&format!("DROP TABLE IF EXISTS {table}"), &[])
            .await?;
        Ok(())
    }
}
