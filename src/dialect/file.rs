use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::driver::Connection;
use crate::driver::file::{FileFormat, FileLayout, LocalStorage, Storage};
use crate::error::DatastoreError;

use super::{BulkInsertStrategy, Dialect};

/// Flat-file tables: one INSERT per record, tables are `<base>/<name>.<ext>`
/// and datastores are subdirectories of the base.
#[derive(Debug, Clone)]
pub struct FileDialect {
    name: String,
    format: FileFormat,
    storage: Arc<dyn Storage>,
}

impl FileDialect {
    #[must_use]
    pub fn new(format: FileFormat) -> Self {
        Self {
            name: format.ext().to_string(),
            format,
            storage: Arc::new(LocalStorage),
        }
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    fn layout(&self, config: &Config) -> Result<FileLayout, DatastoreError> {
        FileLayout::from_config(config, self.format)
    }
}

#[async_trait]
impl Dialect for FileDialect {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_strategy(&self) -> BulkInsertStrategy {
        BulkInsertStrategy::SingleRow
    }

    fn supports_tuple_in(&self) -> bool {
        false
    }

    async fn get_datastores(
        &self,
        _conn: &mut dyn Connection,
        config: &Config,
    ) -> Result<Vec<String>, DatastoreError> {
        let layout = self.layout(config)?;
        let mut datastores = Vec::new();
        for path in self.storage.list(&layout.base).await? {
            if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir())
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                datastores.push(name.to_string());
            }
        }
        Ok(datastores)
    }

    async fn get_tables(
        &self,
        _conn: &mut dyn Connection,
        config: &Config,
        datastore: Option<&str>,
    ) -> Result<Vec<String>, DatastoreError> {
        let layout = self.layout(config)?;
        let dir = match datastore.filter(|d| !d.is_empty()) {
            Some(datastore) => layout.base.join(datastore),
            None => layout.base.clone(),
        };
        if !self.storage.exists(&dir).await? {
            return Ok(Vec::new());
        }
        Ok(self
            .storage
            .list(&dir)
            .await?
            .iter()
            .filter_map(|path| layout.table_name(path))
            .collect())
    }

    /// Header columns for CSV/TSV, first-seen keys for NDJSON.
    async fn get_columns(
        &self,
        conn: &mut dyn Connection,
        _config: &Config,
        table: &str,
    ) -> Result<Vec<String>, DatastoreError> {
        let rs = conn.query(&format!("SELECT * FROM {table}"), &[]).await?;
        Ok(rs
            .get_column_names()
            .map(|names| names.to_vec())
            .unwrap_or_default())
    }

    async fn drop_datastore(
        &self,
        _conn: &mut dyn Connection,
        config: &Config,
        datastore: &str,
    ) -> Result<(), DatastoreError> {
        let dir = self.layout(config)?.base.join(datastore);
        if self.storage.exists(&dir).await? {
            self.storage.delete_dir(&dir).await?;
        }
        Ok(())
    }

    async fn drop_table(
        &self,
        _conn: &mut dyn Connection,
        config: &Config,
        table: &str,
    ) -> Result<(), DatastoreError> {
        let path = self.layout(config)?.table_path(table);
        if self.storage.exists(&path).await? {
            self.storage.delete(&path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Driver;
    use crate::driver::file::FileDriver;

    #[tokio::test]
    async fn lists_tables_columns_and_drops() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new("csv", dir.path().display().to_string());
        let mut conn = FileDriver::new(FileFormat::Csv).connect(&config).await.unwrap();
        conn.execute("INSERT INTO people(id, name) VALUES (1, 'a')", &[])
            .await
            .unwrap();
        conn.execute("INSERT INTO sales.orders(id) VALUES (1)", &[])
            .await
            .unwrap();
        conn.on_release();

        let dialect = FileDialect::new(FileFormat::Csv);
        assert_eq!(
            dialect.get_tables(conn.as_mut(), &config, None).await.unwrap(),
            vec!["people".to_string()]
        );
        assert_eq!(
            dialect.get_tables(conn.as_mut(), &config, Some("sales")).await.unwrap(),
            vec!["orders".to_string()]
        );
        assert_eq!(
            dialect.get_datastores(conn.as_mut(), &config).await.unwrap(),
            vec!["sales".to_string()]
        );
        assert_eq!(
            dialect.get_columns(conn.as_mut(), &config, "people").await.unwrap(),
            vec!["id", "name"]
        );
        assert!(!dialect.can_create_datastore());
        assert!(matches!(
            dialect.create_datastore(conn.as_mut(), &config, "x").await,
            Err(DatastoreError::Unsupported(_))
        ));

        dialect.drop_table(conn.as_mut(), &config, "people").await.unwrap();
        assert!(dialect.get_tables(conn.as_mut(), &config, None).await.unwrap().is_empty());
        dialect.drop_datastore(conn.as_mut(), &config, "sales").await.unwrap();
        assert!(dialect.get_datastores(conn.as_mut(), &config).await.unwrap().is_empty());
    }
}
