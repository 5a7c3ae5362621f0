//! File-backed engine: tables are NDJSON/CSV/TSV files under a base directory,
//! queried with the restricted SQL dialect in [`crate::sql`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::{Config, params, url_to_path};
use crate::error::DatastoreError;
use crate::results::ResultSet;
use crate::sql::{SqlKind, parse_dml, parse_query};
use crate::table::dates;
use crate::types::RowValues;

use super::{Connection, Driver, ExecResult};

mod engine;
mod format;
mod storage;

pub use format::{Codec, Decoded, FileFormat, FileRecord};
pub use storage::{LocalStorage, Storage, compress, decompress};

const GZIP: &str = "gzip";

/// Opens [`FileConnection`]s rooted at the config descriptor (a directory path).
#[derive(Debug, Clone)]
pub struct FileDriver {
    format: FileFormat,
    storage: Arc<dyn Storage>,
}

impl FileDriver {
    #[must_use]
    pub fn new(format: FileFormat) -> Self {
        Self {
            format,
            storage: Arc::new(LocalStorage),
        }
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }
}

/// Table layout shared by the file connection and the file dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLayout {
    pub base: PathBuf,
    pub codec: Codec,
    pub gzip: bool,
}

impl FileLayout {
    /// Resolve format (`ext` parameter overrides the driver default), compression
    /// and date layout from `config`.
    ///
    /// # Errors
    /// Returns `ConfigError` for an unknown `ext` or an invalid `dateFormat`.
    pub fn from_config(config: &Config, default_format: FileFormat) -> Result<Self, DatastoreError> {
        let format = match config.param(params::EXT) {
            Some(ext) => FileFormat::from_str(ext.trim(), true)
                .map_err(|e| DatastoreError::ConfigError(format!("invalid ext {ext}: {e}")))?,
            None => default_format,
        };
        let mut codec = Codec::new(format);
        if let Some(date_format) = config.param(params::DATE_FORMAT) {
            let layout = dates::convert_date_format(date_format);
            dates::validate_layout(&layout)?;
            codec = codec.with_date_format(layout);
        }
        let gzip = config
            .param(params::COMPRESSION)
            .is_some_and(|c| c.trim().eq_ignore_ascii_case(GZIP));
        Ok(Self {
            base: url_to_path(&config.descriptor),
            codec,
            gzip,
        })
    }

    /// File extension including the compression suffix.
    #[must_use]
    pub fn extension(&self) -> String {
        if self.gzip {
            format!("{}.gz", self.codec.format.ext())
        } else {
            self.codec.format.ext().to_string()
        }
    }

    /// `<base>/<table>.<ext>`; a `datastore.table` name resolves into the
    /// datastore's subdirectory.
    #[must_use]
    pub fn table_path(&self, table: &str) -> PathBuf {
        let mut path = self.base.clone();
        let mut parts: Vec<&str> = table.split('.').collect();
        let name = parts.pop().unwrap_or(table);
        for part in parts {
            path.push(part);
        }
        path.push(format!("{name}.{}", self.extension()));
        path
    }

    /// Table name for a path produced by [`FileLayout::table_path`].
    #[must_use]
    pub fn table_name(&self, path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        file_name
            .strip_suffix(&format!(".{}", self.extension()))
            .map(str::to_string)
    }
}

#[async_trait]
impl Driver for FileDriver {
    async fn connect(&self, config: &Config) -> Result<Box<dyn Connection>, DatastoreError> {
        let layout = FileLayout::from_config(config, self.format)?;
        if !self.storage.exists(&layout.base).await? {
            self.storage.create_dir(&layout.base).await?;
        }
        debug!(base = %layout.base.display(), ext = %layout.extension(), "opened file connection");
        Ok(Box::new(FileConnection {
            layout,
            storage: Arc::clone(&self.storage),
            append_handles: HashMap::new(),
            closed: false,
        }))
    }
}

/// A session over one base directory. Assumes a single writer per file.
#[derive(Debug)]
pub struct FileConnection {
    layout: FileLayout,
    storage: Arc<dyn Storage>,
    append_handles: HashMap<PathBuf, File>,
    closed: bool,
}

impl FileConnection {
    #[must_use]
    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    fn ensure_open(&self) -> Result<(), DatastoreError> {
        if self.closed {
            Err(DatastoreError::ConnectionError(
                "file connection is closed".into(),
            ))
        } else {
            Ok(())
        }
    }

    async fn load(&self, path: &Path) -> Result<Option<Decoded>, DatastoreError> {
        if !self.storage.exists(path).await? {
            return Ok(None);
        }
        let mut bytes = self.storage.download(path).await?;
        if self.layout.gzip {
            bytes = decompress(&bytes)?;
        }
        let text = String::from_utf8(bytes)
            .map_err(|e| DatastoreError::ExecutionError(format!("{}: {e}", path.display())))?;
        self.layout.codec.decode(&text).map(Some)
    }

    async fn store(&mut self, path: &Path, decoded: &Decoded) -> Result<(), DatastoreError> {
        self.append_handles.remove(path);
        let body = self.layout.codec.encode_all(decoded)?.into_bytes();
        let body = if self.layout.gzip { compress(&body)? } else { body };
        self.storage.upload(path, &body).await
    }

    async fn append(&mut self, path: &Path, text: String) -> Result<(), DatastoreError> {
        let bytes = if self.layout.gzip {
            compress(text.as_bytes())?
        } else {
            text.into_bytes()
        };
        if !self.append_handles.contains_key(path) {
            let handle = self.storage.open_append(path).await?;
            self.append_handles.insert(path.to_path_buf(), handle);
        }
        if let Some(handle) = self.append_handles.get_mut(path) {
            handle.write_all(&bytes).await?;
            handle.flush().await?;
        }
        Ok(())
    }

    async fn insert(&mut self, path: &Path, record: FileRecord) -> Result<(), DatastoreError> {
        let codec = self.layout.codec.clone();
        if !codec.format.has_header() {
            let line = codec.encode_record(&[], &record)?;
            return self.append(path, format!("{line}\n")).await;
        }
        let names: Vec<String> = record.iter().map(|(k, _)| k.clone()).collect();
        match self.load(path).await? {
            None => {
                let mut text = codec.encode_header(&names).unwrap_or_default();
                text.push('\n');
                text.push_str(&codec.encode_record(&names, &record)?);
                text.push('\n');
                self.append(path, text).await
            }
            Some(mut decoded) => {
                if decoded.extend_columns(names.iter()) {
                    // new columns widen the header, so the whole file is rewritten
                    decoded.records.push(record);
                    return self.store(path, &decoded).await;
                }
                let line = codec.encode_record(&decoded.columns, &record)?;
                self.append(path, format!("{line}\n")).await
            }
        }
    }
}

#[async_trait]
impl Connection for FileConnection {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, DatastoreError> {
        self.ensure_open()?;
        let statement = parse_dml(sql)?;
        let path = self.layout.table_path(statement.table());
        let rows_affected = match statement.kind {
            SqlKind::Insert => {
                let record = engine::insert_record(&statement, params)?;
                self.insert(&path, record).await?;
                1
            }
            SqlKind::Update | SqlKind::Delete => {
                let Some(mut decoded) = self.load(&path).await? else {
                    return Ok(ExecResult::default());
                };
                let changed = if statement.kind == SqlKind::Update {
                    engine::update(&statement, &mut decoded, params)?
                } else {
                    engine::delete(&statement, &mut decoded, params)?
                };
                if changed > 0 {
                    self.store(&path, &decoded).await?;
                }
                changed
            }
        };
        Ok(ExecResult::new(rows_affected, None))
    }

    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DatastoreError> {
        self.ensure_open()?;
        let query = parse_query(sql)?;
        let path = self.layout.table_path(query.table());
        let decoded = self.load(&path).await?.unwrap_or_default();
        engine::select(&query, &decoded, params)
    }

    async fn begin(&mut self) -> Result<(), DatastoreError> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DatastoreError> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatastoreError> {
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    fn in_transaction(&self) -> bool {
        false
    }

    async fn ping(&mut self) -> Result<(), DatastoreError> {
        self.ensure_open()?;
        if self.storage.exists(&self.layout.base).await? {
            Ok(())
        } else {
            Err(DatastoreError::ConnectionError(format!(
                "base directory {} is gone",
                self.layout.base.display()
            )))
        }
    }

    async fn close(&mut self) -> Result<(), DatastoreError> {
        self.append_handles.clear();
        self.closed = true;
        Ok(())
    }

    fn on_release(&mut self) {
        if !self.append_handles.is_empty() {
            debug!(handles = self.append_handles.len(), "closing append handles");
        }
        self.append_handles.clear();
    }
}

impl Drop for FileConnection {
    fn drop(&mut self) {
        if !self.closed && !self.append_handles.is_empty() {
            warn!(
                base = %self.layout.base.display(),
                "file connection dropped with open append handles"
            );
        }
    }
}
