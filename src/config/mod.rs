//! Datastore configuration: driver name, connection descriptor template,
//! parameters and pool sizing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Deserialize;

use crate::dialect::BulkInsertStrategy;
use crate::error::DatastoreError;

mod macros;

pub use macros::expand_macros;

/// Parameter names recognized by the manager and drivers.
pub mod params {
    pub const BATCH_SIZE: &str = "batchSize";
    pub const INSERT_STRATEGY: &str = "insertStrategy";
    pub const MAX_REQUEST_PER_SECOND: &str = "maxRequestPerSecond";
    pub const QUOTE_RESERVED_IDENTIFIERS: &str = "quoteReservedIdentifiers";
    pub const RESERVED_KEYWORDS: &str = "reservedKeywords";
    pub const EXT: &str = "ext";
    pub const COMPRESSION: &str = "compression";
    pub const DATE_FORMAT: &str = "dateFormat";
}

pub const DEFAULT_BATCH_SIZE: usize = 200;
const DEFAULT_POOL_SIZE: usize = 1;
const DEFAULT_MAX_POOL_SIZE: usize = 2;

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_max_pool_size() -> usize {
    DEFAULT_MAX_POOL_SIZE
}

/// Pre-registered table descriptor as found in a config document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    pub table: String,
    #[serde(default)]
    pub autoincrement: bool,
    #[serde(default)]
    pub pk_columns: Vec<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub order_columns: Vec<String>,
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
    #[serde(default, rename = "schemaURL")]
    pub schema_url: Option<String>,
    #[serde(default)]
    pub from_query: Option<String>,
    #[serde(default)]
    pub from_query_alias: Option<String>,
}

/// Datastore configuration.
///
/// Build it in code or load it from a JSON document, then call [`Config::init`]
/// (done by the manager factory) to resolve secrets and `[name]` macros before
/// any connection opens:
/// ```rust
/// use datastore_middleware::prelude::*;
///
/// let config = Config::new("sqlite", "[dir]/app.db")
///     .with_param("dir", "/tmp")
///     .with_pool_size(2, 4);
/// # let _ = config;
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub driver_name: String,
    pub descriptor: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    #[serde(default, rename = "secretParametersURL")]
    pub secret_parameters_url: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
    #[serde(skip)]
    initialized: bool,
}

impl Config {
    #[must_use]
    pub fn new(driver_name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            driver_name: driver_name.into(),
            descriptor: descriptor.into(),
            parameters: HashMap::new(),
            pool_size: DEFAULT_POOL_SIZE,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            secret_parameters_url: None,
            tables: Vec::new(),
            initialized: false,
        }
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize, max_pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self.max_pool_size = max_pool_size;
        self
    }

    #[must_use]
    pub fn with_secret_parameters_url(mut self, url: impl Into<String>) -> Self {
        self.secret_parameters_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: TableConfig) -> Self {
        self.tables.push(table);
        self
    }

    /// Parse a JSON config document.
    ///
    /// # Errors
    /// Returns `JsonError` if the document is malformed.
    pub fn from_json(document: &str) -> Result<Self, DatastoreError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Load a JSON config document from a local path or `file://` URL.
    ///
    /// # Errors
    /// Returns `IoError` if the document cannot be read, `JsonError` if malformed.
    pub async fn from_url(url: &str) -> Result<Self, DatastoreError> {
        let body = tokio::fs::read_to_string(url_to_path(url)).await?;
        Self::from_json(&body)
    }

    /// Resolve secrets and expand descriptor macros. Idempotent.
    ///
    /// # Errors
    /// Returns `ConfigError` for unresolved macros or an unreadable secret or
    /// table schema document.
    pub async fn init(&mut self) -> Result<(), DatastoreError> {
        if self.initialized {
            return Ok(());
        }
        if let Some(url) = &self.secret_parameters_url {
            let secrets = load_secrets(url).await?;
            self.parameters.extend(secrets);
        }
        for table in &mut self.tables {
            if table.schema.is_none()
                && let Some(url) = &table.schema_url
            {
                table.schema = Some(load_schema(url).await?);
            }
        }
        self.descriptor = expand_macros(&self.descriptor, &self.parameters)?;
        if self.max_pool_size < self.pool_size {
            self.max_pool_size = self.pool_size;
        }
        if self.max_pool_size == 0 {
            return Err(DatastoreError::ConfigError(
                "maxPoolSize must be at least 1".into(),
            ));
        }
        self.initialized = true;
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Required parameter.
    ///
    /// # Errors
    /// Returns `ConfigError` when the parameter is missing.
    pub fn required_param(&self, name: &str) -> Result<&str, DatastoreError> {
        self.param(name)
            .ok_or_else(|| DatastoreError::ConfigError(format!("missing parameter {name}")))
    }

    /// Rows per bulk insert batch; `batchSize` parameter or 200.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.param(params::BATCH_SIZE)
            .and_then(|v| v.trim().parse().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_BATCH_SIZE)
    }

    /// Bulk strategy override from the `insertStrategy` parameter.
    ///
    /// # Errors
    /// Returns `ConfigError` for an unknown strategy name.
    pub fn insert_strategy(&self) -> Result<Option<BulkInsertStrategy>, DatastoreError> {
        self.param(params::INSERT_STRATEGY)
            .map(|name| {
                BulkInsertStrategy::from_str(name.trim(), true).map_err(|e| {
                    DatastoreError::ConfigError(format!("invalid insertStrategy {name}: {e}"))
                })
            })
            .transpose()
    }

    #[must_use]
    pub fn max_requests_per_second(&self) -> Option<u64> {
        self.param(params::MAX_REQUEST_PER_SECOND)
            .and_then(|v| v.trim().parse().ok())
            .filter(|max| *max > 0)
    }

    #[must_use]
    pub fn quote_reserved_identifiers(&self) -> bool {
        self.param(params::QUOTE_RESERVED_IDENTIFIERS)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// Keyword set override from the comma separated `reservedKeywords` parameter.
    #[must_use]
    pub fn reserved_keywords(&self) -> Option<Vec<String>> {
        self.param(params::RESERVED_KEYWORDS).map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

/// Strip a `file://` scheme; anything else is treated as a local path.
pub(crate) fn url_to_path(url: &str) -> PathBuf {
    Path::new(url.strip_prefix("file://").unwrap_or(url)).to_path_buf()
}

async fn load_schema(url: &str) -> Result<serde_json::Value, DatastoreError> {
    let body = tokio::fs::read_to_string(url_to_path(url))
        .await
        .map_err(|e| DatastoreError::ConfigError(format!("failed to load schema {url}: {e}")))?;
    serde_json::from_str(&body)
        .map_err(|e| DatastoreError::ConfigError(format!("invalid schema document {url}: {e}")))
}

async fn load_secrets(url: &str) -> Result<HashMap<String, String>, DatastoreError> {
    let body = tokio::fs::read_to_string(url_to_path(url))
        .await
        .map_err(|e| DatastoreError::ConfigError(format!("failed to load secrets {url}: {e}")))?;
    let document: HashMap<String, serde_json::Value> = serde_json::from_str(&body)
        .map_err(|e| DatastoreError::ConfigError(format!("invalid secrets document {url}: {e}")))?;
    Ok(document
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_document() {
        let config = Config::from_json(
            r#"{
                "driverName": "sqlite",
                "descriptor": "[dir]/x.db",
                "parameters": {"dir": "/tmp", "batchSize": "50", "insertStrategy": "unionAll"},
                "poolSize": 3,
                "tables": [{"table": "users", "pkColumns": ["id"], "autoincrement": true}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.driver_name, "sqlite");
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.max_pool_size, DEFAULT_MAX_POOL_SIZE);
        assert_eq!(config.batch_size(), 50);
        assert_eq!(
            config.insert_strategy().unwrap(),
            Some(BulkInsertStrategy::UnionAll)
        );
        assert_eq!(config.tables[0].pk_columns, vec!["id".to_string()]);
    }

    #[test]
    fn defaults_apply_without_parameters() {
        let config = Config::new("ndjson", "/tmp");
        assert_eq!(config.batch_size(), DEFAULT_BATCH_SIZE);
        assert!(config.insert_strategy().unwrap().is_none());
        assert!(!config.quote_reserved_identifiers());
        assert!(config.max_requests_per_second().is_none());
    }

    #[test]
    fn rejects_unknown_strategy() {
        let config = Config::new("x", "y").with_param(params::INSERT_STRATEGY, "bogus");
        assert!(matches!(
            config.insert_strategy(),
            Err(DatastoreError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn init_expands_macros_and_raises_max_pool() {
        let mut config = Config::new("sqlite", "[dir]/[name].db")
            .with_param("dir", "/data")
            .with_param("name", "app")
            .with_pool_size(4, 2);
        config.init().await.unwrap();
        assert_eq!(config.descriptor, "/data/app.db");
        assert_eq!(config.max_pool_size, 4);
        assert!(config.is_initialized());
    }

    #[tokio::test]
    async fn secrets_are_merged_before_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = dir.path().join("secrets.json");
        std::fs::write(&secrets, r#"{"password": "s3cret", "port": 5432}"#).unwrap();
        let mut config = Config::new("pg", "user:[password]@host:[port]")
            .with_secret_parameters_url(format!("file://{}", secrets.display()));
        config.init().await.unwrap();
        assert_eq!(config.descriptor, "user:s3cret@host:5432");
    }

    #[tokio::test]
    async fn unresolved_macro_is_a_config_error() {
        let mut config = Config::new("sqlite", "[missing].db");
        let err = config.init().await.unwrap_err();
        assert!(matches!(err, DatastoreError::ConfigError(_)));
    }

    #[tokio::test]
    async fn table_schemas_are_loaded_from_url() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("events.schema.json");
        std::fs::write(&schema, r#"{"columns": [{"name": "id"}, {"name": "kind"}]}"#).unwrap();
        let mut config = Config::new("ndjson", "/data").with_table(TableConfig {
            table: "events".into(),
            schema_url: Some(schema.display().to_string()),
            ..TableConfig::default()
        });
        config.init().await.unwrap();
        assert_eq!(
            config.tables[0].schema,
            Some(serde_json::json!({"columns": [{"name": "id"}, {"name": "kind"}]}))
        );

        let mut missing = Config::new("ndjson", "/data").with_table(TableConfig {
            table: "events".into(),
            schema_url: Some(dir.path().join("nope.json").display().to_string()),
            ..TableConfig::default()
        });
        assert!(matches!(
            missing.init().await,
            Err(DatastoreError::ConfigError(_))
        ));
    }
}
