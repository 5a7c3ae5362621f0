use std::sync::Arc;

use crate::config::Config;
use crate::dialect::Registry;
use crate::error::DatastoreError;
use crate::pool::PoolOptions;

use super::Manager;

/// Creates managers for configs by looking their driver up in a [`Registry`].
#[derive(Debug, Clone)]
pub struct ManagerFactory {
    registry: Arc<Registry>,
    options: PoolOptions,
}

impl Default for ManagerFactory {
    fn default() -> Self {
        Self::new(Registry::with_defaults())
    }
}

impl ManagerFactory {
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            options: PoolOptions::default(),
        }
    }

    #[must_use]
    pub fn with_pool_options(mut self, options: PoolOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Initialize `config` and build a manager for its driver.
    ///
    /// # Errors
    /// Returns `ConfigError` for an unknown driver or a config that fails to initialize.
    pub async fn create(&self, config: Config) -> Result<Manager, DatastoreError> {
        let entry = self.registry.lookup(&config.driver_name)?;
        Manager::new(config, entry, self.options).await
    }

    /// [`ManagerFactory::create`] from a JSON config document at a path or `file://` URL.
    ///
    /// # Errors
    /// Returns `IoError`/`JsonError` for an unreadable document, otherwise as `create`.
    pub async fn create_from_url(&self, url: &str) -> Result<Manager, DatastoreError> {
        self.create(Config::from_url(url).await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_driver_is_a_config_error() {
        let err = ManagerFactory::default()
            .create(Config::new("nosuchdb", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatastoreError::ConfigError(_)));
    }

    #[tokio::test]
    async fn creates_from_config_document() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("config.json");
        std::fs::write(
            &doc,
            format!(
                r#"{{"driverName": "csv", "descriptor": "[root]/data",
                    "parameters": {{"root": "{}"}},
                    "tables": [{{"table": "events", "pkColumns": ["id"]}}]}}"#,
                dir.path().display()
            ),
        )
        .unwrap();
        let manager = ManagerFactory::default()
            .create_from_url(&format!("file://{}", doc.display()))
            .await
            .unwrap();
        assert_eq!(
            manager.config().descriptor,
            format!("{}/data", dir.path().display())
        );
        assert!(manager.descriptor("events").is_some());
        assert_eq!(manager.dialect().name(), "csv");
    }
}
