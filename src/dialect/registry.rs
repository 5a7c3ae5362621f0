use std::collections::HashMap;
use std::sync::Arc;

use crate::driver::Driver;
use crate::driver::file::{FileDriver, FileFormat};
use crate::error::DatastoreError;

use super::{Dialect, FileDialect};

/// A driver and the dialect describing it.
#[derive(Debug, Clone)]
pub struct DriverEntry {
    pub driver: Arc<dyn Driver>,
    pub dialect: Arc<dyn Dialect>,
}

/// Driver name to [`DriverEntry`] lookup, built at startup and read-only after.
///
/// Names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: HashMap<String, DriverEntry>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `sqlite` (feature gated) and the `ndjson`/`json`, `csv`, `tsv` file engines.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "sqlite")]
        registry.register(
            "sqlite",
            Arc::new(crate::driver::sqlite::SqliteDriver),
            Arc::new(super::SqliteDialect),
        );
        for (name, format) in [
            ("ndjson", FileFormat::Json),
            ("json", FileFormat::Json),
            ("csv", FileFormat::Csv),
            ("tsv", FileFormat::Tsv),
        ] {
            registry.register(
                name,
                Arc::new(FileDriver::new(format)),
                Arc::new(FileDialect::new(format)),
            );
        }
        registry
    }

    /// Add or replace the entry for `name`.
    pub fn register(
        &mut self,
        name: impl AsRef<str>,
        driver: Arc<dyn Driver>,
        dialect: Arc<dyn Dialect>,
    ) -> &mut Self {
        self.entries.insert(
            name.as_ref().to_ascii_lowercase(),
            DriverEntry { driver, dialect },
        );
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DriverEntry> {
        self.entries.get(&name.to_ascii_lowercase())
    }

    /// # Errors
    /// Returns `ConfigError` for an unregistered driver name.
    pub fn lookup(&self, name: &str) -> Result<&DriverEntry, DatastoreError> {
        self.get(name)
            .ok_or_else(|| DatastoreError::ConfigError(format!("unknown driver {name}")))
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
