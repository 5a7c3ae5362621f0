//! Per-driver SQL capabilities: bulk insert strategy, placeholder style,
//! last-insert-id semantics and datastore metadata.

use std::fmt;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::Deserialize;

use crate::config::Config;
use crate::driver::Connection;
use crate::error::DatastoreError;
use crate::translation::PlaceholderStyle;

mod file;
mod generic;
mod registry;
mod reserved;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use file::FileDialect;
pub use generic::GenericDialect;
pub use registry::{DriverEntry, Registry};
pub use reserved::{DEFAULT_RESERVED_KEYWORDS, ReservedQuoter};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDialect;

/// How a batch of INSERTs is combined into fewer statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
#[value(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum BulkInsertStrategy {
    /// One INSERT per record
    SingleRow,
    /// `INSERT INTO t(..) VALUES (..),(..)`
    MultiRowValues,
    /// `INSERT INTO t(..) SELECT .. UNION ALL SELECT ..` with inlined literals
    UnionAll,
    /// `INSERT ALL INTO t(..) VALUES (..) .. SELECT 1 FROM DUAL`
    InsertAll,
    /// Gzipped temp file loaded with `COPY .. FROM LOCAL`
    #[value(alias = "copyLocalInsert")]
    #[serde(alias = "copyLocalInsert", alias = "CopyLocalInsert")]
    CopyLocal,
}

impl BulkInsertStrategy {
    #[must_use]
    pub fn is_batched(self) -> bool {
        self != BulkInsertStrategy::SingleRow
    }
}

impl fmt::Display for BulkInsertStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => write!(f, "{self:?}"),
        }
    }
}

/// Which row a driver's last-insert-id refers to after a multi-row INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastInsertIdKind {
    /// id of the first inserted row (MySQL)
    #[default]
    First,
    /// id of the last inserted row (SQLite)
    Last,
}

impl LastInsertIdKind {
    /// First sequence value of an `inserted`-row batch given the reported id.
    #[must_use]
    pub fn first_sequence(self, reported: i64, inserted: u64) -> i64 {
        match self {
            LastInsertIdKind::First => reported,
            LastInsertIdKind::Last => reported - inserted.saturating_sub(1) as i64,
        }
    }
}

fn unsupported(dialect: &str, op: &str) -> DatastoreError {
    DatastoreError::Unsupported(format!("{op} is not supported by the {dialect} dialect"))
}

/// Driver-specific SQL capabilities.
///
/// Metadata operations run over a connection the caller already holds; the
/// defaults report `Unsupported`.
#[async_trait]
pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn insert_strategy(&self) -> BulkInsertStrategy;

    fn can_persist_batch(&self) -> bool {
        self.insert_strategy().is_batched()
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn last_insert_id_kind(&self) -> LastInsertIdKind {
        LastInsertIdKind::First
    }

    /// Whether `(a, b) IN ((?, ?), ..)` is accepted for composite keys.
    fn supports_tuple_in(&self) -> bool {
        true
    }

    async fn get_datastores(
        &self,
        _conn: &mut dyn Connection,
        _config: &Config,
    ) -> Result<Vec<String>, DatastoreError> {
        Err(unsupported(self.name(), "listing datastores"))
    }

    /// Tables of `datastore`, or of the default datastore when `None`.
    async fn get_tables(
        &self,
        _conn: &mut dyn Connection,
        _config: &Config,
        _datastore: Option<&str>,
    ) -> Result<Vec<String>, DatastoreError> {
        Err(unsupported(self.name(), "listing tables"))
    }

    async fn get_columns(
        &self,
        _conn: &mut dyn Connection,
        _config: &Config,
        _table: &str,
    ) -> Result<Vec<String>, DatastoreError> {
        Err(unsupported(self.name(), "listing columns"))
    }

    /// Current value of the named sequence; 0 when it has not been used.
    async fn get_sequence(
        &self,
        _conn: &mut dyn Connection,
        _config: &Config,
        _name: &str,
    ) -> Result<i64, DatastoreError> {
        Err(unsupported(self.name(), "reading sequences"))
    }

    fn can_create_datastore(&self) -> bool {
        false
    }

    async fn create_datastore(
        &self,
        _conn: &mut dyn Connection,
        _config: &Config,
        _datastore: &str,
    ) -> Result<(), DatastoreError> {
        Err(unsupported(self.name(), "creating datastores"))
    }

    async fn drop_datastore(
        &self,
        _conn: &mut dyn Connection,
        _config: &Config,
        _datastore: &str,
    ) -> Result<(), DatastoreError> {
        Err(unsupported(self.name(), "dropping datastores"))
    }

    async fn drop_table(
        &self,
        _conn: &mut dyn Connection,
        _config: &Config,
        _table: &str,
    ) -> Result<(), DatastoreError> {
        Err(unsupported(self.name(), "dropping tables"))
    }
}
