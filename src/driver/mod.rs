//! Uniform driver contract consumed by the pool and the manager.

use std::fmt;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::DatastoreError;
use crate::results::ResultSet;
use crate::types::RowValues;

pub mod file;
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Outcome of a non-query statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Driver-reported id of the (last or first, per dialect) inserted row.
    pub last_insert_id: Option<i64>,
}

impl ExecResult {
    #[must_use]
    pub fn new(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
        }
    }
}

/// A session with an underlying datastore.
///
/// Operations on one connection are serialized by `&mut self`.
#[async_trait]
pub trait Connection: Send + fmt::Debug {
    /// Run a parameterized statement.
    async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, DatastoreError>;

    /// Run a parameterized query and buffer its rows.
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DatastoreError>;

    async fn begin(&mut self) -> Result<(), DatastoreError>;

    async fn commit(&mut self) -> Result<(), DatastoreError>;

    async fn rollback(&mut self) -> Result<(), DatastoreError>;

    /// `false` turns begin/commit/rollback into no-ops for callers.
    fn supports_transactions(&self) -> bool;

    fn in_transaction(&self) -> bool;

    /// Liveness probe used for connections idle past the pool threshold.
    async fn ping(&mut self) -> Result<(), DatastoreError>;

    async fn close(&mut self) -> Result<(), DatastoreError>;

    /// Release per-use resources (open file handles) when returned to the pool.
    fn on_release(&mut self) {}
}

/// Opens sessions from an initialized [`Config`].
#[async_trait]
pub trait Driver: Send + Sync + fmt::Debug {
    async fn connect(&self, config: &Config) -> Result<Box<dyn Connection>, DatastoreError>;
}

/// Stand-in left behind when a pooled connection hands its session back.
#[derive(Debug, Default)]
pub(crate) struct Detached;

fn detached() -> DatastoreError {
    DatastoreError::ConnectionError("connection already released".into())
}

#[async_trait]
impl Connection for Detached {
    async fn execute(&mut self, _: &str, _: &[RowValues]) -> Result<ExecResult, DatastoreError> {
        Err(detached())
    }

    async fn query(&mut self, _: &str, _: &[RowValues]) -> Result<ResultSet, DatastoreError> {
        Err(detached())
    }

    async fn begin(&mut self) -> Result<(), DatastoreError> {
        Err(detached())
    }

    async fn commit(&mut self) -> Result<(), DatastoreError> {
        Err(detached())
    }

    async fn rollback(&mut self) -> Result<(), DatastoreError> {
        Err(detached())
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    fn in_transaction(&self) -> bool {
        false
    }

    async fn ping(&mut self) -> Result<(), DatastoreError> {
        Err(detached())
    }

    async fn close(&mut self) -> Result<(), DatastoreError> {
        Ok(())
    }
}
