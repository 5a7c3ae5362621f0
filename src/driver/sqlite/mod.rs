//! rusqlite driver. Blocking calls run on tokio's blocking pool.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{Config, url_to_path};
use crate::error::DatastoreError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::{Connection, Driver, ExecResult};

mod params;
mod query;

pub use params::{Params, row_value_to_sqlite_value};
pub use query::{build_result_set, sqlite_extract_value_sync};

pub(crate) type SharedSqliteConnection = Arc<tokio::sync::Mutex<rusqlite::Connection>>;

const MEMORY: &str = ":memory:";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

/// Opens file-backed (WAL) or in-memory `SQLite` databases; the descriptor is the path.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

#[async_trait]
impl Driver for SqliteDriver {
    async fn connect(&self, config: &Config) -> Result<Box<dyn Connection>, DatastoreError> {
        let path = url_to_path(&config.descriptor);
        let in_memory = config.descriptor == MEMORY;
        let conn = tokio::task::spawn_blocking(move || -> Result<_, DatastoreError> {
            let conn = if in_memory {
                rusqlite::Connection::open_in_memory()?
            } else {
                rusqlite::Connection::open(&path)?
            };
            conn.busy_timeout(BUSY_TIMEOUT)?;
            if !in_memory {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| {
            DatastoreError::ConnectionError(format!("sqlite spawn_blocking join error: {e}"))
        })??;
        debug!(descriptor = %config.descriptor, "opened sqlite connection");
        Ok(Box::new(SqliteConnection::new(conn)))
    }
}

/// A single rusqlite session.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: SharedSqliteConnection,
    in_transaction: bool,
    closed: bool,
}

impl SqliteConnection {
    #[must_use]
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Arc::new(tokio::sync::Mutex::new(conn)),
            in_transaction: false,
            closed: false,
        }
    }

    fn handle(&self) -> Result<SharedSqliteConnection, DatastoreError> {
        if self.closed {
            return Err(DatastoreError::ConnectionError(
                "sqlite connection is closed".into(),
            ));
        }
        Ok(Arc::clone(&self.conn))
    }

    /// Run arbitrary work against the underlying rusqlite connection.
    ///
    /// # Errors
    /// Returns the closure's error, or `ConnectionError` once closed.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, DatastoreError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, DatastoreError> + Send + 'static,
        R: Send + 'static,
    {
        run_blocking(self.handle()?, func).await
    }
}

pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, DatastoreError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, DatastoreError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| DatastoreError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}

fn rollback_with_busy_retries(conn: &mut rusqlite::Connection) -> Result<(), DatastoreError> {
    for (idx, delay) in ROLLBACK_BUSY_RETRIES.iter().copied().enumerate() {
        match conn.execute_batch("ROLLBACK") {
            Ok(()) => return Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    && idx + 1 < ROLLBACK_BUSY_RETRIES.len() =>
            {
                thread::sleep(delay);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(DatastoreError::TransactionError(
        "rollback retries exhausted".into(),
    ))
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, DatastoreError> {
        let sql = sql.to_owned();
        let params = Params::convert(params);
        run_blocking(self.handle()?, move |guard| {
            let rows = {
                let mut stmt = guard.prepare_cached(&sql)?;
                stmt.execute(&params.as_refs()[..])?
            };
            let last_insert_id = (rows > 0).then(|| guard.last_insert_rowid());
            Ok(ExecResult::new(rows as u64, last_insert_id))
        })
        .await
    }

    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DatastoreError> {
        let sql = sql.to_owned();
        let params = Params::convert(params);
        run_blocking(self.handle()?, move |guard| {
            let mut stmt = guard.prepare_cached(&sql)?;
            build_result_set(&mut stmt, &params)
        })
        .await
    }

    async fn begin(&mut self) -> Result<(), DatastoreError> {
        if self.in_transaction {
            return Err(DatastoreError::TransactionError(
                "SQLite transaction already in progress".into(),
            ));
        }
        run_blocking(self.handle()?, |guard| Ok(guard.execute_batch("BEGIN")?)).await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DatastoreError> {
        if !self.in_transaction {
            return Err(DatastoreError::TransactionError(
                "SQLite transaction not active".into(),
            ));
        }
        run_blocking(self.handle()?, |guard| Ok(guard.execute_batch("COMMIT")?)).await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatastoreError> {
        if !self.in_transaction {
            return Err(DatastoreError::TransactionError(
                "SQLite transaction not active".into(),
            ));
        }
        let result = run_blocking(self.handle()?, rollback_with_busy_retries).await;
        if result.is_ok() {
            self.in_transaction = false;
        }
        result
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn ping(&mut self) -> Result<(), DatastoreError> {
        run_blocking(self.handle()?, |guard| {
            guard.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn close(&mut self) -> Result<(), DatastoreError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_reports_rows_and_rowid() {
        let config = Config::new("sqlite", MEMORY);
        let mut conn = SqliteDriver.connect(&config).await.unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT)", &[])
            .await
            .unwrap();
        let res = conn
            .execute("INSERT INTO t (v) VALUES (?), (?)", &["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(res.rows_affected, 2);
        assert_eq!(res.last_insert_id, Some(2));

        let rs = conn
            .query("SELECT id, v FROM t WHERE id = ?", &[RowValues::Int(1)])
            .await
            .unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.results[0].get("v"), Some(&RowValues::Text("a".into())));
    }

    #[tokio::test]
    async fn rollback_discards_work_and_close_blocks_use() {
        let config = Config::new("sqlite", MEMORY);
        let mut conn = SqliteDriver.connect(&config).await.unwrap();
        conn.execute("CREATE TABLE t (v INTEGER)", &[]).await.unwrap();
        conn.begin().await.unwrap();
        assert!(conn.in_transaction());
        conn.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        conn.rollback().await.unwrap();
        let rs = conn.query("SELECT v FROM t", &[]).await.unwrap();
        assert!(rs.is_empty());
        assert!(conn.commit().await.is_err());

        conn.ping().await.unwrap();
        conn.close().await.unwrap();
        assert!(matches!(
            conn.ping().await,
            Err(DatastoreError::ConnectionError(_))
        ));
    }
}
