//! The datastore manager: statement execution, reads through mappers, and
//! record persistence inside a transaction bracket.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::dialect::{BulkInsertStrategy, Dialect, DriverEntry, ReservedQuoter};
use crate::driver::{Connection, ExecResult};
use crate::error::DatastoreError;
use crate::mapper::{ColumnarRecordMapper, MapRecordMapper, MetadataRecordMapper, RecordMapper, Scanner};
use crate::pool::{ConnectionProvider, PoolOptions, PoolStatus, PooledConnection};
use crate::rate_limiter::RateLimiter;
use crate::results::ResultSet;
use crate::sql::SqlKind;
use crate::table::{
    DescriptorRegistry, DmlProvider, MetadataDmlProvider, ParametrizedSql, Record, TableDescriptor,
};
use crate::translation::normalize_placeholders;
use crate::types::RowValues;

pub mod bulk;
mod factory;
mod persist;
mod tx;

pub use factory::ManagerFactory;

/// Settings shared by every statement a manager sends.
#[derive(Debug)]
pub(crate) struct Context {
    config: Arc<Config>,
    dialect: Arc<dyn Dialect>,
    limiter: Option<RateLimiter>,
    quoter: Option<ReservedQuoter>,
    batch_size: usize,
    strategy: BulkInsertStrategy,
}

/// One connection plus the manager context; every statement goes through here.
pub(crate) struct Session<'a> {
    conn: &'a mut dyn Connection,
    ctx: &'a Context,
}

impl<'a> Session<'a> {
    fn new(conn: &'a mut dyn Connection, ctx: &'a Context) -> Self {
        Self { conn, ctx }
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.ctx.limiter {
            limiter.acquire().await;
        }
    }

    pub(crate) async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, DatastoreError> {
        let sql = normalize_placeholders(sql, self.ctx.dialect.placeholder_style());
        self.throttle().await;
        debug!(sql = %sql, params = params.len(), "execute");
        self.conn
            .execute(&sql, params)
            .await
            .map_err(|e| e.with_statement(&sql, params))
    }

    pub(crate) async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, DatastoreError> {
        let sql = normalize_placeholders(sql, self.ctx.dialect.placeholder_style());
        self.throttle().await;
        debug!(sql = %sql, params = params.len(), "query");
        self.conn
            .query(&sql, params)
            .await
            .map_err(|e| e.with_statement(&sql, params))
    }

    pub(crate) fn dialect(&self) -> &dyn Dialect {
        self.ctx.dialect.as_ref()
    }

    pub(crate) fn insert_strategy(&self) -> BulkInsertStrategy {
        self.ctx.strategy
    }

    pub(crate) fn batch_size(&self) -> usize {
        self.ctx.batch_size
    }

    pub(crate) fn quote<'s>(&self, identifier: &'s str) -> Cow<'s, str> {
        match &self.ctx.quoter {
            Some(quoter) => quoter.quote(identifier),
            None => Cow::Borrowed(identifier),
        }
    }
}

/// Reads and writes one datastore through a pooled driver.
///
/// ```rust,no_run
/// use datastore_middleware::prelude::*;
///
/// # async fn run() -> Result<(), DatastoreError> {
/// let manager = ManagerFactory::default()
///     .create(Config::new("sqlite", "/tmp/app.db"))
///     .await?;
/// manager
///     .execute("CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT)", &[])
///     .await?;
/// let rows = manager.read_all_maps("SELECT id, name FROM users", &[]).await?;
/// # let _ = rows;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Manager {
    ctx: Context,
    pool: ConnectionProvider,
    descriptors: DescriptorRegistry,
}

impl Manager {
    /// Build a manager for `config` over the driver and dialect in `entry`.
    ///
    /// # Errors
    /// Returns `ConfigError` when the config cannot be initialized or names an
    /// unknown insert strategy.
    pub async fn new(
        mut config: Config,
        entry: &DriverEntry,
        options: PoolOptions,
    ) -> Result<Self, DatastoreError> {
        config.init().await?;
        let strategy = config
            .insert_strategy()?
            .unwrap_or_else(|| entry.dialect.insert_strategy());
        let descriptors = DescriptorRegistry::new();
        for table in &config.tables {
            descriptors.register(TableDescriptor::from_config(table));
        }
        let ctx = Context {
            limiter: config.max_requests_per_second().map(RateLimiter::per_second),
            quoter: ReservedQuoter::from_config(&config),
            batch_size: config.batch_size(),
            strategy,
            dialect: Arc::clone(&entry.dialect),
            config: Arc::new(config),
        };
        let pool = ConnectionProvider::new(
            Arc::clone(&entry.driver),
            Arc::clone(&ctx.config),
            options,
        );
        info!(
            driver = %ctx.config.driver_name,
            dialect = entry.dialect.name(),
            strategy = %ctx.strategy,
            batch_size = ctx.batch_size,
            "datastore manager created"
        );
        Ok(Self {
            ctx,
            pool,
            descriptors,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.ctx.config
    }

    #[must_use]
    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.ctx.dialect
    }

    /// Check a connection out of the pool; release it when done.
    ///
    /// # Errors
    /// Returns the pool's error when no connection can be opened.
    pub async fn connection(&self) -> Result<PooledConnection, DatastoreError> {
        self.pool.get().await
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Close idle connections and refuse further checkouts.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn register_descriptor(&self, descriptor: TableDescriptor) -> Arc<TableDescriptor> {
        self.descriptors.register(descriptor)
    }

    #[must_use]
    pub fn descriptor(&self, table: &str) -> Option<Arc<TableDescriptor>> {
        self.descriptors.get(table)
    }

    fn session<'a>(&'a self, conn: &'a mut PooledConnection) -> Session<'a> {
        Session::new(&mut **conn, &self.ctx)
    }

    /// # Errors
    /// Returns the driver error wrapped with the statement.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, DatastoreError> {
        let mut conn = self.pool.get().await?;
        let result = self.execute_on_connection(&mut conn, sql, params).await;
        conn.release().await;
        result
    }

    /// # Errors
    /// Returns the driver error wrapped with the statement.
    pub async fn execute_on_connection(
        &self,
        conn: &mut PooledConnection,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, DatastoreError> {
        self.session(conn).execute(sql, params).await
    }

    /// Run `statements` in order on one connection inside a transaction;
    /// returns the total rows affected.
    ///
    /// # Errors
    /// Returns the first failing statement's error after rolling back.
    pub async fn execute_all(&self, statements: &[ParametrizedSql]) -> Result<u64, DatastoreError> {
        let mut conn = self.pool.get().await?;
        let result = match tx::begin(&mut *conn).await {
            Ok(started) => {
                let mut session = self.session(&mut conn);
                let mut affected = 0;
                let mut work = Ok(());
                for statement in statements {
                    match session.execute(&statement.sql, &statement.values).await {
                        Ok(result) => affected += result.rows_affected,
                        Err(e) => {
                            work = Err(e);
                            break;
                        }
                    }
                }
                tx::finish(&mut *conn, started, work.map(|()| affected)).await
            }
            Err(e) => Err(e),
        };
        conn.release().await;
        result
    }

    /// Run `sql` and hand every row to `handler` until it returns `false`.
    ///
    /// # Errors
    /// Returns the driver error, or the first error from `handler`.
    pub async fn read_all_with_handler<H>(
        &self,
        sql: &str,
        params: &[RowValues],
        handler: H,
    ) -> Result<(), DatastoreError>
    where
        H: FnMut(&dyn Scanner) -> Result<bool, DatastoreError> + Send,
    {
        let mut conn = self.pool.get().await?;
        let result = self
            .read_all_on_connection_with_handler(&mut conn, sql, params, handler)
            .await;
        conn.release().await;
        result
    }

    /// [`Manager::read_all_with_handler`] on a connection the caller holds.
    ///
    /// # Errors
    /// Returns the driver error, or the first error from `handler`.
    pub async fn read_all_on_connection_with_handler<H>(
        &self,
        conn: &mut PooledConnection,
        sql: &str,
        params: &[RowValues],
        mut handler: H,
    ) -> Result<(), DatastoreError>
    where
        H: FnMut(&dyn Scanner) -> Result<bool, DatastoreError> + Send,
    {
        let rows = self.session(conn).query(sql, params).await?;
        for row in &rows.results {
            if !handler(row)? {
                break;
            }
        }
        Ok(())
    }

    /// Map every row with `mapper`.
    ///
    /// # Errors
    /// Returns the driver or mapping error.
    pub async fn read_all_with_mapper<T: Send>(
        &self,
        sql: &str,
        params: &[RowValues],
        mapper: &dyn RecordMapper<T>,
    ) -> Result<Vec<T>, DatastoreError> {
        let mut out = Vec::new();
        self.read_all_with_handler(sql, params, |scanner| {
            out.push(mapper.map(scanner)?);
            Ok(true)
        })
        .await?;
        Ok(out)
    }

    /// First row mapped with `mapper`, if any.
    ///
    /// # Errors
    /// Returns the driver or mapping error.
    pub async fn read_single_with_mapper<T: Send>(
        &self,
        sql: &str,
        params: &[RowValues],
        mapper: &dyn RecordMapper<T>,
    ) -> Result<Option<T>, DatastoreError> {
        let mut out = None;
        self.read_all_with_handler(sql, params, |scanner| {
            out = Some(mapper.map(scanner)?);
            Ok(false)
        })
        .await?;
        Ok(out)
    }

    /// Rows mapped onto `T` by column name.
    ///
    /// # Errors
    /// Returns the driver or mapping error.
    pub async fn read_all<T: Record + Default>(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Vec<T>, DatastoreError> {
        self.read_all_with_mapper(sql, params, &MetadataRecordMapper::<T>::new())
            .await
    }

    /// # Errors
    /// Returns the driver or mapping error.
    pub async fn read_single<T: Record + Default>(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Option<T>, DatastoreError> {
        self.read_single_with_mapper(sql, params, &MetadataRecordMapper::<T>::new())
            .await
    }

    /// # Errors
    /// Returns the driver error.
    pub async fn read_all_maps(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Vec<HashMap<String, RowValues>>, DatastoreError> {
        self.read_all_with_mapper(sql, params, &MapRecordMapper).await
    }

    /// # Errors
    /// Returns the driver error.
    pub async fn read_single_map(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Option<HashMap<String, RowValues>>, DatastoreError> {
        self.read_single_with_mapper(sql, params, &MapRecordMapper).await
    }

    /// # Errors
    /// Returns the driver error.
    pub async fn read_all_rows(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Vec<Vec<RowValues>>, DatastoreError> {
        self.read_all_with_mapper(sql, params, &ColumnarRecordMapper)
            .await
    }

    /// # Errors
    /// Returns the driver error.
    pub async fn read_single_row(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Option<Vec<RowValues>>, DatastoreError> {
        self.read_single_with_mapper(sql, params, &ColumnarRecordMapper)
            .await
    }

    /// Every row of `table`, through its `fromQuery` when the descriptor has one.
    ///
    /// # Errors
    /// Returns the driver or mapping error.
    pub async fn read_table<T: Record + Default>(
        &self,
        table: &str,
    ) -> Result<Vec<T>, DatastoreError> {
        let descriptor = self.descriptor_for::<T>(table);
        let sql = descriptor.select_sql(self.ctx.quoter.as_ref());
        self.read_all(&sql, &[]).await
    }

    fn descriptor_for<T: Record>(&self, table: &str) -> Arc<TableDescriptor> {
        self.descriptors
            .get_or_register(table, || TableDescriptor::for_record::<T>(table))
    }

    /// Metadata provider for `T` over the registered (or derived) descriptor of `table`.
    #[must_use]
    pub fn provider<T: Record>(&self, table: &str) -> MetadataDmlProvider<T> {
        MetadataDmlProvider::new(self.descriptor_for::<T>(table), self.ctx.quoter.as_ref())
    }

    /// Insert or update one record; returns `(inserted, updated)`.
    ///
    /// # Errors
    /// See [`Manager::persist_all`].
    pub async fn persist_single<T: Record>(
        &self,
        item: &mut T,
        table: &str,
    ) -> Result<(u64, u64), DatastoreError> {
        self.persist_all(std::slice::from_mut(item), table).await
    }

    /// Insert new records and update existing ones in one transaction.
    ///
    /// Autoincrement keys assigned by the datastore are written back into `items`.
    ///
    /// # Errors
    /// Returns the first classification, insert or update error after rolling back.
    pub async fn persist_all<T: Record>(
        &self,
        items: &mut [T],
        table: &str,
    ) -> Result<(u64, u64), DatastoreError> {
        let provider = self.provider::<T>(table);
        self.persist_all_with_provider(items, &provider).await
    }

    /// # Errors
    /// Returns the first classification, insert or update error after rolling back.
    pub async fn persist_all_with_provider<T: Send + Sync>(
        &self,
        items: &mut [T],
        provider: &dyn DmlProvider<T>,
    ) -> Result<(u64, u64), DatastoreError> {
        if items.is_empty() {
            return Ok((0, 0));
        }
        let mut conn = self.pool.get().await?;
        let result = self
            .persist_all_on_connection(&mut conn, items, provider)
            .await;
        conn.release().await;
        result
    }

    /// Persist on a connection the caller holds. A transaction already open on
    /// `conn` is left for the caller to finish; otherwise one is opened here.
    ///
    /// # Errors
    /// Returns the first classification, insert or update error.
    pub async fn persist_all_on_connection<T: Send + Sync>(
        &self,
        conn: &mut PooledConnection,
        items: &mut [T],
        provider: &dyn DmlProvider<T>,
    ) -> Result<(u64, u64), DatastoreError> {
        if items.is_empty() {
            return Ok((0, 0));
        }
        let started = if conn.in_transaction() {
            false
        } else {
            tx::begin(&mut **conn).await?
        };
        let result = persist::persist(&mut self.session(conn), provider, items).await;
        let result = tx::finish(&mut **conn, started, result).await;
        if let Ok((inserted, updated)) = result {
            debug!(table = %provider.descriptor().table, inserted, updated, "persisted");
        }
        result
    }

    /// # Errors
    /// See [`Manager::delete_all`].
    pub async fn delete_single<T: Record>(
        &self,
        item: &T,
        table: &str,
    ) -> Result<u64, DatastoreError> {
        self.delete_all(std::slice::from_ref(item), table).await
    }

    /// Delete records by primary key in one transaction; returns rows deleted.
    ///
    /// # Errors
    /// Returns `ConfigError` when the table has no key columns, or the driver error.
    pub async fn delete_all<T: Record>(
        &self,
        items: &[T],
        table: &str,
    ) -> Result<u64, DatastoreError> {
        let provider = self.provider::<T>(table);
        let statements = items
            .iter()
            .map(|item| provider.get(SqlKind::Delete, item))
            .collect::<Result<Vec<_>, _>>()?;
        self.delete_statements(&statements).await
    }

    /// Delete rows of a registered table by the keys `key` extracts.
    ///
    /// # Errors
    /// Returns `ConfigError` for an unregistered table or one without key columns.
    pub async fn delete_all_with_key<T, K>(
        &self,
        items: &[T],
        table: &str,
        key: K,
    ) -> Result<u64, DatastoreError>
    where
        K: Fn(&T) -> Vec<RowValues>,
    {
        let descriptor = self.descriptors.get(table).ok_or_else(|| {
            DatastoreError::ConfigError(format!("unknown table descriptor {table}"))
        })?;
        descriptor.validate_for_persist()?;
        let clause = descriptor
            .pk_columns
            .iter()
            .map(|c| format!("{} = ?", self.quote(c)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("DELETE FROM {} WHERE {clause}", self.quote(&descriptor.table));
        let statements: Vec<ParametrizedSql> = items
            .iter()
            .map(|item| ParametrizedSql::new(sql.clone(), key(item), SqlKind::Delete))
            .collect();
        self.delete_statements(&statements).await
    }

    async fn delete_statements(&self, statements: &[ParametrizedSql]) -> Result<u64, DatastoreError> {
        if statements.is_empty() {
            return Ok(0);
        }
        self.execute_all(statements).await
    }

    fn quote<'s>(&self, identifier: &'s str) -> Cow<'s, str> {
        match &self.ctx.quoter {
            Some(quoter) => quoter.quote(identifier),
            None => Cow::Borrowed(identifier),
        }
    }

    /// # Errors
    /// Returns `Unsupported` when the dialect cannot list datastores.
    pub async fn datastores(&self) -> Result<Vec<String>, DatastoreError> {
        let mut conn = self.pool.get().await?;
        let result = self
            .ctx
            .dialect
            .get_datastores(&mut *conn, &self.ctx.config)
            .await;
        conn.release().await;
        result
    }

    /// # Errors
    /// Returns `Unsupported` when the dialect cannot list tables.
    pub async fn tables(&self, datastore: Option<&str>) -> Result<Vec<String>, DatastoreError> {
        let mut conn = self.pool.get().await?;
        let result = self
            .ctx
            .dialect
            .get_tables(&mut *conn, &self.ctx.config, datastore)
            .await;
        conn.release().await;
        result
    }

    /// # Errors
    /// Returns `Unsupported` when the dialect cannot list columns.
    pub async fn columns(&self, table: &str) -> Result<Vec<String>, DatastoreError> {
        let mut conn = self.pool.get().await?;
        let result = self
            .ctx
            .dialect
            .get_columns(&mut *conn, &self.ctx.config, table)
            .await;
        conn.release().await;
        result
    }

    /// # Errors
    /// Returns `Unsupported` when the dialect has no sequences.
    pub async fn sequence(&self, name: &str) -> Result<i64, DatastoreError> {
        let mut conn = self.pool.get().await?;
        let result = self
            .ctx
            .dialect
            .get_sequence(&mut *conn, &self.ctx.config, name)
            .await;
        conn.release().await;
        result
    }

    /// # Errors
    /// Returns `Unsupported` when the dialect cannot create datastores.
    pub async fn create_datastore(&self, datastore: &str) -> Result<(), DatastoreError> {
        if !self.ctx.dialect.can_create_datastore() {
            return Err(DatastoreError::Unsupported(format!(
                "{} cannot create datastores",
                self.ctx.dialect.name()
            )));
        }
        let mut conn = self.pool.get().await?;
        let result = self
            .ctx
            .dialect
            .create_datastore(&mut *conn, &self.ctx.config, datastore)
            .await;
        conn.release().await;
        result
    }

    /// # Errors
    /// Returns `Unsupported` when the dialect cannot drop datastores.
    pub async fn drop_datastore(&self, datastore: &str) -> Result<(), DatastoreError> {
        let mut conn = self.pool.get().await?;
        let result = self
            .ctx
            .dialect
            .drop_datastore(&mut *conn, &self.ctx.config, datastore)
            .await;
        conn.release().await;
        result
    }

    /// # Errors
    /// Returns `Unsupported` when the dialect cannot drop tables.
    pub async fn drop_table(&self, table: &str) -> Result<(), DatastoreError> {
        let mut conn = self.pool.get().await?;
        let result = self
            .ctx
            .dialect
            .drop_table(&mut *conn, &self.ctx.config, table)
            .await;
        conn.release().await;
        result
    }
}
