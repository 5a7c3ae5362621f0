//! Bounded connection queue with lazy top-up, idle pings and reaping.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::config::Config;
use crate::driver::{Connection, Driver};
use crate::error::DatastoreError;

mod connection;
mod options;

pub use connection::PooledConnection;
pub use options::PoolOptions;

/// A queued connection and when it was last handed back.
#[derive(Debug)]
pub(crate) struct Idle {
    conn: Box<dyn Connection>,
    last_used: Instant,
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    pub idle: usize,
    pub pool_size: usize,
    pub max_pool_size: usize,
    pub created: u64,
    pub reused: u64,
    /// Released while the queue was full and closed instead.
    pub discarded: u64,
    /// Failed an idle ping, or trimmed by the reaper.
    pub evicted: u64,
    pub top_up_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
    evicted: AtomicU64,
    top_up_failures: AtomicU64,
}

#[derive(Debug)]
pub(crate) struct Shared {
    driver: Arc<dyn Driver>,
    config: Arc<Config>,
    options: PoolOptions,
    pool_size: usize,
    sender: mpsc::Sender<Idle>,
    receiver: Mutex<mpsc::Receiver<Idle>>,
    topping_up: AtomicBool,
    closed: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn queue_len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, DatastoreError> {
        let conn = self.driver.connect(&self.config).await?;
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        debug!(driver = %self.config.driver_name, "opened pooled connection");
        Ok(conn)
    }

    /// Hand a connection back; returns it when the queue is full and it must be closed.
    pub(crate) fn give_back(&self, mut conn: Box<dyn Connection>) -> Option<Box<dyn Connection>> {
        conn.on_release();
        if self.closed.load(Ordering::Acquire) {
            return Some(conn);
        }
        if conn.in_transaction() {
            warn!(
                driver = %self.config.driver_name,
                "connection released inside an open transaction; closing it"
            );
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return Some(conn);
        }
        let idle = Idle {
            conn,
            last_used: Instant::now(),
        };
        match self.sender.try_send(idle) {
            Ok(()) => None,
            Err(mpsc::error::TrySendError::Full(idle) | mpsc::error::TrySendError::Closed(idle)) => {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(driver = %self.config.driver_name, "pool full; closing released connection");
                Some(idle.conn)
            }
        }
    }

    pub(crate) async fn close_conn(&self, mut conn: Box<dyn Connection>) {
        close_with_timeout(&mut conn, self.options.close_timeout).await;
    }

    async fn top_up(&self) {
        while self.queue_len() < self.pool_size && !self.closed.load(Ordering::Acquire) {
            let conn = match self.connect().await {
                Ok(conn) => conn,
                Err(e) => {
                    self.counters.top_up_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(driver = %self.config.driver_name, error = %e, "pool top-up failed");
                    return;
                }
            };
            let idle = Idle {
                conn,
                last_used: Instant::now(),
            };
            if !matches!(
                timeout(self.options.top_up_timeout, self.sender.send(idle)).await,
                Ok(Ok(()))
            ) {
                warn!(driver = %self.config.driver_name, "pool top-up could not enqueue");
                return;
            }
        }
    }

    async fn reap(&self) {
        while self.queue_len() > self.pool_size {
            let Ok(mut receiver) = self.receiver.try_lock() else {
                return;
            };
            let Ok(idle) = receiver.try_recv() else {
                return;
            };
            drop(receiver);
            self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            debug!(driver = %self.config.driver_name, "reaping connection beyond pool size");
            self.close_conn(idle.conn).await;
        }
    }
}

async fn close_with_timeout(conn: &mut Box<dyn Connection>, limit: Duration) {
    match timeout(limit, conn.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "closing connection failed"),
        Err(_) => warn!("closing connection timed out"),
    }
}

/// Hands out connections for one datastore.
///
/// The idle queue holds at most `maxPoolSize` connections and is topped up
/// toward `poolSize` in the background before each [`ConnectionProvider::get`].
#[derive(Debug, Clone)]
pub struct ConnectionProvider {
    shared: Arc<Shared>,
}

impl ConnectionProvider {
    /// Create the provider and, inside a tokio runtime, its reaper task.
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, config: Arc<Config>, options: PoolOptions) -> Self {
        let max_pool_size = config.max_pool_size.max(config.pool_size).max(1);
        let (sender, receiver) = mpsc::channel(max_pool_size);
        let shared = Arc::new(Shared {
            driver,
            pool_size: config.pool_size.min(max_pool_size),
            config,
            options,
            sender,
            receiver: Mutex::new(receiver),
            topping_up: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
        });
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(reaper(Arc::downgrade(&shared), options.reap_interval));
        }
        Self { shared }
    }

    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.shared.config
    }

    /// Start a background top-up when the queue is below the pool size.
    pub fn spawn_connection_if_needed(&self) {
        let shared = &self.shared;
        if shared.closed.load(Ordering::Acquire)
            || shared.queue_len() >= shared.pool_size
            || shared.topping_up.swap(true, Ordering::AcqRel)
        {
            return;
        }
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            shared.top_up().await;
            shared.topping_up.store(false, Ordering::Release);
        });
    }

    /// A connection ready for use: a queued one if it arrives within the
    /// acquire timeout, otherwise a fresh one.
    ///
    /// # Errors
    /// Returns `ConnectionError` once the provider is closed, or the driver's
    /// error when a fresh connection cannot be opened.
    pub async fn get(&self) -> Result<PooledConnection, DatastoreError> {
        let shared = &self.shared;
        if shared.closed.load(Ordering::Acquire) {
            return Err(DatastoreError::ConnectionError(
                "connection provider is closed".into(),
            ));
        }
        self.spawn_connection_if_needed();

        let dequeued = timeout(shared.options.acquire_timeout, async {
            shared.receiver.lock().await.recv().await
        })
        .await
        .ok()
        .flatten();

        let conn = match dequeued {
            Some(idle) => self.validate(idle).await?,
            None => shared.connect().await?,
        };
        Ok(PooledConnection::new(conn, Arc::clone(shared)))
    }

    async fn validate(&self, idle: Idle) -> Result<Box<dyn Connection>, DatastoreError> {
        let shared = &self.shared;
        let Idle { mut conn, last_used } = idle;
        if conn.supports_transactions() && last_used.elapsed() > shared.options.idle_ping_after {
            if let Err(e) = conn.ping().await {
                warn!(driver = %shared.config.driver_name, error = %e, "idle ping failed; evicting");
                shared.counters.evicted.fetch_add(1, Ordering::Relaxed);
                close_with_timeout(&mut conn, Duration::from_millis(1)).await;
                return shared.connect().await;
            }
        }
        shared.counters.reused.fetch_add(1, Ordering::Relaxed);
        Ok(conn)
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let shared = &self.shared;
        let counters = &shared.counters;
        PoolStatus {
            idle: shared.queue_len(),
            pool_size: shared.pool_size,
            max_pool_size: shared.sender.max_capacity(),
            created: counters.created.load(Ordering::Relaxed),
            reused: counters.reused.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
            evicted: counters.evicted.load(Ordering::Relaxed),
            top_up_failures: counters.top_up_failures.load(Ordering::Relaxed),
        }
    }

    /// Close every queued connection; later `get` calls fail and released
    /// connections are closed instead of queued.
    pub async fn close(&self) {
        let shared = &self.shared;
        shared.closed.store(true, Ordering::Release);
        let mut receiver = shared.receiver.lock().await;
        while let Ok(idle) = receiver.try_recv() {
            shared.close_conn(idle.conn).await;
        }
    }
}

async fn reaper(shared: Weak<Shared>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if shared.closed.load(Ordering::Acquire) {
            return;
        }
        shared.reap().await;
    }
}
