use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::driver::{Connection, Detached};

use super::Shared;

/// A connection checked out of a [`super::ConnectionProvider`].
///
/// Dereferences to the driver [`Connection`]. Dropping it returns the
/// connection like [`PooledConnection::release`], closing it on a spawned task
/// when the queue is full.
pub struct PooledConnection {
    conn: Box<dyn Connection>,
    shared: Arc<Shared>,
    released: bool,
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .field("released", &self.released)
            .finish()
    }
}

impl PooledConnection {
    pub(crate) fn new(conn: Box<dyn Connection>, shared: Arc<Shared>) -> Self {
        Self {
            conn,
            shared,
            released: false,
        }
    }

    fn take(&mut self) -> Box<dyn Connection> {
        self.released = true;
        std::mem::replace(&mut self.conn, Box::new(Detached))
    }

    /// Return to the pool, or close when the pool is already full.
    pub async fn release(mut self) {
        let conn = self.take();
        if let Some(conn) = self.shared.give_back(conn) {
            self.shared.close_conn(conn).await;
        }
    }

    /// Close without returning to the pool.
    pub async fn close_now(mut self) {
        let mut conn = self.take();
        conn.on_release();
        self.shared.close_conn(conn).await;
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let conn = self.take();
        if let Some(conn) = self.shared.give_back(conn)
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            let shared = Arc::clone(&self.shared);
            handle.spawn(async move { shared.close_conn(conn).await });
        }
    }
}
