use std::time::Duration;

/// Deadlines used by [`super::ConnectionProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// How long `get` waits on the idle queue before opening a fresh connection.
    pub acquire_timeout: Duration,
    /// How long a top-up waits to enqueue one new connection.
    pub top_up_timeout: Duration,
    /// Idle time after which a transactional connection is pinged before reuse.
    pub idle_ping_after: Duration,
    /// Upper bound on closing one connection.
    pub close_timeout: Duration,
    /// How often queued connections beyond the pool size are closed.
    pub reap_interval: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_millis(100),
            top_up_timeout: Duration::from_secs(1),
            idle_ping_after: Duration::from_secs(60),
            close_timeout: Duration::from_secs(1),
            reap_interval: Duration::from_secs(30),
        }
    }
}

impl PoolOptions {
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_idle_ping_after(mut self, idle: Duration) -> Self {
        self.idle_ping_after = idle;
        self
    }

    #[must_use]
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }
}
