use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use datastore_middleware::prelude::*;

#[derive(Debug, Default)]
struct SlowDriver {
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

#[derive(Debug)]
struct SlowConnection {
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Driver for SlowDriver {
    async fn connect(&self, _: &Config) -> Result<Box<dyn Connection>, DatastoreError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SlowConnection {
            closed: Arc::clone(&self.closed),
        }))
    }
}

#[async_trait]
impl Connection for SlowConnection {
    async fn execute(&mut self, _: &str, _: &[RowValues]) -> Result<ExecResult, DatastoreError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(ExecResult::new(1, None))
    }

    async fn query(&mut self, _: &str, _: &[RowValues]) -> Result<ResultSet, DatastoreError> {
        Ok(ResultSet::default())
    }

    async fn begin(&mut self) -> Result<(), DatastoreError> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DatastoreError> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatastoreError> {
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    fn in_transaction(&self) -> bool {
        false
    }

    async fn ping(&mut self) -> Result<(), DatastoreError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DatastoreError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn slow_pool(driver: Arc<SlowDriver>, options: PoolOptions) -> ConnectionProvider {
    let config = Config::new("slow", "slow").with_pool_size(2, 3);
    ConnectionProvider::new(driver, Arc::new(config), options)
}

async fn saturate(pool: &ConnectionProvider, callers: usize) {
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut conn = pool.get().await?;
                let result = conn.execute("UPDATE t SET x = 1", &[]).await;
                conn.release().await;
                result
            })
        })
        .collect();
    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.unwrap().rows_affected, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn callers_beyond_max_pool_size_still_get_connections() {
    let driver = Arc::new(SlowDriver::default());
    let closed = Arc::clone(&driver.closed);
    let pool = slow_pool(Arc::clone(&driver), PoolOptions::default());

    saturate(&pool, 4).await;

    let status = pool.status();
    assert_eq!(status.max_pool_size, 3);
    assert!(status.idle <= 3);
    assert!(status.discarded >= 1);
    assert!(driver.opened.load(Ordering::SeqCst) >= 4);
    assert!(closed.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reaper_trims_idle_queue_to_pool_size() {
    let driver = Arc::new(SlowDriver::default());
    let options = PoolOptions::default().with_reap_interval(Duration::from_millis(50));
    let pool = slow_pool(driver, options);

    saturate(&pool, 4).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let status = pool.status();
    assert_eq!(status.idle, 2);
    assert!(status.evicted >= 1);
}

#[tokio::test]
async fn closed_provider_refuses_new_work() {
    let driver = Arc::new(SlowDriver::default());
    let closed = Arc::clone(&driver.closed);
    let pool = slow_pool(driver, PoolOptions::default());

    let conn = pool.get().await.unwrap();
    // let the background top-up settle before closing
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.close().await;
    conn.release().await;

    assert!(matches!(
        pool.get().await,
        Err(DatastoreError::ConnectionError(_))
    ));
    assert_eq!(pool.status().idle, 0);
    assert!(closed.load(Ordering::SeqCst) >= 1);
}
