use tracing::{debug, warn};

use crate::driver::Connection;
use crate::error::DatastoreError;

/// Open a transaction when the driver supports one; returns whether it did.
pub(crate) async fn begin(conn: &mut dyn Connection) -> Result<bool, DatastoreError> {
    if !conn.supports_transactions() {
        return Ok(false);
    }
    conn.begin().await?;
    debug!("transaction started");
    Ok(true)
}

/// Commit on success or roll back on failure, exactly once.
///
/// A commit failure replaces the result; a rollback failure is combined with
/// the original error.
pub(crate) async fn finish<T>(
    conn: &mut dyn Connection,
    started: bool,
    result: Result<T, DatastoreError>,
) -> Result<T, DatastoreError> {
    if !started {
        return result;
    }
    match result {
        Ok(value) => {
            conn.commit().await?;
            debug!("transaction committed");
            Ok(value)
        }
        Err(error) => match conn.rollback().await {
            Ok(()) => {
                debug!(error = %error, "transaction rolled back");
                Err(error)
            }
            Err(rollback) => {
                warn!(error = %error, rollback = %rollback, "rollback failed");
                Err(DatastoreError::RollbackFailed {
                    error: Box::new(error),
                    rollback: Box::new(rollback),
                })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::driver::ExecResult;
    use crate::results::ResultSet;
    use crate::types::RowValues;

    #[derive(Debug, Default)]
    struct Scripted {
        fail_commit: bool,
        fail_rollback: bool,
        commits: usize,
        rollbacks: usize,
    }

    #[async_trait]
    impl Connection for Scripted {
        async fn execute(&mut self, _: &str, _: &[RowValues]) -> Result<ExecResult, DatastoreError> {
            Ok(ExecResult::default())
        }

        async fn query(&mut self, _: &str, _: &[RowValues]) -> Result<ResultSet, DatastoreError> {
            Ok(ResultSet::default())
        }

        async fn begin(&mut self) -> Result<(), DatastoreError> {
            Ok(())
        }

        async fn commit(&mut self) -> Result<(), DatastoreError> {
            self.commits += 1;
            if self.fail_commit {
                Err(DatastoreError::TransactionError("commit".into()))
            } else {
                Ok(())
            }
        }

        async fn rollback(&mut self) -> Result<(), DatastoreError> {
            self.rollbacks += 1;
            if self.fail_rollback {
                Err(DatastoreError::TransactionError("rollback".into()))
            } else {
                Ok(())
            }
        }

        fn supports_transactions(&self) -> bool {
            true
        }

        fn in_transaction(&self) -> bool {
            false
        }

        async fn ping(&mut self) -> Result<(), DatastoreError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), DatastoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn commit_error_replaces_success() {
        let mut conn = Scripted {
            fail_commit: true,
            ..Scripted::default()
        };
        let started = begin(&mut conn).await.unwrap();
        let result = finish(&mut conn, started, Ok(5)).await;
        assert!(matches!(result, Err(DatastoreError::TransactionError(_))));
        assert_eq!((conn.commits, conn.rollbacks), (1, 0));
    }

    #[tokio::test]
    async fn rollback_failure_keeps_both_errors() {
        let mut conn = Scripted {
            fail_rollback: true,
            ..Scripted::default()
        };
        let result: Result<(), _> = finish(
            &mut conn,
            true,
            Err(DatastoreError::ExecutionError("constraint".into())),
        )
        .await;
        match result {
            Err(DatastoreError::RollbackFailed { error, rollback }) => {
                assert!(matches!(*error, DatastoreError::ExecutionError(_)));
                assert!(matches!(*rollback, DatastoreError::TransactionError(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(conn.rollbacks, 1);
    }

    #[tokio::test]
    async fn no_transaction_support_skips_bracket() {
        let mut conn = crate::driver::Detached;
        assert!(!begin(&mut conn).await.unwrap());
        assert_eq!(finish(&mut conn, false, Ok(1)).await.unwrap(), 1);
    }
}
