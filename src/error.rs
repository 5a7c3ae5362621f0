use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;

use crate::sql::ParseError;

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Binding error: {0}")]
    BindingError(String),

    #[error("failed to run {sql} with [{params}]: {source}")]
    Driver {
        sql: String,
        params: String,
        #[source]
        source: Box<DatastoreError>,
    },

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("{error}; rollback also failed: {rollback}")]
    RollbackFailed {
        error: Box<DatastoreError>,
        rollback: Box<DatastoreError>,
    },

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Other datastore error: {0}")]
    Other(String),
}

impl DatastoreError {
    /// Wrap a driver failure with the statement that caused it.
    #[must_use]
    pub fn with_statement(self, sql: &str, params: &[crate::types::RowValues]) -> Self {
        match self {
            already @ DatastoreError::Driver { .. } => already,
            other => DatastoreError::Driver {
                sql: sql.to_string(),
                params: summarize_params(params),
                source: Box::new(other),
            },
        }
    }

    /// Strip statement context and return the underlying error.
    #[must_use]
    pub fn root_cause(&self) -> &DatastoreError {
        match self {
            DatastoreError::Driver { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

const PARAM_SUMMARY_LIMIT: usize = 8;

fn summarize_params(params: &[crate::types::RowValues]) -> String {
    let mut parts: Vec<String> = params
        .iter()
        .take(PARAM_SUMMARY_LIMIT)
        .map(crate::types::RowValues::to_string)
        .collect();
    if params.len() > PARAM_SUMMARY_LIMIT {
        parts.push(format!("... {} more", params.len() - PARAM_SUMMARY_LIMIT));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowValues;

    #[test]
    fn driver_context_is_applied_once() {
        let err = DatastoreError::ExecutionError("boom".into())
            .with_statement("INSERT INTO t(a) VALUES (?)", &[RowValues::Int(1)])
            .with_statement("ignored", &[]);
        match &err {
            DatastoreError::Driver { sql, params, .. } => {
                assert_eq!(sql, "INSERT INTO t(a) VALUES (?)");
                assert_eq!(params, "1");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(err.root_cause(), DatastoreError::ExecutionError(_)));
    }

    #[test]
    fn long_param_lists_are_truncated() {
        let params: Vec<RowValues> = (0..10).map(RowValues::Int).collect();
        let summary = summarize_params(&params);
        assert!(summary.ends_with("... 2 more"));
    }
}
