//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::{Config, TableConfig};
pub use crate::dialect::{
    BulkInsertStrategy, Dialect, DriverEntry, GenericDialect, LastInsertIdKind, Registry,
    ReservedQuoter,
};
pub use crate::driver::{Connection, Driver, ExecResult};
pub use crate::error::DatastoreError;
pub use crate::manager::{Manager, ManagerFactory};
pub use crate::mapper::{
    ColumnarRecordMapper, MapRecordMapper, MetadataRecordMapper, RecordMapper, Scanner,
};
pub use crate::pool::{ConnectionProvider, PoolOptions, PoolStatus, PooledConnection};
pub use crate::rate_limiter::RateLimiter;
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::sql::SqlKind;
pub use crate::table::{
    DmlProvider, FieldMeta, MetadataDmlProvider, ParametrizedSql, Record, TableDescriptor,
    ValueMap,
};
pub use crate::translation::PlaceholderStyle;
pub use crate::types::{FromRowValue, RowValues};
