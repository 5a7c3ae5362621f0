//! Datastore connectivity layer.
//!
//! A [`Manager`](manager::Manager) pools connections to one datastore,
//! runs parameterized statements, maps rows into records, and persists
//! records with insert/update classification and bulk insert strategies.
//! Relational tables go through SQLite (feature `sqlite`); NDJSON, CSV and
//! TSV files are served by the built-in file engine, which understands a
//! restricted SQL dialect.

pub mod config;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod manager;
pub mod mapper;
pub mod pool;
pub mod prelude;
pub mod rate_limiter;
pub mod results;
pub mod sql;
pub mod table;
pub mod translation;
pub mod types;

pub use error::DatastoreError;
pub use manager::{Manager, ManagerFactory};
pub use types::RowValues;
