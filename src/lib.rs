// Campaign Spend - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod aggregation;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod datasets;
pub mod error;
pub mod logging;
pub mod records;
pub mod table;
pub mod warehouse;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use aggregation::{group_mean_top_n, group_sum_all, group_sum_by, group_sum_top_n, join_and_rate};
pub use cache::{CacheStatus, DatasetCache};
pub use config::{Config, LogFormat};
pub use credentials::{AccessToken, ServiceAccountKey};
pub use datasets::{Datasets, Readiness};
pub use error::{ConfigError, CredentialError, LoadError, QueryError, TableError};
pub use records::{turnout_rate, CrossedRecord, ExpenditureRecord, TurnoutRecord};
pub use table::{Records, Table, Value};
pub use warehouse::{BigQueryClient, Warehouse};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
