// Error types for the data layer
// Binaries wrap these in anyhow at the top level.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to load or use a service-account credential.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("credential file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed credential file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),
}

/// Failure while running a warehouse query.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("warehouse request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("warehouse returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected warehouse response: {0}")]
    Decode(String),

    #[error("query job {0} did not complete")]
    Incomplete(String),
}

/// Failure of a table operation (shape or type mismatch).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("row has {actual} values, table has {expected} columns")]
    RowWidth { expected: usize, actual: usize },

    #[error("column {column} holds a non-numeric value at row {row}")]
    NotNumeric { column: String, row: usize },

    #[error("duplicate key {key} in column {column}")]
    DuplicateKey { column: String, key: String },
}

/// Failure of a one-time dataset load.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Credential(CredentialError),

    #[error(transparent)]
    Query(QueryError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("dependency unavailable: {0}")]
    Dependency(String),
}

impl From<QueryError> for LoadError {
    fn from(err: QueryError) -> Self {
        // Keep credential failures distinguishable from warehouse failures
        match err {
            QueryError::Credential(inner) => LoadError::Credential(inner),
            other => LoadError::Query(other),
        }
    }
}

impl From<CredentialError> for LoadError {
    fn from(err: CredentialError) -> Self {
        LoadError::Credential(err)
    }
}

/// Invalid runtime configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
