//! Error types for recall-state

use thiserror::Error;

/// Errors raised while establishing the persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by `ContextStorage` and `PreferencesStorage` operations.
///
/// A missing record is never an error; lookups return `Ok(None)`.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backing store failed (network, query, transaction)
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A record could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The store was closed and no longer accepts operations
    #[error("storage is closed")]
    Closed,
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
