//! Centralized error types for the Feels data layer

use thiserror::Error;

/// Main data-layer error type
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid query descriptor: {0}")]
    Descriptor(String),

    #[error("Unknown relation '{relation}' on {entity}")]
    UnknownRelation { entity: String, relation: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Decode error for column {column}: {reason}")]
    Decode { column: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Batch failed: {0}")]
    Batch(String),

    #[error("Computation failed for key {key}: {reason}")]
    Computation { key: String, reason: String },
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Cache error: {0}")]
    Cache(String),
}

/// Result type alias for data-layer operations
pub type DataResult<T> = Result<T, DataError>;

impl DataError {
    pub fn descriptor(reason: impl Into<String>) -> Self {
        DataError::Descriptor(reason.into())
    }

    /// True for errors raised by the distributed cache
    pub fn is_cache(&self) -> bool {
        matches!(self, DataError::Storage(StorageError::Cache(_)))
    }
}

/// Helper to convert sqlx errors
impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DataError::Storage(StorageError::PoolExhausted),
            other => DataError::Storage(StorageError::Database(other.to_string())),
        }
    }
}

/// Helper to convert redis errors
impl From<redis::RedisError> for DataError {
    fn from(err: redis::RedisError) -> Self {
        DataError::Storage(StorageError::Cache(err.to_string()))
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Serialization(err.to_string())
    }
}
