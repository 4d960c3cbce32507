//! Error types for Matrixon
//!
//! This module defines the error type shared by the store, the identity
//! services and the request layer. Storage faults and legitimate lookup
//! misses never share a variant: a miss is an `Ok(None)` at the store
//! level and only becomes `NotFound` once a caller decides it is fatal.

use std::io;
use thiserror::Error;

/// Matrixon error types
#[derive(Debug, Error)]
pub enum MatrixonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Stored data could not be decoded
    #[error("Database error: {0}")]
    Database(String),

    /// Lower-level persistence fault (I/O, lost connection, closed pool)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl MatrixonError {
    /// Whether this error is a persistence fault rather than a caller problem
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, MatrixonError::StorageUnavailable(_))
    }

    /// Whether this error reports a legitimate miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, MatrixonError::NotFound(_))
    }
}

/// Result type for Matrixon operations
pub type Result<T> = std::result::Result<T, MatrixonError>;

impl From<figment::Error> for MatrixonError {
    fn from(err: figment::Error) -> Self {
        MatrixonError::Config(err.to_string())
    }
}

impl From<ruma::IdParseError> for MatrixonError {
    fn from(err: ruma::IdParseError) -> Self {
        MatrixonError::Validation(err.to_string())
    }
}
