//! Error types for Hoard core operations.
//!
//! This module defines well-structured error types using `thiserror` for
//! library-level errors, while higher-level code can use `anyhow` for
//! convenient error handling.

use crate::types::EntityId;
use rusqlite::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using HoardError
pub type Result<T> = std::result::Result<T, HoardError>;

/// Core error types for Hoard operations.
///
/// Capability degradation (no full-text index, no fuzzy scorer) is not an
/// error: it is detected once at startup and logged.
#[derive(Error, Debug)]
pub enum HoardError {
    // === Record Errors ===
    /// A uniqueness or required-field rule was broken; nothing was written
    #[error("constraint violation: {reason}")]
    ConstraintViolation { reason: String },

    /// The referenced entity does not exist
    #[error("entity {id} not found")]
    NotFound { id: EntityId },

    /// A stored value could not be decoded
    #[error("malformed stored data in entity {id}, field {field}: {reason}")]
    MalformedStoredData {
        id: EntityId,
        field: &'static str,
        reason: String,
    },

    // === Storage Errors ===
    /// The database file could not be created or opened for writing
    #[error("storage unavailable at {path}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    /// Any other failure reported by the storage engine
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    // === Configuration Errors ===
    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl HoardError {
    /// Returns true for uniqueness and required-field failures
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, HoardError::ConstraintViolation { .. })
    }

    /// Returns true if the referenced entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, HoardError::NotFound { .. })
    }

    /// Returns true if the underlying storage could not be reached or written
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            HoardError::Io(_) | HoardError::StorageUnavailable { .. } | HoardError::Database(_)
        )
    }

    /// Create a constraint violation error
    pub fn constraint(reason: impl Into<String>) -> Self {
        HoardError::ConstraintViolation {
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(reason: impl Into<String>) -> Self {
        HoardError::Serialization(reason.into())
    }
}

impl From<rusqlite::Error> for HoardError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, ref message)
                if code.code == ErrorCode::ConstraintViolation =>
            {
                HoardError::ConstraintViolation {
                    reason: message
                        .clone()
                        .unwrap_or_else(|| "constraint failed".to_string()),
                }
            }
            other => HoardError::Database(other),
        }
    }
}

impl From<serde_json::Error> for HoardError {
    fn from(err: serde_json::Error) -> Self {
        HoardError::Serialization(err.to_string())
    }
}
