//! Error types for ShelfDB
//!
//! This module defines all error types used throughout the record store.

use thiserror::Error;

/// The main error type for ShelfDB
#[derive(Error, Debug)]
pub enum Error {
    // ========== Schema Errors ==========
    #[error("Schema error: fields '{0}' and '{1}' both claim the primary key")]
    MultiplePrimaryKeys(String, String),

    #[error("Schema error: duplicate field '{0}'")]
    DuplicateField(String),

    #[error("Schema error: default value for field '{field}' is not a valid {expected}")]
    InvalidDefault { field: String, expected: String },

    #[error("Schema error: primary-key field '{0}' cannot carry a default value")]
    DefaultOnPrimaryKey(String),

    // ========== Constraint Errors ==========
    #[error("Constraint error: null value not allowed for field '{0}'")]
    NotNullViolation(String),

    #[error("Constraint error: expected {expected} for field '{field}', got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Constraint error: duplicate value for unique field '{0}'")]
    UniqueViolation(String),

    #[error("Constraint error: primary-key field '{0}' cannot be changed")]
    ImmutableField(String),

    // ========== Registry Errors ==========
    #[error("Registry error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Registry error: table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Registry error: field '{0}' not found in table '{1}'")]
    FieldNotFound(String, String),

    #[error("Registry error: persistence is not enabled for database '{0}'")]
    PersistenceDisabled(String),

    // ========== Storage Errors ==========
    #[error("Storage error: storage root '{0}' does not exist")]
    StorageRootNotFound(String),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is a per-record constraint violation, recoverable
    /// by the caller with corrected values.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::NotNullViolation(_)
                | Error::TypeMismatch { .. }
                | Error::UniqueViolation(_)
                | Error::ImmutableField(_)
        )
    }
}

/// Result type alias for ShelfDB operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "Registry error: table 'users' not found");

        let err = Error::NotNullViolation("email".to_string());
        assert_eq!(
            err.to_string(),
            "Constraint error: null value not allowed for field 'email'"
        );
    }

    #[test]
    fn test_constraint_classification() {
        assert!(Error::UniqueViolation("email".to_string()).is_constraint_violation());
        assert!(!Error::TableNotFound("users".to_string()).is_constraint_violation());
    }
}
