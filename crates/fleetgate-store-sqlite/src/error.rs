// crates/fleetgate-store-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Store Errors
// Description: Internal error type for the SQLite-backed Rule Store.
// Purpose: Translate rusqlite and schema-shape failures into StoreError.
// Dependencies: fleetgate-core, rusqlite, thiserror
// ============================================================================

//! ## Overview
//! SQL and schema details stay local to this crate as `SqliteStoreError`;
//! only the backend-agnostic [`StoreError`] crosses into `fleetgate-core`.

use fleetgate_core::StoreError;
use thiserror::Error;

/// `SQLite`-specific Rule Store errors.
#[derive(Debug, Clone, Error)]
pub enum SqliteStoreError {
    /// Store I/O error (path, filesystem).
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data failed an integrity or shape check on load.
    #[error("sqlite store corrupt: {0}")]
    Corrupt(String),
    /// A write would violate a structural invariant.
    #[error("sqlite store rejected write: {0}")]
    Invalid(String),
    /// The referenced row does not exist.
    #[error("sqlite store row not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Io(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
        }
    }
}
