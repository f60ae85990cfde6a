//! Storage Layer
//!
//! SQLite persistence for classification results and model lineage.

mod repository;
mod schema;

pub use repository::{ModelVersionRecord, ResultStore, TIMESTAMP_FORMAT};

use domain_types::DomainError;
use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Result {0} already exists")]
    DuplicateId(Uuid),
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),
    #[error("Stored row is invalid: {0}")]
    Domain(#[from] DomainError),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            sqlx::Error::Database(db) if db.is_check_violation() => {
                StorageError::ConstraintViolation(db.message().to_string())
            }
            _ => StorageError::DatabaseError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}
