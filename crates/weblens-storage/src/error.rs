use thiserror::Error;
use uuid::Uuid;

/// Storage layer failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("conflict on {entity}: {message}")]
    Conflict { entity: &'static str, message: String },

    #[error("storage backend error: {message}")]
    Backend { message: String },
}

pub type StorageResult<T> = Result<T, StorageError>;
