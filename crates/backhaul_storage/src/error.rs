use backhaul_protocol::{BackhaulError, ErrorKind};
use thiserror::Error;

/// Errors surfaced by a [`crate::StorageAdapter`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage credentials rejected: {0}")]
    AuthDenied(String),
    #[error("could not reach storage backend: {0}")]
    Unreachable(String),
    #[error("storage I/O failure: {0}")]
    Io(String),
    #[error("unsupported destination config: {0}")]
    ConfigInvalid(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => StorageError::AuthDenied(err.to_string()),
            _ => StorageError::Io(err.to_string()),
        }
    }
}

impl From<StorageError> for BackhaulError {
    fn from(err: StorageError) -> Self {
        let kind = match &err {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::AuthDenied(_) => ErrorKind::AuthDenied,
            StorageError::Unreachable(_) => ErrorKind::Unreachable,
            StorageError::Io(_) => ErrorKind::StreamIo,
            StorageError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            StorageError::Backend(_) => ErrorKind::Unreachable,
        };
        BackhaulError::new(kind, err.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
