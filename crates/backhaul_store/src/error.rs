//! Error types for the configuration/execution store.

use thiserror::Error;

use backhaul_protocol::{BackhaulError, ErrorKind};

/// Store operation errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn corrupt_row(msg: impl Into<String>) -> Self {
        Self::CorruptRow(msg.into())
    }
}

impl From<StoreError> for BackhaulError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => BackhaulError::new(ErrorKind::NotFound, msg),
            StoreError::Sqlx(err) => BackhaulError::new(ErrorKind::Internal, err.to_string()),
            StoreError::Serialization(err) => BackhaulError::new(ErrorKind::Internal, err.to_string()),
            StoreError::CorruptRow(msg) => BackhaulError::new(ErrorKind::Internal, msg),
        }
    }
}
