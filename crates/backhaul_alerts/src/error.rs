use thiserror::Error;

use backhaul_protocol::{BackhaulError, ErrorKind};

#[derive(Error, Debug)]
pub enum AlertError {
    #[error(transparent)]
    Backhaul(#[from] BackhaulError),
}

impl From<AlertError> for BackhaulError {
    fn from(err: AlertError) -> Self {
        match err {
            AlertError::Backhaul(err) => err,
        }
    }
}

impl AlertError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Backhaul(BackhaulError::new(ErrorKind::Internal, message.into()))
    }
}
