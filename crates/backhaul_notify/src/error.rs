//! Errors raised while rendering or dispatching a notification. Per spec
//! §4.8's failure policy, callers driving a backup/restore run never see
//! these: the dispatcher swallows them into the notification log instead.

use thiserror::Error;

use backhaul_protocol::{BackhaulError, ErrorKind};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("channel {0} config is not valid utf-8")]
    ConfigNotUtf8(String),

    #[error("channel {0} config did not decrypt")]
    ConfigUndecryptable(String),

    #[error("channel {0} transport error: {1}")]
    Transport(String, String),

    #[error("channel {0} responded with status {1}")]
    BadResponse(String, u16),

    #[error(transparent)]
    Backhaul(#[from] BackhaulError),
}

impl From<NotifyError> for BackhaulError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::Backhaul(err) => err,
            other => BackhaulError::new(ErrorKind::Internal, other.to_string()),
        }
    }
}
