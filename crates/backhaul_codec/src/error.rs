use backhaul_protocol::{BackhaulError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("i/o error during codec pipe: {0}")]
    Io(#[from] std::io::Error),
    #[error("data key must be exactly 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("iv must be 12-16 bytes, got {0}")]
    InvalidIvLength(usize),
    #[error("decryption failed: auth tag mismatch")]
    AuthenticationFailed,
}

impl From<CodecError> for BackhaulError {
    fn from(err: CodecError) -> Self {
        let kind = match err {
            CodecError::Io(_) => ErrorKind::StreamIo,
            CodecError::AuthenticationFailed => ErrorKind::Integrity,
            CodecError::InvalidKeyLength(_) | CodecError::InvalidIvLength(_) => {
                ErrorKind::ConfigInvalid
            }
        };
        BackhaulError::new(kind, err.to_string())
    }
}
