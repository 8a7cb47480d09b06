use backhaul_protocol::{BackhaulError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("master key must be exactly 32 bytes, got {0}")]
    InvalidMasterKeyLength(usize),
    #[error("master key is not valid hex: {0}")]
    InvalidMasterKeyHex(String),
    #[error("decryption failed: auth tag mismatch or corrupted payload")]
    DecryptionFailed,
    #[error("opaque payload too short to contain a nonce")]
    PayloadTooShort,
}

impl From<SecurityError> for BackhaulError {
    fn from(err: SecurityError) -> Self {
        let kind = match err {
            SecurityError::DecryptionFailed => ErrorKind::Integrity,
            _ => ErrorKind::ConfigInvalid,
        };
        BackhaulError::new(kind, err.to_string())
    }
}
