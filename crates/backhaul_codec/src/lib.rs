//! Codec pipes (C1): streaming compression and AES-256-GCM encryption for
//! backup artifacts.

pub mod compression;
pub mod encryption;
pub mod error;

pub use compression::{compress_stream, decompress_stream};
pub use encryption::{decrypt_stream, encrypt_stream, EncryptionTrailer};
pub use error::CodecError;
