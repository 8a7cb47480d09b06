//! Secret store (C10): a process-wide symmetric envelope over adapter
//! configs and encryption-profile data keys. `encrypt`/`decrypt` are the
//! only operations the rest of the workspace touches; everything keyed by
//! the system master key loaded once at startup.

pub mod error;
pub mod secret;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;

pub use error::SecurityError;
pub use secret::SecretBytes;

const NONCE_LEN: usize = 12;
const DATA_KEY_LEN: usize = 32;

/// The system master key (spec §4.10), loaded once at process start from
/// `BACKHAUL_MASTER_KEY` (64 hex chars / 32 bytes) and never logged.
pub struct SecretStore {
    cipher: Aes256Gcm,
}

impl SecretStore {
    pub fn new(master_key: [u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&master_key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Parses a 64-hex-character master key, as read from the environment.
    pub fn from_hex(hex_key: &str) -> Result<Self, SecurityError> {
        let bytes =
            hex::decode(hex_key).map_err(|err| SecurityError::InvalidMasterKeyHex(err.to_string()))?;
        if bytes.len() != 32 {
            return Err(SecurityError::InvalidMasterKeyLength(bytes.len()));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self::new(key))
    }

    /// Encrypts `plaintext` into an opaque blob: `nonce || ciphertext+tag`.
    /// Used for adapter configs and for wrapping encryption-profile data
    /// keys, both persisted verbatim in the configuration store.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        // Only fails on pathological input lengths the aes-gcm crate
        // itself cannot produce here, so this is treated as infallible.
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("AES-256-GCM encryption of a bounded plaintext cannot fail");

        let mut opaque = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        opaque.extend_from_slice(&nonce_bytes);
        opaque.extend_from_slice(&ciphertext);
        opaque
    }

    /// Reverses `encrypt`. Returns `SecurityError::DecryptionFailed` on any
    /// auth-tag mismatch, which callers map to `ErrorKind::Integrity`.
    pub fn decrypt(&self, opaque: &[u8]) -> Result<SecretBytes, SecurityError> {
        if opaque.len() < NONCE_LEN {
            return Err(SecurityError::PayloadTooShort);
        }
        let (nonce_bytes, ciphertext) = opaque.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| SecurityError::DecryptionFailed)?;
        Ok(SecretBytes::new(plaintext))
    }

    /// Generates a fresh 32-byte data key for a new encryption profile.
    pub fn generate_data_key() -> [u8; DATA_KEY_LEN] {
        let mut key = [0u8; DATA_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    /// Parses an imported 64-hex-character data key (spec §3 "created by
    /// generation or by importing an existing 64-hex key").
    pub fn parse_data_key_hex(hex_key: &str) -> Result<[u8; DATA_KEY_LEN], SecurityError> {
        let bytes =
            hex::decode(hex_key).map_err(|err| SecurityError::InvalidMasterKeyHex(err.to_string()))?;
        if bytes.len() != DATA_KEY_LEN {
            return Err(SecurityError::InvalidMasterKeyLength(bytes.len()));
        }
        let mut key = [0u8; DATA_KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(key)
    }

    /// Wraps a freshly generated or imported data key for storage on an
    /// `EncryptionProfile`.
    pub fn wrap_data_key(&self, data_key: &[u8; DATA_KEY_LEN]) -> Vec<u8> {
        self.encrypt(data_key)
    }

    /// Unwraps a profile's stored data key back into raw bytes.
    pub fn unwrap_data_key(&self, wrapped: &[u8]) -> Result<[u8; DATA_KEY_LEN], SecurityError> {
        let plaintext = self.decrypt(wrapped)?;
        if plaintext.len() != DATA_KEY_LEN {
            return Err(SecurityError::InvalidMasterKeyLength(plaintext.len()));
        }
        let mut key = [0u8; DATA_KEY_LEN];
        key.copy_from_slice(&plaintext);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> SecretStore {
        SecretStore::new([7u8; 32])
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let store = test_store();
        let opaque = store.encrypt(b"host=db.internal;user=backhaul");
        let plaintext = store.decrypt(&opaque).unwrap();
        assert_eq!(plaintext.as_slice(), b"host=db.internal;user=backhaul");
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let store = test_store();
        let mut opaque = store.encrypt(b"secret config blob");
        let last = opaque.len() - 1;
        opaque[last] ^= 0xFF;
        assert!(matches!(
            store.decrypt(&opaque),
            Err(SecurityError::DecryptionFailed)
        ));
    }

    #[test]
    fn different_master_keys_cannot_decrypt_each_others_payloads() {
        let store_a = SecretStore::new([1u8; 32]);
        let store_b = SecretStore::new([2u8; 32]);
        let opaque = store_a.encrypt(b"payload");
        assert!(matches!(
            store_b.decrypt(&opaque),
            Err(SecurityError::DecryptionFailed)
        ));
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(matches!(
            SecretStore::from_hex("deadbeef"),
            Err(SecurityError::InvalidMasterKeyLength(_))
        ));
    }

    #[test]
    fn data_key_wrap_unwrap_round_trips() {
        let store = test_store();
        let key = SecretStore::generate_data_key();
        let wrapped = store.wrap_data_key(&key);
        let unwrapped = store.unwrap_data_key(&wrapped).unwrap();
        assert_eq!(key, unwrapped);
    }

    #[test]
    fn parse_data_key_hex_round_trips_through_generation() {
        let key = SecretStore::generate_data_key();
        let hex_key = hex::encode(key);
        let parsed = SecretStore::parse_data_key_hex(&hex_key).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn short_opaque_payload_is_rejected() {
        let store = test_store();
        assert!(matches!(
            store.decrypt(&[1, 2, 3]),
            Err(SecurityError::PayloadTooShort)
        ));
    }
}
