//! AES-256-GCM artifact encryption (spec §4.1). The IV and final auth tag
//! are captured after the cipher finalizes and never travel inside the
//! ciphertext stream — they're handed back to the caller to store in the
//! sidecar, keeping the artifact itself binary-identical to
//! `raw compressed dump` plus a small metadata file.
//!
//! This buffers the full plaintext for a single `encrypt`/`open` call
//! rather than using a chunked AEAD construction: the sidecar contract
//! wants exactly one IV and one tag per artifact, and `aes-gcm`'s public
//! API only produces that from a single call. Compression (the other
//! half of the transform stage) stays fully streaming; this is the one
//! place a dump is held in memory.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use std::io::{Read, Write};

use crate::error::CodecError;

const MIN_IV_LEN: usize = 12;
const MAX_IV_LEN: usize = 16;
const DATA_KEY_LEN: usize = 32;

/// IV and auth tag produced by a successful encryption, destined for the
/// sidecar's `encryption` block.
pub struct EncryptionTrailer {
    pub iv: Vec<u8>,
    pub auth_tag: Vec<u8>,
}

/// Reads all of `reader`, encrypts it under `data_key`, and writes the
/// ciphertext (without the tag) to `writer`. Returns the IV and tag for
/// the caller to persist in the sidecar.
pub fn encrypt_stream<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    data_key: &[u8],
) -> Result<EncryptionTrailer, CodecError> {
    if data_key.len() != DATA_KEY_LEN {
        return Err(CodecError::InvalidKeyLength(data_key.len()));
    }
    let key = Key::<Aes256Gcm>::from_slice(data_key);
    let cipher = Aes256Gcm::new(key);

    let mut iv = vec![0u8; MIN_IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let mut plaintext = Vec::new();
    reader.read_to_end(&mut plaintext)?;

    let mut sealed = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|_| CodecError::AuthenticationFailed)?;
    // `aes-gcm` appends the 16-byte tag to the ciphertext; split it off so
    // the stream carries ciphertext only, per the sidecar contract.
    let auth_tag = sealed.split_off(sealed.len() - 16);

    writer.write_all(&sealed)?;
    Ok(EncryptionTrailer { iv, auth_tag })
}

/// Reads ciphertext from `reader`, authenticates and decrypts it against
/// `(data_key, iv, auth_tag)`, and writes the plaintext to `writer`.
/// Authentication failure returns `CodecError::AuthenticationFailed`
/// before any plaintext is written.
pub fn decrypt_stream<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    data_key: &[u8],
    iv: &[u8],
    auth_tag: &[u8],
) -> Result<(), CodecError> {
    if data_key.len() != DATA_KEY_LEN {
        return Err(CodecError::InvalidKeyLength(data_key.len()));
    }
    if iv.len() < MIN_IV_LEN || iv.len() > MAX_IV_LEN {
        return Err(CodecError::InvalidIvLength(iv.len()));
    }
    let key = Key::<Aes256Gcm>::from_slice(data_key);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(iv);

    let mut ciphertext = Vec::new();
    reader.read_to_end(&mut ciphertext)?;
    ciphertext.extend_from_slice(auth_tag);

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_slice())
        .map_err(|_| CodecError::AuthenticationFailed)?;
    writer.write_all(&plaintext)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn key() -> [u8; 32] {
        [0x42u8; 32]
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let plaintext = b"-- pg_dump output --\nCREATE TABLE orders (id int);".to_vec();
        let mut ciphertext = Vec::new();
        let trailer = encrypt_stream(Cursor::new(&plaintext), &mut ciphertext, &key()).unwrap();

        assert_eq!(trailer.iv.len(), 12);
        assert_eq!(trailer.auth_tag.len(), 16);
        assert_ne!(ciphertext, plaintext);

        let mut recovered = Vec::new();
        decrypt_stream(
            Cursor::new(&ciphertext),
            &mut recovered,
            &key(),
            &trailer.iv,
            &trailer.auth_tag,
        )
        .unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let plaintext = b"some backup bytes".to_vec();
        let mut ciphertext = Vec::new();
        let trailer = encrypt_stream(Cursor::new(&plaintext), &mut ciphertext, &key()).unwrap();
        ciphertext[0] ^= 0xFF;

        let mut recovered = Vec::new();
        let result = decrypt_stream(
            Cursor::new(&ciphertext),
            &mut recovered,
            &key(),
            &trailer.iv,
            &trailer.auth_tag,
        );
        assert!(matches!(result, Err(CodecError::AuthenticationFailed)));
    }

    #[test]
    fn wrong_key_length_is_rejected_loudly() {
        let mut out = Vec::new();
        let result = encrypt_stream(Cursor::new(b"data"), &mut out, &[0u8; 16]);
        assert!(matches!(result, Err(CodecError::InvalidKeyLength(16))));
    }

    #[test]
    fn wrong_iv_length_is_rejected_on_decrypt() {
        let mut out = Vec::new();
        let result = decrypt_stream(Cursor::new(b"cc"), &mut out, &key(), &[0u8; 8], &[0u8; 16]);
        assert!(matches!(result, Err(CodecError::InvalidIvLength(8))));
    }
}
