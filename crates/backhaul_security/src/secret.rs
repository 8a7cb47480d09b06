//! A byte buffer that overwrites itself with zeros on drop. Used for
//! decrypted data keys and adapter config plaintext so they don't linger
//! in freed memory (spec §4.10: "decrypted values are zeroized when
//! possible").

use std::fmt;
use std::ops::Deref;

pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

impl Deref for SecretBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes(REDACTED, {} bytes)", self.0.len())
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        for byte in self.0.iter_mut() {
            *byte = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_the_bytes() {
        let secret = SecretBytes::new(vec![1, 2, 3, 4]);
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains('1'));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn into_vec_recovers_the_bytes() {
        let secret = SecretBytes::new(vec![9, 8, 7]);
        assert_eq!(secret.into_vec(), vec![9, 8, 7]);
    }
}
