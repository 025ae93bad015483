//! # Encryption Envelope
//!
//! Pluggable symmetric ciphers wrapping frame payloads once a session is
//! authenticated.
//!
//! ## Components
//! - **EncryptionArgs**: mode + session key + salt, derived once per session
//!   after proof verification and immutable thereafter
//! - **AES variant**: AES-128-CBC, key/IV material derived from the session
//!   key and the user's salt
//! - **Blowfish variant**: Blowfish-CBC keyed from the hex-decoded session
//!   secret, PKCS7-padded to 8-byte blocks
//!
//! ## Security
//! - PKCS7 padding is verified on decrypt: corrupted ciphertext fails instead
//!   of silently producing garbage
//! - Key material is zeroized when the envelope is dropped; release is scoped
//!   to the owning session, never left to finalization timing

pub mod aes;
pub mod blowfish;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Which symmetric cipher a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherMode {
    Aes,
    Blowfish,
}

/// Cipher parameters for one authenticated session.
///
/// `key` is the hex-encoded shared session key both sides derived from the
/// SRP exchange; `salt` is the user's hex-encoded salt. Both are fixed for
/// the session lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionArgs {
    pub mode: CipherMode,
    pub key: String,
    pub salt: String,
}

impl EncryptionArgs {
    pub fn new(mode: CipherMode, key: impl Into<String>, salt: impl Into<String>) -> Self {
        Self {
            mode,
            key: key.into(),
            salt: salt.into(),
        }
    }

    /// Build the cipher strategy these args describe.
    pub fn envelope(&self) -> Result<Box<dyn Envelope>> {
        match self.mode {
            CipherMode::Aes => Ok(Box::new(aes::AesEnvelope::from_args(self)?)),
            CipherMode::Blowfish => Ok(Box::new(blowfish::BlowfishEnvelope::from_args(self)?)),
        }
    }
}

/// Strategy interface over the session ciphers.
///
/// One instance serves a whole session; calls carry no chained state, so the
/// same envelope may encrypt any number of frames in either direction.
pub trait Envelope: Send + Sync {
    /// Encrypt an arbitrary-length buffer, padding to the cipher block size.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Invert [`Envelope::encrypt`], verifying and stripping padding.
    ///
    /// # Errors
    /// [`ProtocolError::DecryptionFailure`] on any padding or length fault.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

pub(crate) fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value)
        .map_err(|_| ProtocolError::InvalidKeyMaterial(format!("{field} is not valid hex")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(mode: CipherMode) -> EncryptionArgs {
        EncryptionArgs::new(
            mode,
            "8e2c4f60a1b3d5e7f90112233445566778899aab",
            "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff",
        )
    }

    #[test]
    fn both_modes_invert() {
        for mode in [CipherMode::Aes, CipherMode::Blowfish] {
            let envelope = args(mode).envelope().unwrap();
            for payload in [&b""[..], b"x", b"exactly-8", &[0xAA; 4096]] {
                let ciphertext = envelope.encrypt(payload).unwrap();
                assert_eq!(envelope.decrypt(&ciphertext).unwrap(), payload);
            }
        }
    }

    #[test]
    fn ciphertext_differs_from_plaintext() {
        let envelope = args(CipherMode::Aes).envelope().unwrap();
        let ciphertext = envelope.encrypt(b"attack at dawn").unwrap();
        assert_ne!(&ciphertext[..], b"attack at dawn".as_slice());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        for mode in [CipherMode::Aes, CipherMode::Blowfish] {
            let envelope = args(mode).envelope().unwrap();
            let mut ciphertext = envelope.encrypt(&[0x55; 64]).unwrap();
            let last = ciphertext.len() - 1;
            ciphertext[last] ^= 0x01;

            // Padding verification rejects the flipped byte.
            assert!(matches!(
                envelope.decrypt(&ciphertext),
                Err(ProtocolError::DecryptionFailure)
            ));
        }
    }

    #[test]
    fn bad_hex_key_rejected() {
        let args = EncryptionArgs::new(CipherMode::Aes, "not-hex!", "00ff");
        assert!(matches!(
            args.envelope(),
            Err(ProtocolError::InvalidKeyMaterial(_))
        ));
    }
}
