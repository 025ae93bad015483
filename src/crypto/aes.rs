//! AES-128-CBC envelope.
//!
//! Key and IV material are derived from the session key and the user's salt:
//! the key is the first 16 bytes of SHA-256(session key), the IV the first 16
//! bytes of SHA-256(salt ‖ session key). Both inputs arrive hex-encoded from
//! the handshake.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{decode_hex, EncryptionArgs, Envelope};
use crate::error::{ProtocolError, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES strategy for one session. Key schedule is rebuilt per call; the
/// envelope itself only holds the derived key/IV bytes.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AesEnvelope {
    key: [u8; 16],
    iv: [u8; 16],
}

impl AesEnvelope {
    pub fn from_args(args: &EncryptionArgs) -> Result<Self> {
        let session_key = decode_hex("session key", &args.key)?;
        let salt = decode_hex("salt", &args.salt)?;
        if session_key.is_empty() {
            return Err(ProtocolError::InvalidKeyMaterial(
                "session key is empty".into(),
            ));
        }

        let key_digest = Sha256::digest(&session_key);
        let iv_digest = Sha256::new()
            .chain_update(&salt)
            .chain_update(&session_key)
            .finalize();

        let mut key = [0u8; 16];
        let mut iv = [0u8; 16];
        key.copy_from_slice(&key_digest[..16]);
        iv.copy_from_slice(&iv_digest[..16]);
        Ok(Self { key, iv })
    }
}

impl Envelope for AesEnvelope {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes128CbcEnc::new(&self.key.into(), &self.iv.into());
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes128CbcDec::new(&self.key.into(), &self.iv.into());
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| ProtocolError::DecryptionFailure)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::crypto::CipherMode;

    fn envelope() -> AesEnvelope {
        AesEnvelope::from_args(&EncryptionArgs::new(
            CipherMode::Aes,
            "a1b2c3d4e5f60718293a4b5c6d7e8f90",
            "ffeeddccbbaa99887766554433221100",
        ))
        .unwrap()
    }

    #[test]
    fn pads_to_block_size() {
        let envelope = envelope();
        // Block-aligned input still gains one full padding block.
        assert_eq!(envelope.encrypt(&[0u8; 16]).unwrap().len(), 32);
        assert_eq!(envelope.encrypt(&[0u8; 15]).unwrap().len(), 16);
        assert_eq!(envelope.encrypt(&[]).unwrap().len(), 16);
    }

    #[test]
    fn deterministic_for_fixed_args() {
        let a = envelope().encrypt(b"same input").unwrap();
        let b = envelope().encrypt(b"same input").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_salt_different_stream() {
        let other = AesEnvelope::from_args(&EncryptionArgs::new(
            CipherMode::Aes,
            "a1b2c3d4e5f60718293a4b5c6d7e8f90",
            "0000000000000000",
        ))
        .unwrap();
        assert_ne!(
            envelope().encrypt(b"same input").unwrap(),
            other.encrypt(b"same input").unwrap()
        );
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let envelope = envelope();
        let ciphertext = envelope.encrypt(b"some payload bytes").unwrap();
        assert!(envelope.decrypt(&ciphertext[..ciphertext.len() - 1]).is_err());
    }
}
