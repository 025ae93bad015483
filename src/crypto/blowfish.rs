//! Blowfish-CBC envelope.
//!
//! Keyed directly from the hex-decoded session secret (Blowfish accepts 4-56
//! byte keys; longer secrets are truncated). Plaintext is PKCS7-padded to the
//! 8-byte Blowfish block; padding is verified and stripped on decrypt. The IV
//! is fixed per session, taken from SHA-1 of the key.

use blowfish::Blowfish;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha1::{Digest, Sha1};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{decode_hex, EncryptionArgs, Envelope};
use crate::error::{ProtocolError, Result};

type BlowfishCbcEnc = cbc::Encryptor<Blowfish>;
type BlowfishCbcDec = cbc::Decryptor<Blowfish>;

const MAX_KEY_LEN: usize = 56;
const MIN_KEY_LEN: usize = 4;

/// Blowfish strategy for one session. The expensive key schedule lives inside
/// the cipher construction; this type keeps only the raw key bytes and wipes
/// them when the session ends.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct BlowfishEnvelope {
    key: Vec<u8>,
    iv: [u8; 8],
}

impl BlowfishEnvelope {
    pub fn from_args(args: &EncryptionArgs) -> Result<Self> {
        let mut key = decode_hex("session key", &args.key)?;
        if key.len() < MIN_KEY_LEN {
            return Err(ProtocolError::InvalidKeyMaterial(format!(
                "session key too short for Blowfish: {} bytes",
                key.len()
            )));
        }
        key.truncate(MAX_KEY_LEN);

        let digest = Sha1::digest(&key);
        let mut iv = [0u8; 8];
        iv.copy_from_slice(&digest[..8]);
        Ok(Self { key, iv })
    }
}

impl Envelope for BlowfishEnvelope {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = BlowfishCbcEnc::new_from_slices(&self.key, &self.iv)
            .map_err(|_| ProtocolError::EncryptionFailure)?;
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let cipher = BlowfishCbcDec::new_from_slices(&self.key, &self.iv)
            .map_err(|_| ProtocolError::DecryptionFailure)?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| ProtocolError::DecryptionFailure)
    }
}
