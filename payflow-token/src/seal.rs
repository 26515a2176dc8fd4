//! Authenticated sealing of merchant data.
//!
//! The original demo "encrypted" merchant data by concatenating a hash
//! with the plaintext and base64-encoding the result, which offers no
//! confidentiality. Here the merchant block is sealed with AES-256-GCM
//! under a key derived from the shared secret via HKDF-SHA256, so a
//! receiver without the secret learns nothing and any bit-flip fails
//! authentication at unseal time.
//!
//! Sealed wire format, hex-encoded for embedding in the token JSON:
//!
//! ```text
//! [1 byte version][12 byte nonce][ciphertext + 16 byte tag]
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::errors::TokenError;

const SEAL_VERSION: u8 = 1;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// HKDF info string binding derived keys to this purpose.
const KEY_INFO: &[u8] = b"payflow-merchant-data-v1";

/// Sealing context derived from the shared token secret.
#[derive(Clone)]
pub struct SealContext {
    key: [u8; 32],
}

impl SealContext {
    /// Derive a sealing key from the shared secret.
    pub fn from_secret(secret: &str) -> Result<Self, TokenError> {
        let hk = Hkdf::<Sha256>::new(None, secret.as_bytes());
        let mut key = [0u8; 32];
        hk.expand(KEY_INFO, &mut key)
            .map_err(|e| TokenError::Seal(format!("key derivation failed: {}", e)))?;
        Ok(Self { key })
    }

    /// Seal plaintext, returning the hex-encoded wire blob.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, TokenError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| TokenError::Seal(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| TokenError::Seal(format!("encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
        blob.push(SEAL_VERSION);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(hex::encode(blob))
    }

    /// Unseal a hex-encoded blob back to plaintext.
    ///
    /// Fails on malformed hex, an unknown version byte, or when the GCM
    /// tag does not authenticate (wrong secret or tampered data).
    pub fn unseal(&self, sealed: &str) -> Result<Vec<u8>, TokenError> {
        let blob = hex::decode(sealed)
            .map_err(|_| TokenError::Seal("sealed data is not valid hex".to_string()))?;

        if blob.len() < 1 + NONCE_SIZE + TAG_SIZE {
            return Err(TokenError::Seal("sealed data too short".to_string()));
        }
        if blob[0] != SEAL_VERSION {
            return Err(TokenError::Seal(format!(
                "unsupported seal version: {}",
                blob[0]
            )));
        }

        let nonce = Nonce::from_slice(&blob[1..1 + NONCE_SIZE]);
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| TokenError::Seal(e.to_string()))?;

        cipher
            .decrypt(nonce, &blob[1 + NONCE_SIZE..])
            .map_err(|_| TokenError::Seal("authentication failed".to_string()))
    }

    /// Clear the derived key.
    pub fn zeroize(&mut self) {
        self.key.iter_mut().for_each(|b| *b = 0);
    }
}

impl Drop for SealContext {
    fn drop(&mut self) {
        self.zeroize();
    }
}
