// ABOUTME: Shared envelope keys for message signing and payload encryption
// ABOUTME: HMAC-SHA256 signatures via ring and AES-256-GCM payload encryption
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Envelope key material
//!
//! Every agent in a fabric shares one signing secret and one encryption
//! secret. The AES key is the SHA-256 digest of the encryption secret so any
//! secret length yields a 256-bit key.

use std::fmt;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use ring::hmac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::{random_bytes, CryptoError};
use a2a_trust_core::constants::a2a::{AES_GCM_IV_BYTES, AES_GCM_TAG_BYTES};

/// Wire form of an encrypted payload (all fields hex encoded)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Ciphertext without the authentication tag
    pub ciphertext: String,
    /// 96-bit AES-GCM nonce
    pub iv: String,
    /// 128-bit authentication tag
    pub tag: String,
}

/// Signing and encryption keys shared by the agents of one fabric
#[derive(Clone)]
pub struct EnvelopeKeys {
    signing: hmac::Key,
    encryption: [u8; 32],
}

impl fmt::Debug for EnvelopeKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeKeys")
            .field("signing", &"[REDACTED]")
            .field("encryption", &"[REDACTED]")
            .finish()
    }
}

impl Drop for EnvelopeKeys {
    fn drop(&mut self) {
        self.encryption.zeroize();
    }
}

impl EnvelopeKeys {
    /// Derive keys from the configured secrets
    #[must_use]
    pub fn from_secrets(signing_secret: &str, encryption_secret: &str) -> Self {
        let signing = hmac::Key::new(hmac::HMAC_SHA256, signing_secret.as_bytes());
        let mut encryption = [0u8; 32];
        encryption.copy_from_slice(&Sha256::digest(encryption_secret.as_bytes()));
        Self {
            signing,
            encryption,
        }
    }

    /// HMAC-SHA256 over `data`, hex encoded
    #[must_use]
    pub fn sign(&self, data: &[u8]) -> String {
        hex::encode(hmac::sign(&self.signing, data).as_ref())
    }

    /// Verify a hex encoded HMAC-SHA256 signature in constant time
    #[must_use]
    pub fn verify(&self, data: &[u8], signature_hex: &str) -> bool {
        hex::decode(signature_hex)
            .map(|signature| hmac::verify(&self.signing, data, &signature).is_ok())
            .unwrap_or(false)
    }

    /// Encrypt `plaintext` under a fresh random nonce
    ///
    /// # Errors
    ///
    /// Returns an error if the random source or the cipher fails
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload, CryptoError> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.encryption));
        let iv = random_bytes(AES_GCM_IV_BYTES)?;

        let mut sealed = cipher
            .encrypt(GenericArray::from_slice(&iv), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        // aes-gcm appends the tag to the ciphertext
        let tag = sealed.split_off(sealed.len() - AES_GCM_TAG_BYTES);

        Ok(EncryptedPayload {
            ciphertext: hex::encode(sealed),
            iv: hex::encode(iv),
            tag: hex::encode(tag),
        })
    }

    /// Authenticate and decrypt a payload
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] on malformed hex, wrong
    /// lengths or a failed authentication tag
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>, CryptoError> {
        let decode = |field: &str, value: &str| {
            hex::decode(value)
                .map_err(|e| CryptoError::DecryptionFailed(format!("invalid {field} encoding: {e}")))
        };
        let iv = decode("iv", &payload.iv)?;
        let tag = decode("tag", &payload.tag)?;
        let mut sealed = decode("ciphertext", &payload.ciphertext)?;

        if iv.len() != AES_GCM_IV_BYTES {
            return Err(CryptoError::DecryptionFailed(format!(
                "iv must be {AES_GCM_IV_BYTES} bytes"
            )));
        }
        if tag.len() != AES_GCM_TAG_BYTES {
            return Err(CryptoError::DecryptionFailed(format!(
                "tag must be {AES_GCM_TAG_BYTES} bytes"
            )));
        }
        sealed.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.encryption));
        cipher
            .decrypt(GenericArray::from_slice(&iv), sealed.as_slice())
            .map_err(|_| CryptoError::DecryptionFailed("authentication tag mismatch".into()))
    }
}
