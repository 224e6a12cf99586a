// ABOUTME: Cryptography module for random material, digests and envelope keys
// ABOUTME: Centralizes all cryptographic primitives used by the trust fabric
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Cryptographic utilities for the A2A trust fabric

pub mod keys;

use base64::{engine::general_purpose, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

pub use keys::{EncryptedPayload, EnvelopeKeys};

/// Failures raised by cryptographic primitives
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The system random source is unavailable
    #[error("secure random generator unavailable")]
    RandomUnavailable,
    /// AES-GCM encryption failed
    #[error("encryption failed")]
    EncryptionFailed,
    /// Ciphertext could not be authenticated or decoded
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

/// Fill a buffer of `len` bytes from the system CSPRNG
///
/// # Errors
///
/// Returns [`CryptoError::RandomUnavailable`] if the system random source fails
pub fn random_bytes(len: usize) -> Result<Vec<u8>, CryptoError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!(
            "CRITICAL: SystemRandom failed - cannot generate secure random bytes: {}",
            e
        );
        CryptoError::RandomUnavailable
    })?;
    Ok(bytes)
}

/// Random URL-safe token (base64url without padding) over `len` random bytes
///
/// # Errors
///
/// Returns [`CryptoError::RandomUnavailable`] if the system random source fails
pub fn random_token(len: usize) -> Result<String, CryptoError> {
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(random_bytes(len)?))
}

/// Random lowercase hex string over `len` random bytes
///
/// # Errors
///
/// Returns [`CryptoError::RandomUnavailable`] if the system random source fails
pub fn random_hex(len: usize) -> Result<String, CryptoError> {
    Ok(hex::encode(random_bytes(len)?))
}

/// SHA-256 digest of `input`, hex encoded
#[must_use]
pub fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

/// Constant-time string comparison
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
