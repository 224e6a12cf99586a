// ABOUTME: PKCE (RFC 7636) verifier generation, validation and S256 challenges
// ABOUTME: Only the S256 method is supported; plain challenges are never accepted
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use base64::{engine::general_purpose, Engine};
use sha2::{Digest, Sha256};

use crate::crypto::{constant_time_eq, random_token, CryptoError};

/// Shortest verifier RFC 7636 allows
pub const MIN_VERIFIER_LEN: usize = 43;
/// Longest verifier RFC 7636 allows
pub const MAX_VERIFIER_LEN: usize = 128;

/// Generate a fresh random verifier (32 random bytes, 43 characters)
///
/// # Errors
///
/// Returns an error if the system random source fails
pub fn generate_code_verifier() -> Result<String, CryptoError> {
    random_token(32)
}

/// Whether `verifier` has a legal length and only unreserved characters
#[must_use]
pub fn is_valid_verifier(verifier: &str) -> bool {
    (MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&verifier.len())
        && verifier
            .chars()
            .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
}

/// `base64url(sha256(verifier))` without padding
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Whether `challenge` has the shape of an S256 challenge (43 base64url characters)
#[must_use]
pub fn is_valid_challenge(challenge: &str) -> bool {
    challenge.len() == MIN_VERIFIER_LEN
        && challenge
            .chars()
            .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_'))
}

/// Constant-time check of `verifier` against a stored challenge
#[must_use]
pub fn verify_challenge(verifier: &str, challenge: &str) -> bool {
    is_valid_verifier(verifier) && constant_time_eq(&code_challenge(verifier), challenge)
}
