// ABOUTME: Certificate authority error type
// ABOUTME: Issuance, encoding and storage failures with their application error codes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::path::PathBuf;

use thiserror::Error;

use a2a_trust_core::{AppError, ErrorCode};

/// Failures raised by [`super::CertificateAuthority`]
#[derive(Debug, Error)]
pub enum CertificateError {
    /// Agent id is empty or not safe to use as a path component and common name
    #[error("invalid agent id '{0}'")]
    InvalidAgentId(String),
    /// RSA key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    /// Certificate construction or signing failed
    #[error("certificate build failed: {0}")]
    Build(String),
    /// PEM/DER encoding or decoding failed
    #[error("certificate encoding failed: {0}")]
    Encoding(String),
    /// Reading or writing artifacts failed
    #[error("certificate storage failed at {path}: {source}")]
    Storage {
        /// Path being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl CertificateError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

impl From<CertificateError> for AppError {
    fn from(error: CertificateError) -> Self {
        let code = match error {
            CertificateError::InvalidAgentId(_) => ErrorCode::ValidationFailed,
            CertificateError::Storage { .. } => ErrorCode::StorageError,
            CertificateError::KeyGeneration(_)
            | CertificateError::Build(_)
            | CertificateError::Encoding(_) => ErrorCode::CertificateIssuanceFailed,
        };
        Self::new(code, error.to_string())
    }
}
