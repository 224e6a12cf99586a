// ABOUTME: Secure channel error type for handshakes, envelopes and delivery
// ABOUTME: Maps channel failures onto stable application error codes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use thiserror::Error;

use crate::certificates::CertificateError;
use crate::crypto::CryptoError;
use crate::oauth2_server::TokenError;
use a2a_trust_core::{AppError, ErrorCode};

/// Failures raised by [`super::SecureChannel`] and its transports
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Token exchange or validation failed during the handshake
    #[error("authentication failed: {0}")]
    Authentication(#[from] TokenError),
    /// Our own certificate could not be issued
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    /// Certificate handshake requested while the authority is disabled
    #[error("certificates are disabled; mutual TLS is unavailable")]
    CertificatesDisabled,
    /// Peer presented a certificate that does not validate for its id
    #[error("invalid certificate presented by peer {0}")]
    InvalidPeerCertificate(String),
    /// No established connection for the peer
    #[error("no active connection to peer {0}")]
    NoActiveConnection(String),
    /// Envelope signature did not verify
    #[error("invalid message signature")]
    InvalidSignature,
    /// Envelope id already seen or timestamp outside the replay window
    #[error("replay detected for message {message_id}: {reason}")]
    ReplayDetected {
        /// Offending envelope id
        message_id: String,
        /// Duplicate or stale
        reason: &'static str,
    },
    /// Encrypted payload could not be decoded or authenticated
    #[error("payload decryption failed: {0}")]
    DecryptionFailed(String),
    /// Message type outside the built-in kinds
    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),
    /// Payload does not fit its message type
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// Handshake or delivery deadline passed
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout {
        /// What timed out
        operation: &'static str,
        /// Deadline in milliseconds
        after_ms: u64,
    },
    /// No route to the peer
    #[error("no endpoint registered for peer {0}")]
    UnknownPeer(String),
    /// Peer unreachable or failing
    #[error("transport failed: {0}")]
    Transport(String),
    /// Peer processed the message and rejected it
    #[error("peer rejected message ({code}): {message}")]
    Rejected {
        /// Error code reported by the peer
        code: ErrorCode,
        /// Message reported by the peer
        message: String,
    },
    /// Random generation or encryption failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Envelope (de)serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChannelError {
    /// Whether a retry of the same delivery may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }

    /// Application error code
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Authentication(error) => error.error_code(),
            Self::Certificate(_) => ErrorCode::CertificateIssuanceFailed,
            Self::CertificatesDisabled => ErrorCode::PolicyViolation,
            Self::InvalidPeerCertificate(_) => ErrorCode::CertificateInvalid,
            Self::NoActiveConnection(_) => ErrorCode::NoActiveConnection,
            Self::InvalidSignature => ErrorCode::SignatureInvalid,
            Self::ReplayDetected { .. } => ErrorCode::ReplayDetected,
            Self::DecryptionFailed(_) => ErrorCode::DecryptionFailed,
            Self::UnknownMessageType(_) => ErrorCode::UnknownMessageType,
            Self::InvalidPayload(_) => ErrorCode::InvalidPayload,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::UnknownPeer(_) => ErrorCode::ResourceNotFound,
            Self::Transport(_) => ErrorCode::TransportFailed,
            Self::Rejected { code, .. } => *code,
            Self::Crypto(_) => ErrorCode::InternalError,
            Self::Serialization(_) => ErrorCode::SerializationError,
        }
    }
}

impl From<ChannelError> for AppError {
    fn from(error: ChannelError) -> Self {
        match error {
            ChannelError::Certificate(inner) => inner.into(),
            other => Self::new(other.error_code(), other.to_string()),
        }
    }
}
