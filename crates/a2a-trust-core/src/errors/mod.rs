// ABOUTME: Unified error codes and application error type for the trust fabric
// ABOUTME: Maps every failure to a stable code, an HTTP status and an audit category
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Unified Error Handling
//!
//! Components raise their own `thiserror` enums; at the orchestrator boundary
//! everything converges on [`AppError`], which carries a stable [`ErrorCode`]
//! used for HTTP responses, audit entries and security metrics.

#[cfg(feature = "http-response")]
mod http;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard error codes used throughout the trust fabric
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication & authorization
    /// Client credentials, codes or tokens were rejected
    AuthInvalid,
    /// Token or session is past its expiry
    AuthExpired,
    /// Caller lacks the scope or policy required for the action
    PermissionDenied,
    /// Request violates the active security policy
    PolicyViolation,

    // Rate limiting
    /// Per-agent request ceiling reached for the current window
    RateLimitExceeded,

    // Validation
    /// Malformed or disallowed input
    ValidationFailed,

    // Certificates
    /// Certificate failed validation against the authority
    CertificateInvalid,
    /// Certificate could not be issued or persisted
    CertificateIssuanceFailed,

    // Message security
    /// Envelope signature did not verify
    SignatureInvalid,
    /// Envelope id already seen or envelope outside the replay window
    ReplayDetected,
    /// Encrypted payload could not be authenticated or decrypted
    DecryptionFailed,

    // Channel
    /// No established connection exists for the peer
    NoActiveConnection,
    /// Message type is not one of the built-in kinds
    UnknownMessageType,
    /// Payload does not match the shape of its message type
    InvalidPayload,
    /// Handshake or transmission exceeded its deadline
    Timeout,
    /// Peer could not be reached or answered with an error
    TransportFailed,

    // Resources
    /// Requested resource does not exist
    ResourceNotFound,

    // Configuration
    /// Required configuration is missing
    ConfigMissing,
    /// Configuration value is invalid
    ConfigInvalid,

    // Internal
    /// Unexpected internal failure
    InternalError,
    /// Artifact storage failed
    StorageError,
    /// Data serialization/deserialization failed
    SerializationError,
}

/// Coarse error taxonomy used for audit grouping and retry guidance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input; never retried
    Validation,
    /// Credential or token failure; retry only by restarting the flow
    Auth,
    /// Certificate issuance or validation failure
    Certificate,
    /// Caller must back off until the window resets
    RateLimit,
    /// Duplicate or stale message; fatal for that message
    Replay,
    /// Signature or decryption failure
    Crypto,
    /// Timeouts and peer delivery failures
    Transport,
    /// Everything else
    Internal,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::ValidationFailed
            | Self::UnknownMessageType
            | Self::InvalidPayload
            | Self::NoActiveConnection => 400,
            Self::AuthInvalid | Self::AuthExpired | Self::SignatureInvalid => 401,
            Self::PermissionDenied
            | Self::PolicyViolation
            | Self::CertificateInvalid
            | Self::DecryptionFailed => 403,
            Self::ResourceNotFound => 404,
            Self::ReplayDetected => 409,
            Self::RateLimitExceeded => 429,
            Self::TransportFailed => 502,
            Self::Timeout => 504,
            Self::CertificateIssuanceFailed
            | Self::ConfigMissing
            | Self::ConfigInvalid
            | Self::InternalError
            | Self::StorageError
            | Self::SerializationError => 500,
        }
    }

    /// Audit category for this code
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationFailed | Self::UnknownMessageType | Self::InvalidPayload => {
                ErrorCategory::Validation
            }
            Self::AuthInvalid | Self::AuthExpired | Self::PermissionDenied | Self::PolicyViolation => {
                ErrorCategory::Auth
            }
            Self::CertificateInvalid | Self::CertificateIssuanceFailed => ErrorCategory::Certificate,
            Self::RateLimitExceeded => ErrorCategory::RateLimit,
            Self::ReplayDetected => ErrorCategory::Replay,
            Self::SignatureInvalid | Self::DecryptionFailed => ErrorCategory::Crypto,
            Self::NoActiveConnection | Self::Timeout | Self::TransportFailed => {
                ErrorCategory::Transport
            }
            Self::ResourceNotFound
            | Self::ConfigMissing
            | Self::ConfigInvalid
            | Self::InternalError
            | Self::StorageError
            | Self::SerializationError => ErrorCategory::Internal,
        }
    }

    /// Stable string form, identical to the serialized representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthInvalid => "AUTH_INVALID",
            Self::AuthExpired => "AUTH_EXPIRED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::PolicyViolation => "POLICY_VIOLATION",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::CertificateInvalid => "CERTIFICATE_INVALID",
            Self::CertificateIssuanceFailed => "CERTIFICATE_ISSUANCE_FAILED",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::ReplayDetected => "REPLAY_DETECTED",
            Self::DecryptionFailed => "DECRYPTION_FAILED",
            Self::NoActiveConnection => "NO_ACTIVE_CONNECTION",
            Self::UnknownMessageType => "UNKNOWN_MESSAGE_TYPE",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::Timeout => "TIMEOUT",
            Self::TransportFailed => "TRANSPORT_FAILED",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::ConfigMissing => "CONFIG_MISSING",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::InternalError => "INTERNAL_ERROR",
            Self::StorageError => "STORAGE_ERROR",
            Self::SerializationError => "SERIALIZATION_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorCategory {
    /// Whether failures in this category are recorded as security events
    #[must_use]
    pub const fn is_security_event(&self) -> bool {
        matches!(
            self,
            Self::Crypto | Self::Replay | Self::Certificate | Self::RateLimit
        )
    }
}

/// Unified error type for the application
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Structured details (reset time for rate limits, offending field, ...)
    pub details: Option<serde_json::Value>,
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a new error with the given code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Audit category of this error
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// HTTP status for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Validation failure
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    /// Invalid credentials or token
    #[must_use]
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Security policy violation
    #[must_use]
    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PolicyViolation, message)
    }

    /// Permission denied
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Rate limit exceeded, carrying the reset time so callers can back off
    #[must_use]
    pub fn rate_limit_exceeded(agent_id: &str, limit: u32, reset_at: DateTime<Utc>) -> Self {
        Self::new(
            ErrorCode::RateLimitExceeded,
            format!("Rate limit of {limit} requests per minute exceeded for agent {agent_id}"),
        )
        .with_details(serde_json::json!({
            "limit": limit,
            "reset_at": reset_at.to_rfc3339(),
        }))
    }

    /// Resource not found
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Missing configuration
    #[must_use]
    pub fn config_missing(key: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissing,
            format!("Missing configuration: {key}"),
        )
    }

    /// Invalid configuration value
    #[must_use]
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, message)
    }

    /// Internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, error.to_string())
    }
}
