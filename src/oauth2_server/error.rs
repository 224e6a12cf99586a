// ABOUTME: Token service error type with OAuth 2.0 and application error mappings
// ABOUTME: Each variant maps to an RFC 6749 error code and a stable ErrorCode
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use thiserror::Error;

use super::models::{GrantType, OAuth2Error};
use crate::crypto::CryptoError;
use a2a_trust_core::{AppError, ErrorCode};

/// Failures raised by [`super::TokenService`]
#[derive(Debug, Error)]
pub enum TokenError {
    /// Client unknown or deactivated
    #[error("invalid client")]
    InvalidClient,
    /// Redirect URI not registered for the client
    #[error("redirect URI is not registered for this client")]
    InvalidRedirectUri,
    /// Requested scope outside the client's allowed scopes
    #[error("scope '{0}' is not allowed for this client")]
    InvalidScope(String),
    /// Client did not register for the grant
    #[error("client is not authorized for the {0} grant")]
    UnauthorizedGrant(GrantType),
    /// Client secret mismatch
    #[error("invalid client secret")]
    InvalidClientSecret,
    /// No unexpired authorization code for this client and redirect URI
    #[error("invalid or expired authorization code")]
    InvalidOrExpiredCode,
    /// PKCE verifier malformed or not matching the stored challenge
    #[error("invalid code verifier")]
    InvalidCodeVerifier,
    /// PKCE challenge is not an S256 challenge
    #[error("code_challenge must be a base64url S256 digest")]
    InvalidCodeChallenge,
    /// Unknown refresh token
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    /// Refresh token past its expiry
    #[error("refresh token expired")]
    RefreshTokenExpired,
    /// Token belongs to a deactivated client
    #[error("client is inactive")]
    ClientInactive,
    /// Unknown access token
    #[error("invalid token")]
    InvalidToken,
    /// Access token past its expiry
    #[error("token expired")]
    TokenExpired,
    /// Random generation failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl TokenError {
    /// RFC 6749 error code for token endpoint responses
    #[must_use]
    pub const fn oauth_error(&self) -> &'static str {
        match self {
            Self::InvalidClient | Self::InvalidClientSecret | Self::ClientInactive => {
                "invalid_client"
            }
            Self::InvalidRedirectUri | Self::InvalidCodeChallenge => "invalid_request",
            Self::InvalidScope(_) => "invalid_scope",
            Self::UnauthorizedGrant(_) => "unauthorized_client",
            Self::InvalidOrExpiredCode
            | Self::InvalidCodeVerifier
            | Self::InvalidRefreshToken
            | Self::RefreshTokenExpired => "invalid_grant",
            Self::InvalidToken | Self::TokenExpired => "invalid_token",
            Self::Crypto(_) => "server_error",
        }
    }

    /// Application error code
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidRedirectUri | Self::InvalidCodeChallenge => ErrorCode::ValidationFailed,
            Self::InvalidScope(_) | Self::UnauthorizedGrant(_) => ErrorCode::PermissionDenied,
            Self::TokenExpired | Self::RefreshTokenExpired => ErrorCode::AuthExpired,
            Self::Crypto(_) => ErrorCode::InternalError,
            Self::InvalidClient
            | Self::InvalidClientSecret
            | Self::InvalidOrExpiredCode
            | Self::InvalidCodeVerifier
            | Self::InvalidRefreshToken
            | Self::ClientInactive
            | Self::InvalidToken => ErrorCode::AuthInvalid,
        }
    }
}

impl From<TokenError> for AppError {
    fn from(error: TokenError) -> Self {
        Self::new(error.error_code(), error.to_string())
    }
}

impl From<&TokenError> for OAuth2Error {
    fn from(error: &TokenError) -> Self {
        Self {
            error: error.oauth_error().to_owned(),
            error_description: Some(error.to_string()),
        }
    }
}
