// ABOUTME: OAuth 2.0 data models for registered clients, codes and bearer tokens
// ABOUTME: Request/response structures for the authorization-code flow with PKCE
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use a2a_trust_core::constants::defaults;

/// OAuth 2.0 grant types supported by the token service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code with PKCE
    AuthorizationCode,
    /// Refresh token rotation
    RefreshToken,
}

impl GrantType {
    /// Wire name of the grant
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Grants given to clients that do not ask for specific ones
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![Self::AuthorizationCode, Self::RefreshToken]
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "refresh_token" => Ok(Self::RefreshToken),
            other => Err(format!("unsupported grant type: {other}")),
        }
    }
}

/// A client registered with the token service
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredClient {
    /// Unique client identifier
    pub client_id: String,
    /// SHA-256 digest of the client secret, hex encoded
    #[serde(skip_serializing)]
    pub client_secret_hash: String,
    /// Display name
    pub name: String,
    /// Redirect URIs allowed for the authorization-code flow
    pub redirect_uris: Vec<String>,
    /// Scopes the client may request
    pub scopes: Vec<String>,
    /// Grants the client may use
    pub grant_types: Vec<GrantType>,
    /// Cleared on revocation; clients are never removed
    pub is_active: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl RegisteredClient {
    /// Whether the client registered for `grant`
    #[must_use]
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }
}

/// Result of a client registration; the only place the plaintext secret appears
#[derive(Clone)]
pub struct ClientRegistration {
    /// Stored client record
    pub client: RegisteredClient,
    /// Plaintext client secret
    pub client_secret: String,
}

impl fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("client", &self.client)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Pending authorization, keyed by its opaque state value which doubles as the code
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    /// Opaque random state value
    pub code: String,
    /// Client that requested authorization
    pub client_id: String,
    /// Redirect URI the code is bound to
    pub redirect_uri: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// `base64url(sha256(code_verifier))`
    pub code_challenge: String,
    /// Expiry of the code
    pub expires_at: DateTime<Utc>,
}

/// Issued access token
#[derive(Debug, Clone)]
pub struct TokenRecord {
    /// Opaque access token
    pub access_token: String,
    /// Owning client
    pub client_id: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Issue time
    pub issued_at: DateTime<Utc>,
    /// Expiry time; the token is expired once `now >= expires_at`
    pub expires_at: DateTime<Utc>,
    /// Refresh token issued alongside
    pub refresh_token: String,
}

/// Refresh token index entry
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    /// Opaque refresh token
    pub refresh_token: String,
    /// Access token issued alongside
    pub access_token: String,
    /// Owning client
    pub client_id: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
}

/// OAuth 2.0 Token Response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    /// Opaque access token
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Expires in seconds
    pub expires_in: i64,
    /// Refresh token
    pub refresh_token: String,
    /// Space-separated granted scopes
    pub scope: String,
}

/// Identity resolved from a valid access token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentIdentity {
    /// Client identifier
    pub client_id: String,
    /// Client display name
    pub name: String,
    /// Scopes granted to the token
    pub scopes: Vec<String>,
    /// Token issue time
    pub issued_at: DateTime<Utc>,
    /// Token expiry time
    pub expires_at: DateTime<Utc>,
}

impl AgentIdentity {
    /// Whether the identity carries `scope`
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Counts of records removed by one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Expired access tokens removed
    pub access_tokens: usize,
    /// Expired refresh tokens removed
    pub refresh_tokens: usize,
    /// Expired authorization codes removed
    pub authorization_codes: usize,
}

impl PurgeReport {
    /// Total records removed
    #[must_use]
    pub const fn total(&self) -> usize {
        self.access_tokens + self.refresh_tokens + self.authorization_codes
    }
}

/// Token service lifetimes and issuer
#[derive(Debug, Clone)]
pub struct TokenServiceConfig {
    /// Base URL used to build authorization URLs
    pub issuer: Url,
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// Authorization code lifetime
    pub authorization_code_expiry: Duration,
    /// Interval of the background expiry sweep
    pub cleanup_interval: std::time::Duration,
}

impl TokenServiceConfig {
    /// Defaults for the given issuer
    #[must_use]
    pub fn with_issuer(issuer: Url) -> Self {
        Self {
            issuer,
            access_token_ttl: Duration::seconds(defaults::ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: Duration::seconds(defaults::REFRESH_TOKEN_TTL_SECS),
            authorization_code_expiry: Duration::seconds(defaults::AUTHORIZATION_CODE_EXPIRY_SECS),
            cleanup_interval: std::time::Duration::from_secs(defaults::CLEANUP_INTERVAL_SECS),
        }
    }
}

/// OAuth 2.0 Token Request (form encoded)
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Grant type (`authorization_code` or `refresh_token`)
    pub grant_type: String,
    /// Authorization code (for `authorization_code` grant)
    pub code: Option<String>,
    /// Redirect URI (must match the authorization request)
    pub redirect_uri: Option<String>,
    /// Client ID
    pub client_id: Option<String>,
    /// Client secret
    pub client_secret: Option<String>,
    /// PKCE code verifier
    pub code_verifier: Option<String>,
    /// Refresh token (for `refresh_token` grant)
    pub refresh_token: Option<String>,
}

/// OAuth 2.0 Authorization Request (query string)
#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    /// Must be `code`
    pub response_type: String,
    /// Client ID
    pub client_id: String,
    /// Registered redirect URI receiving the code
    pub redirect_uri: String,
    /// Space-separated scopes; all client scopes when absent
    pub scope: Option<String>,
    /// Opaque client state echoed on the redirect
    pub state: Option<String>,
    /// PKCE S256 challenge
    pub code_challenge: String,
    /// PKCE method; only `S256` is accepted
    pub code_challenge_method: Option<String>,
}

/// Authorization code issued for a client-supplied challenge
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    /// Single-use authorization code
    pub code: String,
    /// Space-separated granted scopes
    pub scope: String,
}

/// OAuth 2.0 Revocation Request (form encoded)
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    /// Access or refresh token
    pub token: String,
}

/// OAuth 2.0 Error Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,
    /// Human-readable error description
    pub error_description: Option<String>,
}

impl OAuth2Error {
    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: "invalid_request".to_owned(),
            error_description: Some(description.to_owned()),
        }
    }

    /// Create an `unsupported_response_type` error
    #[must_use]
    pub fn unsupported_response_type() -> Self {
        Self {
            error: "unsupported_response_type".to_owned(),
            error_description: Some("Only the code response type is supported".to_owned()),
        }
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self {
            error: "unsupported_grant_type".to_owned(),
            error_description: Some("Grant type not supported".to_owned()),
        }
    }
}
