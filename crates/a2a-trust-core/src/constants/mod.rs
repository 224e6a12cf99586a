// ABOUTME: Constants module with domain-separated organization
// ABOUTME: OAuth scopes and grants, A2A header names, endpoint paths and defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Constants module
//!
//! Constants are grouped into logical domains rather than being in a single large file.

/// OAuth 2.0 constants
pub mod oauth {
    /// Read scope
    pub const SCOPE_READ: &str = "read";
    /// Write scope
    pub const SCOPE_WRITE: &str = "write";
    /// Administrative scope, required for the high security level
    pub const SCOPE_ADMIN: &str = "admin";
    /// Every scope an agent may request
    pub const ALLOWED_SCOPES: &[&str] = &[SCOPE_READ, SCOPE_WRITE, SCOPE_ADMIN];
    /// Bearer token type
    pub const TOKEN_TYPE_BEARER: &str = "Bearer";
    /// PKCE challenge method (plain is never accepted)
    pub const CODE_CHALLENGE_METHOD_S256: &str = "S256";
    /// Authorization response type
    pub const RESPONSE_TYPE_CODE: &str = "code";
    /// Random bytes behind a client id
    pub const CLIENT_ID_BYTES: usize = 16;
    /// Random bytes behind a client secret
    pub const CLIENT_SECRET_BYTES: usize = 32;
    /// Random bytes behind access/refresh tokens and authorization states
    pub const TOKEN_BYTES: usize = 32;
    /// Prefix of generated client ids
    pub const CLIENT_ID_PREFIX: &str = "a2a_";
}

/// A2A message transport constants
pub mod a2a {
    /// Agent identity header
    pub const HEADER_AGENT_ID: &str = "x-agent-id";
    /// Message identity header
    pub const HEADER_MESSAGE_ID: &str = "x-message-id";
    /// Nonce header
    pub const HEADER_NONCE: &str = "x-nonce";
    /// Delivery priority header
    pub const HEADER_PRIORITY: &str = "x-message-priority";
    /// AES-GCM nonce length in bytes
    pub const AES_GCM_IV_BYTES: usize = 12;
    /// AES-GCM authentication tag length in bytes
    pub const AES_GCM_TAG_BYTES: usize = 16;
    /// Envelope nonce length in bytes
    pub const ENVELOPE_NONCE_BYTES: usize = 16;
}

/// HTTP endpoint paths
pub mod endpoints {
    /// Authorization endpoint path
    pub const OAUTH_AUTHORIZE: &str = "/oauth/authorize";
    /// Token endpoint path
    pub const OAUTH_TOKEN: &str = "/oauth/token";
    /// Revocation endpoint path
    pub const OAUTH_REVOKE: &str = "/oauth/revoke";
    /// Message endpoint path
    pub const A2A_MESSAGES: &str = "/a2a/messages";
    /// Certificate endpoint path
    pub const A2A_CERTIFICATE: &str = "/a2a/certificate";
    /// Health endpoint path
    pub const A2A_HEALTH: &str = "/a2a/health";
    /// Security metrics endpoint path
    pub const A2A_METRICS: &str = "/a2a/metrics";
    /// Callback path used for the local agent's own OAuth client
    pub const A2A_CALLBACK: &str = "/a2a/callback";
}

/// Certificate authority constants
pub mod certificates {
    /// Root private key file name
    pub const ROOT_KEY_FILE: &str = "ca.key.pem";
    /// Root certificate file name
    pub const ROOT_CERT_FILE: &str = "ca.cert.pem";
    /// Persisted serial counter file name
    pub const SERIAL_FILE: &str = "serial";
    /// Directory holding per-agent artifacts
    pub const AGENTS_DIR: &str = "agents";
    /// Agent private key file name
    pub const AGENT_KEY_FILE: &str = "agent.key.pem";
    /// Agent certificate file name
    pub const AGENT_CERT_FILE: &str = "agent.cert.pem";
    /// Copy of the CA certificate kept beside each agent certificate
    pub const AGENT_CA_FILE: &str = "ca.cert.pem";
    /// Certificates expiring within this many days report `expiring_soon`
    pub const EXPIRING_SOON_DAYS: i64 = 7;
    /// Backdating applied to `notBefore` to absorb clock skew between agents
    pub const NOT_BEFORE_SKEW_MINUTES: i64 = 5;
    /// Root certificate common name
    pub const ROOT_COMMON_NAME: &str = "A2A Trust Fabric Root CA";
    /// Organization placed in every subject
    pub const ORGANIZATION: &str = "A2A Trust Fabric";
}

/// Service defaults
pub mod defaults {
    /// Default HTTP port
    pub const HTTP_PORT: u16 = 8090;
    /// Default per-agent requests per minute
    pub const RATE_LIMIT_PER_MINUTE: u32 = 100;
    /// Default audit buffer capacity
    pub const AUDIT_CAPACITY: usize = 10_000;
    /// Default access token lifetime in seconds
    pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;
    /// Default refresh token lifetime in seconds (30 days)
    pub const REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 3600;
    /// Default authorization code lifetime in seconds
    pub const AUTHORIZATION_CODE_EXPIRY_SECS: i64 = 600;
    /// Default cleanup sweep interval in seconds
    pub const CLEANUP_INTERVAL_SECS: u64 = 60;
    /// Default replay retention window in seconds
    pub const REPLAY_WINDOW_SECS: i64 = 24 * 3600;
    /// Default session duration in seconds
    pub const MAX_SESSION_SECS: i64 = 3600;
    /// Default leaf certificate validity in days
    pub const CERT_VALIDITY_DAYS: i64 = 365;
    /// Default leaf RSA key size
    pub const CERT_KEY_SIZE: usize = 2048;
    /// Default root RSA key size
    pub const CA_KEY_SIZE: usize = 4096;
    /// Default root certificate validity in days
    pub const CA_VALIDITY_DAYS: i64 = 3650;
    /// Default outbound request timeout in milliseconds
    pub const REQUEST_TIMEOUT_MS: u64 = 30_000;
    /// Default outbound retry count
    pub const RETRY_COUNT: u32 = 3;
    /// Default delay between retries in milliseconds
    pub const RETRY_DELAY_MS: u64 = 1_000;
    /// Timeout applied to health-check round trips in milliseconds
    pub const HEALTH_CHECK_TIMEOUT_MS: u64 = 5_000;
}

/// Service names for structured logging
pub mod service_names {
    /// Trust fabric server
    pub const A2A_TRUST_SERVER: &str = "a2a-trust-server";
}
