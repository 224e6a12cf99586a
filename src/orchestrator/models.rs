// ABOUTME: Request and result types of the authentication orchestrator
// ABOUTME: Registration, authentication outcomes, request context, channel and health results
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::a2a::{ConnectionStatus, SecurityLevel};
use crate::certificates::{AgentCertificate, AgentInfo};
use crate::oauth2_server::{AgentIdentity, TokenResponse};
use a2a_trust_core::{AppError, ErrorCode};

/// Agent registration request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentRegistration {
    /// Display name
    pub name: String,
    /// Absolute http(s) redirect URIs
    pub redirect_uris: Vec<String>,
    /// Requested scopes; `read` and `write` when absent
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    /// Certificate common name; the client id when absent
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Organization details placed in the certificate subject
    #[serde(default)]
    pub agent_info: AgentInfo,
}

/// OAuth endpoint URLs handed to a newly registered agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OAuthEndpoints {
    /// Authorization endpoint
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// Revocation endpoint
    pub revocation_endpoint: String,
}

/// Result of a successful registration
#[derive(Clone, Serialize)]
pub struct RegistrationResult {
    /// Agent id used for the certificate
    pub agent_id: String,
    /// OAuth client id
    pub client_id: String,
    /// Plaintext client secret; only ever returned here
    pub client_secret: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Issued certificate when certificates are enabled
    pub certificate: Option<AgentCertificate>,
    /// OAuth endpoints
    pub endpoints: OAuthEndpoints,
}

impl fmt::Debug for RegistrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationResult")
            .field("agent_id", &self.agent_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("certificate", &self.certificate.as_ref().map(|c| c.serial))
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

/// Caller metadata checked against the allow lists
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Client address
    pub ip_address: Option<IpAddr>,
    /// `User-Agent` header
    pub user_agent: Option<String>,
}

/// Structured authentication failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthFailure {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Extra context such as the rate-limit reset time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<AppError> for AuthFailure {
    fn from(error: AppError) -> Self {
        Self {
            code: error.code,
            message: error.message,
            details: error.details,
        }
    }
}

/// Result of [`super::AuthOrchestrator::authenticate_agent`]
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticationOutcome {
    /// Whether the agent authenticated
    pub success: bool,
    /// Requested security level
    pub security_level: SecurityLevel,
    /// Resolved identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<AgentIdentity>,
    /// Fresh session id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Issued tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenResponse>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AuthFailure>,
}

impl AuthenticationOutcome {
    pub(crate) fn failed(security_level: SecurityLevel, error: AppError) -> Self {
        Self {
            success: false,
            security_level,
            identity: None,
            session_id: None,
            tokens: None,
            error: Some(error.into()),
        }
    }
}

/// Liveness of a peer channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckResult {
    /// Peer agent id
    pub peer_id: String,
    /// Whether the round trip succeeded
    pub healthy: bool,
    /// Round-trip time
    pub latency_ms: u64,
    /// When the check finished
    pub checked_at: DateTime<Utc>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Established channel with its first health check
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    /// Peer agent id
    pub peer_id: String,
    /// Connection snapshot
    pub connection: ConnectionStatus,
    /// Health-check round trip run right after the handshake
    pub health: HealthCheckResult,
}

/// Authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Opaque session id
    pub session_id: String,
    /// Authenticated client
    pub client_id: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Level the session was authenticated at
    pub security_level: SecurityLevel,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// End of the maximum session duration
    pub expires_at: DateTime<Utc>,
}

/// A2A headers accompanying an inbound envelope
#[derive(Debug, Clone, Default)]
pub struct InboundHeaders {
    /// Token from `Authorization: Bearer`
    pub bearer_token: Option<String>,
    /// `X-Agent-ID`
    pub agent_id: Option<String>,
    /// `X-Message-ID`
    pub message_id: Option<String>,
    /// `X-Nonce`
    pub nonce: Option<String>,
    /// `X-Message-Priority`
    pub priority: Option<String>,
}

/// Liveness summary of the local service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    /// Always `healthy` while the process serves requests
    pub status: &'static str,
    /// Local agent id
    pub agent_id: String,
    /// Established peer connections
    pub active_connections: usize,
    /// Live access tokens
    pub active_tokens: usize,
    /// Open sessions
    pub active_sessions: usize,
    /// Whether the certificate authority is enabled
    pub certificates_enabled: bool,
    /// When the summary was produced
    pub timestamp: DateTime<Utc>,
}
