// ABOUTME: Per-peer connection records, handshake states and security levels
// ABOUTME: Read-only status snapshots exclude bearer tokens and key material
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Security level of a connection or authentication
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Bearer token only
    Basic,
    /// Bearer token with signed envelopes
    #[default]
    Standard,
    /// Adds mutual certificate authentication, encryption and admin scope
    High,
}

impl SecurityLevel {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::High => "high",
        }
    }

    /// Whether a certificate handshake is part of the connection
    #[must_use]
    pub const fn requires_certificates(&self) -> bool {
        matches!(self, Self::High)
    }

    /// Whether every payload must be encrypted
    #[must_use]
    pub const fn requires_encryption(&self) -> bool {
        matches!(self, Self::High)
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "standard" => Ok(Self::Standard),
            "high" => Ok(Self::High),
            other => Err(format!("unknown security level: {other}")),
        }
    }
}

/// Handshake state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Nothing attempted yet
    Uninitialized,
    /// Token exchange in progress
    Authenticating,
    /// Certificate exchange in progress
    TlsHandshake,
    /// Ready to carry messages
    Established,
    /// Closed by either side
    Closed,
}

/// Certificate material used for mutual TLS with one peer
#[derive(Clone)]
pub struct TlsContext {
    /// Our leaf certificate PEM
    pub certificate_pem: String,
    /// Our PKCS#8 private key PEM
    pub private_key_pem: String,
    /// CA certificate PEM
    pub ca_certificate_pem: String,
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("private_key_pem", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Live connection to a peer
#[derive(Debug, Clone)]
pub struct Connection {
    /// Peer agent id
    pub peer_id: String,
    /// Bearer token presented to the peer
    pub access_token: String,
    /// Bearer token expiry
    pub token_expires_at: DateTime<Utc>,
    /// Mutual TLS material for high-security connections
    pub tls: Option<TlsContext>,
    /// Negotiated security level
    pub security_level: SecurityLevel,
    /// Handshake completion time
    pub established_at: DateTime<Utc>,
    /// Last successful send
    pub last_activity: DateTime<Utc>,
    /// Cleared on close
    pub is_active: bool,
    /// Messages delivered on this connection
    pub message_count: u64,
    /// Current state
    pub state: ConnectionState,
}

impl Connection {
    /// Whether messages may be sent
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.is_active && self.state == ConnectionState::Established
    }

    /// Snapshot without secrets
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            peer_id: self.peer_id.clone(),
            state: self.state,
            security_level: Some(self.security_level),
            established_at: Some(self.established_at),
            last_activity: Some(self.last_activity),
            token_expires_at: Some(self.token_expires_at),
            message_count: self.message_count,
            is_active: self.is_active,
            mutual_tls: self.tls.is_some(),
        }
    }
}

/// Read-only view of a connection or an in-flight handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Peer agent id
    pub peer_id: String,
    /// Current state
    pub state: ConnectionState,
    /// Negotiated level, once established
    pub security_level: Option<SecurityLevel>,
    /// Handshake completion time
    pub established_at: Option<DateTime<Utc>>,
    /// Last successful send
    pub last_activity: Option<DateTime<Utc>>,
    /// Bearer token expiry
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Messages delivered
    pub message_count: u64,
    /// Whether the connection is usable
    pub is_active: bool,
    /// Whether certificates were exchanged
    pub mutual_tls: bool,
}

impl ConnectionStatus {
    /// Status of a handshake that has not completed
    #[must_use]
    pub fn pending(peer_id: &str, state: ConnectionState) -> Self {
        Self {
            peer_id: peer_id.to_owned(),
            state,
            security_level: None,
            established_at: None,
            last_activity: None,
            token_expires_at: None,
            message_count: 0,
            is_active: false,
            mutual_tls: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_level_parsing() {
        assert_eq!("HIGH".parse::<SecurityLevel>().unwrap(), SecurityLevel::High);
        assert_eq!(SecurityLevel::default(), SecurityLevel::Standard);
        assert!("extreme".parse::<SecurityLevel>().is_err());
        assert!(SecurityLevel::High.requires_certificates());
        assert!(!SecurityLevel::Standard.requires_encryption());
    }
}
