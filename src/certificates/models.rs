// ABOUTME: Certificate authority data models
// ABOUTME: Agent certificates, status values, listings and authority configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use a2a_trust_core::constants::{certificates::EXPIRING_SOON_DAYS, defaults};

/// Optional subject details for an agent certificate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Organization placed in the subject; defaults to the fabric organization
    pub organization: Option<String>,
    /// Organizational unit placed in the subject
    pub organizational_unit: Option<String>,
}

/// Leaf certificate and key material issued to one agent
#[derive(Clone, Serialize)]
pub struct AgentCertificate {
    /// Agent id, also the certificate common name
    pub agent_id: String,
    /// Leaf certificate PEM
    pub certificate_pem: String,
    /// PKCS#8 private key PEM
    #[serde(skip_serializing)]
    pub private_key_pem: String,
    /// Issuing CA certificate PEM
    pub ca_certificate_pem: String,
    /// Certificate serial number
    pub serial: u64,
    /// Issue time
    pub issued_at: DateTime<Utc>,
    /// Expiry time (`notAfter`)
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for AgentCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentCertificate")
            .field("agent_id", &self.agent_id)
            .field("serial", &self.serial)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("private_key_pem", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl AgentCertificate {
    /// Status of this certificate at `now`
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> CertificateStatus {
        if now >= self.expires_at {
            CertificateStatus::Expired
        } else if self.expires_at - now <= Duration::days(EXPIRING_SOON_DAYS) {
            CertificateStatus::ExpiringSoon
        } else {
            CertificateStatus::Valid
        }
    }
}

/// Lifecycle status of an agent certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    /// Within validity and not close to expiry
    Valid,
    /// Expires within seven days
    ExpiringSoon,
    /// Past `notAfter`
    Expired,
}

/// Listing entry without key material
#[derive(Debug, Clone, Serialize)]
pub struct CertificateSummary {
    /// Agent id
    pub agent_id: String,
    /// Serial number
    pub serial: u64,
    /// Issue time
    pub issued_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
    /// Status at listing time
    pub status: CertificateStatus,
}

/// Certificate authority settings
#[derive(Debug, Clone)]
pub struct CertificateAuthorityConfig {
    /// Artifact directory; `None` keeps the authority in memory
    pub storage_dir: Option<PathBuf>,
    /// Leaf certificate validity in days
    pub validity_days: i64,
    /// Leaf RSA key size in bits
    pub key_size: usize,
    /// Root RSA key size in bits
    pub ca_key_size: usize,
    /// Root certificate validity in days
    pub ca_validity_days: i64,
}

impl Default for CertificateAuthorityConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            validity_days: defaults::CERT_VALIDITY_DAYS,
            key_size: defaults::CERT_KEY_SIZE,
            ca_key_size: defaults::CA_KEY_SIZE,
            ca_validity_days: defaults::CA_VALIDITY_DAYS,
        }
    }
}

/// Whether `agent_id` is usable as a common name and a directory name
#[must_use]
pub fn is_valid_agent_id(agent_id: &str) -> bool {
    !agent_id.is_empty()
        && agent_id.len() <= 128
        && agent_id != "."
        && agent_id != ".."
        && agent_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
