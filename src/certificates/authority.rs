// ABOUTME: Private certificate authority issuing and validating per-agent X.509 certificates
// ABOUTME: RSA root with PKCS#1 v1.5 SHA-256 signatures, serial tracking and revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Certificate Authority
//!
//! A single self-signed root issues one leaf certificate per agent. The leaf
//! common name is the agent id, so a peer proves its identity by presenting a
//! certificate that chains to the root and names it.
//!
//! Issuance holds a per-agent lock (so racing callers receive one certificate)
//! and the serial lock only for the signing step, which keeps key generation
//! for different agents parallel while serials stay gap-free.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::rngs::OsRng;
use rsa::pkcs1v15::{Signature, SigningKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::pem::LineEnding;
use x509_cert::der::{DecodePem, Encode, EncodePem};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;
use x509_parser::parse_x509_certificate;
use x509_parser::pem::parse_x509_pem;

use super::error::CertificateError;
use super::models::{
    is_valid_agent_id, AgentCertificate, AgentInfo, CertificateAuthorityConfig,
    CertificateStatus, CertificateSummary,
};
use super::storage::CertificateStorage;
use crate::clock::SharedClock;
use crate::crypto::random_bytes;
use crate::store::{MemoryStore, SharedStore};
use a2a_trust_core::constants::certificates::{
    NOT_BEFORE_SKEW_MINUTES, ORGANIZATION, ROOT_COMMON_NAME,
};

/// Private certificate authority for agents
pub struct CertificateAuthority {
    config: CertificateAuthorityConfig,
    clock: SharedClock,
    signer: SigningKey<Sha256>,
    root_subject: Name,
    root_cert_pem: String,
    root_der: Vec<u8>,
    next_serial: Mutex<u64>,
    certificates: SharedStore<String, AgentCertificate>,
    revoked_serials: SharedStore<u64, DateTime<Utc>>,
    issuance_locks: DashMap<String, Arc<Mutex<()>>>,
    storage: Option<CertificateStorage>,
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("storage_dir", &self.config.storage_dir)
            .field("certificates", &self.certificates.len())
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Load the root from the storage directory, or generate and persist a new one
    ///
    /// # Errors
    ///
    /// Returns an error if stored material cannot be read or parsed, or if a
    /// new root cannot be generated or written
    pub async fn initialize(
        config: CertificateAuthorityConfig,
        clock: SharedClock,
    ) -> Result<Self, CertificateError> {
        let storage = config.storage_dir.clone().map(CertificateStorage::new);

        let stored = match &storage {
            Some(storage) => storage.load_root().await?,
            None => None,
        };

        let (root_key, root_cert, next_serial) = if let Some(stored) = stored {
            let key = RsaPrivateKey::from_pkcs8_pem(&stored.key_pem)
                .map_err(|e| CertificateError::Encoding(format!("root key: {e}")))?;
            let cert = Certificate::from_pem(stored.cert_pem.as_bytes())
                .map_err(|e| CertificateError::Encoding(format!("root certificate: {e}")))?;
            let expected_spki = SubjectPublicKeyInfoOwned::from_key(key.to_public_key())
                .map_err(|e| CertificateError::Encoding(e.to_string()))?;
            if cert.tbs_certificate.subject_public_key_info != expected_spki {
                return Err(CertificateError::Encoding(
                    "stored root key does not match the stored root certificate".into(),
                ));
            }
            let next_serial = stored.next_serial.unwrap_or(1);
            info!(next_serial, "Loaded certificate authority root from storage");
            (key, cert, next_serial)
        } else {
            let key = generate_key(config.ca_key_size).await?;
            let cert = build_root(&key, clock.now(), config.ca_validity_days)?;
            if let Some(storage) = &storage {
                let key_pem = key
                    .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
                    .map_err(|e| CertificateError::Encoding(e.to_string()))?;
                storage.save_root(&key_pem, &encode_pem(&cert)?).await?;
                storage.save_serial(1).await?;
                info!(dir = %storage.dir().display(), "Generated and persisted certificate authority root");
            } else {
                info!("Generated in-memory certificate authority root");
            }
            (key, cert, 1)
        };

        let root_cert_pem = encode_pem(&root_cert)?;
        let root_der = root_cert
            .to_der()
            .map_err(|e| CertificateError::Encoding(e.to_string()))?;

        Ok(Self {
            root_subject: root_cert.tbs_certificate.subject.clone(),
            signer: SigningKey::<Sha256>::new(root_key),
            root_cert_pem,
            root_der,
            next_serial: Mutex::new(next_serial),
            certificates: MemoryStore::shared(),
            revoked_serials: MemoryStore::shared(),
            issuance_locks: DashMap::new(),
            storage,
            clock,
            config,
        })
    }

    /// Root certificate PEM
    #[must_use]
    pub fn ca_certificate_pem(&self) -> &str {
        &self.root_cert_pem
    }

    /// Issue a leaf certificate for `agent_id`, reusing a non-expired one
    ///
    /// # Errors
    ///
    /// Returns an error if the agent id is invalid, key generation or signing
    /// fails, or artifacts cannot be persisted
    pub async fn issue_agent_certificate(
        &self,
        agent_id: &str,
        info: &AgentInfo,
    ) -> Result<AgentCertificate, CertificateError> {
        if !is_valid_agent_id(agent_id) {
            return Err(CertificateError::InvalidAgentId(agent_id.to_owned()));
        }

        let lock = Arc::clone(
            self.issuance_locks
                .entry(agent_id.to_owned())
                .or_default()
                .value(),
        );
        let result = {
            let _issuing = lock.lock().await;
            self.issue_locked(agent_id, info).await
        };
        drop(lock);
        // Only the map still holds the lock once every racing caller is done
        self.issuance_locks
            .remove_if(agent_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn issue_locked(
        &self,
        agent_id: &str,
        info: &AgentInfo,
    ) -> Result<AgentCertificate, CertificateError> {
        if let Some(existing) = self.certificates.get(&agent_id.to_owned()) {
            if self.clock.now() < existing.expires_at {
                debug!(agent_id = %agent_id, serial = existing.serial, "Reusing valid agent certificate");
                return Ok(existing);
            }
        }

        let private_key = generate_key(self.config.key_size).await?;
        let subject = subject_name(agent_id, info)?;
        let spki = SubjectPublicKeyInfoOwned::from_key(RsaPublicKey::from(&private_key))
            .map_err(|e| CertificateError::Build(e.to_string()))?;

        let now = self.clock.now();
        let expires_at = expiry_after(now, self.config.validity_days)?;
        let validity = Validity {
            not_before: x509_time(now - Duration::minutes(NOT_BEFORE_SKEW_MINUTES))?,
            not_after: x509_time(expires_at)?,
        };

        let (serial, certificate_pem) = {
            let mut next_serial = self.next_serial.lock().await;
            let serial = *next_serial;
            let profile = Profile::Leaf {
                issuer: self.root_subject.clone(),
                enable_key_agreement: false,
                enable_key_encipherment: true,
            };
            let certificate = CertificateBuilder::new(
                profile,
                serial_number(&serial.to_be_bytes())?,
                validity,
                subject,
                spki,
                &self.signer,
            )
            .map_err(|e| CertificateError::Build(e.to_string()))?
            .build::<Signature>()
            .map_err(|e| CertificateError::Build(e.to_string()))?;
            let pem = encode_pem(&certificate)?;

            if let Some(storage) = &self.storage {
                storage.save_serial(serial + 1).await?;
            }
            *next_serial = serial + 1;
            (serial, pem)
        };

        let private_key_pem = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| CertificateError::Encoding(e.to_string()))?
            .to_string();

        let certificate = AgentCertificate {
            agent_id: agent_id.to_owned(),
            certificate_pem,
            private_key_pem,
            ca_certificate_pem: self.root_cert_pem.clone(),
            serial,
            issued_at: now,
            expires_at,
        };

        if let Some(storage) = &self.storage {
            storage.save_agent(&certificate).await?;
        }
        self.certificates
            .insert(agent_id.to_owned(), certificate.clone());

        info!(agent_id = %agent_id, serial, expires_at = %expires_at, "Issued agent certificate");
        Ok(certificate)
    }

    /// Check a presented certificate against the root and the expected agent id.
    /// Never fails; the rejection reason is logged.
    #[must_use]
    pub fn validate_agent_certificate(&self, certificate_pem: &str, agent_id: &str) -> bool {
        match self.check_certificate(certificate_pem, agent_id) {
            Ok(()) => {
                debug!(agent_id = %agent_id, "Agent certificate validated");
                true
            }
            Err(reason) => {
                warn!(agent_id = %agent_id, reason = %reason, "Agent certificate rejected");
                false
            }
        }
    }

    /// Remove an agent's certificate and key material and revoke its serial.
    /// Returns whether a certificate was revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if stored artifacts cannot be removed
    pub async fn revoke_agent_certificate(&self, agent_id: &str) -> Result<bool, CertificateError> {
        let Some(certificate) = self.certificates.remove(&agent_id.to_owned()) else {
            return Ok(false);
        };
        self.revoked_serials
            .insert(certificate.serial, self.clock.now());
        if let Some(storage) = &self.storage {
            storage.remove_agent(agent_id).await?;
        }
        info!(agent_id = %agent_id, serial = certificate.serial, "Revoked agent certificate");
        Ok(true)
    }

    /// Whether `serial` has been revoked
    #[must_use]
    pub fn is_revoked(&self, serial: u64) -> bool {
        self.revoked_serials.get(&serial).is_some()
    }

    /// Lifecycle status of an agent's certificate
    #[must_use]
    pub fn get_certificate_status(&self, agent_id: &str) -> Option<CertificateStatus> {
        self.certificates
            .get(&agent_id.to_owned())
            .map(|certificate| certificate.status_at(self.clock.now()))
    }

    /// Current certificate of an agent
    #[must_use]
    pub fn get_agent_certificate(&self, agent_id: &str) -> Option<AgentCertificate> {
        self.certificates.get(&agent_id.to_owned())
    }

    /// Every tracked certificate, without key material
    #[must_use]
    pub fn list_certificates(&self) -> Vec<CertificateSummary> {
        let now = self.clock.now();
        let mut summaries: Vec<_> = self
            .certificates
            .values()
            .into_iter()
            .map(|certificate| CertificateSummary {
                status: certificate.status_at(now),
                agent_id: certificate.agent_id,
                serial: certificate.serial,
                issued_at: certificate.issued_at,
                expires_at: certificate.expires_at,
            })
            .collect();
        summaries.sort_by_key(|summary| summary.serial);
        summaries
    }

    fn check_certificate(&self, certificate_pem: &str, agent_id: &str) -> Result<(), String> {
        let (_, root) = parse_x509_certificate(&self.root_der)
            .map_err(|e| format!("root certificate unreadable: {e}"))?;
        let (_, pem) = parse_x509_pem(certificate_pem.as_bytes())
            .map_err(|e| format!("not a PEM document: {e}"))?;
        let certificate = pem
            .parse_x509()
            .map_err(|e| format!("not an X.509 certificate: {e}"))?;

        if certificate.issuer().as_raw() != root.subject().as_raw() {
            return Err("issuer does not match the authority subject".into());
        }

        let now = self.clock.now().timestamp();
        let validity = certificate.validity();
        if now < validity.not_before.timestamp() || now > validity.not_after.timestamp() {
            return Err("outside the validity period".into());
        }

        let common_name = certificate
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok());
        if common_name != Some(agent_id) {
            return Err(format!(
                "common name {common_name:?} does not match agent id"
            ));
        }

        certificate
            .verify_signature(Some(root.public_key()))
            .map_err(|e| format!("signature does not verify against the authority key: {e}"))?;

        if let Some(serial) = serial_to_u64(certificate.raw_serial()) {
            if self.is_revoked(serial) {
                return Err(format!("serial {serial} has been revoked"));
            }
        }

        Ok(())
    }
}

async fn generate_key(bits: usize) -> Result<RsaPrivateKey, CertificateError> {
    tokio::task::spawn_blocking(move || RsaPrivateKey::new(&mut OsRng, bits))
        .await
        .map_err(|e| CertificateError::KeyGeneration(format!("key generation task failed: {e}")))?
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))
}

fn build_root(
    key: &RsaPrivateKey,
    now: DateTime<Utc>,
    validity_days: i64,
) -> Result<Certificate, CertificateError> {
    let subject = Name::from_str(&format!(
        "CN={},O={}",
        escape_dn_value(ROOT_COMMON_NAME),
        escape_dn_value(ORGANIZATION)
    ))
    .map_err(|e| CertificateError::Build(e.to_string()))?;
    let spki = SubjectPublicKeyInfoOwned::from_key(key.to_public_key())
        .map_err(|e| CertificateError::Build(e.to_string()))?;
    let validity = Validity {
        not_before: x509_time(now - Duration::minutes(NOT_BEFORE_SKEW_MINUTES))?,
        not_after: x509_time(expiry_after(now, validity_days)?)?,
    };

    // Random positive 128-bit serial for the root
    let mut serial = random_bytes(16).map_err(|e| CertificateError::Build(e.to_string()))?;
    serial[0] = (serial[0] & 0x7f) | 0x01;

    let signer = SigningKey::<Sha256>::new(key.clone());
    CertificateBuilder::new(
        Profile::Root,
        serial_number(&serial)?,
        validity,
        subject,
        spki,
        &signer,
    )
    .map_err(|e| CertificateError::Build(e.to_string()))?
    .build::<Signature>()
    .map_err(|e| CertificateError::Build(e.to_string()))
}

fn subject_name(agent_id: &str, info: &AgentInfo) -> Result<Name, CertificateError> {
    let organization = info.organization.as_deref().unwrap_or(ORGANIZATION);
    let mut dn = format!(
        "CN={},O={}",
        escape_dn_value(agent_id),
        escape_dn_value(organization)
    );
    if let Some(unit) = &info.organizational_unit {
        dn.push_str(",OU=");
        dn.push_str(&escape_dn_value(unit));
    }
    Name::from_str(&dn).map_err(|e| CertificateError::Build(e.to_string()))
}

fn escape_dn_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn serial_number(bytes: &[u8]) -> Result<SerialNumber, CertificateError> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len().saturating_sub(1));
    SerialNumber::new(&bytes[first..]).map_err(|e| CertificateError::Build(e.to_string()))
}

fn serial_to_u64(raw: &[u8]) -> Option<u64> {
    let first = raw.iter().position(|b| *b != 0).unwrap_or(raw.len());
    let significant = &raw[first..];
    if significant.len() > 8 {
        return None;
    }
    Some(
        significant
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)),
    )
}

fn expiry_after(
    now: DateTime<Utc>,
    validity_days: i64,
) -> Result<DateTime<Utc>, CertificateError> {
    Duration::try_days(validity_days)
        .and_then(|validity| now.checked_add_signed(validity))
        .ok_or_else(|| {
            CertificateError::Build(format!("validity of {validity_days} days is out of range"))
        })
}

fn x509_time(at: DateTime<Utc>) -> Result<Time, CertificateError> {
    Time::try_from(SystemTime::from(at)).map_err(|e| CertificateError::Build(e.to_string()))
}

fn encode_pem(certificate: &Certificate) -> Result<String, CertificateError> {
    certificate
        .to_pem(LineEnding::LF)
        .map_err(|e| CertificateError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_round_trip_through_der_bytes() {
        assert_eq!(serial_to_u64(&[0x00, 0x80]), Some(128));
        assert_eq!(serial_to_u64(&[0x01]), Some(1));
        assert_eq!(serial_to_u64(&[0x01; 9]), None);
    }

    #[test]
    fn test_escape_dn_value() {
        assert_eq!(escape_dn_value("Acme, Inc"), "Acme\\, Inc");
        assert_eq!(escape_dn_value("plain"), "plain");
    }

    #[test]
    fn test_serial_number_strips_leading_zeros() {
        assert!(serial_number(&1u64.to_be_bytes()).is_ok());
        assert!(serial_number(&u64::MAX.to_be_bytes()).is_ok());
    }

    #[test]
    fn test_expiry_rejects_out_of_range_validity() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, 365).unwrap() - now, Duration::days(365));
        assert!(matches!(
            expiry_after(now, i64::MAX),
            Err(CertificateError::Build(_))
        ));
        assert!(expiry_after(now, 100_000_000).is_err());
    }

    #[tokio::test]
    async fn test_issuance_locks_released_after_issuance() {
        let clock = crate::clock::ManualClock::starting_now();
        let config = CertificateAuthorityConfig {
            key_size: 2048,
            ca_key_size: 2048,
            ..CertificateAuthorityConfig::default()
        };
        let authority = CertificateAuthority::initialize(config, clock.shared())
            .await
            .unwrap();

        let info_first = AgentInfo::default();
        let info_second = AgentInfo::default();
        let (first, second) = tokio::join!(
            authority.issue_agent_certificate("agent-b", &info_first),
            authority.issue_agent_certificate("agent-b", &info_second),
        );
        assert_eq!(first.unwrap().serial, second.unwrap().serial);
        assert!(authority.issuance_locks.is_empty());

        assert!(authority
            .issue_agent_certificate("../bad", &AgentInfo::default())
            .await
            .is_err());
        assert!(authority.issuance_locks.is_empty());
    }
}
