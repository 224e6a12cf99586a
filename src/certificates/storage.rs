// ABOUTME: Filesystem layout for certificate authority artifacts
// ABOUTME: Root key, root certificate, serial counter and per-agent directories
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use super::error::CertificateError;
use super::models::AgentCertificate;
use a2a_trust_core::constants::certificates::{
    AGENTS_DIR, AGENT_CA_FILE, AGENT_CERT_FILE, AGENT_KEY_FILE, ROOT_CERT_FILE, ROOT_KEY_FILE,
    SERIAL_FILE,
};

/// Owner-only access for private keys
const SECRET_FILE_MODE: u32 = 0o600;

/// Owner-only access for artifact directories
const PRIVATE_DIR_MODE: u32 = 0o700;

/// Root material read back from disk
#[derive(Debug)]
pub struct StoredRoot {
    /// PKCS#8 root private key PEM
    pub key_pem: String,
    /// Root certificate PEM
    pub cert_pem: String,
    /// Next serial, when a counter file exists
    pub next_serial: Option<u64>,
}

/// Artifact directory
#[derive(Debug, Clone)]
pub struct CertificateStorage {
    dir: PathBuf,
}

impl CertificateStorage {
    /// Storage rooted at `dir`
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Root directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding one agent's artifacts
    #[must_use]
    pub fn agent_dir(&self, agent_id: &str) -> PathBuf {
        self.dir.join(AGENTS_DIR).join(agent_id)
    }

    /// Load the root key and certificate if both exist
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failures other than missing files, or when the
    /// serial file is unreadable
    pub async fn load_root(&self) -> Result<Option<StoredRoot>, CertificateError> {
        let Some(key_pem) = read_optional(&self.dir.join(ROOT_KEY_FILE)).await? else {
            return Ok(None);
        };
        let Some(cert_pem) = read_optional(&self.dir.join(ROOT_CERT_FILE)).await? else {
            return Ok(None);
        };

        let serial_path = self.dir.join(SERIAL_FILE);
        let next_serial = match read_optional(&serial_path).await? {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                CertificateError::Encoding(format!(
                    "serial file {} is not a number: {e}",
                    serial_path.display()
                ))
            })?),
            None => None,
        };

        Ok(Some(StoredRoot {
            key_pem,
            cert_pem,
            next_serial,
        }))
    }

    /// Persist the root key and certificate
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or files cannot be written
    pub async fn save_root(&self, key_pem: &str, cert_pem: &str) -> Result<(), CertificateError> {
        create_private_dir(&self.dir).await?;
        write_secret(&self.dir.join(ROOT_KEY_FILE), key_pem).await?;
        write_file(&self.dir.join(ROOT_CERT_FILE), cert_pem).await
    }

    /// Persist the next serial
    ///
    /// # Errors
    ///
    /// Returns an error if the serial file cannot be written
    pub async fn save_serial(&self, next_serial: u64) -> Result<(), CertificateError> {
        write_file(&self.dir.join(SERIAL_FILE), &next_serial.to_string()).await
    }

    /// Persist one agent's key, certificate and CA copy
    ///
    /// # Errors
    ///
    /// Returns an error if the agent directory or files cannot be written
    pub async fn save_agent(&self, certificate: &AgentCertificate) -> Result<(), CertificateError> {
        let dir = self.agent_dir(&certificate.agent_id);
        create_private_dir(&self.dir).await?;
        create_private_dir(&self.dir.join(AGENTS_DIR)).await?;
        create_private_dir(&dir).await?;
        write_secret(&dir.join(AGENT_KEY_FILE), &certificate.private_key_pem).await?;
        write_file(&dir.join(AGENT_CERT_FILE), &certificate.certificate_pem).await?;
        write_file(&dir.join(AGENT_CA_FILE), &certificate.ca_certificate_pem).await
    }

    /// Remove one agent's artifacts; missing directories are not an error
    ///
    /// # Errors
    ///
    /// Returns an error if an existing directory cannot be removed
    pub async fn remove_agent(&self, agent_id: &str) -> Result<(), CertificateError> {
        let dir = self.agent_dir(agent_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CertificateError::storage(dir, e)),
        }
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, CertificateError> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CertificateError::storage(path, e)),
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<(), CertificateError> {
    fs::write(path, contents)
        .await
        .map_err(|e| CertificateError::storage(path, e))
}

async fn write_secret(path: &Path, contents: &str) -> Result<(), CertificateError> {
    write_file(path, contents).await?;
    restrict_permissions(path, SECRET_FILE_MODE).await
}

async fn create_private_dir(dir: &Path) -> Result<(), CertificateError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| CertificateError::storage(dir, e))?;
    restrict_permissions(dir, PRIVATE_DIR_MODE).await
}

/// Restrict `path` to its owner on Unix
#[cfg(unix)]
async fn restrict_permissions(path: &Path, mode: u32) -> Result<(), CertificateError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| CertificateError::storage(path, e))
}

#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn restrict_permissions(_path: &Path, _mode: u32) -> Result<(), CertificateError> {
    Ok(())
}
