// ABOUTME: Certificate authority module for per-agent transport identities
// ABOUTME: Root management, leaf issuance, validation, revocation and artifact storage
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Certificate authority
pub mod authority;
/// Certificate error type
pub mod error;
/// Certificate data models
pub mod models;
/// Artifact directory layout
pub mod storage;

pub use authority::CertificateAuthority;
pub use error::CertificateError;
pub use models::{
    is_valid_agent_id, AgentCertificate, AgentInfo, CertificateAuthorityConfig,
    CertificateStatus, CertificateSummary,
};
pub use storage::CertificateStorage;
