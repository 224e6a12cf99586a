// ABOUTME: Bounded in-memory audit log of agent operations and security events
// ABOUTME: Security metrics are aggregated on demand from the retained entries
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Security Audit Module
//!
//! Every registration, authentication, channel, message and session operation
//! appends one [`AuditEntry`]. The buffer is a FIFO capped at a configured
//! capacity; the oldest entries fall off first.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::clock::SharedClock;
use a2a_trust_core::{AppError, ErrorCode};

/// How many entries the top-N metric lists carry
const TOP_N: usize = 10;

/// Operation being audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Agent registration
    RegisterAgent,
    /// Credential authentication
    Authenticate,
    /// Secure channel establishment
    EstablishChannel,
    /// Outbound message
    SendMessage,
    /// Inbound message
    ReceiveMessage,
    /// Health-check round trip
    HealthCheck,
    /// Session validation
    ValidateSession,
    /// Session termination
    EndSession,
}

impl AuditAction {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RegisterAgent => "register_agent",
            Self::Authenticate => "authenticate",
            Self::EstablishChannel => "establish_channel",
            Self::SendMessage => "send_message",
            Self::ReceiveMessage => "receive_message",
            Self::HealthCheck => "health_check",
            Self::ValidateSession => "validate_session",
            Self::EndSession => "end_session",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of security-relevant failures grouped in metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    /// Bad credentials or token
    AuthenticationFailure,
    /// Request refused by the rate limiter
    RateLimitExceeded,
    /// Security level requirements not met
    PolicyViolation,
    /// Certificate missing, invalid or not issued
    CertificateRejected,
    /// Envelope signature did not verify
    InvalidSignature,
    /// Duplicate or stale envelope
    ReplayAttempt,
    /// Encrypted payload failed to decrypt
    DecryptionFailure,
}

impl SecurityEventKind {
    /// Security event implied by an error code, if any
    #[must_use]
    pub const fn from_error_code(code: ErrorCode) -> Option<Self> {
        match code {
            ErrorCode::AuthInvalid | ErrorCode::AuthExpired => Some(Self::AuthenticationFailure),
            ErrorCode::RateLimitExceeded => Some(Self::RateLimitExceeded),
            ErrorCode::PolicyViolation | ErrorCode::PermissionDenied => {
                Some(Self::PolicyViolation)
            }
            ErrorCode::CertificateInvalid | ErrorCode::CertificateIssuanceFailed => {
                Some(Self::CertificateRejected)
            }
            ErrorCode::SignatureInvalid => Some(Self::InvalidSignature),
            ErrorCode::ReplayDetected => Some(Self::ReplayAttempt),
            ErrorCode::DecryptionFailed => Some(Self::DecryptionFailure),
            _ => None,
        }
    }
}

/// One retained audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry id
    pub id: Uuid,
    /// When the operation finished
    pub timestamp: DateTime<Utc>,
    /// Acting or targeted agent
    pub agent_id: String,
    /// Operation
    pub action: AuditAction,
    /// Resource the operation touched
    pub resource: String,
    /// Outcome
    pub success: bool,
    /// Error code of a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Security event kind of a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_event: Option<SecurityEventKind>,
    /// Structured details
    #[serde(default)]
    pub details: Value,
}

/// Audit record before it is stamped with an id and time
#[derive(Debug, Clone)]
pub struct AuditEvent {
    agent_id: String,
    action: AuditAction,
    resource: String,
    success: bool,
    error_code: Option<ErrorCode>,
    security_event: Option<SecurityEventKind>,
    details: Value,
}

impl AuditEvent {
    /// Successful operation
    #[must_use]
    pub fn success(agent_id: &str, action: AuditAction, resource: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.to_owned(),
            action,
            resource: resource.into(),
            success: true,
            error_code: None,
            security_event: None,
            details: Value::Null,
        }
    }

    /// Failed operation; the security event kind is derived from the error code
    #[must_use]
    pub fn failure(
        agent_id: &str,
        action: AuditAction,
        resource: impl Into<String>,
        error: &AppError,
    ) -> Self {
        Self {
            agent_id: agent_id.to_owned(),
            action,
            resource: resource.into(),
            success: false,
            error_code: Some(error.code),
            security_event: SecurityEventKind::from_error_code(error.code),
            details: serde_json::json!({ "error": error.message }),
        }
    }

    /// Replace the details
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Counted key in a top-N list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountEntry {
    /// Error code or agent id
    pub key: String,
    /// Occurrences
    pub count: usize,
}

/// Occurrences of one security event kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEventSummary {
    /// Event kind
    pub kind: SecurityEventKind,
    /// Occurrences
    pub count: usize,
    /// Most recent occurrence
    pub last_occurrence: DateTime<Utc>,
}

/// Aggregates over the retained audit entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityMetrics {
    /// Retained entries
    pub total_events: usize,
    /// Successful operations
    pub successful_events: usize,
    /// Failed operations
    pub failed_events: usize,
    /// Requests refused by the rate limiter
    pub blocked_requests: usize,
    /// Most frequent error codes
    pub top_errors: Vec<CountEntry>,
    /// Agents with the most audited operations
    pub top_agents: Vec<CountEntry>,
    /// Security events grouped by kind
    pub security_events: Vec<SecurityEventSummary>,
    /// When these metrics were computed
    pub generated_at: DateTime<Utc>,
}

/// Append-only FIFO of audit entries
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
    enabled: bool,
    clock: SharedClock,
}

impl AuditLog {
    /// Log retaining at most `capacity` entries; a disabled log records nothing
    #[must_use]
    pub fn new(capacity: usize, enabled: bool, clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            enabled,
            clock,
        }
    }

    /// Stamp and append an event, evicting the oldest entry when full
    pub fn record(&self, event: AuditEvent) -> Option<AuditEntry> {
        if event.success {
            tracing::debug!(agent_id = %event.agent_id, action = %event.action, resource = %event.resource, "Audit: success");
        } else {
            tracing::warn!(
                agent_id = %event.agent_id,
                action = %event.action,
                resource = %event.resource,
                error_code = ?event.error_code,
                security_event = ?event.security_event,
                "Audit: failure"
            );
        }
        if !self.enabled {
            return None;
        }

        let entry = AuditEntry {
            id: Uuid::new_v4(),
            timestamp: self.clock.now(),
            agent_id: event.agent_id,
            action: event.action,
            resource: event.resource,
            success: event.success,
            error_code: event.error_code,
            security_event: event.security_event,
            details: event.details,
        };

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        Some(entry)
    }

    /// Snapshot of the retained entries, oldest first
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// The `limit` most recent entries, newest first
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Retained entries for one agent, oldest first
    #[must_use]
    pub fn for_agent(&self, agent_id: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// Number of retained entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate the retained entries
    #[must_use]
    pub fn metrics(&self) -> SecurityMetrics {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let mut successful_events = 0;
        let mut blocked_requests = 0;
        let mut errors: HashMap<&'static str, usize> = HashMap::new();
        let mut agents: HashMap<&str, usize> = HashMap::new();
        let mut events: HashMap<SecurityEventKind, (usize, DateTime<Utc>)> = HashMap::new();

        for entry in entries.iter() {
            *agents.entry(entry.agent_id.as_str()).or_default() += 1;
            if entry.success {
                successful_events += 1;
                continue;
            }
            if let Some(code) = entry.error_code {
                *errors.entry(code.as_str()).or_default() += 1;
                if code == ErrorCode::RateLimitExceeded {
                    blocked_requests += 1;
                }
            }
            if let Some(kind) = entry.security_event {
                let slot = events.entry(kind).or_insert((0, entry.timestamp));
                slot.0 += 1;
                slot.1 = slot.1.max(entry.timestamp);
            }
        }

        let mut security_events: Vec<_> = events
            .into_iter()
            .map(|(kind, (count, last_occurrence))| SecurityEventSummary {
                kind,
                count,
                last_occurrence,
            })
            .collect();
        security_events.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(b.last_occurrence.cmp(&a.last_occurrence))
        });

        SecurityMetrics {
            total_events: entries.len(),
            successful_events,
            failed_events: entries.len() - successful_events,
            blocked_requests,
            top_errors: top_counts(errors),
            top_agents: top_counts(agents),
            security_events,
            generated_at: self.clock.now(),
        }
    }
}

fn top_counts<K: AsRef<str>>(counts: HashMap<K, usize>) -> Vec<CountEntry> {
    let mut ranked: Vec<CountEntry> = counts
        .into_iter()
        .map(|(key, count)| CountEntry {
            key: key.as_ref().to_owned(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    ranked.truncate(TOP_N);
    ranked
}
