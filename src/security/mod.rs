// ABOUTME: Security module with audit logging and per-agent rate limiting
// ABOUTME: Shared by the orchestrator for every authenticated operation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Bounded audit log and security metrics
pub mod audit;
/// Per-agent fixed-window rate limiting
pub mod rate_limiting;

pub use audit::{
    AuditAction, AuditEntry, AuditEvent, AuditLog, CountEntry, SecurityEventKind,
    SecurityEventSummary, SecurityMetrics,
};
pub use rate_limiting::{AgentRateLimiter, RateLimitRecord, RateLimitStatus};
