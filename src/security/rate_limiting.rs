// ABOUTME: Per-agent fixed-window rate limiting for authentication and messaging
// ABOUTME: Atomic check-and-count through the DashMap entry API; rejections never queue
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::clock::SharedClock;

/// Entries beyond this count trigger a lazy sweep of finished windows
const CLEANUP_THRESHOLD: usize = 10_000;

/// Counter state of one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitRecord {
    /// Requests admitted in the current window
    pub request_count: u32,
    /// When the current window ends
    pub window_reset: DateTime<Utc>,
    /// Set once the ceiling is hit; cleared by the next window
    pub blocked: bool,
}

/// Outcome of one rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// Whether the request was admitted
    pub allowed: bool,
    /// Ceiling per window
    pub limit: u32,
    /// Requests left in the window
    pub remaining: u32,
    /// When the window resets
    pub reset_at: DateTime<Utc>,
}

/// Fixed one-minute window limiter keyed by agent id
pub struct AgentRateLimiter {
    state: DashMap<String, RateLimitRecord>,
    limit_per_minute: u32,
    clock: SharedClock,
}

impl AgentRateLimiter {
    /// Limiter admitting `limit_per_minute` requests per agent per minute
    #[must_use]
    pub fn new(limit_per_minute: u32, clock: SharedClock) -> Self {
        Self {
            state: DashMap::new(),
            limit_per_minute,
            clock,
        }
    }

    /// Configured ceiling
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit_per_minute
    }

    /// Count one request for `agent_id` if the window has room
    #[must_use]
    pub fn check(&self, agent_id: &str) -> RateLimitStatus {
        let now = self.clock.now();
        let limit = self.limit_per_minute;

        let mut entry = self
            .state
            .entry(agent_id.to_owned())
            .or_insert_with(|| RateLimitRecord {
                request_count: 0,
                window_reset: now + Duration::minutes(1),
                blocked: false,
            });
        let record = entry.value_mut();

        if now >= record.window_reset {
            record.request_count = 0;
            record.window_reset = now + Duration::minutes(1);
            record.blocked = false;
        }

        let allowed = record.request_count < limit;
        if allowed {
            record.request_count += 1;
        } else {
            record.blocked = true;
        }

        let status = RateLimitStatus {
            allowed,
            limit,
            remaining: limit.saturating_sub(record.request_count),
            reset_at: record.window_reset,
        };
        drop(entry);

        if self.state.len() > CLEANUP_THRESHOLD {
            self.cleanup_expired(now);
        }
        status
    }

    /// Current record for `agent_id`
    #[must_use]
    pub fn record(&self, agent_id: &str) -> Option<RateLimitRecord> {
        self.state.get(agent_id).map(|entry| *entry.value())
    }

    /// Forget `agent_id`'s window
    pub fn reset(&self, agent_id: &str) {
        self.state.remove(agent_id);
    }

    fn cleanup_expired(&self, now: DateTime<Utc>) {
        self.state.retain(|_, record| record.window_reset > now);
    }
}
