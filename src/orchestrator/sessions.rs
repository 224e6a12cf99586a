// ABOUTME: Authenticated sessions bounded by a maximum duration
// ABOUTME: Creation on authentication, validation with lazy eviction and explicit termination
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::Duration;
use tracing::debug;

use super::models::Session;
use crate::cleanup::ExpirySweep;
use crate::a2a::SecurityLevel;
use crate::clock::SharedClock;
use crate::crypto::{random_token, CryptoError};
use crate::oauth2_server::AgentIdentity;
use crate::store::{MemoryStore, SharedStore};
use a2a_trust_core::constants::oauth::TOKEN_BYTES;

/// Session registry
pub struct SessionManager {
    sessions: SharedStore<String, Session>,
    max_duration: Duration,
    clock: SharedClock,
}

impl SessionManager {
    /// Sessions lasting at most `max_duration`
    #[must_use]
    pub fn new(max_duration: Duration, clock: SharedClock) -> Self {
        Self {
            sessions: MemoryStore::shared(),
            max_duration,
            clock,
        }
    }

    /// Open a session for `identity`
    ///
    /// # Errors
    ///
    /// Returns an error if the session id cannot be generated
    pub fn create(
        &self,
        identity: &AgentIdentity,
        security_level: SecurityLevel,
    ) -> Result<Session, CryptoError> {
        let now = self.clock.now();
        let session = Session {
            session_id: random_token(TOKEN_BYTES)?,
            client_id: identity.client_id.clone(),
            scopes: identity.scopes.clone(),
            security_level,
            created_at: now,
            expires_at: now + self.max_duration,
        };
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        debug!(client_id = %session.client_id, "Session created");
        Ok(session)
    }

    /// Live session for `session_id`; expired sessions are evicted
    #[must_use]
    pub fn validate(&self, session_id: &str) -> Option<Session> {
        let key = session_id.to_owned();
        let session = self.sessions.get(&key)?;
        if self.clock.now() >= session.expires_at {
            self.sessions.remove(&key);
            debug!(client_id = %session.client_id, "Session expired");
            return None;
        }
        Some(session)
    }

    /// End a session; returns whether it existed
    pub fn end(&self, session_id: &str) -> bool {
        self.sessions.remove(&session_id.to_owned()).is_some()
    }

    /// Drop expired sessions
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.sessions.retain(&|_, session| session.expires_at > now)
    }

    /// Live session count, expired ones included until purged
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no sessions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl ExpirySweep for SessionManager {
    fn sweep_name(&self) -> &'static str {
        "sessions"
    }

    fn sweep_expired(&self) -> usize {
        self.purge_expired()
    }
}
