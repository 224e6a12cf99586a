// ABOUTME: Replay protection for inbound envelopes
// ABOUTME: Atomic first-seen recording of message ids within a bounded retention window
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, Duration, Utc};

use super::error::ChannelError;
use crate::clock::SharedClock;
use crate::store::{MemoryStore, SharedStore};

/// Allowed clock drift for envelopes stamped in the future
const FUTURE_SKEW_SECS: i64 = 300;

/// Remembers message ids for `window` and rejects envelopes outside it
pub struct ReplayGuard {
    seen: SharedStore<String, DateTime<Utc>>,
    window: Duration,
    clock: SharedClock,
}

impl ReplayGuard {
    /// Guard over an in-memory store
    #[must_use]
    pub fn new(window: Duration, clock: SharedClock) -> Self {
        Self {
            seen: MemoryStore::shared(),
            window,
            clock,
        }
    }

    /// Record `message_id`, failing if it was seen before or `timestamp` is outside the window
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ReplayDetected`] for duplicate or stale envelopes
    pub fn check_and_record(
        &self,
        message_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), ChannelError> {
        let now = self.clock.now();
        if timestamp < now - self.window {
            return Err(ChannelError::ReplayDetected {
                message_id: message_id.to_owned(),
                reason: "timestamp is older than the replay window",
            });
        }
        if timestamp > now + Duration::seconds(FUTURE_SKEW_SECS) {
            return Err(ChannelError::ReplayDetected {
                message_id: message_id.to_owned(),
                reason: "timestamp is in the future",
            });
        }

        if !self.seen.insert_if_absent(message_id.to_owned(), timestamp) {
            return Err(ChannelError::ReplayDetected {
                message_id: message_id.to_owned(),
                reason: "message id already processed",
            });
        }
        Ok(())
    }

    /// Forget ids whose timestamps left the window; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let cutoff = self.clock.now() - self.window;
        self.seen.retain(&|_, timestamp| *timestamp >= cutoff)
    }

    /// Number of remembered ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no ids are remembered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    #[test]
    fn test_duplicate_rejected() {
        let clock = ManualClock::starting_now();
        let guard = ReplayGuard::new(Duration::hours(24), clock.shared());
        guard.check_and_record("m1", clock.now()).unwrap();
        assert!(matches!(
            guard.check_and_record("m1", clock.now()),
            Err(ChannelError::ReplayDetected { .. })
        ));
    }

    #[test]
    fn test_stale_and_future_rejected() {
        let clock = ManualClock::starting_now();
        let guard = ReplayGuard::new(Duration::hours(24), clock.shared());
        assert!(guard
            .check_and_record("old", clock.now() - Duration::hours(25))
            .is_err());
        assert!(guard
            .check_and_record("future", clock.now() + Duration::hours(1))
            .is_err());
        assert!(guard.is_empty());
    }

    #[test]
    fn test_purge_forgets_expired_ids() {
        let clock = ManualClock::starting_now();
        let guard = ReplayGuard::new(Duration::hours(1), clock.shared());
        guard.check_and_record("m1", clock.now()).unwrap();
        clock.advance(Duration::hours(2));
        assert_eq!(guard.purge_expired(), 1);
        assert!(guard.is_empty());
    }

    #[test]
    fn test_recording_leaves_expired_ids_for_the_sweep() {
        let clock = ManualClock::starting_now();
        let guard = ReplayGuard::new(Duration::hours(1), clock.shared());
        guard.check_and_record("m1", clock.now()).unwrap();
        guard.check_and_record("m2", clock.now()).unwrap();
        clock.advance(Duration::hours(2));

        guard.check_and_record("m3", clock.now()).unwrap();
        assert_eq!(guard.len(), 3);
        assert_eq!(guard.purge_expired(), 2);
        assert_eq!(guard.len(), 1);
    }
}
