// ABOUTME: Background sweep that purges expired tokens, replay ids and sessions
// ABOUTME: Independent tokio task with an explicit start/stop lifecycle over pluggable sweep targets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// State holding records that expire with time
pub trait ExpirySweep: Send + Sync {
    /// Short name used in log fields
    fn sweep_name(&self) -> &'static str;

    /// Drop expired records; returns how many were removed
    fn sweep_expired(&self) -> usize;
}

/// Periodic expiry sweep over a set of [`ExpirySweep`] targets
pub struct CleanupTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupTask {
    /// Spawn the sweep on the current tokio runtime
    #[must_use]
    pub fn start(targets: Vec<Arc<dyn ExpirySweep>>, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let target_count = targets.len();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // First tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        for target in &targets {
                            let removed = target.sweep_expired();
                            if removed > 0 {
                                tracing::debug!(target = target.sweep_name(), removed, "Expiry sweep removed records");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Cleanup task received shutdown signal");
                        break;
                    }
                }
            }
        });

        tracing::info!(
            interval_secs = every.as_secs(),
            targets = target_count,
            "Started expiry cleanup task"
        );
        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Whether the sweep is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the sweep to stop and wait for it to exit
    pub async fn stop(mut self) {
        if let Err(e) = self.shutdown_tx.try_send(()) {
            tracing::debug!(error = ?e, "Cleanup shutdown signal send failed (task likely exited)");
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = ?e, "Cleanup task ended abnormally");
            }
        }
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}
