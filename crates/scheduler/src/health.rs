// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The health monitor loop: detects dead workers and recovers their jobs.
//!
//! A worker returning to service after being marked offline re-enters on
//! its next heartbeat; jobs already re-queued are not reclaimed — the
//! allocator decides afresh. This avoids split-brain.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fawkes_core::Clock;

use crate::error::SchedulerError;
use crate::store::SchedulerStore;

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub poll_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(30) }
    }
}

/// One monitor cycle: every offline worker's in-flight jobs are re-queued
/// (or failed once retries are exhausted).
pub fn run_health_cycle<C: Clock>(store: &SchedulerStore<C>) -> Result<(), SchedulerError> {
    for (worker_id, jobs) in store.offline_workers_with_jobs() {
        warn!(worker = %worker_id, jobs = jobs.len(), "worker offline, recovering jobs");
        for job_id in jobs {
            match store.requeue_or_fail(job_id, "worker lost") {
                Ok(status) => {
                    info!(job = %job_id, %status, "recovered from lost worker")
                }
                // Job reached a terminal state concurrently; nothing to do
                Err(SchedulerError::IllegalTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

/// Run the health monitor until cancelled.
pub async fn run_health_monitor<C: Clock>(
    store: SchedulerStore<C>,
    config: HealthConfig,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_health_cycle(&store) {
                    tracing::error!(error = %e, "health cycle failed, halting loop");
                    return;
                }
            }
            _ = cancel.cancelled() => return,
        }
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
