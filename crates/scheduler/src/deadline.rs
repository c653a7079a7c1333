// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The deadline enforcer loop: fails non-terminal jobs past their deadline.
//!
//! A deadline miss is terminal — no retry. In-flight jobs additionally get
//! a cancellation signal to their worker.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fawkes_core::Clock;

use crate::dispatch::JobDispatcher;
use crate::error::SchedulerError;
use crate::store::SchedulerStore;

#[derive(Debug, Clone)]
pub struct DeadlineConfig {
    pub poll_interval: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(30) }
    }
}

/// One enforcement cycle.
pub async fn run_deadline_cycle<C: Clock>(
    store: &SchedulerStore<C>,
    dispatcher: &Arc<dyn JobDispatcher>,
) -> Result<(), SchedulerError> {
    for (job_id, owner) in store.expired_jobs() {
        match store.fail_expired(job_id) {
            Ok(()) => info!(job = %job_id, "deadline exceeded, job failed"),
            // Raced with a concurrent terminal transition
            Err(SchedulerError::IllegalTransition { .. }) => continue,
            Err(e) => return Err(e),
        }
        if let Some(worker) = owner {
            if let Err(e) = dispatcher.cancel_job(&worker, job_id).await {
                // The worker will also learn via its own deadline watch;
                // log and move on
                warn!(job = %job_id, worker = %worker.id, error = %e, "cancel signal failed");
            }
        }
    }
    Ok(())
}

/// Run the deadline enforcer until cancelled.
pub async fn run_deadline_enforcer<C: Clock>(
    store: SchedulerStore<C>,
    dispatcher: Arc<dyn JobDispatcher>,
    config: DeadlineConfig,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_deadline_cycle(&store, &dispatcher).await {
                    tracing::error!(error = %e, "deadline cycle failed, halting loop");
                    return;
                }
            }
            _ = cancel.cancelled() => return,
        }
    }
}

#[cfg(test)]
#[path = "deadline_tests.rs"]
mod tests;
