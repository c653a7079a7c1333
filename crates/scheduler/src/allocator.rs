// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The allocator loop: binds queued jobs to eligible workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fawkes_core::{Clock, WorkerId};

use crate::dispatch::{AcceptOutcome, JobDispatcher};
use crate::error::SchedulerError;
use crate::store::SchedulerStore;
use crate::strategy::AllocationStrategy;

#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// How often a cycle runs (default 30 s)
    pub poll_interval: Duration,
    pub strategy: AllocationStrategy,
    /// Keep scanning past an unplaceable head entry. Off by default so
    /// priority order is preserved under backpressure.
    pub allocate_past_head: bool,
    /// Consecutive dispatch failures before a worker is proactively marked
    /// offline.
    pub dispatch_failure_limit: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            strategy: AllocationStrategy::default(),
            allocate_past_head: false,
            dispatch_failure_limit: 3,
        }
    }
}

/// Allocator state that persists across cycles.
pub struct Allocator<C: Clock> {
    store: SchedulerStore<C>,
    dispatcher: Arc<dyn JobDispatcher>,
    config: AllocatorConfig,
    strategy: AllocationStrategy,
    /// Consecutive dispatch failures per worker; reset on success.
    dispatch_failures: HashMap<WorkerId, u32>,
}

impl<C: Clock> Allocator<C> {
    pub fn new(
        store: SchedulerStore<C>,
        dispatcher: Arc<dyn JobDispatcher>,
        config: AllocatorConfig,
    ) -> Self {
        let strategy = config.strategy.clone();
        Self { store, dispatcher, config, strategy, dispatch_failures: HashMap::new() }
    }

    /// One allocation cycle: walk the queue in priority order, placing what
    /// fits. Stops at the first unplaceable entry unless configured to scan
    /// past it.
    pub async fn run_cycle(&mut self) -> Result<(), SchedulerError> {
        loop {
            let entries = if self.config.allocate_past_head {
                self.store.queued_entries()
            } else {
                self.store.get_next_job_from_queue().into_iter().collect()
            };
            if entries.is_empty() {
                return Ok(());
            }

            let mut placed_any = false;
            for entry in entries {
                let job = match self.store.get_job(entry.job_id) {
                    Ok(job) => job,
                    // Raced with a cancel; move on
                    Err(SchedulerError::UnknownEntity(_)) => continue,
                    Err(e) => return Err(e),
                };

                let candidates =
                    self.store.get_available_workers(&job.resources.tags, &job.resources);
                if candidates.is_empty() {
                    warn!(
                        job = %job.id,
                        priority = job.priority,
                        "backpressure: no eligible worker"
                    );
                    if self.config.allocate_past_head {
                        continue;
                    }
                    return Ok(());
                }

                let Some(worker_id) = self.strategy.select(&candidates, &job) else {
                    return Ok(());
                };

                // A cancel can race between the queue fetch and here
                match self.store.assign_job_to_worker(job.id, worker_id) {
                    Ok(()) => {}
                    Err(SchedulerError::IllegalTransition { .. })
                    | Err(SchedulerError::UnknownEntity(_)) => continue,
                    Err(e) => return Err(e),
                }
                if self.dispatch(worker_id, job.id).await? {
                    placed_any = true;
                }
            }

            // Nothing moved this pass; next tick may have fresh workers
            if !placed_any {
                return Ok(());
            }
        }
    }

    /// Dispatch an assigned job; on failure revert the assignment and track
    /// the worker's failure streak. Returns whether the worker accepted.
    async fn dispatch(
        &mut self,
        worker_id: WorkerId,
        job_id: fawkes_core::JobId,
    ) -> Result<bool, SchedulerError> {
        let worker = self.store.get_worker(&worker_id)?;
        let job = self.store.get_job(job_id)?;

        let outcome = self.dispatcher.accept_job(&worker, &job).await;
        match outcome {
            Ok(AcceptOutcome::Accepted) => {
                self.dispatch_failures.remove(&worker_id);
                // Acceptance is the assigned → running transition. A cancel
                // can race the dispatch; that loses nothing.
                match self.store.update_job_status(job_id, fawkes_core::JobStatus::Running, None)
                {
                    Ok(()) | Err(SchedulerError::IllegalTransition { .. }) => {}
                    Err(e) => return Err(e),
                }
                info!(job = %job_id, worker = %worker_id, "job dispatched");
                Ok(true)
            }
            Ok(AcceptOutcome::Refused(reason)) => {
                debug!(job = %job_id, worker = %worker_id, reason, "dispatch refused");
                self.note_dispatch_failure(worker_id);
                self.revert(job_id, &format!("dispatch refused: {reason}"))?;
                Ok(false)
            }
            Err(e) => {
                debug!(job = %job_id, worker = %worker_id, error = %e, "dispatch failed");
                self.note_dispatch_failure(worker_id);
                self.revert(job_id, &format!("dispatch failed: {e}"))?;
                Ok(false)
            }
        }
    }

    /// Undo an assignment whose dispatch went nowhere. Tolerates racing
    /// terminal transitions.
    fn revert(&self, job_id: fawkes_core::JobId, reason: &str) -> Result<(), SchedulerError> {
        match self.store.requeue_or_fail(job_id, reason) {
            Ok(_) | Err(SchedulerError::IllegalTransition { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn note_dispatch_failure(&mut self, worker_id: WorkerId) {
        let count = self.dispatch_failures.entry(worker_id).or_insert(0);
        *count += 1;
        if *count >= self.config.dispatch_failure_limit {
            self.store.mark_worker_offline(&worker_id);
            self.dispatch_failures.remove(&worker_id);
        }
    }
}

/// Run the allocator until cancelled.
pub async fn run_allocator<C: Clock>(
    store: SchedulerStore<C>,
    dispatcher: Arc<dyn JobDispatcher>,
    config: AllocatorConfig,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut allocator = Allocator::new(store, dispatcher, config);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = allocator.run_cycle().await {
                    // Storage failures are fatal for this loop
                    tracing::error!(error = %e, "allocator cycle failed, halting loop");
                    return;
                }
            }
            _ = cancel.cancelled() => return,
        }
    }
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod tests;
