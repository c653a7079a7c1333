// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared worker runtime state.
//!
//! One job at a time: the dispatch endpoint claims the slot, the executor
//! releases it. Everything the heartbeat emitter reads lives here.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use fawkes_core::{JobId, WorkerId, WorkerLoad};
use fawkes_harness::ProgressCounters;

/// The job currently running on this worker.
#[derive(Clone)]
pub struct ActiveJob {
    pub job_id: JobId,
    pub cancel: CancellationToken,
    pub counters: Arc<ProgressCounters>,
    pub reserved_vms: u32,
}

/// Shared across the dispatch endpoint, executor, and heartbeat emitter.
#[derive(Clone, Default)]
pub struct WorkerState {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    worker_id: Option<WorkerId>,
    active: Option<ActiveJob>,
}

impl WorkerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_worker_id(&self, id: WorkerId) {
        self.inner.lock().worker_id = Some(id);
    }

    pub fn worker_id(&self) -> Option<WorkerId> {
        self.inner.lock().worker_id
    }

    /// Claim the single job slot. Fails with the current occupant when busy.
    pub fn try_claim(&self, job: ActiveJob) -> Result<(), JobId> {
        let mut inner = self.inner.lock();
        match &inner.active {
            Some(active) => Err(active.job_id),
            None => {
                inner.active = Some(job);
                Ok(())
            }
        }
    }

    /// Release the slot if `job_id` still owns it.
    pub fn release(&self, job_id: JobId) {
        let mut inner = self.inner.lock();
        if inner.active.as_ref().is_some_and(|a| a.job_id == job_id) {
            inner.active = None;
        }
    }

    pub fn active(&self) -> Option<ActiveJob> {
        self.inner.lock().active.clone()
    }

    /// Signal cancellation for `job_id` if it is the active job.
    /// Idempotent; unknown jobs are fine (the cancel may race completion).
    pub fn cancel(&self, job_id: JobId) {
        let inner = self.inner.lock();
        if let Some(active) = &inner.active {
            if active.job_id == job_id {
                active.cancel.cancel();
            }
        }
    }

    /// Cancel whatever is running (worker shutdown).
    pub fn cancel_all(&self) {
        if let Some(active) = self.inner.lock().active.as_ref() {
            active.cancel.cancel();
        }
    }

    /// Current load for heartbeats.
    pub fn load(&self) -> WorkerLoad {
        let inner = self.inner.lock();
        match &inner.active {
            Some(active) => WorkerLoad {
                used_vms: active.reserved_vms,
                cpu_percent: 0.0,
                ram_percent: 0.0,
                active_jobs: 1,
            },
            None => WorkerLoad::default(),
        }
    }

    /// Progress snapshot for heartbeats, if a job is running.
    pub fn progress(&self) -> Option<fawkes_core::JobProgress> {
        self.inner.lock().active.as_ref().map(|a| a.counters.snapshot())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
