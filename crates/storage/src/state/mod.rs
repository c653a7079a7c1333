// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay

mod crashes;
mod jobs;
mod workers;

use fawkes_core::{
    Assignment, CrashId, CrashRecord, Event, JobId, JobRecord, JobStatus, QueueEntry, StatusCounts,
    WorkerId, WorkerLoad, WorkerRecord, WorkerStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Runtime-only view of a worker: heartbeat freshness and reported load.
///
/// Not persisted — after a controller restart every worker is offline until
/// its next heartbeat, which is exactly what recovery wants.
#[derive(Debug, Clone, Default)]
pub struct WorkerRuntime {
    pub last_heartbeat_epoch_ms: u64,
    pub load: WorkerLoad,
    pub marked_offline: bool,
}

/// Materialized state built from WAL replay.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub jobs: HashMap<JobId, JobRecord>,
    /// Priority queue entries; head = min by `(−priority, enqueue_seq)`
    pub queue: Vec<QueueEntry>,
    /// job → owning worker; the single source of truth for ownership
    pub assignments: HashMap<JobId, Assignment>,
    pub workers: HashMap<WorkerId, WorkerRecord>,
    pub crashes: HashMap<CrashId, CrashRecord>,
    /// stack_hash → unique crash, for dedup
    #[serde(default)]
    pub crash_hashes: HashMap<String, CrashId>,
    #[serde(default)]
    pub next_job_id: u64,
    #[serde(default)]
    pub next_crash_id: u64,
    #[serde(default)]
    pub next_enqueue_seq: u64,
    /// Runtime-only heartbeat/load data; repopulates as workers check in.
    #[serde(skip)]
    pub worker_runtime: HashMap<WorkerId, WorkerRuntime>,
}

impl MaterializedState {
    /// Apply an event to derive state changes.
    ///
    /// # Idempotency Requirement
    ///
    /// **All event handlers MUST be idempotent.** Applying the same event
    /// twice must produce the same state as applying it once — events may be
    /// applied once for immediate visibility and again during replay after a
    /// restart. Guidelines:
    ///
    /// - Use assignment (`=`) instead of mutation (`+=`, `-=`)
    /// - Guard inserts with existence checks
    /// - Guard timestamps with `is_none` checks
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::JobAdded { .. }
            | Event::JobQueued { .. }
            | Event::JobAssigned { .. }
            | Event::JobRequeued { .. }
            | Event::JobStatusChanged { .. } => jobs::apply(self, event),

            Event::WorkerRegistered { .. } | Event::WorkerUpdated { .. } => {
                workers::apply(self, event)
            }

            Event::CrashRecorded { .. } | Event::CrashDuplicate { .. } => {
                crashes::apply(self, event)
            }
        }
    }

    /// Head of the priority queue without removing it.
    pub fn peek_queue(&self) -> Option<&QueueEntry> {
        self.queue.iter().min_by_key(|e| e.order_key())
    }

    /// Queue entries in dequeue order.
    pub fn queue_in_order(&self) -> Vec<QueueEntry> {
        let mut entries = self.queue.clone();
        entries.sort_by_key(|e| e.order_key());
        entries
    }

    /// Whether every dependency of `job` has completed.
    pub fn dependencies_satisfied(&self, job: &JobRecord) -> bool {
        job.dependencies.iter().all(|dep| {
            self.jobs.get(dep).map(|d| d.status == JobStatus::Completed).unwrap_or(false)
        })
    }

    /// Pending jobs that list `dep` as a dependency.
    pub fn dependents_of(&self, dep: JobId) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.dependencies.contains(&dep))
            .map(|j| j.id)
            .collect();
        ids.sort();
        ids
    }

    /// Derived status of a worker given the heartbeat timeout.
    pub fn worker_status(&self, id: &WorkerId, now_epoch_ms: u64, timeout_ms: u64) -> WorkerStatus {
        let Some(record) = self.workers.get(id) else {
            return WorkerStatus::Offline;
        };
        let Some(runtime) = self.worker_runtime.get(id) else {
            return WorkerStatus::Offline;
        };
        if runtime.marked_offline
            || now_epoch_ms.saturating_sub(runtime.last_heartbeat_epoch_ms) >= timeout_ms
        {
            return WorkerStatus::Offline;
        }
        if runtime.load.used_vms >= record.capabilities.max_vms {
            WorkerStatus::Busy
        } else {
            WorkerStatus::Online
        }
    }

    /// Jobs assigned to or running on the given worker.
    pub fn jobs_owned_by(&self, worker: &WorkerId) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .assignments
            .values()
            .filter(|a| &a.worker_id == worker)
            .map(|a| a.job_id)
            .collect();
        ids.sort();
        ids
    }

    /// Counts by status for jobs and workers plus crash totals.
    pub fn stats(&self, now_epoch_ms: u64, heartbeat_timeout_ms: u64) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for job in self.jobs.values() {
            *counts.jobs.entry(job.status.to_string()).or_default() += 1;
        }
        for id in self.workers.keys() {
            let status = self.worker_status(id, now_epoch_ms, heartbeat_timeout_ms);
            *counts.workers.entry(status.to_string()).or_default() += 1;
        }
        counts.unique_crashes = self.crashes.len() as u64;
        counts.duplicate_crashes =
            self.crashes.values().map(|c| c.duplicate_count.saturating_sub(1)).sum();
        counts
    }
}

#[cfg(test)]
#[path = "../state_tests.rs"]
mod tests;
