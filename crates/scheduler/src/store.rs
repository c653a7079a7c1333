// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler store: the single authoritative home of jobs, workers,
//! queue, assignments, and crashes.
//!
//! Write path: validate against the in-memory state, append the event to
//! the WAL, apply it. Validation happens before the append, so a returned
//! error means nothing was persisted or applied — no operation partially
//! applies. State and WAL sit behind one lock each, always taken in that
//! order.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use fawkes_core::{
    Clock, CrashId, CrashRecord, Event, JobId, JobRecord, JobSpec, JobStatus, StatusCounts,
    WorkerId, WorkerLoad, WorkerRecord, WorkerStatus,
};
use fawkes_storage::{
    load_or_default, Checkpointer, CheckpointError, MaterializedState, Wal, WorkerRuntime,
};

use crate::error::SchedulerError;
use crate::strategy::Candidate;

/// Workers missing heartbeats for this long are offline (default 90 s).
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 90_000;

/// Heartbeat acknowledgement data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatAck {
    /// A job is assigned to this worker but not yet accepted
    pub assignments_pending: bool,
}

/// Result of recording a crash report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashOutcome {
    pub crash_id: CrashId,
    pub is_duplicate: bool,
    /// The new report out-scored the stored one; its testcase replaces the
    /// stored artifact
    pub replace_payload: bool,
}

/// The authoritative scheduler store.
///
/// Cheap to clone; all clones share the same state and WAL.
pub struct SchedulerStore<C: Clock> {
    state: Arc<Mutex<MaterializedState>>,
    wal: Arc<Mutex<Wal>>,
    clock: C,
    heartbeat_timeout_ms: u64,
}

impl<C: Clock> Clone for SchedulerStore<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            wal: Arc::clone(&self.wal),
            clock: self.clock.clone(),
            heartbeat_timeout_ms: self.heartbeat_timeout_ms,
        }
    }
}

impl<C: Clock> SchedulerStore<C> {
    pub fn new(state: MaterializedState, wal: Wal, clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            wal: Arc::new(Mutex::new(wal)),
            clock,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
        }
    }

    pub fn with_heartbeat_timeout_ms(mut self, ms: u64) -> Self {
        self.heartbeat_timeout_ms = ms;
        self
    }

    pub fn heartbeat_timeout_ms(&self) -> u64 {
        self.heartbeat_timeout_ms
    }

    /// Recover from disk: load the snapshot (if any) and replay the WAL.
    pub fn recover(
        wal_path: &Path,
        snapshot_path: &Path,
        clock: C,
    ) -> Result<Self, SchedulerError> {
        let (mut state, seq) = load_or_default(snapshot_path)
            .map_err(|e| SchedulerError::Fatal(format!("snapshot: {e}")))?;
        let mut wal = Wal::open(wal_path, seq)?;
        let mut replayed = 0u64;
        while let Some(entry) = wal.next_unprocessed()? {
            state.apply_event(&entry.event);
            wal.mark_processed(entry.seq);
            replayed += 1;
        }
        if replayed > 0 {
            info!(replayed, "replayed WAL entries");
        }
        Ok(Self::new(state, wal, clock))
    }

    /// Append + apply one event. The state lock must be held by the caller.
    fn emit(
        &self,
        state: &mut MaterializedState,
        event: Event,
    ) -> Result<(), SchedulerError> {
        let mut wal = self.wal.lock();
        let seq = wal.append(&event)?;
        wal.mark_processed(seq);
        drop(wal);
        state.apply_event(&event);
        Ok(())
    }

    // -- jobs --

    /// Create a job. Lands `queued` immediately when it has no unfinished
    /// dependencies; unknown dependency ids are rejected.
    pub fn add_job(&self, spec: JobSpec) -> Result<JobId, SchedulerError> {
        let mut state = self.state.lock();

        for dep in &spec.dependencies {
            if !state.jobs.contains_key(dep) {
                return Err(SchedulerError::unknown_job(*dep));
            }
        }

        let id = JobId(state.next_job_id.max(1));
        let now = self.clock.epoch_ms();

        // A dependency that already failed can never complete
        let dead_dep = spec
            .dependencies
            .iter()
            .find(|dep| {
                matches!(
                    state.jobs[*dep].status,
                    JobStatus::Failed | JobStatus::Cancelled
                )
            })
            .copied();

        self.emit(&mut state, Event::JobAdded { id, spec, created_at_epoch_ms: now })?;

        if let Some(dep) = dead_dep {
            self.emit(
                &mut state,
                Event::JobStatusChanged {
                    id,
                    status: JobStatus::Failed,
                    at_epoch_ms: now,
                    reason: Some(format!("dependency {dep} did not complete")),
                },
            )?;
            return Ok(id);
        }

        let job = &state.jobs[&id];
        if state.dependencies_satisfied(job) {
            let seq = state.next_enqueue_seq.max(1);
            self.emit(&mut state, Event::JobQueued { id, enqueue_seq: seq })?;
        }
        Ok(id)
    }

    /// Transition a job, enforcing the legal-transition table. Completing a
    /// job promotes its satisfied dependents into the queue; a terminal
    /// failure fails dependents that can never become eligible.
    pub fn update_job_status(
        &self,
        id: JobId,
        status: JobStatus,
        reason: Option<String>,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        self.transition(&mut state, id, status, reason)?;

        match status {
            JobStatus::Completed => self.promote_dependents(&mut state, id)?,
            JobStatus::Failed | JobStatus::Cancelled => {
                self.fail_dependents(&mut state, id)?
            }
            _ => {}
        }
        Ok(())
    }

    /// Validate + emit one transition. Caller holds the state lock.
    fn transition(
        &self,
        state: &mut MaterializedState,
        id: JobId,
        status: JobStatus,
        reason: Option<String>,
    ) -> Result<(), SchedulerError> {
        let job = state.jobs.get(&id).ok_or_else(|| SchedulerError::unknown_job(id))?;
        if !job.status.can_transition_to(status) {
            return Err(SchedulerError::IllegalTransition { id, from: job.status, to: status });
        }
        let now = self.clock.epoch_ms();
        if status == JobStatus::Queued {
            let seq = state.next_enqueue_seq.max(1);
            self.emit(state, Event::JobQueued { id, enqueue_seq: seq })
        } else {
            self.emit(state, Event::JobStatusChanged { id, status, at_epoch_ms: now, reason })
        }
    }

    /// Queue pending dependents whose dependencies are now all completed.
    fn promote_dependents(
        &self,
        state: &mut MaterializedState,
        completed: JobId,
    ) -> Result<(), SchedulerError> {
        for dependent in state.dependents_of(completed) {
            let satisfied = state
                .jobs
                .get(&dependent)
                .map(|j| state.dependencies_satisfied(j))
                .unwrap_or(false);
            if satisfied {
                let seq = state.next_enqueue_seq.max(1);
                self.emit(state, Event::JobQueued { id: dependent, enqueue_seq: seq })?;
            }
        }
        Ok(())
    }

    /// Fail pending dependents of a terminally-failed job, cascading.
    fn fail_dependents(
        &self,
        state: &mut MaterializedState,
        failed: JobId,
    ) -> Result<(), SchedulerError> {
        let mut worklist = vec![failed];
        while let Some(dead) = worklist.pop() {
            for dependent in state.dependents_of(dead) {
                let now = self.clock.epoch_ms();
                self.emit(
                    state,
                    Event::JobStatusChanged {
                        id: dependent,
                        status: JobStatus::Failed,
                        at_epoch_ms: now,
                        reason: Some(format!("dependency {dead} did not complete")),
                    },
                )?;
                worklist.push(dependent);
            }
        }
        Ok(())
    }

    /// Cancel a job (terminal). Returns the owning worker when the job was
    /// in flight so the caller can signal it.
    pub fn cancel_job(&self, id: JobId) -> Result<Option<WorkerRecord>, SchedulerError> {
        let mut state = self.state.lock();
        let owner = state
            .assignments
            .get(&id)
            .and_then(|a| state.workers.get(&a.worker_id))
            .cloned();
        self.transition(&mut state, id, JobStatus::Cancelled, None)?;
        self.fail_dependents(&mut state, id)?;
        Ok(owner)
    }

    /// Head of the queue by `(−priority, enqueue_seq)`; does not remove.
    pub fn get_next_job_from_queue(&self) -> Option<fawkes_core::QueueEntry> {
        self.state.lock().peek_queue().copied()
    }

    /// Queue entries in dequeue order.
    pub fn queued_entries(&self) -> Vec<fawkes_core::QueueEntry> {
        self.state.lock().queue_in_order()
    }

    /// Atomically pop the queue entry, record the Assignment, and mark the
    /// job `assigned`.
    pub fn assign_job_to_worker(
        &self,
        job_id: JobId,
        worker_id: WorkerId,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        let job = state.jobs.get(&job_id).ok_or_else(|| SchedulerError::unknown_job(job_id))?;
        if job.status != JobStatus::Queued {
            return Err(SchedulerError::IllegalTransition {
                id: job_id,
                from: job.status,
                to: JobStatus::Assigned,
            });
        }
        if !state.workers.contains_key(&worker_id) {
            return Err(SchedulerError::unknown_worker(&worker_id));
        }
        let now = self.clock.epoch_ms();
        self.emit(&mut state, Event::JobAssigned { id: job_id, worker_id, at_epoch_ms: now })
    }

    /// Re-queue an in-flight job (worker loss, dispatch failure) or fail it
    /// once retries are exhausted. Returns the resulting status.
    pub fn requeue_or_fail(
        &self,
        job_id: JobId,
        reason: &str,
    ) -> Result<JobStatus, SchedulerError> {
        let mut state = self.state.lock();
        let job = state.jobs.get(&job_id).ok_or_else(|| SchedulerError::unknown_job(job_id))?;
        if !matches!(job.status, JobStatus::Assigned | JobStatus::Running) {
            return Err(SchedulerError::IllegalTransition {
                id: job_id,
                from: job.status,
                to: JobStatus::Queued,
            });
        }
        if job.retries < job.max_retries {
            let retries = job.retries + 1;
            let seq = state.next_enqueue_seq.max(1);
            self.emit(
                &mut state,
                Event::JobRequeued {
                    id: job_id,
                    enqueue_seq: seq,
                    retries,
                    reason: reason.to_string(),
                },
            )?;
            Ok(JobStatus::Queued)
        } else {
            let now = self.clock.epoch_ms();
            self.emit(
                &mut state,
                Event::JobStatusChanged {
                    id: job_id,
                    status: JobStatus::Failed,
                    at_epoch_ms: now,
                    reason: Some(format!("retries exhausted: {reason}")),
                },
            )?;
            self.fail_dependents(&mut state, job_id)?;
            Ok(JobStatus::Failed)
        }
    }

    pub fn get_job(&self, id: JobId) -> Result<JobRecord, SchedulerError> {
        self.state
            .lock()
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| SchedulerError::unknown_job(id))
    }

    /// Jobs matching the filters, newest first.
    pub fn list_jobs(
        &self,
        status: Option<JobStatus>,
        min_priority: Option<u8>,
        limit: Option<usize>,
    ) -> Vec<JobRecord> {
        let state = self.state.lock();
        let mut jobs: Vec<JobRecord> = state
            .jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .filter(|j| min_priority.map_or(true, |p| j.priority >= p))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| std::cmp::Reverse(j.id));
        jobs.truncate(limit.unwrap_or(usize::MAX));
        jobs
    }

    // -- workers --

    /// Register a worker; idempotent on `address`. A known address keeps
    /// its worker_id and refreshes hostname/capabilities/tags.
    pub fn register_worker(
        &self,
        address: &str,
        hostname: &str,
        capabilities: fawkes_core::Capabilities,
        tags: BTreeSet<String>,
    ) -> Result<WorkerId, SchedulerError> {
        let mut state = self.state.lock();
        let now = self.clock.epoch_ms();

        let existing = state.workers.values().find(|w| w.address == address).map(|w| w.id);
        let id = match existing {
            Some(id) => {
                self.emit(
                    &mut state,
                    Event::WorkerUpdated {
                        id,
                        hostname: hostname.to_string(),
                        capabilities,
                        tags,
                    },
                )?;
                id
            }
            None => {
                let id = WorkerId::new();
                self.emit(
                    &mut state,
                    Event::WorkerRegistered {
                        id,
                        address: address.to_string(),
                        hostname: hostname.to_string(),
                        capabilities,
                        tags,
                        registered_at_epoch_ms: now,
                    },
                )?;
                id
            }
        };

        // Registration counts as a heartbeat
        state.worker_runtime.insert(
            id,
            WorkerRuntime {
                last_heartbeat_epoch_ms: now,
                load: WorkerLoad::default(),
                marked_offline: false,
            },
        );
        Ok(id)
    }

    /// Record a heartbeat. Clears any offline mark — a returning worker
    /// re-enters service immediately (its old jobs are not reclaimed).
    pub fn update_worker_heartbeat(
        &self,
        worker_id: WorkerId,
        load: WorkerLoad,
    ) -> Result<HeartbeatAck, SchedulerError> {
        let mut state = self.state.lock();
        if !state.workers.contains_key(&worker_id) {
            return Err(SchedulerError::unknown_worker(&worker_id));
        }
        let now = self.clock.epoch_ms();
        state.worker_runtime.insert(
            worker_id,
            WorkerRuntime { last_heartbeat_epoch_ms: now, load, marked_offline: false },
        );
        let assignments_pending = state.assignments.values().any(|a| {
            a.worker_id == worker_id
                && state.jobs.get(&a.job_id).map(|j| j.status == JobStatus::Assigned).unwrap_or(false)
        });
        Ok(HeartbeatAck { assignments_pending })
    }

    /// Eligible workers for a job: heartbeat-fresh, tags ⊇ required, and
    /// enough spare capacity. Returned in registration order.
    pub fn get_available_workers(
        &self,
        required_tags: &BTreeSet<String>,
        resources: &fawkes_core::ResourceSpec,
    ) -> Vec<Candidate> {
        let state = self.state.lock();
        let now = self.clock.epoch_ms();
        let mut candidates: Vec<Candidate> = state
            .workers
            .values()
            .filter(|w| w.has_tags(required_tags))
            .filter(|w| {
                state.worker_status(&w.id, now, self.heartbeat_timeout_ms)
                    != WorkerStatus::Offline
            })
            .filter_map(|w| {
                let load = state.worker_runtime.get(&w.id)?.load;
                let spare_vms = w.capabilities.max_vms.saturating_sub(load.used_vms);
                let fits = spare_vms >= resources.vms
                    && w.capabilities.cpu_cores >= resources.cpu
                    && w.capabilities.ram_gb >= resources.ram_gb;
                fits.then(|| Candidate { worker: w.clone(), load })
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.worker
                .registered_at_epoch_ms
                .cmp(&b.worker.registered_at_epoch_ms)
                .then_with(|| a.worker.id.as_str().cmp(b.worker.id.as_str()))
        });
        candidates
    }

    pub fn get_worker(&self, id: &WorkerId) -> Result<WorkerRecord, SchedulerError> {
        self.state
            .lock()
            .workers
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::unknown_worker(id))
    }

    /// All workers with their derived status and load.
    pub fn list_workers(&self) -> Vec<(WorkerRecord, WorkerStatus, WorkerLoad)> {
        let state = self.state.lock();
        let now = self.clock.epoch_ms();
        let mut workers: Vec<_> = state
            .workers
            .values()
            .map(|w| {
                let status = state.worker_status(&w.id, now, self.heartbeat_timeout_ms);
                let load =
                    state.worker_runtime.get(&w.id).map(|r| r.load).unwrap_or_default();
                (w.clone(), status, load)
            })
            .collect();
        workers.sort_by(|a, b| a.0.registered_at_epoch_ms.cmp(&b.0.registered_at_epoch_ms));
        workers
    }

    /// Mark a worker offline without waiting for the heartbeat timeout
    /// (repeated dispatch failures). Runtime-only; the next heartbeat
    /// clears it.
    pub fn mark_worker_offline(&self, id: &WorkerId) {
        let mut state = self.state.lock();
        match state.worker_runtime.get_mut(id) {
            Some(runtime) => runtime.marked_offline = true,
            None => {
                state
                    .worker_runtime
                    .insert(*id, WorkerRuntime { marked_offline: true, ..Default::default() });
            }
        }
        warn!(worker = %id, "worker marked offline");
    }

    /// Workers that are offline (stale heartbeat or marked) yet still own
    /// assignments — the health monitor's recovery set.
    pub fn offline_workers_with_jobs(&self) -> Vec<(WorkerId, Vec<JobId>)> {
        let state = self.state.lock();
        let now = self.clock.epoch_ms();
        state
            .workers
            .keys()
            .filter(|id| {
                state.worker_status(id, now, self.heartbeat_timeout_ms) == WorkerStatus::Offline
            })
            .map(|id| (*id, state.jobs_owned_by(id)))
            .filter(|(_, jobs)| !jobs.is_empty())
            .collect()
    }

    /// Non-terminal jobs whose deadline has passed, with their owner (if
    /// in flight).
    pub fn expired_jobs(&self) -> Vec<(JobId, Option<WorkerRecord>)> {
        let state = self.state.lock();
        let now = self.clock.epoch_ms();
        state
            .jobs
            .values()
            .filter(|j| !j.is_terminal() && j.deadline_passed(now))
            .map(|j| {
                let owner = state
                    .assignments
                    .get(&j.id)
                    .and_then(|a| state.workers.get(&a.worker_id))
                    .cloned();
                (j.id, owner)
            })
            .collect()
    }

    /// Force-fail a job past its deadline. No retry — a deadline miss is
    /// terminal.
    pub fn fail_expired(&self, id: JobId) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        self.transition(
            &mut state,
            id,
            JobStatus::Failed,
            Some("deadline exceeded".to_string()),
        )?;
        self.fail_dependents(&mut state, id)
    }

    // -- crashes --

    /// Record a triaged crash, deduplicating by stack hash.
    pub fn record_crash(
        &self,
        worker_id: WorkerId,
        report: &fawkes_core::CrashReport,
    ) -> Result<CrashOutcome, SchedulerError> {
        let mut state = self.state.lock();
        if !state.jobs.contains_key(&report.job_id) {
            return Err(SchedulerError::unknown_job(report.job_id));
        }

        if let Some(existing_id) = state.crash_hashes.get(&report.stack_hash).copied() {
            let existing = &state.crashes[&existing_id];
            let replace_payload = report.exploitability_score > existing.exploitability_score;
            let duplicate_count = existing.duplicate_count + 1;
            self.emit(
                &mut state,
                Event::CrashDuplicate {
                    of: existing_id,
                    job_id: report.job_id,
                    worker_id,
                    duplicate_count,
                    exploitability_score: report.exploitability_score,
                    replace_payload,
                },
            )?;
            return Ok(CrashOutcome {
                crash_id: existing_id,
                is_duplicate: true,
                replace_payload,
            });
        }

        let id = CrashId(state.next_crash_id.max(1));
        let record = CrashRecord::from_report(id, worker_id, report);
        self.emit(&mut state, Event::CrashRecorded { record })?;
        Ok(CrashOutcome { crash_id: id, is_duplicate: false, replace_payload: false })
    }

    pub fn get_crash(&self, id: CrashId) -> Option<CrashRecord> {
        self.state.lock().crashes.get(&id).cloned()
    }

    // -- maintenance --

    pub fn stats(&self) -> StatusCounts {
        let state = self.state.lock();
        state.stats(self.clock.epoch_ms(), self.heartbeat_timeout_ms)
    }

    /// Sequence number of the last WAL entry applied to the state.
    pub fn wal_processed_seq(&self) -> u64 {
        self.wal.lock().processed_seq()
    }

    /// Flush buffered WAL appends to disk.
    pub fn flush(&self) -> Result<(), SchedulerError> {
        self.wal.lock().flush()?;
        Ok(())
    }

    /// Run the checkpointer against the current state and WAL.
    pub fn checkpoint(&self, checkpointer: &mut Checkpointer) -> Result<bool, CheckpointError> {
        let state = self.state.lock();
        let mut wal = self.wal.lock();
        checkpointer.maybe_checkpoint(&state, &mut wal)
    }

    /// Snapshot unconditionally (shutdown path).
    pub fn checkpoint_now(
        &self,
        checkpointer: &mut Checkpointer,
    ) -> Result<(), CheckpointError> {
        let state = self.state.lock();
        let mut wal = self.wal.lock();
        checkpointer.checkpoint(&state, &mut wal)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
