// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job and queue event handlers.

use fawkes_core::{Assignment, Event, JobRecord, JobStatus, QueueEntry};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::JobAdded { id, spec, created_at_epoch_ms } => {
            // Idempotency: skip if already present
            if !state.jobs.contains_key(id) {
                state.jobs.insert(*id, JobRecord::new(*id, spec.clone(), *created_at_epoch_ms));
            }
            state.next_job_id = state.next_job_id.max(id.0 + 1);
        }

        Event::JobQueued { id, enqueue_seq } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.status = JobStatus::Queued;
            }
            push_queue_entry(state, *id, *enqueue_seq);
        }

        Event::JobAssigned { id, worker_id, at_epoch_ms } => {
            state.queue.retain(|e| e.job_id != *id);
            if let Some(job) = state.jobs.get_mut(id) {
                job.status = JobStatus::Assigned;
                job.assigned_worker = Some(*worker_id);
            }
            state.assignments.insert(
                *id,
                Assignment { job_id: *id, worker_id: *worker_id, assigned_at_epoch_ms: *at_epoch_ms },
            );
        }

        Event::JobRequeued { id, enqueue_seq, retries, .. } => {
            state.assignments.remove(id);
            if let Some(job) = state.jobs.get_mut(id) {
                job.status = JobStatus::Queued;
                job.assigned_worker = None;
                // Assignment, not increment: replay-safe
                job.retries = *retries;
            }
            push_queue_entry(state, *id, *enqueue_seq);
        }

        Event::JobStatusChanged { id, status, at_epoch_ms, reason } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.status = *status;
                match status {
                    JobStatus::Running => {
                        if job.started_at_epoch_ms.is_none() {
                            job.started_at_epoch_ms = Some(*at_epoch_ms);
                        }
                    }
                    JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                        if job.finished_at_epoch_ms.is_none() {
                            job.finished_at_epoch_ms = Some(*at_epoch_ms);
                        }
                        if job.failure_reason.is_none() {
                            job.failure_reason.clone_from(reason);
                        }
                        job.assigned_worker = None;
                    }
                    _ => {}
                }
            }
            // Terminal jobs leave the queue and release their worker
            if status.is_terminal() {
                state.queue.retain(|e| e.job_id != *id);
                state.assignments.remove(id);
            }
        }

        _ => {}
    }
}

fn push_queue_entry(state: &mut MaterializedState, id: fawkes_core::JobId, enqueue_seq: u64) {
    // Idempotency: a job appears at most once in the queue
    if !state.queue.iter().any(|e| e.job_id == id) {
        if let Some(job) = state.jobs.get(&id) {
            state.queue.push(QueueEntry { job_id: id, priority: job.priority, enqueue_seq });
        }
    }
    state.next_enqueue_seq = state.next_enqueue_seq.max(enqueue_seq + 1);
}
