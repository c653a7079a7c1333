// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events that mutate scheduler state.
//!
//! Serializes with `{"type": "event:name", ...fields}` format. Events are
//! facts about what happened; the materialized state is derived by replay,
//! so every handler must be idempotent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::crash::{CrashId, CrashRecord};
use crate::job::{JobId, JobSpec, JobStatus};
use crate::worker::{Capabilities, WorkerId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- jobs --
    /// A job was created (always lands `pending`; a `job:queued` event
    /// follows immediately when it has no dependencies).
    #[serde(rename = "job:added")]
    JobAdded {
        id: JobId,
        spec: JobSpec,
        created_at_epoch_ms: u64,
    },

    /// A pending job became eligible and entered the priority queue.
    #[serde(rename = "job:queued")]
    JobQueued { id: JobId, enqueue_seq: u64 },

    /// The allocator bound a queued job to a worker.
    #[serde(rename = "job:assigned")]
    JobAssigned {
        id: JobId,
        worker_id: WorkerId,
        at_epoch_ms: u64,
    },

    /// An in-flight job went back to the queue (worker loss or dispatch
    /// failure). Carries the new retry count.
    #[serde(rename = "job:requeued")]
    JobRequeued {
        id: JobId,
        enqueue_seq: u64,
        retries: u32,
        reason: String,
    },

    /// A job status transition (running, completed, failed, cancelled).
    #[serde(rename = "job:status")]
    JobStatusChanged {
        id: JobId,
        status: JobStatus,
        at_epoch_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    // -- workers --
    #[serde(rename = "worker:registered")]
    WorkerRegistered {
        id: WorkerId,
        address: String,
        hostname: String,
        capabilities: Capabilities,
        tags: BTreeSet<String>,
        registered_at_epoch_ms: u64,
    },

    /// Re-registration refreshed a known worker's shape.
    #[serde(rename = "worker:updated")]
    WorkerUpdated {
        id: WorkerId,
        hostname: String,
        capabilities: Capabilities,
        tags: BTreeSet<String>,
    },

    // -- crashes --
    /// A unique crash entered the global store.
    #[serde(rename = "crash:recorded")]
    CrashRecorded { record: CrashRecord },

    /// A report matched an existing stack hash. Carries the resulting total
    /// count (assignment, not increment, so replay is idempotent).
    /// `replace_payload` is set when the new report scored strictly higher
    /// and its testcase replaced the stored one.
    #[serde(rename = "crash:duplicate")]
    CrashDuplicate {
        of: CrashId,
        job_id: JobId,
        worker_id: WorkerId,
        duplicate_count: u64,
        exploitability_score: u8,
        replace_payload: bool,
    },
}

impl Event {
    /// One-line summary for WAL/debug logging.
    pub fn log_summary(&self) -> String {
        match self {
            Event::JobAdded { id, spec, .. } => {
                format!("job:added id={id} name={} pri={}", spec.name, spec.priority)
            }
            Event::JobQueued { id, enqueue_seq } => {
                format!("job:queued id={id} seq={enqueue_seq}")
            }
            Event::JobAssigned { id, worker_id, .. } => {
                format!("job:assigned id={id} worker={worker_id}")
            }
            Event::JobRequeued { id, retries, reason, .. } => {
                format!("job:requeued id={id} retries={retries} reason={reason}")
            }
            Event::JobStatusChanged { id, status, .. } => {
                format!("job:status id={id} status={status}")
            }
            Event::WorkerRegistered { id, address, .. } => {
                format!("worker:registered id={id} addr={address}")
            }
            Event::WorkerUpdated { id, .. } => format!("worker:updated id={id}"),
            Event::CrashRecorded { record } => {
                format!(
                    "crash:recorded id={} job={} hash={}",
                    record.id,
                    record.job_id,
                    crate::id::short(&record.stack_hash, 12)
                )
            }
            Event::CrashDuplicate { of, job_id, .. } => {
                format!("crash:duplicate of={of} job={job_id}")
            }
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
