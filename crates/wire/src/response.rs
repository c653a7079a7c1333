// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeSet;

use fawkes_core::{CrashId, JobId, JobRecord, JobStatus, StatusCounts, WorkerId, WorkerStatus};
use serde::{Deserialize, Serialize};

/// Error taxonomy exposed over the wire (spec'd in the scheduler API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Job or worker id does not exist
    UnknownEntity,
    /// Requested status transition is not legal
    IllegalTransition,
    /// No worker can satisfy the resource request
    ResourceUnavailable,
    /// Dependencies are not all completed
    DependencyUnsatisfied,
    /// Worker refused a dispatch (e.g. already running a job)
    Busy,
    /// Anything the taxonomy does not cover; not retryable
    Internal,
}

fawkes_core::simple_display! {
    ErrorKind {
        UnknownEntity => "unknown-entity",
        IllegalTransition => "illegal-transition",
        ResourceUnavailable => "resource-unavailable",
        DependencyUnsatisfied => "dependency-unsatisfied",
        Busy => "busy",
        Internal => "internal",
    }
}

/// One row of `ListJobs` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub name: String,
    pub priority: u8,
    pub status: JobStatus,
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<WorkerId>,
    pub created_at_epoch_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_epoch_ms: Option<u64>,
}

impl From<&JobRecord> for JobSummary {
    fn from(job: &JobRecord) -> Self {
        Self {
            id: job.id,
            name: job.name.clone(),
            priority: job.priority,
            status: job.status,
            retries: job.retries,
            assigned_worker: job.assigned_worker,
            created_at_epoch_ms: job.created_at_epoch_ms,
            deadline_epoch_ms: job.deadline_epoch_ms,
        }
    }
}

/// One row of `ListWorkers` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub address: String,
    pub hostname: String,
    pub status: WorkerStatus,
    pub used_vms: u32,
    pub max_vms: u32,
    pub active_jobs: u32,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

/// Response from the controller endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Pong,

    /// Registration result: the worker's identity and how often to heartbeat.
    Hello {
        worker_id: WorkerId,
        heartbeat_interval_ms: u64,
    },

    /// Heartbeat acknowledged. `assignments_pending` tells the worker a
    /// dispatch is on its way (informational; dispatch is push-based).
    HeartbeatAck { assignments_pending: bool },

    /// Crash report stored (or matched an existing stack hash).
    CrashAck { crash_id: CrashId, is_duplicate: bool },

    JobAdded { id: JobId },

    Jobs { jobs: Vec<JobSummary> },

    Job { job: Box<JobRecord> },

    Workers { workers: Vec<WorkerSummary> },

    Stats { counts: StatusCounts },

    Ok,

    ShuttingDown,

    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error { kind, message: message.into() }
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
