// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeSet;

use fawkes_core::{
    Capabilities, CrashReport, JobId, JobProgress, JobSpec, JobStatus, WorkerId, WorkerLoad,
    WorkerStatus,
};
use serde::{Deserialize, Serialize};

/// Request to the controller endpoint.
///
/// Workers and the CLI share one port; the worker-plane variants carry a
/// `worker_id` obtained from `Hello`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    // -- worker plane --
    /// Idempotent worker registration. A worker that restarts with the same
    /// address gets its previous worker_id back.
    Hello {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worker_id: Option<WorkerId>,
        /// host:port of the worker's dispatch endpoint
        address: String,
        hostname: String,
        capabilities: Capabilities,
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        tags: BTreeSet<String>,
    },

    /// Periodic liveness + load report, optionally with job progress.
    Heartbeat {
        worker_id: WorkerId,
        load: WorkerLoad,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<JobProgress>,
    },

    /// Ship a triaged crash with its testcase bytes.
    ReportCrash {
        worker_id: WorkerId,
        report: CrashReport,
        testcase: Vec<u8>,
    },

    /// Final status for a dispatched job.
    JobDone {
        worker_id: WorkerId,
        job_id: JobId,
        /// `completed` or `failed`; anything else is rejected
        status: JobStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure_reason: Option<String>,
    },

    // -- control plane --
    /// Create a job from a spec
    AddJob { spec: JobSpec },

    /// List jobs, optionally filtered
    ListJobs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<JobStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_priority: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },

    /// Full record for one job
    GetJob { id: JobId },

    /// Cancel a job (terminal; running jobs are told to stop)
    CancelJob { id: JobId },

    /// List workers, optionally filtered by derived status
    ListWorkers {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<WorkerStatus>,
    },

    /// Counts by status
    Stats,

    /// Request controller shutdown
    Shutdown,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
