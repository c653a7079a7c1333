// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller → worker dispatch protocol.
//!
//! The controller connects to the worker's dispatch endpoint to hand over
//! jobs and cancellations; everything else flows worker → controller.

use fawkes_core::{JobId, JobRecord, ResourceSpec};
use serde::{Deserialize, Serialize};

/// Everything a worker needs to run a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: JobId,
    pub name: String,
    /// Opaque blob the harness parses
    pub config: serde_json::Value,
    pub resources: ResourceSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_epoch_ms: Option<u64>,
}

impl From<&JobRecord> for JobDescriptor {
    fn from(job: &JobRecord) -> Self {
        Self {
            job_id: job.id,
            name: job.name.clone(),
            config: job.config.clone(),
            resources: job.resources.clone(),
            deadline_epoch_ms: job.deadline_epoch_ms,
        }
    }
}

/// Request to a worker's dispatch endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DispatchRequest {
    Ping,

    /// Hand a job to the worker.
    AcceptJob { job: JobDescriptor },

    /// Stop a running job. The worker acknowledges immediately and drains
    /// asynchronously; completion is observed via the next heartbeat.
    CancelJob { job_id: JobId },
}

/// Response from a worker's dispatch endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DispatchResponse {
    Pong,

    /// Whether the worker took the job; `reason` explains a refusal.
    Accepted {
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Cancellation acknowledged (idempotent).
    Cancelled { accepted: bool },
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
