// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job records, specs, queue entries, and the status state machine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::worker::WorkerId;

/// Monotone integer identifier for a job.
///
/// Allocated by the scheduler store; survives controller restarts via WAL
/// replay (next id = max persisted + 1).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Status of a job in the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting on dependencies
    Pending,
    /// Eligible and sitting in the priority queue
    Queued,
    /// Allocated to a worker, not yet accepted
    Assigned,
    /// Worker accepted and is executing
    Running,
    /// Finished successfully (terminal)
    Completed,
    /// Finished unsuccessfully (terminal)
    Failed,
    /// Cancelled by an operator (terminal)
    Cancelled,
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Queued => "queued",
        Assigned => "assigned",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl JobStatus {
    /// Check if this status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// The recovery transitions (`assigned`/`running` → `queued`) are legal
    /// because worker loss re-queues in-flight jobs.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match self {
            Pending => matches!(next, Queued | Cancelled | Failed),
            Queued => matches!(next, Assigned | Cancelled | Failed),
            Assigned => matches!(next, Running | Queued | Cancelled | Failed),
            Running => matches!(next, Completed | Failed | Cancelled | Queued),
            Completed | Failed | Cancelled => false,
        }
    }

    /// Parse a status filter string (CLI `--status` flag).
    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "queued" => Some(JobStatus::Queued),
            "assigned" => Some(JobStatus::Assigned),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

/// Resources a job requires from a worker.
///
/// `tags` must be a subset of the worker's tags; the numeric fields are
/// compared against the worker's remaining capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub cpu: u32,
    #[serde(default)]
    pub ram_gb: u32,
    /// VM slots reserved on the worker while the job runs
    #[serde(default = "default_vms")]
    pub vms: u32,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

fn default_vms() -> u32 {
    1
}

impl ResourceSpec {
    pub fn new(cpu: u32, ram_gb: u32, vms: u32) -> Self {
        Self { cpu, ram_gb, vms, tags: BTreeSet::new() }
    }

    /// Parse a CLI resource string like `cpu=4,ram=8,vms=2` (all keys optional).
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut spec = Self { vms: 1, ..Self::default() };
        for part in s.split(',').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got: {}", part))?;
            let parse_num =
                |v: &str| v.trim().parse::<u32>().map_err(|_| format!("invalid number: {}", v));
            match key.trim() {
                "cpu" => spec.cpu = parse_num(value)?,
                "ram" | "ram_gb" => spec.ram_gb = parse_num(value)?,
                "vms" => spec.vms = parse_num(value)?,
                other => return Err(format!("unknown resource key: {}", other)),
            }
        }
        Ok(spec)
    }
}

/// Everything needed to create a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    /// Opaque configuration blob consumed by the worker harness
    pub config: serde_json::Value,
    /// Priority in [0, 100]; higher dequeues first
    pub priority: u8,
    /// Absolute deadline (epoch ms); unset = no deadline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_epoch_ms: Option<u64>,
    /// Jobs that must reach `completed` before this one becomes eligible
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<JobId>,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl JobSpec {
    pub fn builder(name: impl Into<String>) -> JobSpecBuilder {
        JobSpecBuilder {
            name: name.into(),
            config: serde_json::Value::Null,
            priority: 50,
            deadline_epoch_ms: None,
            dependencies: Vec::new(),
            resources: ResourceSpec { vms: 1, ..ResourceSpec::default() },
            max_retries: default_max_retries(),
        }
    }

    /// Clamp user-supplied fields into their valid ranges.
    pub fn sanitized(mut self) -> Self {
        self.priority = self.priority.min(100);
        self
    }
}

/// Production builder for [`JobSpec`] — a job has enough optional fields
/// that positional construction is unreadable.
pub struct JobSpecBuilder {
    name: String,
    config: serde_json::Value,
    priority: u8,
    deadline_epoch_ms: Option<u64>,
    dependencies: Vec<JobId>,
    resources: ResourceSpec,
    max_retries: u32,
}

impl JobSpecBuilder {
    crate::setters! {
        set {
            config: serde_json::Value,
            priority: u8,
            dependencies: Vec<JobId>,
            resources: ResourceSpec,
            max_retries: u32,
        }
        option {
            deadline_epoch_ms: u64,
        }
    }

    pub fn build(self) -> JobSpec {
        JobSpec {
            name: self.name,
            config: self.config,
            priority: self.priority,
            deadline_epoch_ms: self.deadline_epoch_ms,
            dependencies: self.dependencies,
            resources: self.resources,
            max_retries: self.max_retries,
        }
        .sanitized()
    }
}

/// A job as tracked by the scheduler store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub name: String,
    pub config: serde_json::Value,
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<JobId>,
    #[serde(default)]
    pub resources: ResourceSpec,
    pub status: JobStatus,
    #[serde(default)]
    pub retries: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<WorkerId>,
    pub created_at_epoch_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl JobRecord {
    /// Create a fresh `pending` record from a spec.
    pub fn new(id: JobId, spec: JobSpec, created_at_epoch_ms: u64) -> Self {
        let spec = spec.sanitized();
        Self {
            id,
            name: spec.name,
            config: spec.config,
            priority: spec.priority,
            deadline_epoch_ms: spec.deadline_epoch_ms,
            dependencies: spec.dependencies,
            resources: spec.resources,
            status: JobStatus::Pending,
            retries: 0,
            max_retries: spec.max_retries,
            assigned_worker: None,
            created_at_epoch_ms,
            started_at_epoch_ms: None,
            finished_at_epoch_ms: None,
            failure_reason: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// A deadline has passed when one is set and `now` is strictly beyond it.
    pub fn deadline_passed(&self, now_epoch_ms: u64) -> bool {
        self.deadline_epoch_ms.is_some_and(|d| now_epoch_ms > d)
    }
}

/// An entry in the priority queue.
///
/// Ordered by `(−priority, enqueue_seq)`: higher priority first, FIFO within
/// a priority level. `enqueue_seq` is a store-global monotone counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub job_id: JobId,
    pub priority: u8,
    pub enqueue_seq: u64,
}

impl QueueEntry {
    /// Sort key implementing the queue ordering.
    pub fn order_key(&self) -> (std::cmp::Reverse<u8>, u64) {
        (std::cmp::Reverse(self.priority), self.enqueue_seq)
    }
}

/// Execution progress for one job, sampled by the heartbeat emitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub executions: u64,
    pub exec_per_sec: f64,
    pub crashes: u64,
}

/// The single source of truth for "which worker owns which job".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub assigned_at_epoch_ms: u64,
}

crate::builder! {
    pub struct JobRecordBuilder => JobRecord {
        into {
            name: String = "test-job",
        }
        set {
            id: JobId = JobId(1),
            config: serde_json::Value = serde_json::Value::Null,
            priority: u8 = 50,
            dependencies: Vec<JobId> = Vec::new(),
            resources: ResourceSpec = ResourceSpec { vms: 1, ..ResourceSpec::default() },
            status: JobStatus = JobStatus::Pending,
            retries: u32 = 0,
            max_retries: u32 = 3,
            created_at_epoch_ms: u64 = 1_000_000,
        }
        option {
            deadline_epoch_ms: u64 = None,
            assigned_worker: WorkerId = None,
            started_at_epoch_ms: u64 = None,
            finished_at_epoch_ms: u64 = None,
            failure_reason: String = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
