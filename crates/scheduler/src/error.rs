// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler error taxonomy.
//!
//! Four recoverable kinds plus a storage wrap; callers match on the kind,
//! the RPC layer maps them onto wire error kinds 1:1. No operation that
//! returns one of these has partially applied.

use fawkes_core::{JobId, JobStatus};
use fawkes_storage::WalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("illegal transition for job {id}: {from} → {to}")]
    IllegalTransition { id: JobId, from: JobStatus, to: JobStatus },

    #[error("resources unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("dependency unsatisfied: job {job} waits on {dep}")]
    DependencyUnsatisfied { job: JobId, dep: JobId },

    #[error("storage error: {0}")]
    Storage(#[from] WalError),

    /// Corrupted or incompatible durable state. Not recoverable by the
    /// caller; the process must be restarted by an operator.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl SchedulerError {
    pub fn unknown_job(id: JobId) -> Self {
        SchedulerError::UnknownEntity(format!("job {id}"))
    }

    pub fn unknown_worker(id: &fawkes_core::WorkerId) -> Self {
        SchedulerError::UnknownEntity(format!("worker {id}"))
    }
}
