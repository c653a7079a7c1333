// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch abstraction between the scheduler loops and the RPC layer.
//!
//! The loops only know this trait; the controller daemon provides the TCP
//! implementation and tests provide [`FakeDispatcher`].

use async_trait::async_trait;
use fawkes_core::{JobId, JobRecord, WorkerRecord};
use thiserror::Error;

/// Worker's answer to a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
    /// The worker declined (busy, draining, wrong shape)
    Refused(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Sends jobs and cancellations to workers.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Offer a job to a worker. Bounded by the per-call dispatch deadline.
    async fn accept_job(
        &self,
        worker: &WorkerRecord,
        job: &JobRecord,
    ) -> Result<AcceptOutcome, DispatchError>;

    /// Tell a worker to stop a job. Idempotent; the worker drains
    /// asynchronously.
    async fn cancel_job(&self, worker: &WorkerRecord, job_id: JobId)
        -> Result<(), DispatchError>;
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeDispatcher;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Scripted dispatcher for loop tests.
    ///
    /// By default accepts everything and records the calls. Push outcomes
    /// onto `script` to fail or refuse specific dispatches (consumed FIFO).
    #[derive(Default)]
    pub struct FakeDispatcher {
        pub dispatched: Mutex<Vec<(fawkes_core::WorkerId, JobId)>>,
        pub cancelled: Mutex<Vec<(fawkes_core::WorkerId, JobId)>>,
        pub script: Mutex<VecDeque<Result<AcceptOutcome, DispatchError>>>,
    }

    impl FakeDispatcher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue an outcome for the next dispatch call.
        pub fn push_outcome(&self, outcome: Result<AcceptOutcome, DispatchError>) {
            self.script.lock().push_back(outcome);
        }

        pub fn dispatched_jobs(&self) -> Vec<(fawkes_core::WorkerId, JobId)> {
            self.dispatched.lock().clone()
        }

        pub fn cancelled_jobs(&self) -> Vec<(fawkes_core::WorkerId, JobId)> {
            self.cancelled.lock().clone()
        }
    }

    #[async_trait]
    impl JobDispatcher for FakeDispatcher {
        async fn accept_job(
            &self,
            worker: &WorkerRecord,
            job: &JobRecord,
        ) -> Result<AcceptOutcome, DispatchError> {
            self.dispatched.lock().push((worker.id, job.id));
            self.script.lock().pop_front().unwrap_or(Ok(AcceptOutcome::Accepted))
        }

        async fn cancel_job(
            &self,
            worker: &WorkerRecord,
            job_id: JobId,
        ) -> Result<(), DispatchError> {
            self.cancelled.lock().push((worker.id, job_id));
            Ok(())
        }
    }
}
