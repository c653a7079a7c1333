// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP implementation of the scheduler's dispatch trait.

use std::time::Duration;

use async_trait::async_trait;

use fawkes_core::{JobId, JobRecord, WorkerRecord};
use fawkes_scheduler::{AcceptOutcome, DispatchError, JobDispatcher};
use fawkes_wire::{call, DispatchRequest, DispatchResponse, JobDescriptor, ProtocolError};

/// Dispatches over the worker's dispatch endpoint with a per-call deadline.
pub struct TcpDispatcher {
    timeout: Duration,
}

impl TcpDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn transport_error(e: ProtocolError) -> DispatchError {
    match e {
        ProtocolError::Timeout => DispatchError::Timeout,
        other => DispatchError::Transport(other.to_string()),
    }
}

#[async_trait]
impl JobDispatcher for TcpDispatcher {
    async fn accept_job(
        &self,
        worker: &WorkerRecord,
        job: &JobRecord,
    ) -> Result<AcceptOutcome, DispatchError> {
        let request = DispatchRequest::AcceptJob { job: JobDescriptor::from(job) };
        let response: DispatchResponse =
            call(&worker.address, &request, self.timeout).await.map_err(transport_error)?;
        match response {
            DispatchResponse::Accepted { accepted: true, .. } => Ok(AcceptOutcome::Accepted),
            DispatchResponse::Accepted { accepted: false, reason } => {
                Ok(AcceptOutcome::Refused(reason.unwrap_or_else(|| "refused".to_string())))
            }
            other => Err(DispatchError::Transport(format!("unexpected response: {other:?}"))),
        }
    }

    async fn cancel_job(
        &self,
        worker: &WorkerRecord,
        job_id: JobId,
    ) -> Result<(), DispatchError> {
        let request = DispatchRequest::CancelJob { job_id };
        let response: DispatchResponse =
            call(&worker.address, &request, self.timeout).await.map_err(transport_error)?;
        match response {
            DispatchResponse::Cancelled { .. } => Ok(()),
            other => Err(DispatchError::Transport(format!("unexpected response: {other:?}"))),
        }
    }
}
