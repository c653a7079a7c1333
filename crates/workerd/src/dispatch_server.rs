// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker's dispatch endpoint.
//!
//! The controller connects here to hand over jobs and cancellations. One
//! job runs at a time; a second dispatch is refused, not queued — the
//! scheduler re-queues refused jobs itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use fawkes_wire::{read_message, write_message, DispatchRequest, DispatchResponse, ProtocolError};

use crate::config::WorkerConfig;
use crate::executor;
use crate::state::WorkerState;

const IPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept loop for the dispatch endpoint; runs until cancelled.
pub async fn run_dispatch_server(
    listener: TcpListener,
    config: Arc<WorkerConfig>,
    state: WorkerState,
    cancel: CancellationToken,
) {
    info!(addr = ?listener.local_addr().ok(), "dispatch endpoint listening");
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, _)) => {
                    let config = Arc::clone(&config);
                    let state = state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, config, state).await {
                            debug!(error = %e, "dispatch connection error");
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept failed"),
            },
            _ = cancel.cancelled() => return,
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    config: Arc<WorkerConfig>,
    state: WorkerState,
) -> Result<(), ProtocolError> {
    let request: DispatchRequest = read_message(&mut stream, IPC_TIMEOUT).await?;
    let response = handle_request(request, &config, &state);
    write_message(&mut stream, &response, IPC_TIMEOUT).await
}

fn handle_request(
    request: DispatchRequest,
    config: &Arc<WorkerConfig>,
    state: &WorkerState,
) -> DispatchResponse {
    match request {
        DispatchRequest::Ping => DispatchResponse::Pong,

        DispatchRequest::AcceptJob { job } => {
            match executor::launch(job, Arc::clone(config), state.clone()) {
                Ok(job_id) => {
                    info!(job = %job_id, "job accepted");
                    DispatchResponse::Accepted { accepted: true, reason: None }
                }
                Err(executor::LaunchError::Busy(current)) => DispatchResponse::Accepted {
                    accepted: false,
                    reason: Some(format!("already running job {current}")),
                },
                Err(e) => DispatchResponse::Accepted {
                    accepted: false,
                    reason: Some(e.to_string()),
                },
            }
        }

        DispatchRequest::CancelJob { job_id } => {
            info!(job = %job_id, "cancel requested");
            state.cancel(job_id);
            // Idempotent: cancelling an unknown/finished job still succeeds
            DispatchResponse::Cancelled { accepted: true }
        }
    }
}

#[cfg(test)]
#[path = "dispatch_server_tests.rs"]
mod tests;
