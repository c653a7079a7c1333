// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration with the controller.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use fawkes_core::WorkerId;
use fawkes_wire::{call, ProtocolError, Request, Response};

use crate::config::WorkerConfig;

const RPC_TIMEOUT: Duration = Duration::from_secs(5);
/// Backoff between registration attempts while the controller is away.
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("controller rejected registration: {0}")]
    Rejected(String),

    #[error("transport: {0}")]
    Transport(#[from] ProtocolError),
}

/// Outcome of a successful Hello.
#[derive(Debug, Clone)]
pub struct Registration {
    pub worker_id: WorkerId,
    pub heartbeat_interval: Duration,
}

fn hello_request(config: &WorkerConfig, worker_id: Option<WorkerId>) -> Request {
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    Request::Hello {
        worker_id,
        address: config.listen_addr.clone(),
        hostname,
        capabilities: config.capabilities(),
        tags: config.tags.clone(),
    }
}

/// One registration attempt.
pub async fn register_once(
    config: &WorkerConfig,
    worker_id: Option<WorkerId>,
) -> Result<Registration, RegistrationError> {
    let response: Response =
        call(&config.controller_addr, &hello_request(config, worker_id), RPC_TIMEOUT).await?;
    match response {
        Response::Hello { worker_id, heartbeat_interval_ms } => Ok(Registration {
            worker_id,
            heartbeat_interval: Duration::from_millis(heartbeat_interval_ms),
        }),
        Response::Error { kind, message } => {
            Err(RegistrationError::Rejected(format!("{kind}: {message}")))
        }
        other => Err(RegistrationError::Rejected(format!("unexpected response: {other:?}"))),
    }
}

/// Register, retrying until the controller answers. Registration is
/// idempotent on our address, so blind retries are safe.
pub async fn register_with_retry(config: &WorkerConfig) -> Registration {
    loop {
        match register_once(config, None).await {
            Ok(registration) => {
                info!(
                    worker = %registration.worker_id,
                    controller = %config.controller_addr,
                    "registered"
                );
                return registration;
            }
            Err(e) => {
                warn!(error = %e, "registration failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}
