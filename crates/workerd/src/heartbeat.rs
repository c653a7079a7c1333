// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat emitter.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use fawkes_wire::{call, Request, Response};

use crate::config::WorkerConfig;
use crate::state::WorkerState;

const RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Emit heartbeats at the controller-provided interval until cancelled.
///
/// A failed heartbeat is logged and retried next tick — the controller's
/// health monitor decides when we are truly gone.
pub async fn run_heartbeat(
    config: WorkerConfig,
    state: WorkerState,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => beat(&config, &state).await,
            _ = cancel.cancelled() => return,
        }
    }
}

async fn beat(config: &WorkerConfig, state: &WorkerState) {
    let Some(worker_id) = state.worker_id() else {
        return;
    };
    let request = Request::Heartbeat {
        worker_id,
        load: state.load(),
        progress: state.progress(),
    };
    match call::<_, Response>(&config.controller_addr, &request, RPC_TIMEOUT).await {
        Ok(Response::HeartbeatAck { assignments_pending }) => {
            if assignments_pending {
                debug!("controller has a dispatch in flight for us");
            }
        }
        Ok(Response::Error { kind, message }) => {
            // An unknown worker_id means the controller lost its durable
            // state; re-registration will mint a fresh identity
            warn!(%kind, message, "heartbeat rejected");
        }
        Ok(other) => warn!(?other, "unexpected heartbeat response"),
        Err(e) => warn!(error = %e, "heartbeat failed"),
    }
}
