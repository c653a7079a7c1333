// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for the controller endpoint.
//!
//! Accepts connections and handles them in spawned tasks without blocking
//! the control loops. One request/response exchange per connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use fawkes_wire::{read_message, write_message, ProtocolError, Request};

use crate::artifacts::ArtifactStore;
use crate::handlers::{self, Store};
use fawkes_scheduler::JobDispatcher;

/// Per-exchange IO deadline.
const IPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub store: Store,
    pub artifacts: ArtifactStore,
    pub dispatcher: Arc<dyn JobDispatcher>,
    pub shutdown: Arc<Notify>,
    pub heartbeat_interval_ms: u64,
}

/// Accept loop; runs until cancelled.
pub async fn run_listener(listener: TcpListener, ctx: Arc<ListenCtx>, cancel: CancellationToken) {
    info!(addr = ?listener.local_addr().ok(), "controller endpoint listening");
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    debug!(%addr, "connection");
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept failed"),
            },
            _ = cancel.cancelled() => return,
        }
    }
}

fn log_connection_error(e: ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!("client disconnected"),
        ProtocolError::Timeout => debug!("connection timed out"),
        other => error!(error = %other, "connection error"),
    }
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    ctx: &ListenCtx,
) -> Result<(), ProtocolError> {
    let request: Request = read_message(&mut stream, IPC_TIMEOUT).await?;

    // Heartbeats are frequent; keep them at debug
    if matches!(request, Request::Heartbeat { .. }) {
        debug!(request = ?request, "received");
    } else {
        info!(request = ?request, "received");
    }

    let response = handlers::handle_request(request, ctx).await;
    write_message(&mut stream, &response, IPC_TIMEOUT).await
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
