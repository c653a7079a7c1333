// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framed request/response client with retry.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::frame::{read_message, write_message, ProtocolError};

/// Exponential backoff policy for transient transport errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry attempt (0-based): base · 2^attempt,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// One request/response exchange over a fresh connection.
pub async fn call<Req, Resp>(
    addr: &str,
    request: &Req,
    timeout: Duration,
) -> Result<Resp, ProtocolError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    write_message(&mut stream, request, timeout).await?;
    read_message(&mut stream, timeout).await
}

/// [`call`] with exponential backoff on transient errors.
///
/// Protocol errors (malformed frames, oversized messages) are not retried —
/// repeating them cannot help.
pub async fn call_with_retry<Req, Resp>(
    addr: &str,
    request: &Req,
    timeout: Duration,
    policy: RetryPolicy,
) -> Result<Resp, ProtocolError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let mut attempt = 0;
    loop {
        match call(addr, request, timeout).await {
            Ok(resp) => return Ok(resp),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                debug!(addr, attempt, ?delay, error = %e, "transient RPC error, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
