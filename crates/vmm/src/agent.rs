// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Guest agent client.
//!
//! The agent listens on one TCP port inside the guest, ignores the request
//! body, and answers every connection with a single HTTP/1.1 response whose
//! JSON body is either `{"crash": false}` or the full crash record. The
//! agent keeps returning the same record until the VM is reverted.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use fawkes_core::CrashObservation;

/// Interval between polls while waiting for a verdict.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Liveness probes just need any answer.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent timed out")]
    Timeout,

    #[error("agent returned malformed response: {0}")]
    Malformed(String),

    #[error("agent IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What one poll of the agent said.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReport {
    /// Target still running (or idle again) with no crash observed
    NoCrash,
    /// Crash captured by the in-guest detector
    Crash(CrashObservation),
}

/// On-the-wire shape of the agent's JSON body.
#[derive(Debug, Deserialize)]
struct RawAgentResponse {
    crash: bool,
    #[serde(default)]
    pid: Option<u32>,
    #[serde(default)]
    exe: Option<String>,
    /// Hex string like "0xC0000005"
    #[serde(default)]
    exception: Option<String>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    stack: Option<Vec<String>>,
    #[serde(default)]
    registers: Option<std::collections::HashMap<String, u64>>,
    #[serde(default)]
    fault_address: Option<u64>,
}

/// Client for one guest's agent endpoint.
#[derive(Debug, Clone)]
pub struct AgentClient {
    addr: String,
}

impl AgentClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// One poll: connect, send a minimal GET, parse the JSON body.
    pub async fn poll(&self, timeout: Duration) -> Result<AgentReport, AgentError> {
        tokio::time::timeout(timeout, self.poll_inner())
            .await
            .map_err(|_| AgentError::Timeout)?
    }

    /// Liveness probe after a revert: any well-formed answer counts.
    pub async fn probe(&self) -> Result<(), AgentError> {
        self.poll(PROBE_TIMEOUT).await.map(|_| ())
    }

    /// Poll until the agent reports a crash or `timeout` elapses.
    ///
    /// Returns `Ok(None)` on a clean timeout (the testcase ran without
    /// crashing as far as the agent saw).
    pub async fn wait_for_crash(
        &self,
        timeout: Duration,
    ) -> Result<Option<CrashObservation>, AgentError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.poll(remaining.min(PROBE_TIMEOUT)).await {
                Ok(AgentReport::Crash(observation)) => return Ok(Some(observation)),
                Ok(AgentReport::NoCrash) => {}
                // The guest may be mid-boot or mid-revert; keep trying
                // until the overall deadline
                Err(AgentError::Timeout) | Err(AgentError::Io(_)) => {}
                Err(e) => return Err(e),
            }
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }

    async fn poll_inner(&self) -> Result<AgentReport, AgentError> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: agent\r\nConnection: close\r\n\r\n")
            .await?;

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;

        let text = String::from_utf8_lossy(&response);
        let body = text
            .split_once("\r\n\r\n")
            .map(|(_, body)| body)
            .ok_or_else(|| AgentError::Malformed("missing header/body separator".into()))?;

        let raw: RawAgentResponse = serde_json::from_str(body.trim())
            .map_err(|e| AgentError::Malformed(e.to_string()))?;
        if !raw.crash {
            return Ok(AgentReport::NoCrash);
        }

        let exception_code = raw
            .exception
            .as_deref()
            .map(parse_hex)
            .transpose()?
            .unwrap_or(fawkes_core::SEGFAULT_PLACEHOLDER);

        Ok(AgentReport::Crash(CrashObservation {
            pid: raw.pid.unwrap_or(0),
            exe: raw.exe.unwrap_or_default(),
            exception_code,
            stack_frames: raw.stack.unwrap_or_default(),
            registers: raw.registers.unwrap_or_default(),
            fault_address: raw.fault_address,
            artifact_path: raw.file,
        }))
    }
}

fn parse_hex(s: &str) -> Result<u64, AgentError> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|_| AgentError::Malformed(format!("bad exception code: {s}")))
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
