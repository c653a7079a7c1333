// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VM monitor client.
//!
//! The monitor endpoint is a text-command socket: one verb per line, one
//! reply block per command. A reply block ends with a line that is either
//! `OK` or starts with `error:` — anything before it is informational
//! output the client ignores.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

/// Monitor connect deadline.
pub const MONITOR_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// `loadvm` restores guest RAM and device state; it gets a longer deadline.
const LOADVM_TIMEOUT: Duration = Duration::from_secs(10);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor timed out")]
    Timeout,

    #[error("monitor connection closed")]
    ConnectionClosed,

    #[error("monitor command {command:?} failed: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("monitor IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for one VM's monitor endpoint.
#[derive(Debug, Clone)]
pub struct MonitorClient {
    addr: String,
}

impl MonitorClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Connect within [`MONITOR_CONNECT_TIMEOUT`].
    pub async fn connect(&self) -> Result<MonitorConnection, MonitorError> {
        let stream = tokio::time::timeout(MONITOR_CONNECT_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| MonitorError::Timeout)??;
        let (read, write) = stream.into_split();
        Ok(MonitorConnection { reader: BufReader::new(read), writer: write })
    }
}

/// An open monitor session.
pub struct MonitorConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl MonitorConnection {
    /// Pause guest execution.
    pub async fn stop(&mut self) -> Result<(), MonitorError> {
        self.command("stop", COMMAND_TIMEOUT).await
    }

    /// Restore the named snapshot.
    pub async fn loadvm(&mut self, snapshot: &str) -> Result<(), MonitorError> {
        self.command(&format!("loadvm {snapshot}"), LOADVM_TIMEOUT).await
    }

    /// Resume guest execution.
    pub async fn cont(&mut self) -> Result<(), MonitorError> {
        self.command("cont", COMMAND_TIMEOUT).await
    }

    /// Send one verb and read the reply block, failing on an error token.
    async fn command(&mut self, command: &str, timeout: Duration) -> Result<(), MonitorError> {
        tokio::time::timeout(timeout, self.command_inner(command))
            .await
            .map_err(|_| MonitorError::Timeout)?
    }

    async fn command_inner(&mut self, command: &str) -> Result<(), MonitorError> {
        trace!(command, "monitor command");
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(MonitorError::ConnectionClosed);
            }
            let trimmed = line.trim();
            if trimmed == "OK" {
                return Ok(());
            }
            if let Some(detail) = trimmed.strip_prefix("error:") {
                return Err(MonitorError::CommandFailed {
                    command: command.to_string(),
                    detail: detail.trim().to_string(),
                });
            }
            // Informational output; keep reading
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
