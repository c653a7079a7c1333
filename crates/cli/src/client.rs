// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller client for CLI commands.

use std::time::Duration;

use thiserror::Error;

use fawkes_wire::{call, ErrorKind, ProtocolError, Request, Response};

const RPC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot reach controller at {addr}: {source}")]
    Connect { addr: String, source: ProtocolError },

    #[error("{kind}: {message}")]
    Server { kind: ErrorKind, message: String },
}

impl ClientError {
    /// Whether this error means "the entity does not exist" (exit code 1
    /// with a clean message rather than a transport diagnostic).
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Server { kind: ErrorKind::UnknownEntity, .. })
    }
}

pub struct Client {
    addr: String,
}

impl Client {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// One request/response exchange; server-side errors become
    /// [`ClientError::Server`].
    pub async fn request(&self, request: &Request) -> Result<Response, ClientError> {
        let response: Response = call(&self.addr, request, RPC_TIMEOUT)
            .await
            .map_err(|source| ClientError::Connect { addr: self.addr.clone(), source })?;
        match response {
            Response::Error { kind, message } => Err(ClientError::Server { kind, message }),
            other => Ok(other),
        }
    }
}
