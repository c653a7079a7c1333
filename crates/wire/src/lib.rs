// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC protocol between controller, workers, and the CLI.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod dispatch;
mod frame;
mod request;
mod response;

pub use client::{call, call_with_retry, RetryPolicy};
pub use dispatch::{DispatchRequest, DispatchResponse, JobDescriptor};
pub use frame::{decode, encode, read_message, write_message, ProtocolError, MAX_FRAME_LEN};
pub use request::Request;
pub use response::{ErrorKind, JobSummary, Response, WorkerSummary};
