// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storage layer for the Fawkes scheduler.
//!
//! The durable form is an append-only event WAL plus periodic snapshots;
//! the queryable form is [`MaterializedState`], rebuilt by replay.

mod checkpoint;
mod snapshot;
mod state;
mod wal;

pub use checkpoint::{load_or_default, Checkpointer, CheckpointError};
pub use snapshot::{rotate_bak_path, Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::{MaterializedState, WorkerRuntime};
pub use wal::{Wal, WalEntry, WalError};
