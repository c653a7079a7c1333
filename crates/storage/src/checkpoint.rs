// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpointing: periodic snapshots plus WAL truncation.
//!
//! Recovery is `load_or_default` (snapshot, if any) followed by replaying
//! WAL entries after the snapshot's sequence number.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::snapshot::{Snapshot, SnapshotError};
use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};

/// Snapshot after this many events have been applied since the last one.
const DEFAULT_SNAPSHOT_EVERY: u64 = 500;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
}

/// Load the snapshot if one exists, otherwise start empty.
///
/// Returns the state and the WAL sequence number replay should start after.
pub fn load_or_default(snapshot_path: &Path) -> Result<(MaterializedState, u64), SnapshotError> {
    if snapshot_path.exists() {
        let snapshot = Snapshot::load(snapshot_path)?;
        info!(seq = snapshot.seq, "loaded snapshot");
        Ok((snapshot.state, snapshot.seq))
    } else {
        Ok((MaterializedState::default(), 0))
    }
}

/// Writes snapshots every N applied events and truncates the WAL behind them.
pub struct Checkpointer {
    snapshot_path: PathBuf,
    snapshot_every: u64,
    last_snapshot_seq: u64,
}

impl Checkpointer {
    pub fn new(snapshot_path: PathBuf, start_seq: u64) -> Self {
        Self {
            snapshot_path,
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
            last_snapshot_seq: start_seq,
        }
    }

    #[cfg(test)]
    pub fn with_snapshot_every(mut self, every: u64) -> Self {
        self.snapshot_every = every;
        self
    }

    /// Snapshot if enough events have accumulated since the last one.
    ///
    /// Returns true when a snapshot was written.
    pub fn maybe_checkpoint(
        &mut self,
        state: &MaterializedState,
        wal: &mut Wal,
    ) -> Result<bool, CheckpointError> {
        let seq = wal.processed_seq();
        if seq.saturating_sub(self.last_snapshot_seq) < self.snapshot_every {
            return Ok(false);
        }
        self.checkpoint(state, wal)?;
        Ok(true)
    }

    /// Unconditionally snapshot the current state and truncate the WAL.
    pub fn checkpoint(
        &mut self,
        state: &MaterializedState,
        wal: &mut Wal,
    ) -> Result<(), CheckpointError> {
        let seq = wal.processed_seq();
        Snapshot::new(seq, state.clone()).save(&self.snapshot_path)?;
        wal.truncate_before(seq + 1)?;
        self.last_snapshot_seq = seq;
        debug!(seq, "checkpoint written");
        Ok(())
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
