// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only write-ahead log of scheduler events.
//!
//! One JSON entry per line, each carrying a monotone sequence number.
//! A corrupt tail (partial write, binary garbage) is rotated to a `.bak`
//! file at open; the valid prefix is preserved. Valid entries stay resident
//! in memory until a checkpoint truncates them, so reads never touch disk.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fawkes_core::Event;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::snapshot::rotate_bak_path;

/// Buffered appends are flushed once this many entries accumulate.
const FLUSH_THRESHOLD: usize = 100;
/// ... or once this much time has passed since the last flush.
const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Errors from WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single WAL entry: sequence number plus the event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

/// The write-ahead log.
pub struct Wal {
    path: PathBuf,
    /// Valid entries not yet truncated by a checkpoint.
    entries: Vec<WalEntry>,
    /// Serialized lines appended since the last flush.
    unflushed: Vec<String>,
    /// Highest sequence number ever written.
    write_seq: u64,
    /// Highest sequence number the engine has finished processing.
    processed_seq: u64,
    /// Read cursor for [`Wal::next_unprocessed`].
    read_seq: u64,
    last_flush: Instant,
}

impl Wal {
    /// Open (or create) a WAL file, recovering from a corrupt tail.
    ///
    /// `processed_seq` is the sequence number of the last entry already
    /// reflected in a snapshot; replay starts after it.
    pub fn open(path: &Path, processed_seq: u64) -> Result<Self, WalError> {
        let (entries, corrupt) = match File::open(path) {
            Ok(file) => read_entries(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Vec::new(), false),
            Err(e) => return Err(e.into()),
        };

        if corrupt {
            let bak = rotate_bak_path(path);
            warn!(path = %path.display(), bak = %bak.display(), "corrupt WAL tail, rotating");
            std::fs::copy(path, &bak)?;
            rewrite(path, &entries)?;
        } else if !path.exists() {
            File::create(path)?;
        }

        let write_seq = entries.last().map(|e| e.seq).unwrap_or(0);
        Ok(Self {
            path: path.to_path_buf(),
            entries,
            unflushed: Vec::new(),
            write_seq,
            processed_seq,
            read_seq: processed_seq,
            last_flush: Instant::now(),
        })
    }

    /// Append an event, assigning the next sequence number.
    ///
    /// The entry is immediately visible to readers; bytes reach disk on the
    /// next [`Wal::flush`] (or automatically past the flush thresholds).
    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        self.write_seq += 1;
        let entry = WalEntry { seq: self.write_seq, event: event.clone() };
        self.unflushed.push(serde_json::to_string(&entry)?);
        self.entries.push(entry);
        if self.needs_flush() {
            self.flush()?;
        }
        Ok(self.write_seq)
    }

    /// Whether buffered appends are due for a flush.
    pub fn needs_flush(&self) -> bool {
        !self.unflushed.is_empty()
            && (self.unflushed.len() >= FLUSH_THRESHOLD
                || self.last_flush.elapsed() >= FLUSH_INTERVAL)
    }

    /// Write buffered appends to disk and sync.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if !self.unflushed.is_empty() {
            let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            for line in &self.unflushed {
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
            }
            file.sync_data()?;
            self.unflushed.clear();
        }
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Next entry past the read cursor, or `None` when caught up.
    ///
    /// Does not mark the entry processed; call [`Wal::mark_processed`] once
    /// the engine has applied it.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry>, WalError> {
        let next = self.entries.iter().find(|e| e.seq > self.read_seq).cloned();
        if let Some(entry) = &next {
            self.read_seq = entry.seq;
        }
        Ok(next)
    }

    /// Record that every entry up to `seq` has been applied.
    pub fn mark_processed(&mut self, seq: u64) {
        self.processed_seq = self.processed_seq.max(seq);
    }

    /// All entries with a sequence number greater than `seq`.
    pub fn entries_after(&self, seq: u64) -> Result<Vec<WalEntry>, WalError> {
        Ok(self.entries.iter().filter(|e| e.seq > seq).cloned().collect())
    }

    /// Drop entries before `seq` (exclusive) and rewrite the file.
    ///
    /// Called by the checkpointer after a snapshot covers them.
    pub fn truncate_before(&mut self, seq: u64) -> Result<(), WalError> {
        self.flush()?;
        self.entries.retain(|e| e.seq >= seq);
        rewrite(&self.path, &self.entries)?;
        Ok(())
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "failed to flush WAL on drop");
        }
    }
}

/// Read entries from the start of a file, stopping at the first corrupt or
/// non-UTF-8 line. Returns the valid prefix and whether corruption was seen.
fn read_entries(file: File) -> (Vec<WalEntry>, bool) {
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for line in reader.split(b'\n') {
        let Ok(bytes) = line else {
            return (entries, true);
        };
        if bytes.is_empty() {
            continue;
        }
        let Ok(text) = std::str::from_utf8(&bytes) else {
            return (entries, true);
        };
        match serde_json::from_str::<WalEntry>(text) {
            Ok(entry) => entries.push(entry),
            Err(_) => return (entries, true),
        }
    }
    (entries, false)
}

/// Replace the file's contents with exactly the given entries.
fn rewrite(path: &Path, entries: &[WalEntry]) -> Result<(), WalError> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        for entry in entries {
            let line = serde_json::to_string(entry)?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
        }
        file.sync_data()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
