// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Testcase production.
//!
//! One producer task pulls from a [`TestcaseSource`] and feeds a bounded
//! channel shared by all runners: single producer, multiple consumers,
//! with backpressure pausing generation rather than buffering unboundedly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One testcase: opaque bytes plus a content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Testcase {
    pub bytes: Vec<u8>,
    pub fingerprint: String,
}

impl Testcase {
    pub fn new(bytes: Vec<u8>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hasher.finalize();
        let fingerprint = digest.iter().fold(String::with_capacity(64), |mut out, b| {
            use std::fmt::Write;
            let _ = write!(out, "{b:02x}");
            out
        });
        Self { bytes, fingerprint }
    }
}

/// A pull-based stream of testcase bytes. `None` means drained.
///
/// Implementations may block (file IO); the producer task runs them on the
/// blocking pool.
pub trait TestcaseSource: Send {
    fn next(&mut self) -> Option<Vec<u8>>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("corpus directory {0} has no seed files")]
    EmptyCorpus(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Endless source over a job's input directory: first a pass of the raw
/// seeds, then mutated variants (deterministic xorshift byte flips keyed
/// by iteration, so a run is reproducible).
pub struct CorpusSource {
    seeds: Vec<PathBuf>,
    iteration: u64,
}

impl CorpusSource {
    pub fn open(dir: &Path) -> Result<Self, SourceError> {
        let mut seeds: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();
        seeds.sort();
        if seeds.is_empty() {
            return Err(SourceError::EmptyCorpus(dir.to_path_buf()));
        }
        info!(dir = %dir.display(), seeds = seeds.len(), "corpus opened");
        Ok(Self { seeds, iteration: 0 })
    }
}

impl TestcaseSource for CorpusSource {
    fn next(&mut self) -> Option<Vec<u8>> {
        let seed_path = &self.seeds[(self.iteration as usize) % self.seeds.len()];
        let mut bytes = match std::fs::read(seed_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %seed_path.display(), error = %e, "seed unreadable, skipping");
                self.iteration += 1;
                return self.next_or_give_up();
            }
        };

        // Raw seeds on the first pass, mutations after
        let pass = self.iteration / self.seeds.len() as u64;
        if pass > 0 && !bytes.is_empty() {
            mutate(&mut bytes, self.iteration);
        }
        self.iteration += 1;
        Some(bytes)
    }
}

impl CorpusSource {
    /// After a read failure, advance until a readable seed or a full loop.
    fn next_or_give_up(&mut self) -> Option<Vec<u8>> {
        for _ in 0..self.seeds.len() {
            let seed_path = &self.seeds[(self.iteration as usize) % self.seeds.len()];
            if let Ok(bytes) = std::fs::read(seed_path) {
                self.iteration += 1;
                return Some(bytes);
            }
            self.iteration += 1;
        }
        None
    }
}

/// Nudge one byte at a position drawn from a xorshift stream. The delta is
/// never zero, so a mutated pass always differs from the raw seed.
fn mutate(bytes: &mut [u8], iteration: u64) {
    let mut state = iteration.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    state ^= state << 13;
    state ^= state >> 7;
    state ^= state << 17;
    let pos = (state as usize) % bytes.len();
    let delta = 1 + ((state >> 8) % 255) as u8;
    bytes[pos] = bytes[pos].wrapping_add(delta);
}

/// Receiver end shared by all runners of one harness.
pub type SharedTestcases = Arc<tokio::sync::Mutex<mpsc::Receiver<Testcase>>>;

/// Spawn the producer task. The channel bound is the backpressure limit:
/// when runners fall behind, production pauses.
pub fn spawn_producer(
    mut source: Box<dyn TestcaseSource>,
    capacity: usize,
    cancel: CancellationToken,
) -> (SharedTestcases, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<Testcase>(capacity);
    let handle = tokio::task::spawn_blocking(move || {
        while !cancel.is_cancelled() {
            let Some(bytes) = source.next() else {
                debug!("testcase source drained");
                break;
            };
            if tx.blocking_send(Testcase::new(bytes)).is_err() {
                // All runners gone
                break;
            }
        }
    });
    (Arc::new(tokio::sync::Mutex::new(rx)), handle)
}

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;
