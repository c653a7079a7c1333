// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared execution counters, sampled by the worker's heartbeat emitter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use fawkes_core::{JobId, JobProgress};

/// Executions inside this window feed the exec/sec figure.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Lock-free counters incremented by runners, plus a small sample ring for
/// the rolling rate.
pub struct ProgressCounters {
    job_id: JobId,
    executions: AtomicU64,
    crashes: AtomicU64,
    samples: Mutex<VecDeque<(Instant, u64)>>,
}

impl ProgressCounters {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            executions: AtomicU64::new(0),
            crashes: AtomicU64::new(0),
            samples: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record_execution(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crash(&self) {
        self.crashes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn crashes(&self) -> u64 {
        self.crashes.load(Ordering::Relaxed)
    }

    /// Take a sample and compute progress with the rolling exec/sec rate.
    pub fn snapshot(&self) -> JobProgress {
        let now = Instant::now();
        let executions = self.executions();

        let mut samples = self.samples.lock();
        samples.push_back((now, executions));
        while let Some((t, _)) = samples.front() {
            if now.duration_since(*t) > RATE_WINDOW {
                samples.pop_front();
            } else {
                break;
            }
        }

        let exec_per_sec = match (samples.front(), samples.back()) {
            (Some((t0, e0)), Some((t1, e1))) if t1 > t0 => {
                let span = t1.duration_since(*t0).as_secs_f64();
                (e1 - e0) as f64 / span
            }
            _ => 0.0,
        };

        JobProgress { job_id: self.job_id, executions, exec_per_sec, crashes: self.crashes() }
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
