// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fast snapshot revert — the fuzzing throughput hot path.
//!
//! Fast mode drives the monitor through `stop` → `loadvm` → `cont` and then
//! probes the guest agent: a partial revert (monitor died between verbs)
//! leaves the probe unanswered and the caller falls back to the slow path
//! (full VM stop + relaunch). After a successful revert the guest's RAM,
//! CPU, device, and disk state match the named snapshot exactly.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::agent::AgentClient;
use crate::monitor::{MonitorClient, MonitorError};

/// Fast reverts are expected to land under this.
pub const FAST_REVERT_TARGET: Duration = Duration::from_millis(200);

/// Latency samples kept for percentile reporting.
const LATENCY_RING: usize = 256;
/// Rolling window of revert outcomes watched for slow-path pileups.
const SLOW_WINDOW: usize = 50;
/// More than this many slow fallbacks inside the window warrants a warning.
const SLOW_WARN_THRESHOLD: usize = 5;

#[derive(Debug, Error)]
pub enum RevertError {
    #[error("monitor: {0}")]
    Monitor(#[from] MonitorError),

    #[error("post-revert liveness probe failed: {0}")]
    LivenessProbe(crate::agent::AgentError),
}

/// Latency and outcome statistics for one runner's reverts.
#[derive(Debug, Default)]
struct RevertStats {
    latencies_ms: VecDeque<u64>,
    outcomes: VecDeque<bool>, // true = fast
    fast_total: u64,
    slow_total: u64,
    warned_window: bool,
}

/// Point-in-time view of the revert statistics.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RevertStatsSnapshot {
    pub fast_total: u64,
    pub slow_total: u64,
    /// Share of fast reverts over the lifetime of the runner
    pub fast_ratio: f64,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p99_ms: u64,
}

impl RevertStats {
    fn record(&mut self, latency: Duration, fast: bool) {
        if self.latencies_ms.len() == LATENCY_RING {
            self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(latency.as_millis() as u64);

        if self.outcomes.len() == SLOW_WINDOW {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(fast);

        if fast {
            self.fast_total += 1;
        } else {
            self.slow_total += 1;
        }

        let recent_slow = self.outcomes.iter().filter(|fast| !**fast).count();
        if recent_slow > SLOW_WARN_THRESHOLD {
            if !self.warned_window {
                self.warned_window = true;
                warn!(
                    recent_slow,
                    window = SLOW_WINDOW,
                    "slow-path reverts piling up; snapshot or monitor may be degraded"
                );
            }
        } else {
            self.warned_window = false;
        }
    }

    fn percentile(&self, p: f64) -> u64 {
        if self.latencies_ms.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = self.latencies_ms.iter().copied().collect();
        sorted.sort_unstable();
        let rank = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[rank.min(sorted.len() - 1)]
    }

    fn snapshot(&self) -> RevertStatsSnapshot {
        let total = self.fast_total + self.slow_total;
        RevertStatsSnapshot {
            fast_total: self.fast_total,
            slow_total: self.slow_total,
            fast_ratio: if total == 0 { 1.0 } else { self.fast_total as f64 / total as f64 },
            p50_ms: self.percentile(0.50),
            p90_ms: self.percentile(0.90),
            p99_ms: self.percentile(0.99),
        }
    }
}

/// Drives fast reverts for one VM and tracks their latency.
pub struct RevertEngine {
    monitor: MonitorClient,
    agent: AgentClient,
    snapshot_name: String,
    stats: RevertStats,
}

impl RevertEngine {
    pub fn new(monitor: MonitorClient, agent: AgentClient, snapshot_name: impl Into<String>) -> Self {
        Self { monitor, agent, snapshot_name: snapshot_name.into(), stats: RevertStats::default() }
    }

    /// Fast revert: `stop` → `loadvm` → `cont`, then a liveness probe to
    /// catch partial reverts. On error the caller must take the slow path
    /// and report it via [`RevertEngine::record_slow`].
    pub async fn fast_revert(&mut self) -> Result<Duration, RevertError> {
        let started = Instant::now();

        let mut session = self.monitor.connect().await?;
        session.stop().await?;
        session.loadvm(&self.snapshot_name).await?;
        session.cont().await?;

        // A monitor that half-applied the revert answers nothing here
        self.agent.probe().await.map_err(RevertError::LivenessProbe)?;

        let elapsed = started.elapsed();
        if elapsed > FAST_REVERT_TARGET {
            debug!(?elapsed, "fast revert exceeded target");
        }
        self.stats.record(elapsed, true);
        Ok(elapsed)
    }

    /// Record a completed slow-path revert (full VM stop + relaunch).
    pub fn record_slow(&mut self, latency: Duration) {
        self.stats.record(latency, false);
    }

    pub fn stats(&self) -> RevertStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
#[path = "revert_tests.rs"]
mod tests;
