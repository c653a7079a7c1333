// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Allocation strategies.
//!
//! Strategies are variants, not trait objects: adding one means adding a
//! variant and a match arm. All strategies pick from the candidate list the
//! store already filtered for eligibility (tags + resources).

use fawkes_core::{JobRecord, WorkerId, WorkerLoad, WorkerRecord};

/// An eligible worker with its reported load.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub worker: WorkerRecord,
    pub load: WorkerLoad,
}

impl Candidate {
    /// Composite load score: weighted VM, CPU, and RAM utilization.
    /// Lower is better.
    fn load_score(&self) -> f64 {
        let vm_util = self.load.vm_util(self.worker.capabilities.max_vms);
        let cpu_util = f64::from(self.load.cpu_percent) / 100.0;
        let ram_util = f64::from(self.load.ram_percent) / 100.0;
        0.6 * vm_util + 0.3 * cpu_util + 0.1 * ram_util
    }
}

/// How the allocator picks a worker from the candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationStrategy {
    /// Least-loaded worker by the composite score (default)
    LoadAware,
    /// Rotating cursor over the candidate list
    RoundRobin { cursor: usize },
    /// First eligible worker in registration order
    FirstFit,
}

impl Default for AllocationStrategy {
    fn default() -> Self {
        AllocationStrategy::LoadAware
    }
}

impl AllocationStrategy {
    /// Parse a config string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "load_aware" => Some(AllocationStrategy::LoadAware),
            "round_robin" => Some(AllocationStrategy::RoundRobin { cursor: 0 }),
            "first_fit" => Some(AllocationStrategy::FirstFit),
            _ => None,
        }
    }

    /// Pick a worker for `job`. Candidates arrive in registration order;
    /// ties break toward the lower worker_id.
    pub fn select(&mut self, candidates: &[Candidate], _job: &JobRecord) -> Option<WorkerId> {
        if candidates.is_empty() {
            return None;
        }
        match self {
            AllocationStrategy::LoadAware => candidates
                .iter()
                .min_by(|a, b| {
                    a.load_score()
                        .partial_cmp(&b.load_score())
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.worker.id.as_str().cmp(b.worker.id.as_str()))
                })
                .map(|c| c.worker.id),

            AllocationStrategy::RoundRobin { cursor } => {
                let picked = candidates[*cursor % candidates.len()].worker.id;
                *cursor = cursor.wrapping_add(1);
                Some(picked)
            }

            AllocationStrategy::FirstFit => candidates.first().map(|c| c.worker.id),
        }
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod tests;
