// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fawkes_core::{Capabilities, JobRecord, WorkerRecord};
use std::collections::BTreeSet;

fn candidate(id: &str, max_vms: u32, used_vms: u32) -> Candidate {
    Candidate {
        worker: WorkerRecord {
            id: WorkerId::from_string(id),
            address: format!("{id}:7700"),
            hostname: id.to_string(),
            capabilities: Capabilities { cpu_cores: 8, ram_gb: 16, max_vms, arch: BTreeSet::new() },
            tags: BTreeSet::new(),
            registered_at_epoch_ms: 0,
        },
        load: WorkerLoad { used_vms, ..WorkerLoad::default() },
    }
}

fn job() -> JobRecord {
    JobRecord::builder().build()
}

#[test]
fn parse_known_strategies() {
    assert_eq!(AllocationStrategy::parse("load_aware"), Some(AllocationStrategy::LoadAware));
    assert_eq!(
        AllocationStrategy::parse("round_robin"),
        Some(AllocationStrategy::RoundRobin { cursor: 0 })
    );
    assert_eq!(AllocationStrategy::parse("first_fit"), Some(AllocationStrategy::FirstFit));
    assert_eq!(AllocationStrategy::parse("psychic"), None);
}

#[test]
fn empty_candidates_select_nothing() {
    let mut strategy = AllocationStrategy::default();
    assert_eq!(strategy.select(&[], &job()), None);
}

#[test]
fn load_aware_picks_lowest_vm_utilization() {
    // W1: 3/4 used (0.75), W2: 2/8 used (0.25)
    let candidates = vec![candidate("wkr-w1", 4, 3), candidate("wkr-w2", 8, 2)];
    let mut strategy = AllocationStrategy::LoadAware;
    assert_eq!(strategy.select(&candidates, &job()), Some(WorkerId::from_string("wkr-w2")));
}

#[test]
fn load_aware_weights_cpu_and_ram() {
    let mut hot_cpu = candidate("wkr-a", 4, 1);
    hot_cpu.load.cpu_percent = 95.0;
    let cool = candidate("wkr-b", 4, 1);
    let mut strategy = AllocationStrategy::LoadAware;
    assert_eq!(strategy.select(&[hot_cpu, cool], &job()), Some(WorkerId::from_string("wkr-b")));
}

#[test]
fn load_aware_ties_break_to_lower_worker_id() {
    let candidates = vec![candidate("wkr-bb", 4, 2), candidate("wkr-aa", 4, 2)];
    let mut strategy = AllocationStrategy::LoadAware;
    assert_eq!(strategy.select(&candidates, &job()), Some(WorkerId::from_string("wkr-aa")));
}

#[test]
fn round_robin_rotates() {
    let candidates =
        vec![candidate("wkr-a", 4, 0), candidate("wkr-b", 4, 0), candidate("wkr-c", 4, 0)];
    let mut strategy = AllocationStrategy::RoundRobin { cursor: 0 };
    let picks: Vec<WorkerId> =
        (0..4).filter_map(|_| strategy.select(&candidates, &job())).collect();
    assert_eq!(
        picks,
        vec![
            WorkerId::from_string("wkr-a"),
            WorkerId::from_string("wkr-b"),
            WorkerId::from_string("wkr-c"),
            WorkerId::from_string("wkr-a"),
        ]
    );
}

#[test]
fn first_fit_takes_registration_order() {
    let candidates = vec![candidate("wkr-z", 4, 3), candidate("wkr-a", 4, 0)];
    let mut strategy = AllocationStrategy::FirstFit;
    // First in the list, regardless of load or id
    assert_eq!(strategy.select(&candidates, &job()), Some(WorkerId::from_string("wkr-z")));
}
