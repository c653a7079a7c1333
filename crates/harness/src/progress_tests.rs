// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn counters_accumulate() {
    let counters = ProgressCounters::new(JobId(3));
    for _ in 0..5 {
        counters.record_execution();
    }
    counters.record_crash();

    assert_eq!(counters.executions(), 5);
    assert_eq!(counters.crashes(), 1);

    let progress = counters.snapshot();
    assert_eq!(progress.job_id, JobId(3));
    assert_eq!(progress.executions, 5);
    assert_eq!(progress.crashes, 1);
}

#[test]
fn first_snapshot_has_zero_rate() {
    let counters = ProgressCounters::new(JobId(1));
    counters.record_execution();
    assert_eq!(counters.snapshot().exec_per_sec, 0.0);
}

#[test]
fn rate_reflects_executions_between_samples() {
    let counters = ProgressCounters::new(JobId(1));
    counters.snapshot();

    for _ in 0..100 {
        counters.record_execution();
    }
    std::thread::sleep(Duration::from_millis(50));

    let progress = counters.snapshot();
    assert!(progress.exec_per_sec > 0.0);
}

#[test]
fn counters_are_shareable_across_threads() {
    let counters = std::sync::Arc::new(ProgressCounters::new(JobId(1)));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let counters = std::sync::Arc::clone(&counters);
            std::thread::spawn(move || {
                for _ in 0..1_000 {
                    counters.record_execution();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counters.executions(), 4_000);
}
