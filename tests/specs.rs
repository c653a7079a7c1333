// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level scenario tests: the scheduler's externally observable
//! behavior, driven end to end through the store and control loops.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use fawkes_core::{
    Capabilities, Clock, CrashObservation, CrashReport, FakeClock, JobId, JobSpec, JobStatus,
    Severity, VulnType, WorkerId, WorkerLoad,
};
use fawkes_scheduler::{
    run_deadline_cycle, run_health_cycle, Allocator, AllocatorConfig, FakeDispatcher,
    JobDispatcher, SchedulerStore,
};
use fawkes_storage::{MaterializedState, Wal};
use tempfile::TempDir;

const HEARTBEAT_TIMEOUT_MS: u64 = 5_000;

fn store(dir: &TempDir, clock: &FakeClock) -> SchedulerStore<FakeClock> {
    let wal = Wal::open(&dir.path().join("specs.wal"), 0).unwrap();
    SchedulerStore::new(MaterializedState::default(), wal, clock.clone())
        .with_heartbeat_timeout_ms(HEARTBEAT_TIMEOUT_MS)
}

fn register_worker(
    store: &SchedulerStore<FakeClock>,
    addr: &str,
    max_vms: u32,
    used_vms: u32,
) -> WorkerId {
    let id = store
        .register_worker(
            addr,
            "host",
            Capabilities { cpu_cores: 16, ram_gb: 32, max_vms, arch: BTreeSet::new() },
            BTreeSet::new(),
        )
        .unwrap();
    store
        .update_worker_heartbeat(id, WorkerLoad { used_vms, ..WorkerLoad::default() })
        .unwrap();
    id
}

fn crash_report(job: JobId, frames: &[&str], testcase_tag: u8, score: u8) -> CrashReport {
    let normalized: Vec<String> = frames.iter().map(|f| f.to_string()).collect();
    CrashReport {
        job_id: job,
        observed_at_epoch_ms: 1,
        observation: CrashObservation {
            pid: 100 + testcase_tag as u32,
            exe: "target".into(),
            exception_code: 0xC0000005,
            stack_frames: normalized.clone(),
            ..CrashObservation::default()
        },
        normalized_frames: normalized.clone(),
        stack_hash: fawkes_triage::stack_hash(&normalized),
        signature: fawkes_triage::signature(0xC0000005, &normalized),
        vuln_type: VulnType::Unknown,
        confidence: 0.1,
        exploitability_score: score,
        severity: Severity::from_score(score),
    }
}

// Scenario 1: FIFO within one priority level.
#[test]
fn fifo_within_priority() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store = store(&dir, &clock);

    let a = store.add_job(JobSpec::builder("a").priority(50).build()).unwrap();
    let b = store.add_job(JobSpec::builder("b").priority(50).build()).unwrap();

    assert_eq!(store.get_next_job_from_queue().unwrap().job_id, a);

    let worker = register_worker(&store, "w:1", 8, 0);
    store.assign_job_to_worker(a, worker).unwrap();
    store.update_job_status(a, JobStatus::Running, None).unwrap();
    store.update_job_status(a, JobStatus::Completed, None).unwrap();

    assert_eq!(store.get_next_job_from_queue().unwrap().job_id, b);
}

// Scenario 2: dependencies gate queue entry regardless of priority.
#[test]
fn dependency_gating_beats_priority() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store = store(&dir, &clock);

    let a = store.add_job(JobSpec::builder("a").priority(50).build()).unwrap();
    let b = store
        .add_job(JobSpec::builder("b").priority(90).dependencies(vec![a]).build())
        .unwrap();

    // B outranks A but is still pending
    assert_eq!(store.get_next_job_from_queue().unwrap().job_id, a);
    assert_eq!(store.get_job(b).unwrap().status, JobStatus::Pending);

    let worker = register_worker(&store, "w:1", 8, 0);
    store.assign_job_to_worker(a, worker).unwrap();
    store.update_job_status(a, JobStatus::Running, None).unwrap();
    store.update_job_status(a, JobStatus::Completed, None).unwrap();

    // A's completion happens-before B's eligibility
    assert_eq!(store.get_next_job_from_queue().unwrap().job_id, b);
    assert_eq!(store.get_job(b).unwrap().status, JobStatus::Queued);
}

// Scenario 3: load-aware allocation picks the lower VM utilization.
#[tokio::test]
async fn load_aware_allocation() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store = store(&dir, &clock);

    // W1: 3/4 used (0.75) — W2: 2/8 used (0.25)
    let _w1 = register_worker(&store, "w:1", 4, 3);
    let w2 = register_worker(&store, "w:2", 8, 2);

    let job = store.add_job(JobSpec::builder("j").build()).unwrap();

    let dispatcher = Arc::new(FakeDispatcher::new());
    let mut allocator = Allocator::new(
        store.clone(),
        Arc::clone(&dispatcher) as Arc<dyn JobDispatcher>,
        AllocatorConfig::default(),
    );
    allocator.run_cycle().await.unwrap();

    assert_eq!(store.get_job(job).unwrap().assigned_worker, Some(w2));
    assert_eq!(dispatcher.dispatched_jobs(), vec![(w2, job)]);
}

// Scenario 4: worker loss re-queues the job with one retry.
#[test]
fn worker_loss_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store = store(&dir, &clock);

    let worker = register_worker(&store, "w:1", 8, 0);
    let job = store.add_job(JobSpec::builder("j").build()).unwrap();
    store.assign_job_to_worker(job, worker).unwrap();
    store.update_job_status(job, JobStatus::Running, None).unwrap();

    // Heartbeats stop for longer than the timeout
    clock.advance(Duration::from_millis(HEARTBEAT_TIMEOUT_MS + 1_000));
    run_health_cycle(&store).unwrap();

    let record = store.get_job(job).unwrap();
    assert_eq!(record.status, JobStatus::Queued);
    assert_eq!(record.retries, 1);
    assert!(record.assigned_worker.is_none());
}

// Scenario 5: a job past its deadline is failed within one cycle.
#[tokio::test]
async fn deadline_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    clock.set_epoch_ms(10_000_000);
    let store = store(&dir, &clock);

    let worker = register_worker(&store, "w:1", 8, 0);
    let job = store
        .add_job(
            JobSpec::builder("late")
                .deadline_epoch_ms(clock.epoch_ms() - 3_600_000)
                .build(),
        )
        .unwrap();
    store.assign_job_to_worker(job, worker).unwrap();
    store.update_job_status(job, JobStatus::Running, None).unwrap();

    let fake = Arc::new(FakeDispatcher::new());
    let dispatcher = Arc::clone(&fake) as Arc<dyn JobDispatcher>;
    run_deadline_cycle(&store, &dispatcher).await.unwrap();

    let record = store.get_job(job).unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.failure_reason.as_deref(), Some("deadline exceeded"));
    // The running job's worker was told to stop
    assert_eq!(fake.cancelled_jobs(), vec![(worker, job)]);
}

// Scenario 6: crash dedup by stack hash across different testcases.
#[test]
fn crash_dedup() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store = store(&dir, &clock);

    let worker = register_worker(&store, "w:1", 8, 0);
    let job = store.add_job(JobSpec::builder("j").build()).unwrap();

    let stack = ["memcpy", "parse_header", "main"];
    let first = store.record_crash(worker, &crash_report(job, &stack, 1, 20)).unwrap();
    assert!(!first.is_duplicate);

    // Same normalized stack, different testcase bytes
    let second = store.record_crash(worker, &crash_report(job, &stack, 2, 10)).unwrap();
    assert!(second.is_duplicate);
    assert_eq!(second.crash_id, first.crash_id);

    let stored = store.get_crash(first.crash_id).unwrap();
    assert_eq!(stored.duplicate_count, 2);
    assert!(stored.duplicate_of.is_none());

    // Exactly one unique crash exists
    assert_eq!(store.stats().unique_crashes, 1);
    assert_eq!(store.stats().duplicate_crashes, 1);
}

// Boundary: zero available workers leaves jobs queued indefinitely.
#[tokio::test]
async fn zero_workers_means_patience_not_failure() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store = store(&dir, &clock);

    let job = store.add_job(JobSpec::builder("waiting").build()).unwrap();

    let dispatcher = Arc::new(FakeDispatcher::new()) as Arc<dyn JobDispatcher>;
    let mut allocator =
        Allocator::new(store.clone(), dispatcher, AllocatorConfig::default());
    for _ in 0..5 {
        allocator.run_cycle().await.unwrap();
        clock.advance(Duration::from_secs(60));
    }

    assert_eq!(store.get_job(job).unwrap().status, JobStatus::Queued);
    assert_eq!(store.get_job(job).unwrap().retries, 0);
}

// Round-trip law: the full lifecycle is observable and monotone.
#[test]
fn lifecycle_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store = store(&dir, &clock);

    let worker = register_worker(&store, "w:1", 8, 0);
    let job = store.add_job(JobSpec::builder("rt").build()).unwrap();
    assert_eq!(store.get_job(job).unwrap().status, JobStatus::Queued);

    let head = store.get_next_job_from_queue().unwrap();
    assert_eq!(head.job_id, job);

    store.assign_job_to_worker(job, worker).unwrap();
    assert_eq!(store.get_job(job).unwrap().status, JobStatus::Assigned);

    store.update_job_status(job, JobStatus::Running, None).unwrap();
    clock.advance(Duration::from_secs(10));
    store.update_job_status(job, JobStatus::Completed, None).unwrap();

    let record = store.get_job(job).unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.started_at_epoch_ms.unwrap() <= record.finished_at_epoch_ms.unwrap());
}

// Durability: controller restart loses no durable state; in-flight
// assignments re-enter recovery.
#[test]
fn restart_recovers_state_and_inflight_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let wal_path = dir.path().join("specs.wal");
    let snapshot_path = dir.path().join("snapshot.json.zst");

    let (job, worker) = {
        let store = store(&dir, &clock);
        let worker = register_worker(&store, "w:1", 8, 0);
        let job = store.add_job(JobSpec::builder("durable").priority(70).build()).unwrap();
        store.assign_job_to_worker(job, worker).unwrap();
        store.update_job_status(job, JobStatus::Running, None).unwrap();
        store.flush().unwrap();
        (job, worker)
    };

    let recovered = SchedulerStore::recover(&wal_path, &snapshot_path, clock.clone())
        .unwrap()
        .with_heartbeat_timeout_ms(HEARTBEAT_TIMEOUT_MS);

    let record = recovered.get_job(job).unwrap();
    assert_eq!(record.status, JobStatus::Running);
    assert_eq!(record.assigned_worker, Some(worker));

    // Heartbeats were runtime-only, so the worker is offline until it
    // checks in again; the health monitor recovers its job
    run_health_cycle(&recovered).unwrap();
    let record = recovered.get_job(job).unwrap();
    assert_eq!(record.status, JobStatus::Queued);
    assert_eq!(record.retries, 1);
}
