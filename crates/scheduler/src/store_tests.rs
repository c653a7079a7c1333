// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fawkes_core::{Capabilities, FakeClock, JobSpec, ResourceSpec};
use fawkes_storage::MaterializedState;
use fawkes_core::CrashObservation;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

fn test_store(dir: &TempDir, clock: &FakeClock) -> SchedulerStore<FakeClock> {
    let wal = Wal::open(&dir.path().join("test.wal"), 0).unwrap();
    SchedulerStore::new(MaterializedState::default(), wal, clock.clone())
        .with_heartbeat_timeout_ms(5_000)
}

fn caps(max_vms: u32) -> Capabilities {
    Capabilities { cpu_cores: 8, ram_gb: 16, max_vms, arch: BTreeSet::new() }
}

fn register(store: &SchedulerStore<FakeClock>, addr: &str, max_vms: u32) -> WorkerId {
    store.register_worker(addr, "host", caps(max_vms), BTreeSet::new()).unwrap()
}

fn heartbeat(store: &SchedulerStore<FakeClock>, id: WorkerId, used_vms: u32) {
    store
        .update_worker_heartbeat(id, WorkerLoad { used_vms, ..WorkerLoad::default() })
        .unwrap();
}

fn report(job: JobId, hash: &str, score: u8) -> fawkes_core::CrashReport {
    fawkes_core::CrashReport {
        job_id: job,
        observed_at_epoch_ms: 1,
        observation: CrashObservation::default(),
        normalized_frames: vec!["f".into()],
        stack_hash: hash.into(),
        signature: "sig".into(),
        vuln_type: fawkes_core::VulnType::Unknown,
        confidence: 0.1,
        exploitability_score: score,
        severity: fawkes_core::Severity::from_score(score),
    }
}

#[test]
fn add_job_without_deps_is_queued_immediately() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let id = store.add_job(JobSpec::builder("a").build()).unwrap();
    assert_eq!(id, JobId(1));
    assert_eq!(store.get_job(id).unwrap().status, JobStatus::Queued);
    assert_eq!(store.get_next_job_from_queue().unwrap().job_id, id);
}

#[test]
fn job_ids_are_monotone() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let a = store.add_job(JobSpec::builder("a").build()).unwrap();
    let b = store.add_job(JobSpec::builder("b").build()).unwrap();
    assert!(b > a);
}

#[test]
fn fifo_within_priority() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let a = store.add_job(JobSpec::builder("a").priority(50).build()).unwrap();
    let b = store.add_job(JobSpec::builder("b").priority(50).build()).unwrap();

    assert_eq!(store.get_next_job_from_queue().unwrap().job_id, a);

    let worker = register(&store, "w:1", 4);
    store.assign_job_to_worker(a, worker).unwrap();
    store.update_job_status(a, JobStatus::Running, None).unwrap();
    store.update_job_status(a, JobStatus::Completed, None).unwrap();

    assert_eq!(store.get_next_job_from_queue().unwrap().job_id, b);
}

#[test]
fn higher_priority_dequeues_first_even_if_enqueued_later() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let low = store.add_job(JobSpec::builder("low").priority(0).build()).unwrap();
    let high = store.add_job(JobSpec::builder("high").priority(100).build()).unwrap();

    assert_eq!(store.get_next_job_from_queue().unwrap().job_id, high);
    let _ = low;
}

#[test]
fn dependency_gates_queueing() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let a = store.add_job(JobSpec::builder("a").priority(50).build()).unwrap();
    let b = store
        .add_job(JobSpec::builder("b").priority(90).dependencies(vec![a]).build())
        .unwrap();

    // B outranks A but is not queued yet
    assert_eq!(store.get_job(b).unwrap().status, JobStatus::Pending);
    assert_eq!(store.get_next_job_from_queue().unwrap().job_id, a);

    let worker = register(&store, "w:1", 4);
    store.assign_job_to_worker(a, worker).unwrap();
    store.update_job_status(a, JobStatus::Running, None).unwrap();
    store.update_job_status(a, JobStatus::Completed, None).unwrap();

    assert_eq!(store.get_job(b).unwrap().status, JobStatus::Queued);
    assert_eq!(store.get_next_job_from_queue().unwrap().job_id, b);
}

#[test]
fn unknown_dependency_is_rejected() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let result = store.add_job(JobSpec::builder("b").dependencies(vec![JobId(42)]).build());
    assert!(matches!(result, Err(SchedulerError::UnknownEntity(_))));
}

#[test]
fn dependent_of_failed_job_fails() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let a = store.add_job(JobSpec::builder("a").build()).unwrap();
    let b = store.add_job(JobSpec::builder("b").dependencies(vec![a]).build()).unwrap();
    let c = store.add_job(JobSpec::builder("c").dependencies(vec![b]).build()).unwrap();

    store.update_job_status(a, JobStatus::Failed, Some("boom".into())).unwrap();

    // The whole chain collapses
    let b_record = store.get_job(b).unwrap();
    assert_eq!(b_record.status, JobStatus::Failed);
    assert!(b_record.failure_reason.unwrap().contains("dependency"));
    assert_eq!(store.get_job(c).unwrap().status, JobStatus::Failed);
}

#[test]
fn adding_job_with_already_failed_dependency_fails_it() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let a = store.add_job(JobSpec::builder("a").build()).unwrap();
    store.update_job_status(a, JobStatus::Failed, None).unwrap();

    let b = store.add_job(JobSpec::builder("b").dependencies(vec![a]).build()).unwrap();
    assert_eq!(store.get_job(b).unwrap().status, JobStatus::Failed);
}

#[test]
fn illegal_transition_is_rejected() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let id = store.add_job(JobSpec::builder("a").build()).unwrap();
    let result = store.update_job_status(id, JobStatus::Completed, None);
    assert!(matches!(result, Err(SchedulerError::IllegalTransition { .. })));
    // Nothing was applied
    assert_eq!(store.get_job(id).unwrap().status, JobStatus::Queued);
}

#[test]
fn assignment_requires_known_worker_and_queued_job() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let id = store.add_job(JobSpec::builder("a").build()).unwrap();
    let ghost = WorkerId::from_string("wkr-ghost");
    assert!(matches!(
        store.assign_job_to_worker(id, ghost),
        Err(SchedulerError::UnknownEntity(_))
    ));

    let worker = register(&store, "w:1", 4);
    store.assign_job_to_worker(id, worker).unwrap();
    // Already assigned — not in the queue anymore
    assert!(matches!(
        store.assign_job_to_worker(id, worker),
        Err(SchedulerError::IllegalTransition { .. })
    ));
    assert!(store.get_next_job_from_queue().is_none());
}

#[test]
fn requeue_increments_retries_then_fails_at_limit() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let id = store.add_job(JobSpec::builder("a").max_retries(1).build()).unwrap();
    let worker = register(&store, "w:1", 4);

    store.assign_job_to_worker(id, worker).unwrap();
    assert_eq!(store.requeue_or_fail(id, "worker lost").unwrap(), JobStatus::Queued);
    assert_eq!(store.get_job(id).unwrap().retries, 1);

    store.assign_job_to_worker(id, worker).unwrap();
    assert_eq!(store.requeue_or_fail(id, "worker lost").unwrap(), JobStatus::Failed);
    let job = store.get_job(id).unwrap();
    assert!(job.failure_reason.unwrap().contains("retries exhausted"));
}

#[test]
fn zero_max_retries_fails_on_first_loss() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let id = store.add_job(JobSpec::builder("a").max_retries(0).build()).unwrap();
    let worker = register(&store, "w:1", 4);
    store.assign_job_to_worker(id, worker).unwrap();

    assert_eq!(store.requeue_or_fail(id, "worker lost").unwrap(), JobStatus::Failed);
}

#[test]
fn cancel_returns_owner_for_inflight_jobs() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let id = store.add_job(JobSpec::builder("a").build()).unwrap();
    let worker = register(&store, "w:1", 4);
    store.assign_job_to_worker(id, worker).unwrap();
    store.update_job_status(id, JobStatus::Running, None).unwrap();

    let owner = store.cancel_job(id).unwrap();
    assert_eq!(owner.unwrap().id, worker);
    assert_eq!(store.get_job(id).unwrap().status, JobStatus::Cancelled);

    // Cancelling a queued job has no owner
    let other = store.add_job(JobSpec::builder("b").build()).unwrap();
    assert!(store.cancel_job(other).unwrap().is_none());
}

#[test]
fn cancel_is_terminal() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let id = store.add_job(JobSpec::builder("a").build()).unwrap();
    store.cancel_job(id).unwrap();
    assert!(matches!(store.cancel_job(id), Err(SchedulerError::IllegalTransition { .. })));
}

#[test]
fn register_worker_is_idempotent_on_address() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let first = register(&store, "10.0.0.1:7700", 4);
    let second = store
        .register_worker("10.0.0.1:7700", "renamed", caps(8), BTreeSet::new())
        .unwrap();
    assert_eq!(first, second);

    let record = store.get_worker(&first).unwrap();
    assert_eq!(record.hostname, "renamed");
    assert_eq!(record.capabilities.max_vms, 8);
    assert_eq!(store.list_workers().len(), 1);
}

#[test]
fn heartbeat_for_unknown_worker_is_rejected() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let result =
        store.update_worker_heartbeat(WorkerId::from_string("wkr-ghost"), WorkerLoad::default());
    assert!(matches!(result, Err(SchedulerError::UnknownEntity(_))));
}

#[test]
fn heartbeat_reports_pending_assignment() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let worker = register(&store, "w:1", 4);
    let ack = store.update_worker_heartbeat(worker, WorkerLoad::default()).unwrap();
    assert!(!ack.assignments_pending);

    let id = store.add_job(JobSpec::builder("a").build()).unwrap();
    store.assign_job_to_worker(id, worker).unwrap();
    let ack = store.update_worker_heartbeat(worker, WorkerLoad::default()).unwrap();
    assert!(ack.assignments_pending);

    // Once running, nothing is pending
    store.update_job_status(id, JobStatus::Running, None).unwrap();
    let ack = store.update_worker_heartbeat(worker, WorkerLoad::default()).unwrap();
    assert!(!ack.assignments_pending);
}

#[test]
fn available_workers_filters_tags_capacity_and_liveness() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let tagged = store
        .register_worker(
            "w:1",
            "h1",
            caps(4),
            ["win10".to_string()].into_iter().collect(),
        )
        .unwrap();
    clock.advance(Duration::from_secs(1));
    let untagged = register(&store, "w:2", 4);
    clock.advance(Duration::from_secs(1));
    let full = register(&store, "w:3", 2);
    heartbeat(&store, full, 2);

    let needs_tag: BTreeSet<String> = ["win10".to_string()].into_iter().collect();
    let spec = ResourceSpec { vms: 1, ..ResourceSpec::default() };

    let ids: Vec<WorkerId> =
        store.get_available_workers(&needs_tag, &spec).iter().map(|c| c.worker.id).collect();
    assert_eq!(ids, vec![tagged]);

    let ids: Vec<WorkerId> = store
        .get_available_workers(&BTreeSet::new(), &spec)
        .iter()
        .map(|c| c.worker.id)
        .collect();
    // Full worker is excluded; the others are in registration order
    assert_eq!(ids, vec![tagged, untagged]);

    // Stale workers disappear
    clock.advance(Duration::from_secs(10));
    assert!(store.get_available_workers(&BTreeSet::new(), &spec).is_empty());
}

#[test]
fn crash_dedup_by_stack_hash() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    let job = store.add_job(JobSpec::builder("a").build()).unwrap();
    let worker = register(&store, "w:1", 4);

    let first = store.record_crash(worker, &report(job, "hash-a", 20)).unwrap();
    assert_eq!(first, CrashOutcome {
        crash_id: CrashId(1),
        is_duplicate: false,
        replace_payload: false,
    });

    // Same stack, lower score: duplicate, keep stored payload
    let second = store.record_crash(worker, &report(job, "hash-a", 10)).unwrap();
    assert!(second.is_duplicate);
    assert_eq!(second.crash_id, CrashId(1));
    assert!(!second.replace_payload);

    // Strictly higher score: replace payload
    let third = store.record_crash(worker, &report(job, "hash-a", 90)).unwrap();
    assert!(third.is_duplicate && third.replace_payload);

    let stored = store.get_crash(CrashId(1)).unwrap();
    assert_eq!(stored.duplicate_count, 3);
    assert_eq!(stored.exploitability_score, 90);

    // A different stack is a new crash
    let fourth = store.record_crash(worker, &report(job, "hash-b", 5)).unwrap();
    assert_eq!(fourth.crash_id, CrashId(2));
    assert!(!fourth.is_duplicate);
}

#[test]
fn stats_counts() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);

    store.add_job(JobSpec::builder("a").build()).unwrap();
    let b = store.add_job(JobSpec::builder("b").build()).unwrap();
    store.cancel_job(b).unwrap();
    register(&store, "w:1", 4);

    let counts = store.stats();
    assert_eq!(counts.jobs["queued"], 1);
    assert_eq!(counts.jobs["cancelled"], 1);
    assert_eq!(counts.workers["online"], 1);
}

#[test]
fn store_recovers_from_disk() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let wal_path = dir.path().join("test.wal");
    let snap_path = dir.path().join("snapshot.json.zst");

    let worker;
    let job;
    {
        let store = test_store(&dir, &clock);
        job = store.add_job(JobSpec::builder("durable").priority(70).build()).unwrap();
        worker = register(&store, "w:1", 4);
        store.assign_job_to_worker(job, worker).unwrap();
        store.flush().unwrap();
    }

    let recovered = SchedulerStore::recover(&wal_path, &snap_path, clock.clone()).unwrap();
    let record = recovered.get_job(job).unwrap();
    assert_eq!(record.status, JobStatus::Assigned);
    assert_eq!(record.assigned_worker, Some(worker));

    // Heartbeats were runtime-only: the worker comes back offline and the
    // health monitor will recover the assignment
    let stale = recovered.offline_workers_with_jobs();
    assert_eq!(stale, vec![(worker, vec![job])]);

    // New jobs continue the id sequence
    let next = recovered.add_job(JobSpec::builder("next").build()).unwrap();
    assert_eq!(next, JobId(job.0 + 1));
}
