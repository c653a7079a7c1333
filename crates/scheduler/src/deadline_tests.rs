// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::dispatch::FakeDispatcher;
use crate::store::SchedulerStore;
use fawkes_core::{Capabilities, FakeClock, JobSpec, JobStatus};
use fawkes_storage::{MaterializedState, Wal};
use std::collections::BTreeSet;
use tempfile::{tempdir, TempDir};

fn test_store(dir: &TempDir, clock: &FakeClock) -> SchedulerStore<FakeClock> {
    let wal = Wal::open(&dir.path().join("test.wal"), 0).unwrap();
    SchedulerStore::new(MaterializedState::default(), wal, clock.clone())
}

fn register(store: &SchedulerStore<FakeClock>) -> fawkes_core::WorkerId {
    let caps = Capabilities { cpu_cores: 8, ram_gb: 16, max_vms: 4, arch: BTreeSet::new() };
    store.register_worker("w:1", "host", caps, BTreeSet::new()).unwrap()
}

#[tokio::test]
async fn expired_running_job_fails_and_signals_worker() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    clock.set_epoch_ms(10_000_000);
    let store = test_store(&dir, &clock);
    let dispatcher: Arc<dyn JobDispatcher> = Arc::new(FakeDispatcher::new());

    let worker = register(&store);
    // Deadline one hour in the past
    let job = store
        .add_job(
            JobSpec::builder("late")
                .deadline_epoch_ms(clock.epoch_ms() - 3_600_000)
                .build(),
        )
        .unwrap();
    store.assign_job_to_worker(job, worker).unwrap();
    store.update_job_status(job, JobStatus::Running, None).unwrap();

    run_deadline_cycle(&store, &dispatcher).await.unwrap();

    let record = store.get_job(job).unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.failure_reason.as_deref(), Some("deadline exceeded"));
    assert_eq!(record.retries, 0, "deadline miss must not retry");
}

#[tokio::test]
async fn cancel_signal_reaches_the_owner() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    clock.set_epoch_ms(10_000_000);
    let store = test_store(&dir, &clock);
    let fake = Arc::new(FakeDispatcher::new());
    let dispatcher: Arc<dyn JobDispatcher> = Arc::clone(&fake) as Arc<dyn JobDispatcher>;

    let worker = register(&store);
    let job = store
        .add_job(JobSpec::builder("late").deadline_epoch_ms(clock.epoch_ms() - 1).build())
        .unwrap();
    store.assign_job_to_worker(job, worker).unwrap();

    run_deadline_cycle(&store, &dispatcher).await.unwrap();

    assert_eq!(fake.cancelled_jobs(), vec![(worker, job)]);
}

#[tokio::test]
async fn queued_job_with_future_deadline_is_untouched() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let store = test_store(&dir, &clock);
    let dispatcher: Arc<dyn JobDispatcher> = Arc::new(FakeDispatcher::new());

    let job = store
        .add_job(JobSpec::builder("ok").deadline_epoch_ms(clock.epoch_ms() + 60_000).build())
        .unwrap();

    run_deadline_cycle(&store, &dispatcher).await.unwrap();
    assert_eq!(store.get_job(job).unwrap().status, JobStatus::Queued);

    // ... until the deadline actually passes
    clock.advance(std::time::Duration::from_secs(61));
    run_deadline_cycle(&store, &dispatcher).await.unwrap();
    assert_eq!(store.get_job(job).unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn terminal_jobs_are_ignored() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    clock.set_epoch_ms(10_000_000);
    let store = test_store(&dir, &clock);
    let dispatcher: Arc<dyn JobDispatcher> = Arc::new(FakeDispatcher::new());

    let job = store
        .add_job(JobSpec::builder("done").deadline_epoch_ms(clock.epoch_ms() - 1).build())
        .unwrap();
    store.cancel_job(job).unwrap();

    run_deadline_cycle(&store, &dispatcher).await.unwrap();
    assert_eq!(store.get_job(job).unwrap().status, JobStatus::Cancelled);
}
