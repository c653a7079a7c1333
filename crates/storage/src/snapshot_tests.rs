// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fawkes_core::{Event, JobId, JobSpec};
use tempfile::tempdir;

fn sample_state() -> MaterializedState {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::JobAdded {
        id: JobId(1),
        spec: JobSpec::builder("snap-job").priority(60).build(),
        created_at_epoch_ms: 500,
    });
    state.apply_event(&Event::JobQueued { id: JobId(1), enqueue_seq: 1 });
    state
}

#[test]
fn save_and_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json.zst");

    let snapshot = Snapshot::new(42, sample_state());
    snapshot.save(&path).unwrap();

    let loaded = Snapshot::load(&path).unwrap();
    assert_eq!(loaded.version, CURRENT_SNAPSHOT_VERSION);
    assert_eq!(loaded.seq, 42);
    assert_eq!(loaded.state.jobs.len(), 1);
    assert_eq!(loaded.state.queue.len(), 1);
}

#[test]
fn save_is_atomic_no_tmp_left_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json.zst");

    Snapshot::new(1, sample_state()).save(&path).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn load_rejects_future_version() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json.zst");

    let mut snapshot = Snapshot::new(1, MaterializedState::default());
    snapshot.version = CURRENT_SNAPSHOT_VERSION + 1;
    snapshot.save(&path).unwrap();

    match Snapshot::load(&path) {
        Err(SnapshotError::UnsupportedVersion(v)) => {
            assert_eq!(v, CURRENT_SNAPSHOT_VERSION + 1)
        }
        other => panic!("expected UnsupportedVersion, got {:?}", other.map(|s| s.seq)),
    }
}

#[test]
fn rotate_bak_keeps_three() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("file.wal");

    for round in 1..=4u8 {
        std::fs::write(&path, [round; 4]).unwrap();
        let bak = rotate_bak_path(&path);
        std::fs::copy(&path, &bak).unwrap();
    }

    assert_eq!(std::fs::read(path.with_extension("bak")).unwrap(), vec![4u8; 4]);
    assert_eq!(std::fs::read(path.with_extension("bak.2")).unwrap(), vec![3u8; 4]);
    assert_eq!(std::fs::read(path.with_extension("bak.3")).unwrap(), vec![2u8; 4]);
    assert!(!path.with_extension("bak.4").exists());
}
