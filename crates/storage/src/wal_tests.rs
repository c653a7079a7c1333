// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fawkes_core::JobId;
use std::io::Write as _;
use tempfile::tempdir;

fn test_event(n: u64) -> Event {
    Event::JobQueued { id: JobId(n), enqueue_seq: n }
}

fn event_job(event: &Event) -> JobId {
    match event {
        Event::JobQueued { id, .. } => *id,
        other => panic!("expected job:queued event, got {:?}", other),
    }
}

#[test]
fn open_creates_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let wal = Wal::open(&path, 0).unwrap();

    assert!(path.exists());
    assert_eq!(wal.write_seq(), 0);
    assert_eq!(wal.processed_seq(), 0);
}

#[test]
fn append_and_flush() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal = Wal::open(&path, 0).unwrap();

    let seq1 = wal.append(&test_event(1)).unwrap();
    let seq2 = wal.append(&test_event(2)).unwrap();

    assert_eq!(seq1, 1);
    assert_eq!(seq2, 2);

    wal.flush().unwrap();

    let metadata = std::fs::metadata(&path).unwrap();
    assert!(metadata.len() > 0);
}

#[test]
fn next_unprocessed_advances_without_marking() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal = Wal::open(&path, 0).unwrap();

    wal.append(&test_event(1)).unwrap();
    wal.append(&test_event(2)).unwrap();

    let entry1 = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry1.seq, 1);
    assert_eq!(event_job(&entry1.event), JobId(1));

    let entry2 = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry2.seq, 2);
    assert_eq!(event_job(&entry2.event), JobId(2));

    // No more entries
    assert!(wal.next_unprocessed().unwrap().is_none());
    // Reading did not mark anything processed
    assert_eq!(wal.processed_seq(), 0);
}

#[test]
fn mark_processed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal = Wal::open(&path, 0).unwrap();

    wal.append(&test_event(1)).unwrap();
    wal.flush().unwrap();

    let entry = wal.next_unprocessed().unwrap().unwrap();
    wal.mark_processed(entry.seq);

    assert_eq!(wal.processed_seq(), 1);
}

#[test]
fn reopen_with_processed_seq_skips_replayed_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&test_event(1)).unwrap();
        wal.append(&test_event(2)).unwrap();
        wal.append(&test_event(3)).unwrap();
        wal.flush().unwrap();
    }

    // Reopen with processed_seq=2 (simulating recovery from snapshot)
    let mut wal = Wal::open(&path, 2).unwrap();

    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 3);
    assert_eq!(event_job(&entry.event), JobId(3));

    assert!(wal.next_unprocessed().unwrap().is_none());
}

#[test]
fn entries_after() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal = Wal::open(&path, 0).unwrap();

    wal.append(&test_event(1)).unwrap();
    wal.append(&test_event(2)).unwrap();
    wal.append(&test_event(3)).unwrap();
    wal.flush().unwrap();

    let entries = wal.entries_after(1).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[1].seq, 3);
}

#[test]
fn truncate_before_keeps_tail() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal = Wal::open(&path, 0).unwrap();

    wal.append(&test_event(1)).unwrap();
    wal.append(&test_event(2)).unwrap();
    wal.append(&test_event(3)).unwrap();
    wal.flush().unwrap();

    wal.truncate_before(2).unwrap();

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[1].seq, 3);

    // Truncation survives reopen
    drop(wal);
    let wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 3);
    assert_eq!(wal.entries_after(0).unwrap().len(), 2);
}

#[test]
fn open_corrupt_wal_creates_bak_and_preserves_valid_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    // Write valid entries then append garbage
    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&test_event(1)).unwrap();
        wal.append(&test_event(2)).unwrap();
        wal.flush().unwrap();
    }
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"not-valid-json\n").unwrap();
    }

    let wal = Wal::open(&path, 0).unwrap();

    assert_eq!(wal.write_seq(), 2);

    let bak = path.with_extension("bak");
    assert!(bak.exists());

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 1);
    assert_eq!(entries[1].seq, 2);
}

#[test]
fn open_corrupt_wal_rotates_bak_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    // Simulate 4 corrupt opens — should keep at most 3 backups
    for i in 1..=4u8 {
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(&[i; 8]).unwrap();
        }

        let wal = Wal::open(&path, 0).unwrap();
        assert_eq!(wal.write_seq(), 0);
    }

    // .bak (most recent = round 4)
    let bak1 = path.with_extension("bak");
    assert!(bak1.exists());
    assert_eq!(std::fs::read(&bak1).unwrap(), vec![4u8; 8]);

    // .bak.2 (round 3)
    let bak2 = path.with_extension("bak.2");
    assert!(bak2.exists());
    assert_eq!(std::fs::read(&bak2).unwrap(), vec![3u8; 8]);

    // .bak.3 (round 2)
    let bak3 = path.with_extension("bak.3");
    assert!(bak3.exists());
    assert_eq!(std::fs::read(&bak3).unwrap(), vec![2u8; 8]);

    // Round 1 was evicted
    let bak4 = path.with_extension("bak.4");
    assert!(!bak4.exists());
}

#[test]
fn external_garbage_does_not_break_reader() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal = Wal::open(&path, 0).unwrap();
    wal.append(&test_event(1)).unwrap();
    wal.flush().unwrap();

    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 1);

    // Append garbage directly to the file behind the WAL's back
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"corrupt-line\n").unwrap();
    }

    // Reader returns None (not an error)
    assert!(wal.next_unprocessed().unwrap().is_none());

    // New appends still read back fine
    wal.append(&test_event(2)).unwrap();
    wal.flush().unwrap();

    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 2);
}

#[test]
fn open_with_binary_wal_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    // Binary (non-UTF-8) data simulates a torn write
    std::fs::write(&path, b"\x80\x81\x82\xff\xfe\n").unwrap();

    let wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 0);

    let bak = path.with_extension("bak");
    assert!(bak.exists());
}

#[test]
fn open_with_valid_entries_then_binary() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&test_event(1)).unwrap();
        wal.append(&test_event(2)).unwrap();
        wal.flush().unwrap();
    }
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"\x80\x81\x82\xff\xfe\n").unwrap();
    }

    let wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 2);

    let bak = path.with_extension("bak");
    assert!(bak.exists());

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 1);
    assert_eq!(entries[1].seq, 2);
}

#[test]
fn needs_flush_threshold() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal = Wal::open(&path, 0).unwrap();

    assert!(!wal.needs_flush());

    for i in 0..150u64 {
        wal.append(&test_event(i + 1)).unwrap();
    }

    // The threshold auto-flushed at 100; the remaining 50 may or may not be
    // due depending on the interval, but nothing was lost.
    assert_eq!(wal.write_seq(), 150);
    wal.flush().unwrap();

    drop(wal);
    let wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.entries_after(0).unwrap().len(), 150);
}
