// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    queued = { "queued", JobStatus::Queued },
    running = { "running", JobStatus::Running },
    failed = { "failed", JobStatus::Failed },
)]
fn status_filter_parses(input: &str, expected: JobStatus) {
    assert_eq!(parse_status_filter(Some(input)).unwrap(), Some(expected));
}

#[test]
fn status_filter_none_passes_through() {
    assert_eq!(parse_status_filter(None).unwrap(), None);
}

#[test]
fn status_filter_rejects_unknown() {
    assert!(parse_status_filter(Some("exploded")).is_err());
}

#[test]
fn job_row_shape() {
    let summary = JobSummary {
        id: JobId(12),
        name: "fuzz-tiff".into(),
        priority: 80,
        status: JobStatus::Running,
        retries: 1,
        assigned_worker: Some("wkr-abc".into()),
        created_at_epoch_ms: 0,
        deadline_epoch_ms: None,
    };
    let row = job_row(&summary);
    assert_eq!(row[0], "12");
    assert_eq!(row[1], "fuzz-tiff");
    assert_eq!(row[3], "running");
    assert_eq!(row[5], "wkr-abc");
}

#[test]
fn job_row_dashes_out_missing_worker() {
    let summary = JobSummary {
        id: JobId(1),
        name: "j".into(),
        priority: 50,
        status: JobStatus::Queued,
        retries: 0,
        assigned_worker: None,
        created_at_epoch_ms: 0,
        deadline_epoch_ms: None,
    };
    assert_eq!(job_row(&summary)[5], "-");
}
