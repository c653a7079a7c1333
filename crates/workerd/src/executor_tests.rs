// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fawkes_core::ResourceSpec;

fn descriptor(config: serde_json::Value) -> JobDescriptor {
    JobDescriptor {
        job_id: JobId(5),
        name: "fuzz-pdf".into(),
        config,
        resources: ResourceSpec::new(0, 0, 2),
        deadline_epoch_ms: None,
    }
}

fn payload_json(dir: &std::path::Path) -> serde_json::Value {
    serde_json::json!({
        "corpus_dir": dir.join("corpus"),
        "disk_image": "/images/win10.qcow2",
    })
}

#[test]
fn payload_defaults() {
    let payload: JobPayload = serde_json::from_value(serde_json::json!({
        "corpus_dir": "/corpus",
        "disk_image": "/img.qcow2",
    }))
    .unwrap();
    assert_eq!(payload.snapshot_name, "fuzzing-ready");
    assert_eq!(payload.timeout_secs, 30);
    assert_eq!(payload.memory_mb, 2048);
    assert!(payload.extra_args.is_empty());
}

#[test]
fn payload_rejects_unknown_keys() {
    let result: Result<JobPayload, _> = serde_json::from_value(serde_json::json!({
        "corpus_dir": "/corpus",
        "disk_image": "/img.qcow2",
        "surprise": true,
    }));
    assert!(result.is_err());
}

#[test]
fn vm_configs_get_distinct_ports_and_shares() {
    let config = WorkerConfig::default();
    let payload: JobPayload = serde_json::from_value(serde_json::json!({
        "corpus_dir": "/corpus",
        "disk_image": "/img.qcow2",
    }))
    .unwrap();

    let configs = build_vm_configs(&payload, 3, &config, JobId(9));
    assert_eq!(configs.len(), 3);

    let monitors: std::collections::BTreeSet<_> =
        configs.iter().map(|c| c.monitor_addr.clone()).collect();
    let shares: std::collections::BTreeSet<_> =
        configs.iter().map(|c| c.share_dir.clone()).collect();
    assert_eq!(monitors.len(), 3, "monitor ports must not collide");
    assert_eq!(shares.len(), 3, "share dirs are per-VM, never shared");
    assert!(shares.iter().all(|p| p.to_string_lossy().contains("/9/")));
}

#[tokio::test]
async fn bad_config_is_refused_without_claiming_the_slot() {
    let config = Arc::new(WorkerConfig::default());
    let state = WorkerState::new();

    let result = launch(descriptor(serde_json::json!({"nope": 1})), config, state.clone());
    assert!(matches!(result, Err(LaunchError::BadConfig(_))));
    assert!(state.active().is_none());
}

#[tokio::test]
async fn second_job_is_refused_as_busy() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("corpus")).unwrap();
    std::fs::write(dir.path().join("corpus").join("seed"), b"x").unwrap();

    let config = Arc::new(WorkerConfig {
        state_dir: dir.path().to_path_buf(),
        qemu_binary: "/nonexistent/qemu".into(),
        ..WorkerConfig::default()
    });
    let state = WorkerState::new();

    let first = launch(descriptor(payload_json(dir.path())), Arc::clone(&config), state.clone());
    assert_eq!(first.unwrap(), JobId(5));

    let second = launch(descriptor(payload_json(dir.path())), config, state.clone());
    assert!(matches!(second, Err(LaunchError::Busy(JobId(5)))));

    // Shut the background task down
    state.cancel_all();
}
