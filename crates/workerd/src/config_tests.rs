// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_are_sane() {
    let config = WorkerConfig::default();
    assert_eq!(config.controller_addr, "127.0.0.1:7700");
    assert!(config.max_vms >= 1);
    assert_eq!(config.capabilities().max_vms, config.max_vms);
    assert!(config.arch.contains("x86_64"));
}

#[test]
fn missing_file_yields_defaults() {
    let config = WorkerConfig::from_file(Path::new("/nonexistent/fawkes.toml")).unwrap();
    assert_eq!(config.listen_addr, WorkerConfig::default().listen_addr);
}

#[test]
fn worker_section_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fawkes.toml");
    std::fs::write(
        &path,
        r#"
[controller]
listen_addr = "0.0.0.0:7700"

[worker]
controller_addr = "controller.lab:7700"
listen_addr = "0.0.0.0:7799"
max_vms = 12
tags = ["win10", "x86"]
"#,
    )
    .unwrap();

    let config = WorkerConfig::from_file(&path).unwrap();
    assert_eq!(config.controller_addr, "controller.lab:7700");
    assert_eq!(config.listen_addr, "0.0.0.0:7799");
    assert_eq!(config.max_vms, 12);
    assert!(config.tags.contains("win10"));
}

#[test]
fn jobs_dir_hangs_off_state_dir() {
    let config =
        WorkerConfig { state_dir: PathBuf::from("/var/fw"), ..WorkerConfig::default() };
    assert_eq!(config.jobs_dir(), PathBuf::from("/var/fw/jobs"));
}
