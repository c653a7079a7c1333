// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker records, capabilities, and load reporting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

crate::define_id! {
    /// Unique identifier for a registered worker.
    ///
    /// Allocated on first registration; re-registration with a known address
    /// returns the existing ID.
    pub struct WorkerId("wkr-");
}

/// Status of a worker as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Heartbeating and has spare VM capacity
    Online,
    /// Heartbeating with all VM slots reserved
    Busy,
    /// Heartbeat timed out or dispatch failures exceeded the limit
    Offline,
}

crate::simple_display! {
    WorkerStatus {
        Online => "online",
        Busy => "busy",
        Offline => "offline",
    }
}

impl WorkerStatus {
    pub fn parse(s: &str) -> Option<WorkerStatus> {
        match s {
            "online" => Some(WorkerStatus::Online),
            "busy" => Some(WorkerStatus::Busy),
            "offline" => Some(WorkerStatus::Offline),
            _ => None,
        }
    }
}

/// Static capabilities a worker advertises at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub cpu_cores: u32,
    pub ram_gb: u32,
    /// Maximum concurrent VM slots
    pub max_vms: u32,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub arch: BTreeSet<String>,
}

/// Instantaneous load reported with each heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerLoad {
    pub used_vms: u32,
    pub cpu_percent: f32,
    pub ram_percent: f32,
    pub active_jobs: u32,
}

impl WorkerLoad {
    /// VM slot utilization in [0, 1]; a zero-capacity worker counts as full.
    pub fn vm_util(&self, max_vms: u32) -> f64 {
        if max_vms == 0 {
            1.0
        } else {
            f64::from(self.used_vms) / f64::from(max_vms)
        }
    }
}

/// A worker as tracked by the scheduler store.
///
/// Heartbeat/load state is runtime-only and lives in the store's transient
/// side table, not here: after a controller restart every worker is offline
/// until its next heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    /// host:port of the worker's dispatch endpoint
    pub address: String,
    pub hostname: String,
    pub capabilities: Capabilities,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    pub registered_at_epoch_ms: u64,
}

impl WorkerRecord {
    /// Whether this worker's static shape can satisfy `required_tags`.
    pub fn has_tags(&self, required_tags: &BTreeSet<String>) -> bool {
        required_tags.is_subset(&self.tags)
    }
}

crate::builder! {
    pub struct WorkerRecordBuilder => WorkerRecord {
        into {
            address: String = "127.0.0.1:7700",
            hostname: String = "test-host",
        }
        set {
            id: WorkerId = WorkerId::from_string("wkr-test000000000000000"),
            capabilities: Capabilities = Capabilities {
                cpu_cores: 8,
                ram_gb: 16,
                max_vms: 4,
                arch: BTreeSet::new(),
            },
            tags: BTreeSet<String> = BTreeSet::new(),
            registered_at_epoch_ms: u64 = 1_000_000,
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
