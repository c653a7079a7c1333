// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VM process lifecycle and the per-worker handle registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::monitor::MonitorClient;

fawkes_core::define_id! {
    /// Unique identifier for a VM instance on a worker.
    pub struct VmId("vmi-");
}

/// Full VM boot deadline (cold start from snapshot).
const VM_START_TIMEOUT: Duration = Duration::from_secs(60);
/// How long to wait between monitor-connect attempts while booting.
const START_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum VmError {
    #[error("VM failed to start within {VM_START_TIMEOUT:?}")]
    StartTimeout,

    #[error("VM process error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything needed to launch one VM.
#[derive(Debug, Clone)]
pub struct VmConfig {
    pub qemu_binary: PathBuf,
    pub disk_image: PathBuf,
    pub snapshot_name: String,
    pub memory_mb: u32,
    /// host:port the monitor socket listens on
    pub monitor_addr: String,
    /// host:port the guest agent is reachable at (via port forward)
    pub agent_addr: String,
    /// Host side of the host↔guest share
    pub share_dir: PathBuf,
    /// Extra hypervisor arguments appended verbatim
    pub extra_args: Vec<String>,
}

/// Worker-local record of a live VM.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VmHandle {
    pub vm_id: VmId,
    pub pid: Option<u32>,
    pub monitor_addr: String,
    pub agent_addr: String,
    pub snapshot_name: String,
    pub disk_image: PathBuf,
}

/// A running VM process plus its handle.
pub struct VmInstance {
    handle: VmHandle,
    config: VmConfig,
    child: Child,
}

impl VmInstance {
    /// Launch a VM and wait until its monitor socket accepts connections.
    pub async fn spawn(config: VmConfig) -> Result<VmInstance, VmError> {
        let vm_id = VmId::new();
        let child = launch(&config)?;
        let pid = child.id();
        info!(vm = %vm_id, ?pid, image = %config.disk_image.display(), "VM starting");

        wait_for_monitor(&config.monitor_addr).await?;

        let handle = VmHandle {
            vm_id,
            pid,
            monitor_addr: config.monitor_addr.clone(),
            agent_addr: config.agent_addr.clone(),
            snapshot_name: config.snapshot_name.clone(),
            disk_image: config.disk_image.clone(),
        };
        Ok(VmInstance { handle, config, child })
    }

    pub fn handle(&self) -> &VmHandle {
        &self.handle
    }

    /// Kill the process and relaunch from the named snapshot (the slow
    /// revert path). The handle keeps its vm_id.
    pub async fn restart(&mut self) -> Result<(), VmError> {
        debug!(vm = %self.handle.vm_id, "slow restart");
        self.kill().await;
        let child = launch(&self.config)?;
        self.handle.pid = child.id();
        self.child = child;
        wait_for_monitor(&self.config.monitor_addr).await
    }

    /// Force-kill the VM process. Idempotent.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            // Already gone is fine
            debug!(vm = %self.handle.vm_id, error = %e, "kill");
        }
        let _ = self.child.wait().await;
        self.handle.pid = None;
    }
}

fn launch(config: &VmConfig) -> Result<Child, std::io::Error> {
    let mut command = Command::new(&config.qemu_binary);
    command
        .arg("-m")
        .arg(config.memory_mb.to_string())
        .arg("-drive")
        .arg(format!("file={},format=qcow2", config.disk_image.display()))
        .arg("-loadvm")
        .arg(&config.snapshot_name)
        .arg("-monitor")
        .arg(format!("tcp:{},server,nowait", config.monitor_addr))
        .arg("-virtfs")
        .arg(format!(
            "local,path={},mount_tag=share,security_model=none",
            config.share_dir.display()
        ))
        .arg("-display")
        .arg("none")
        .args(&config.extra_args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    command.spawn()
}

/// Poll the monitor socket until it accepts, bounded by the start timeout.
async fn wait_for_monitor(addr: &str) -> Result<(), VmError> {
    let client = MonitorClient::new(addr);
    let result = tokio::time::timeout(VM_START_TIMEOUT, async {
        loop {
            if client.connect().await.is_ok() {
                return;
            }
            tokio::time::sleep(START_POLL_INTERVAL).await;
        }
    })
    .await;
    match result {
        Ok(()) => Ok(()),
        Err(_) => {
            warn!(addr, "monitor never came up");
            Err(VmError::StartTimeout)
        }
    }
}

/// Worker-local map of live VM handles. Mutations are serialized per map;
/// handles are values, so per-vm updates replace whole entries.
#[derive(Clone, Default)]
pub struct VmRegistry {
    inner: Arc<Mutex<HashMap<VmId, VmHandle>>>,
}

impl VmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: VmHandle) {
        self.inner.lock().insert(handle.vm_id, handle);
    }

    pub fn remove(&self, vm_id: &VmId) -> Option<VmHandle> {
        self.inner.lock().remove(vm_id)
    }

    pub fn get(&self, vm_id: &VmId) -> Option<VmHandle> {
        self.inner.lock().get(vm_id).cloned()
    }

    pub fn list(&self) -> Vec<VmHandle> {
        self.inner.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "vm_tests.rs"]
mod tests;
