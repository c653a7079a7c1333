// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker configuration (`[worker]` section of `fawkes.toml`).
//!
//! `FAWKES_CONTROLLER_ADDR` and `FAWKES_STATE_DIR` override the file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use fawkes_core::Capabilities;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("cannot parse {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Controller endpoint to register with
    pub controller_addr: String,
    /// TCP address this worker's dispatch endpoint listens on. The
    /// controller connects here, so it must be reachable from it.
    pub listen_addr: String,
    pub state_dir: PathBuf,
    pub qemu_binary: PathBuf,
    /// VM slots this host can run concurrently
    pub max_vms: u32,
    pub cpu_cores: u32,
    pub ram_gb: u32,
    pub tags: BTreeSet<String>,
    pub arch: BTreeSet<String>,
    /// First monitor port; VM i uses `monitor_port_base + i`
    pub monitor_port_base: u16,
    /// First agent forward port; VM i uses `agent_port_base + i`
    pub agent_port_base: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            controller_addr: "127.0.0.1:7700".to_string(),
            listen_addr: "0.0.0.0:7701".to_string(),
            state_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("fawkes-worker"),
            qemu_binary: PathBuf::from("qemu-system-x86_64"),
            max_vms: 4,
            cpu_cores: num_cpus(),
            ram_gb: 8,
            tags: BTreeSet::new(),
            arch: ["x86_64".to_string()].into_iter().collect(),
            monitor_port_base: 4440,
            agent_port_base: 9900,
        }
    }
}

fn num_cpus() -> u32 {
    std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1)
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    worker: Option<WorkerConfig>,
}

impl WorkerConfig {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("fawkes.toml"));
        let mut config = Self::from_file(&path)?;

        if let Ok(addr) = std::env::var("FAWKES_CONTROLLER_ADDR") {
            config.controller_addr = addr;
        }
        if let Ok(dir) = std::env::var("FAWKES_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Read { path: path.display().to_string(), source: e })
            }
        };
        let file: FileConfig = toml::from_str(&text)
            .map_err(|e| ConfigError::Parse { path: path.display().to_string(), source: e })?;
        Ok(file.worker.unwrap_or_default())
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            cpu_cores: self.cpu_cores,
            ram_gb: self.ram_gb,
            max_vms: self.max_vms,
            arch: self.arch.clone(),
        }
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.state_dir.join("jobs")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
