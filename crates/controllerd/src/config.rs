// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller configuration.
//!
//! Read from the `[controller]` section of `fawkes.toml`; a missing file
//! means defaults. `FAWKES_STATE_DIR` and `FAWKES_CONTROLLER_LISTEN`
//! override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use fawkes_scheduler::AllocationStrategy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("cannot parse {path}: {source}")]
    Parse { path: String, source: toml::de::Error },

    #[error("unknown allocation strategy: {0}")]
    UnknownStrategy(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// TCP address the controller endpoint listens on
    pub listen_addr: String,
    pub state_dir: PathBuf,
    pub poll_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    /// Interval handed to workers in the Hello response
    pub heartbeat_interval_secs: u64,
    /// Per-call dispatch deadline
    pub dispatch_timeout_secs: u64,
    pub strategy: String,
    pub allocate_past_head: bool,
    pub dispatch_failure_limit: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7700".to_string(),
            state_dir: default_state_dir(),
            poll_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            heartbeat_interval_secs: 15,
            dispatch_timeout_secs: 5,
            strategy: "load_aware".to_string(),
            allocate_past_head: false,
            dispatch_failure_limit: 3,
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("fawkes")
}

/// The file can carry both daemons' sections; each reads its own.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    controller: Option<ControllerConfig>,
}

impl ControllerConfig {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("fawkes.toml"));
        let mut config = Self::from_file(&path)?;

        if let Ok(dir) = std::env::var("FAWKES_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("FAWKES_CONTROLLER_LISTEN") {
            config.listen_addr = addr;
        }

        // Fail early on a bad strategy string
        config.parsed_strategy()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read { path: path.display().to_string(), source: e })
            }
        };
        let file: FileConfig = toml::from_str(&text)
            .map_err(|e| ConfigError::Parse { path: path.display().to_string(), source: e })?;
        Ok(file.controller.unwrap_or_default())
    }

    pub fn parsed_strategy(&self) -> Result<AllocationStrategy, ConfigError> {
        AllocationStrategy::parse(&self.strategy)
            .ok_or_else(|| ConfigError::UnknownStrategy(self.strategy.clone()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn heartbeat_timeout_ms(&self) -> u64 {
        self.heartbeat_timeout_secs * 1_000
    }

    pub fn wal_path(&self) -> PathBuf {
        self.state_dir.join("scheduler.wal")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("snapshot.json.zst")
    }

    pub fn crashes_dir(&self) -> PathBuf {
        self.state_dir.join("crashes")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.state_dir.join("fawkesd.pid")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
