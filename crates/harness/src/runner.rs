// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The VM runner hot loop.
//!
//! One runner owns one VM for the life of a job: pull a testcase, stage it
//! on the share, revert the VM to the fuzzing-ready snapshot, let the
//! target consume it, and poll the guest agent for a verdict. One testcase
//! touches one VM, exactly once; retries live at the scheduler layer, not
//! here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fawkes_vmm::{AgentClient, MonitorClient, RevertEngine, VmInstance};

use crate::pipeline::CrashSubmission;
use crate::progress::ProgressCounters;
use crate::source::{SharedTestcases, Testcase};

/// Name the staged testcase gets on the share. The snapshot's in-guest
/// driver watches for it; any name works as long as both sides agree.
const STAGED_NAME: &str = "testcase.bin";

#[derive(Debug, Clone)]
pub struct VmRunnerConfig {
    /// Hard wall-clock limit for one execution (agent poll)
    pub exec_timeout: Duration,
    /// Directory where crash artifacts are staged before upload
    pub artifact_dir: PathBuf,
}

/// Why the runner's loop ended.
#[derive(Debug, PartialEq, Eq)]
pub enum RunnerExit {
    /// Testcase stream drained
    Drained,
    /// Stop signal fired
    Cancelled,
    /// Both revert paths failed; the harness should replace this VM
    VmFailed,
}

pub struct VmRunner {
    vm: VmInstance,
    revert: RevertEngine,
    agent: AgentClient,
    /// Host side of this VM's private share directory
    share_dir: PathBuf,
    config: VmRunnerConfig,
    testcases: SharedTestcases,
    crashes: mpsc::Sender<CrashSubmission>,
    counters: Arc<ProgressCounters>,
    cancel: CancellationToken,
}

impl VmRunner {
    pub fn new(
        vm: VmInstance,
        share_dir: PathBuf,
        config: VmRunnerConfig,
        testcases: SharedTestcases,
        crashes: mpsc::Sender<CrashSubmission>,
        counters: Arc<ProgressCounters>,
        cancel: CancellationToken,
    ) -> Self {
        let handle = vm.handle();
        let revert = RevertEngine::new(
            MonitorClient::new(&handle.monitor_addr),
            AgentClient::new(&handle.agent_addr),
            &handle.snapshot_name,
        );
        let agent = AgentClient::new(&handle.agent_addr);
        Self { vm, revert, agent, share_dir, config, testcases, crashes, counters, cancel }
    }

    pub fn revert_stats(&self) -> fawkes_vmm::RevertStatsSnapshot {
        self.revert.stats()
    }

    /// Drive the loop until drained, cancelled, or the VM gives out.
    /// Consumes the runner; the VM dies with it.
    pub async fn run(mut self) -> RunnerExit {
        let vm_id = self.vm.handle().vm_id;
        info!(vm = %vm_id, "runner started");
        loop {
            let testcase = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.shutdown().await;
                    return RunnerExit::Cancelled;
                }
                testcase = next_testcase(&self.testcases) => match testcase {
                    Some(t) => t,
                    None => {
                        self.shutdown().await;
                        return RunnerExit::Drained;
                    }
                },
            };

            if let Err(exit) = self.execute(testcase).await {
                self.shutdown().await;
                return exit;
            }
        }
    }

    /// One iteration: stage → revert → agent poll → maybe submit crash.
    async fn execute(&mut self, testcase: Testcase) -> Result<(), RunnerExit> {
        if let Err(e) = self.stage(&testcase) {
            warn!(error = %e, "staging failed");
            return Err(RunnerExit::VmFailed);
        }

        self.revert_with_fallback().await?;

        match self.agent.wait_for_crash(self.config.exec_timeout).await {
            Ok(Some(observation)) => {
                self.counters.record_execution();
                self.counters.record_crash();
                let artifact = self.copy_artifact(observation.artifact_path.as_deref());
                let submission = CrashSubmission { observation, testcase, artifact };
                // Bounded channel: backpressure pauses this runner
                if self.crashes.send(submission).await.is_err() {
                    return Err(RunnerExit::Cancelled);
                }
            }
            Ok(None) => {
                // Clean execution (or hang — the next revert clears it)
                self.counters.record_execution();
            }
            Err(e) => {
                debug!(error = %e, "agent poll failed; reverting");
                self.counters.record_execution();
            }
        }
        Ok(())
    }

    fn stage(&self, testcase: &Testcase) -> std::io::Result<()> {
        stage_testcase(&self.share_dir, &testcase.bytes)
    }

    /// Fast revert; on failure one slow-path retry (full stop + relaunch);
    /// a second failure fails the runner.
    async fn revert_with_fallback(&mut self) -> Result<(), RunnerExit> {
        match self.revert.fast_revert().await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(vm = %self.vm.handle().vm_id, error = %e, "fast revert failed, going slow");
                let started = Instant::now();
                match self.vm.restart().await {
                    Ok(()) => {
                        self.revert.record_slow(started.elapsed());
                        Ok(())
                    }
                    Err(e) => {
                        warn!(vm = %self.vm.handle().vm_id, error = %e, "slow revert failed too");
                        Err(RunnerExit::VmFailed)
                    }
                }
            }
        }
    }

    fn copy_artifact(&self, artifact_path: Option<&str>) -> Option<Vec<u8>> {
        copy_artifact(&self.share_dir, &self.config.artifact_dir, artifact_path)
    }

    async fn shutdown(&mut self) {
        self.vm.kill().await;
    }
}

/// Pull the next testcase from the shared receiver.
async fn next_testcase(shared: &SharedTestcases) -> Option<Testcase> {
    shared.lock().await.recv().await
}

/// Atomically replace the staged testcase on the share (tmp + rename, so
/// the guest never sees a half-written file).
fn stage_testcase(share_dir: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(share_dir)?;
    let target = share_dir.join(STAGED_NAME);
    let tmp = share_dir.join(".testcase.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, &target)
}

/// Copy the guest's crash artifact off the share before the next revert
/// releases it. Only the file name of the agent-reported path is trusted.
fn copy_artifact(
    share_dir: &std::path::Path,
    artifact_dir: &std::path::Path,
    artifact_path: Option<&str>,
) -> Option<Vec<u8>> {
    // Guests report their own path flavor; split on both separators and
    // trust only the file name
    let reported = artifact_path?;
    let file_name = reported.rsplit(['/', '\\']).next().filter(|n| !n.is_empty())?;
    let host_path = share_dir.join(file_name);
    match std::fs::read(&host_path) {
        Ok(bytes) => {
            let staged = artifact_dir.join(file_name);
            if let Err(e) = std::fs::create_dir_all(artifact_dir)
                .and_then(|()| std::fs::write(&staged, &bytes))
            {
                debug!(error = %e, "artifact staging failed");
            }
            Some(bytes)
        }
        Err(e) => {
            debug!(path = %host_path.display(), error = %e, "artifact unreadable");
            None
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
