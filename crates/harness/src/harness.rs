// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-job harness: spawns and supervises the VM runner pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fawkes_core::{Clock, JobId};
use fawkes_triage::Classifier;
use fawkes_vmm::{VmConfig, VmError, VmInstance};

use crate::pipeline::{spawn_pipeline, TriagedCrash};
use crate::progress::ProgressCounters;
use crate::runner::{RunnerExit, VmRunner, VmRunnerConfig};
use crate::source::{spawn_producer, TestcaseSource};

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Hard wall-clock limit per execution
    pub exec_timeout: Duration,
    /// How long cancellation waits for in-flight testcases before VMs are
    /// force-killed
    pub grace: Duration,
    /// Bound for the testcase and crash channels (backpressure limit)
    pub channel_capacity: usize,
    /// Where crash artifacts are staged
    pub artifact_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            exec_timeout: Duration::from_secs(30),
            grace: Duration::from_secs(30),
            channel_capacity: 64,
            artifact_dir: PathBuf::from("artifacts"),
        }
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("no VMs could be started")]
    NoVms,

    #[error("VM error: {0}")]
    Vm(#[from] VmError),
}

/// How a harness run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessOutcome {
    pub executions: u64,
    pub crashes: u64,
    pub cancelled: bool,
}

/// Owns one job's runner pool. Crashes flow out through the `shipper`
/// channel handed to [`Harness::run`]; progress is shared via
/// [`Harness::counters`].
pub struct Harness<C: Clock> {
    job_id: JobId,
    config: HarnessConfig,
    classifier: Arc<Classifier>,
    clock: C,
    counters: Arc<ProgressCounters>,
    cancel: CancellationToken,
}

impl<C: Clock + 'static> Harness<C> {
    pub fn new(job_id: JobId, config: HarnessConfig, clock: C) -> Self {
        Self {
            job_id,
            config,
            classifier: Arc::new(Classifier::default()),
            clock,
            counters: Arc::new(ProgressCounters::new(job_id)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Shared counters for the heartbeat emitter.
    pub fn counters(&self) -> Arc<ProgressCounters> {
        Arc::clone(&self.counters)
    }

    /// Token that stops the pool. Cancelling is idempotent.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the pool: one runner per VM config, all fed from `source`, all
    /// reporting crashes through `shipper`. Returns when the source drains,
    /// cancellation completes, or every VM has failed.
    pub async fn run(
        self,
        vm_configs: Vec<VmConfig>,
        source: Box<dyn TestcaseSource>,
        shipper: mpsc::Sender<TriagedCrash>,
    ) -> Result<HarnessOutcome, HarnessError> {
        let (testcases, producer) =
            spawn_producer(source, self.config.channel_capacity, self.cancel.clone());
        let (submissions, pipeline) = spawn_pipeline(
            self.job_id,
            Arc::clone(&self.classifier),
            self.clock.clone(),
            self.config.channel_capacity,
            shipper,
        );

        let mut pool: JoinSet<RunnerExit> = JoinSet::new();
        let mut started = 0usize;
        for vm_config in &vm_configs {
            match self.start_runner(vm_config.clone(), &testcases, &submissions).await {
                Ok(task) => {
                    pool.spawn(task);
                    started += 1;
                }
                Err(e) => warn!(job = %self.job_id, error = %e, "VM failed to start"),
            }
        }
        if started == 0 {
            producer.abort();
            pipeline.abort();
            return Err(HarnessError::NoVms);
        }
        info!(job = %self.job_id, vms = started, "harness running");

        // Supervise: replace failed VMs, stop when the pool empties. Once
        // cancellation fires, runners get the grace window to drain their
        // in-flight testcase before the pool is aborted (dropping a runner
        // kills its VM).
        let mut cancelled = false;
        loop {
            let joined = if self.cancel.is_cancelled() {
                match tokio::time::timeout(self.config.grace, pool.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(job = %self.job_id, "grace window expired, force-killing VMs");
                        pool.abort_all();
                        while pool.join_next().await.is_some() {}
                        cancelled = true;
                        break;
                    }
                }
            } else {
                pool.join_next().await
            };
            let Some(joined) = joined else { break };
            match joined {
                Ok(RunnerExit::VmFailed) if !self.cancel.is_cancelled() => {
                    // Round-robin over the original configs for a fresh VM
                    let vm_config = vm_configs[started % vm_configs.len()].clone();
                    started += 1;
                    match self.start_runner(vm_config, &testcases, &submissions).await {
                        Ok(task) => {
                            pool.spawn(task);
                        }
                        Err(e) => {
                            warn!(job = %self.job_id, error = %e, "replacement VM failed")
                        }
                    }
                }
                Ok(RunnerExit::Cancelled) => cancelled = true,
                Ok(_) | Err(_) => {}
            }
        }

        // Drain the support tasks: the producer stops once every runner
        // (receiver handle) is gone.
        drop(testcases);
        drop(submissions);
        let _ = tokio::time::timeout(self.config.grace, producer).await;
        let _ = tokio::time::timeout(self.config.grace, pipeline).await;

        Ok(HarnessOutcome {
            executions: self.counters.executions(),
            crashes: self.counters.crashes(),
            cancelled: cancelled || self.cancel.is_cancelled(),
        })
    }

    async fn start_runner(
        &self,
        vm_config: VmConfig,
        testcases: &crate::source::SharedTestcases,
        submissions: &mpsc::Sender<crate::pipeline::CrashSubmission>,
    ) -> Result<impl std::future::Future<Output = RunnerExit>, VmError> {
        let share_dir = vm_config.share_dir.clone();
        let vm = VmInstance::spawn(vm_config).await?;
        let runner = VmRunner::new(
            vm,
            share_dir,
            VmRunnerConfig {
                exec_timeout: self.config.exec_timeout,
                artifact_dir: self.config.artifact_dir.clone(),
            },
            Arc::clone(testcases),
            submissions.clone(),
            Arc::clone(&self.counters),
            self.cancel.clone(),
        );
        Ok(runner.run())
    }
}

#[cfg(test)]
#[path = "harness_tests.rs"]
mod tests;
