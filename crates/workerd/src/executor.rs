// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job execution: accepted descriptor → harness run → JobDone.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use fawkes_core::{JobId, JobStatus, SystemClock};
use fawkes_harness::{CorpusSource, Harness, HarnessConfig, TriagedCrash};
use fawkes_vmm::VmConfig;
use fawkes_wire::{call_with_retry, JobDescriptor, Request, Response, RetryPolicy};

use crate::config::WorkerConfig;
use crate::state::{ActiveJob, WorkerState};

const RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("busy with job {0}")]
    Busy(JobId),

    #[error("bad job config: {0}")]
    BadConfig(String),
}

/// The harness-facing half of a job's opaque `config` blob.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobPayload {
    /// Directory of seed testcases on this worker
    corpus_dir: PathBuf,
    disk_image: PathBuf,
    #[serde(default = "default_snapshot")]
    snapshot_name: String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default = "default_memory_mb")]
    memory_mb: u32,
    #[serde(default)]
    extra_args: Vec<String>,
}

fn default_snapshot() -> String {
    "fuzzing-ready".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_memory_mb() -> u32 {
    2048
}

/// Claim the job slot and spawn the execution task. Synchronous so the
/// dispatch endpoint can answer accept/refuse immediately.
pub fn launch(
    descriptor: JobDescriptor,
    config: Arc<WorkerConfig>,
    state: WorkerState,
) -> Result<JobId, LaunchError> {
    let payload: JobPayload = serde_json::from_value(descriptor.config.clone())
        .map_err(|e| LaunchError::BadConfig(e.to_string()))?;

    let job_id = descriptor.job_id;
    let vms = descriptor.resources.vms.max(1).min(config.max_vms.max(1));

    let harness = Harness::new(
        job_id,
        HarnessConfig {
            exec_timeout: Duration::from_secs(payload.timeout_secs),
            artifact_dir: config.jobs_dir().join(job_id.to_string()).join("artifacts"),
            ..HarnessConfig::default()
        },
        SystemClock,
    );

    let active = ActiveJob {
        job_id,
        cancel: harness.cancel_token(),
        counters: harness.counters(),
        reserved_vms: vms,
    };
    state.try_claim(active).map_err(LaunchError::Busy)?;

    tokio::spawn(run_job(descriptor, payload, vms, harness, config, state));
    Ok(job_id)
}

async fn run_job(
    descriptor: JobDescriptor,
    payload: JobPayload,
    vms: u32,
    harness: Harness<SystemClock>,
    config: Arc<WorkerConfig>,
    state: WorkerState,
) {
    let job_id = descriptor.job_id;
    let outcome = execute(&descriptor, payload, vms, harness, &config, &state).await;

    match outcome {
        Ok(None) => {
            // Cancelled: the controller already holds the terminal state
            info!(job = %job_id, "job drained after cancellation");
        }
        Ok(Some((status, reason))) => report_done(&config, &state, job_id, status, reason).await,
        Err(reason) => {
            report_done(&config, &state, job_id, JobStatus::Failed, Some(reason)).await
        }
    }
    state.release(job_id);
}

/// Run the harness. `Ok(None)` means cancelled; `Ok(Some(..))` carries the
/// terminal status to report.
async fn execute(
    descriptor: &JobDescriptor,
    payload: JobPayload,
    vms: u32,
    harness: Harness<SystemClock>,
    config: &Arc<WorkerConfig>,
    state: &WorkerState,
) -> Result<Option<(JobStatus, Option<String>)>, String> {
    let job_id = descriptor.job_id;
    let source = CorpusSource::open(&payload.corpus_dir).map_err(|e| e.to_string())?;
    let vm_configs = build_vm_configs(&payload, vms, config, job_id);

    // Shipper: triaged crashes → controller, with retry
    let (shipper_tx, shipper_rx) = mpsc::channel::<TriagedCrash>(64);
    let shipper = tokio::spawn(ship_crashes(
        config.controller_addr.clone(),
        state.clone(),
        shipper_rx,
    ));

    let outcome = harness.run(vm_configs, Box::new(source), shipper_tx).await;
    let _ = shipper.await;

    match outcome {
        Ok(outcome) if outcome.cancelled => Ok(None),
        Ok(outcome) => {
            info!(
                job = %job_id,
                executions = outcome.executions,
                crashes = outcome.crashes,
                "job completed"
            );
            Ok(Some((JobStatus::Completed, None)))
        }
        Err(e) => Err(e.to_string()),
    }
}

fn build_vm_configs(
    payload: &JobPayload,
    vms: u32,
    config: &WorkerConfig,
    job_id: JobId,
) -> Vec<VmConfig> {
    (0..vms)
        .map(|i| VmConfig {
            qemu_binary: config.qemu_binary.clone(),
            disk_image: payload.disk_image.clone(),
            snapshot_name: payload.snapshot_name.clone(),
            memory_mb: payload.memory_mb,
            monitor_addr: format!("127.0.0.1:{}", config.monitor_port_base + i as u16),
            agent_addr: format!("127.0.0.1:{}", config.agent_port_base + i as u16),
            share_dir: config
                .jobs_dir()
                .join(job_id.to_string())
                .join(format!("vm{i}"))
                .join("share"),
            extra_args: payload.extra_args.clone(),
        })
        .collect()
}

/// Upload triaged crashes until the pipeline closes.
async fn ship_crashes(
    controller_addr: String,
    state: WorkerState,
    mut crashes: mpsc::Receiver<TriagedCrash>,
) {
    while let Some(triaged) = crashes.recv().await {
        let Some(worker_id) = state.worker_id() else {
            continue;
        };
        let request = Request::ReportCrash {
            worker_id,
            report: triaged.report.clone(),
            testcase: triaged.testcase.bytes.clone(),
        };
        match call_with_retry::<_, Response>(
            &controller_addr,
            &request,
            RPC_TIMEOUT,
            RetryPolicy::default(),
        )
        .await
        {
            Ok(Response::CrashAck { crash_id, is_duplicate }) => {
                info!(
                    crash = %crash_id,
                    duplicate = is_duplicate,
                    hash = fawkes_core::short(&triaged.report.stack_hash, 12),
                    "crash shipped"
                );
            }
            Ok(other) => warn!(?other, "unexpected crash upload response"),
            Err(e) => error!(error = %e, "crash upload failed, dropping report"),
        }
    }
}

/// Report the job's terminal status, retrying through transient failures.
async fn report_done(
    config: &WorkerConfig,
    state: &WorkerState,
    job_id: JobId,
    status: JobStatus,
    failure_reason: Option<String>,
) {
    let Some(worker_id) = state.worker_id() else {
        return;
    };
    let request = Request::JobDone { worker_id, job_id, status, failure_reason };
    match call_with_retry::<_, Response>(
        &config.controller_addr,
        &request,
        RPC_TIMEOUT,
        RetryPolicy::default(),
    )
    .await
    {
        Ok(Response::Ok) => {}
        Ok(Response::Error { kind, message }) => {
            // Racing the health monitor: the job may already be re-queued
            warn!(job = %job_id, %kind, message, "JobDone rejected")
        }
        Ok(other) => warn!(job = %job_id, ?other, "unexpected JobDone response"),
        Err(e) => error!(job = %job_id, error = %e, "JobDone failed"),
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
