// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side crash pipeline stage.
//!
//! Runners submit raw observations; one pipeline task triages them
//! (normalize, hash, classify, score) and forwards the result to the
//! shipper. Both channels are bounded: a target that crashes on every
//! input backpressures the runners instead of buffering without limit.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use fawkes_core::{Clock, CrashObservation, CrashReport, JobId};
use fawkes_triage::Classifier;

use crate::source::Testcase;

/// What a runner hands the pipeline: the observation plus the testcase
/// that provoked it.
#[derive(Debug, Clone)]
pub struct CrashSubmission {
    pub observation: CrashObservation,
    pub testcase: Testcase,
    /// Crash artifact copied out of the share before the revert, if any
    pub artifact: Option<Vec<u8>>,
}

/// A triaged crash ready for upload.
#[derive(Debug, Clone)]
pub struct TriagedCrash {
    pub report: CrashReport,
    pub testcase: Testcase,
    pub artifact: Option<Vec<u8>>,
}

/// Spawn the pipeline task. Returns the submission sender (clone per
/// runner) and the join handle; triaged crashes flow into `shipper`.
pub fn spawn_pipeline<C: Clock + 'static>(
    job_id: JobId,
    classifier: Arc<Classifier>,
    clock: C,
    capacity: usize,
    shipper: mpsc::Sender<TriagedCrash>,
) -> (mpsc::Sender<CrashSubmission>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<CrashSubmission>(capacity);
    let handle = tokio::spawn(async move {
        while let Some(submission) = rx.recv().await {
            let report = fawkes_triage::triage(
                job_id,
                submission.observation,
                clock.epoch_ms(),
                &classifier,
            );
            debug!(
                job = %job_id,
                hash = fawkes_core::short(&report.stack_hash, 12),
                vuln = %report.vuln_type,
                score = report.exploitability_score,
                "crash triaged"
            );
            let triaged = TriagedCrash {
                report,
                testcase: submission.testcase,
                artifact: submission.artifact,
            };
            if shipper.send(triaged).await.is_err() {
                // Shipper gone; nothing left to do
                return;
            }
        }
    });
    (tx, handle)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
