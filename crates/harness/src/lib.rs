// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The fuzzing harness: per-job orchestration of a pool of VM runners fed
//! by a testcase producer, with crashes triaged and shipped upstream.

mod harness;
mod pipeline;
mod progress;
mod runner;
mod source;

pub use harness::{Harness, HarnessConfig, HarnessError, HarnessOutcome};
pub use pipeline::{spawn_pipeline, CrashSubmission, TriagedCrash};
pub use progress::ProgressCounters;
pub use runner::{RunnerExit, VmRunner, VmRunnerConfig};
pub use source::{
    spawn_producer, CorpusSource, SharedTestcases, SourceError, Testcase, TestcaseSource,
};
