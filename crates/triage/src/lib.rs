// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Crash triage: stack normalization, deduplication hashes, vulnerability
//! classification, and exploitability scoring.
//!
//! Everything here is a pure function of the crash observation, so two
//! workers triaging the same crash produce byte-identical hashes.

mod classify;
mod normalize;
mod score;

pub use classify::{ClassifiedCrash, Classifier, Rule};
pub use normalize::{normalize_stack, signature, stack_hash, MAX_FRAMES};
pub use score::exploitability_score;

use fawkes_core::{CrashObservation, CrashReport, JobId, Severity};

/// Run the full worker-side triage pipeline over one observation.
pub fn triage(
    job_id: JobId,
    observation: CrashObservation,
    observed_at_epoch_ms: u64,
    classifier: &Classifier,
) -> CrashReport {
    let normalized_frames = normalize_stack(&observation.stack_frames);
    let stack_hash = stack_hash(&normalized_frames);
    let signature = signature(observation.exception_code, &normalized_frames);
    let classified = classifier.classify(&observation, &normalized_frames);
    let exploitability_score = exploitability_score(&observation, &normalized_frames);
    let severity = Severity::from_score(exploitability_score);

    CrashReport {
        job_id,
        observed_at_epoch_ms,
        observation,
        normalized_frames,
        stack_hash,
        signature,
        vuln_type: classified.vuln_type,
        confidence: classified.confidence,
        exploitability_score,
        severity,
    }
}

#[cfg(test)]
#[path = "triage_tests.rs"]
mod tests;
