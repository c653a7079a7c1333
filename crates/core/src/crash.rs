// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash records and the triage taxonomy.
//!
//! A crash flows through three shapes: the raw [`CrashObservation`] from the
//! guest agent, the worker-triaged [`CrashReport`] shipped to the controller,
//! and the global [`CrashRecord`] the store deduplicates by stack hash.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::job::JobId;
use crate::worker::WorkerId;

/// Stand-in exception code stored for segfaults on platforms that do not
/// supply an NTSTATUS (Linux corefile detection). Not a real NTSTATUS —
/// preserved for harness compatibility.
pub const SEGFAULT_PLACEHOLDER: u64 = 0xC000_0005;

/// Monotone integer identifier for a unique crash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CrashId(pub u64);

impl CrashId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CrashId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CrashId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Severity bands derived from the exploitability score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

crate::simple_display! {
    Severity {
        Info => "info",
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

impl Severity {
    /// Band an exploitability score: <10 Info, <30 Low, <50 Medium,
    /// <70 High, else Critical.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=9 => Severity::Info,
            10..=29 => Severity::Low,
            30..=49 => Severity::Medium,
            50..=69 => Severity::High,
            _ => Severity::Critical,
        }
    }
}

/// Vulnerability classification produced by the triage pattern table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VulnType {
    BufferOverflow,
    UseAfterFree,
    DoubleFree,
    NullDeref,
    IntegerOverflow,
    FormatString,
    Race,
    TypeConfusion,
    PcControl,
    ArbitraryWrite,
    Unknown,
}

crate::simple_display! {
    VulnType {
        BufferOverflow => "buffer-overflow",
        UseAfterFree => "use-after-free",
        DoubleFree => "double-free",
        NullDeref => "null-deref",
        IntegerOverflow => "integer-overflow",
        FormatString => "format-string",
        Race => "race",
        TypeConfusion => "type-confusion",
        PcControl => "pc-control",
        ArbitraryWrite => "arbitrary-write",
        Unknown => "unknown",
    }
}

/// Raw facts captured by the guest agent at crash time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrashObservation {
    pub pid: u32,
    /// Best-effort path of the crashed executable inside the guest
    pub exe: String,
    pub exception_code: u64,
    /// Raw stack frames, innermost first
    #[serde(default)]
    pub stack_frames: Vec<String>,
    /// Register state at the fault, when available
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub registers: HashMap<String, u64>,
    /// Faulting address, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_address: Option<u64>,
    /// Crash artifact (minidump/core) path on the host↔guest share
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
}

/// A worker-triaged crash, ready to ship to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashReport {
    pub job_id: JobId,
    pub observed_at_epoch_ms: u64,
    pub observation: CrashObservation,
    /// Normalized frames the hash was computed over
    pub normalized_frames: Vec<String>,
    pub stack_hash: String,
    pub signature: String,
    pub vuln_type: VulnType,
    /// Confidence of the classification in [0, 1]
    pub confidence: f32,
    pub exploitability_score: u8,
    pub severity: Severity,
}

/// A unique crash in the global store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashRecord {
    pub id: CrashId,
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub timestamp_epoch_ms: u64,
    pub pid: u32,
    pub exe: String,
    pub exception_code: u64,
    pub stack_frames: Vec<String>,
    pub stack_hash: String,
    pub signature: String,
    pub severity: Severity,
    pub exploitability_score: u8,
    pub vuln_type: VulnType,
    /// Set on duplicate reports; a unique crash has `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<CrashId>,
    /// Count of reports with this stack hash, itself included
    #[serde(default = "one")]
    pub duplicate_count: u64,
}

fn one() -> u64 {
    1
}

impl CrashRecord {
    /// Build a unique record from a worker report.
    pub fn from_report(id: CrashId, worker_id: WorkerId, report: &CrashReport) -> Self {
        Self {
            id,
            job_id: report.job_id,
            worker_id,
            timestamp_epoch_ms: report.observed_at_epoch_ms,
            pid: report.observation.pid,
            exe: report.observation.exe.clone(),
            exception_code: report.observation.exception_code,
            stack_frames: report.normalized_frames.clone(),
            stack_hash: report.stack_hash.clone(),
            signature: report.signature.clone(),
            severity: report.severity,
            exploitability_score: report.exploitability_score,
            vuln_type: report.vuln_type,
            duplicate_of: None,
            duplicate_count: 1,
        }
    }
}

#[cfg(test)]
#[path = "crash_tests.rs"]
mod tests;
