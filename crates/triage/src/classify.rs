// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vulnerability classification.
//!
//! A crash is matched against an ordered rule table; the first rule whose
//! predicate fires wins, and its weight becomes the confidence. Deployments
//! with target-specific knowledge prepend their own rules via
//! [`Classifier::with_rules`].

use fawkes_core::{CrashObservation, VulnType};

/// Fault addresses below this are "near null".
const NEAR_NULL: u64 = 0x1000;

/// One classification rule.
#[derive(Clone)]
pub struct Rule {
    pub vuln_type: VulnType,
    /// Confidence assigned when this rule matches, in [0, 1]
    pub weight: f32,
    pub matches: fn(&CrashObservation, &[String]) -> bool,
}

/// Classification result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifiedCrash {
    pub vuln_type: VulnType,
    pub confidence: f32,
}

/// Ordered rule table; first match wins.
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self { rules: builtin_rules() }
    }
}

impl Classifier {
    /// Built-in table with `extra` rules tried first.
    pub fn with_rules(extra: Vec<Rule>) -> Self {
        let mut rules = extra;
        rules.extend(builtin_rules());
        Self { rules }
    }

    pub fn classify(
        &self,
        observation: &CrashObservation,
        normalized_frames: &[String],
    ) -> ClassifiedCrash {
        for rule in &self.rules {
            if (rule.matches)(observation, normalized_frames) {
                return ClassifiedCrash { vuln_type: rule.vuln_type, confidence: rule.weight };
            }
        }
        ClassifiedCrash { vuln_type: VulnType::Unknown, confidence: 0.1 }
    }
}

/// A value that looks attacker-controlled: one byte repeated across the
/// whole word (0x4141..., 0x61616161, ...).
pub(crate) fn repeated_byte_pattern(value: u64) -> bool {
    if value == 0 {
        return false;
    }
    let byte = value & 0xff;
    let mut v = value;
    while v != 0 {
        if v & 0xff != byte {
            return false;
        }
        v >>= 8;
    }
    // A single byte is too little signal
    value > 0xff
}

/// Instruction-pointer register value, whatever the architecture calls it.
pub(crate) fn pc_register(observation: &CrashObservation) -> Option<u64> {
    ["rip", "eip", "pc"].iter().find_map(|name| observation.registers.get(*name).copied())
}

fn frames_contain(frames: &[String], needles: &[&str]) -> bool {
    frames.iter().any(|f| needles.iter().any(|n| f.contains(n)))
}

fn top_frames_contain(frames: &[String], needles: &[&str]) -> bool {
    frames.iter().take(3).any(|f| needles.iter().any(|n| f.contains(n)))
}

fn builtin_rules() -> Vec<Rule> {
    vec![
        // Crashing instruction pointer equals an attacker-influenced pattern
        Rule {
            vuln_type: VulnType::PcControl,
            weight: 0.95,
            matches: |obs, _| pc_register(obs).is_some_and(repeated_byte_pattern),
        },
        // Controlled sink address + controlled data
        Rule {
            vuln_type: VulnType::ArbitraryWrite,
            weight: 0.9,
            matches: |obs, _| {
                obs.fault_address.is_some_and(repeated_byte_pattern)
                    && obs.registers.values().any(|v| repeated_byte_pattern(*v))
            },
        },
        // Allocator assertion with two free frames
        Rule {
            vuln_type: VulnType::DoubleFree,
            weight: 0.85,
            matches: |_, frames| {
                frames.iter().filter(|f| f.contains("free")).count() >= 2
                    && frames_contain(frames, &["malloc_printerr", "abort", "assert"])
            },
        },
        // Heap allocator abort / freed-region access
        Rule {
            vuln_type: VulnType::UseAfterFree,
            weight: 0.8,
            matches: |_, frames| {
                frames_contain(frames, &["malloc_printerr", "_int_free", "use-after-free"])
                    || (frames_contain(frames, &["free"]) && frames_contain(frames, &["heap"]))
            },
        },
        // Stack canary / long-string sink in the top frames
        Rule {
            vuln_type: VulnType::BufferOverflow,
            weight: 0.8,
            matches: |_, frames| {
                frames_contain(frames, &["__stack_chk_fail", "stack_smashing", "gsfailure"])
                    || top_frames_contain(frames, &["strcpy", "strcat", "sprintf", "memcpy", "gets"])
            },
        },
        // %n / %s style indicators
        Rule {
            vuln_type: VulnType::FormatString,
            weight: 0.75,
            matches: |_, frames| top_frames_contain(frames, &["printf", "vfprintf", "vsnprintf"]),
        },
        // vtable / dispatch-table-adjacent faults
        Rule {
            vuln_type: VulnType::TypeConfusion,
            weight: 0.7,
            matches: |_, frames| frames_contain(frames, &["vtable", "dynamic_cast", "vfptr"]),
        },
        // Allocator inconsistency with multiple threads in the trace
        Rule {
            vuln_type: VulnType::Race,
            weight: 0.6,
            matches: |_, frames| {
                frames_contain(frames, &["pthread", "thread_start", "beginthread"])
                    && frames_contain(frames, &["malloc", "free"])
            },
        },
        // Arithmetic-near-bounds pattern
        Rule {
            vuln_type: VulnType::IntegerOverflow,
            weight: 0.6,
            matches: |_, frames| {
                frames_contain(frames, &["__mulodi", "__ubsan", "overflow"])
            },
        },
        // Fault address near 0: low exploitability
        Rule {
            vuln_type: VulnType::NullDeref,
            weight: 0.9,
            matches: |obs, _| obs.fault_address.is_some_and(|a| a < NEAR_NULL),
        },
    ]
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
