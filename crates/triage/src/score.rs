// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exploitability scoring.
//!
//! Weighted indicators are summed and clamped to [0, 100]. The bands map to
//! severity in `fawkes_core::Severity::from_score`.

use fawkes_core::CrashObservation;

use crate::classify::{pc_register, repeated_byte_pattern};

struct Indicator {
    weight: u32,
    present: fn(&CrashObservation, &[String]) -> bool,
}

const INDICATORS: &[Indicator] = &[
    // PC control: the strongest single signal
    Indicator {
        weight: 40,
        present: |obs, _| pc_register(obs).is_some_and(repeated_byte_pattern),
    },
    // Write-what-where shape
    Indicator {
        weight: 30,
        present: |obs, _| {
            obs.fault_address.is_some_and(repeated_byte_pattern)
                && obs.registers.values().any(|v| repeated_byte_pattern(*v))
        },
    },
    // Stack corruption
    Indicator {
        weight: 25,
        present: |_, frames| {
            frames.iter().any(|f| {
                f.contains("__stack_chk_fail") || f.contains("stack_smashing") || f.contains("gsfailure")
            })
        },
    },
    // Heap corruption
    Indicator {
        weight: 20,
        present: |_, frames| {
            frames.iter().any(|f| f.contains("malloc_printerr") || f.contains("_int_free"))
        },
    },
    // Any attacker-patterned register at all
    Indicator {
        weight: 15,
        present: |obs, _| obs.registers.values().any(|v| repeated_byte_pattern(*v)),
    },
    // Fault at a mapped-looking (non-null, non-patterned) address still
    // beats a clean null deref
    Indicator {
        weight: 10,
        present: |obs, _| obs.fault_address.is_some_and(|a| a >= 0x1000),
    },
    // Near-null deref: usually a crash, rarely a primitive
    Indicator {
        weight: 5,
        present: |obs, _| obs.fault_address.is_some_and(|a| a < 0x1000),
    },
];

/// Sum the matched indicator weights, clamped to [0, 100].
pub fn exploitability_score(observation: &CrashObservation, normalized_frames: &[String]) -> u8 {
    let total: u32 = INDICATORS
        .iter()
        .filter(|i| (i.present)(observation, normalized_frames))
        .map(|i| i.weight)
        .sum();
    total.min(100) as u8
}

#[cfg(test)]
#[path = "score_tests.rs"]
mod tests;
