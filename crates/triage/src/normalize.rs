// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic stack normalization and dedup hashes.
//!
//! The normalization rule, in order:
//! 1. Trim everything above (and including) the topmost signal-handler or
//!    exception-dispatch frame — the crash is in the code below it.
//! 2. Strip trailing `_N` / `.N` numeric suffixes (`memcpy_2` → `memcpy`,
//!    `parse.isra.7` → `parse.isra`) so compiler clones collapse.
//! 3. Lowercase (symbol case differs across toolchains).
//! 4. Keep the first [`MAX_FRAMES`] frames.
//!
//! Two crashes are duplicates iff their normalized stacks hash equal.

use sha2::{Digest, Sha256};

/// Frames kept after normalization.
pub const MAX_FRAMES: usize = 16;

/// Signal-trampoline / exception-dispatch frames that sit above the real
/// crash site. Matched case-insensitively as substrings.
const HANDLER_MARKERS: &[&str] = &[
    "kiuserexceptiondispatcher",
    "__restore_rt",
    "_sigtramp",
    "signal_handler",
    "abort_message",
];

/// Normalize raw frames (innermost first) per the module rule.
pub fn normalize_stack(frames: &[String]) -> Vec<String> {
    // Topmost handler frame = last marker hit in the leading machinery;
    // everything at or above it is trampoline noise.
    let start = frames
        .iter()
        .rposition(|f| {
            let lower = f.to_ascii_lowercase();
            HANDLER_MARKERS.iter().any(|m| lower.contains(m))
        })
        .map(|i| i + 1)
        .unwrap_or(0);

    frames[start..]
        .iter()
        .map(|f| strip_numeric_suffixes(f).to_ascii_lowercase())
        .take(MAX_FRAMES)
        .collect()
}

/// Strip trailing `_<digits>` / `.<digits>` groups, repeatedly.
///
/// Leaves embedded digits alone: `sha256_update` keeps its name.
fn strip_numeric_suffixes(frame: &str) -> String {
    let mut s = frame;
    loop {
        let trimmed = s.trim_end_matches(|c: char| c.is_ascii_digit());
        if trimmed.len() == s.len() || trimmed.is_empty() {
            break;
        }
        let Some(prev) = trimmed.strip_suffix(['_', '.']) else {
            break;
        };
        s = prev;
    }
    s.to_string()
}

/// SHA-256 (hex) of the normalized frames joined by newlines.
pub fn stack_hash(normalized_frames: &[String]) -> String {
    let mut hasher = Sha256::new();
    for frame in normalized_frames {
        hasher.update(frame.as_bytes());
        hasher.update(b"\n");
    }
    to_hex(&hasher.finalize())
}

/// SHA-256 (hex) over the exception code and the top 3 normalized frames.
///
/// Coarser than the stack hash: used to group related crashes that differ
/// deeper in the stack.
pub fn signature(exception_code: u64, normalized_frames: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{exception_code:#x}").as_bytes());
    for frame in normalized_frames.iter().take(3) {
        hasher.update(b"\n");
        hasher.update(frame.as_bytes());
    }
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
