// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duration and deadline parsing for the CLI and config surfaces.

use std::time::Duration;

/// Parse a duration string like "30s", "5m", "1h", "2d" into a Duration
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the numeric prefix
    let (num_str, suffix) = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| (&s[..i], &s[i..]))
        .unwrap_or((s, ""));

    let num: u64 = num_str.parse().map_err(|_| format!("invalid number in duration: {}", s))?;

    let multiplier = match suffix.trim() {
        "ms" | "millis" | "millisecond" | "milliseconds" => {
            return Ok(Duration::from_millis(num));
        }
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86400,
        other => return Err(format!("unknown duration suffix: {}", other)),
    };

    Ok(Duration::from_secs(num * multiplier))
}

/// Parse a deadline argument into absolute epoch milliseconds.
///
/// Accepts either a relative duration (`2h`, `30m`, `1d`) applied to
/// `now_epoch_ms`, or absolute epoch seconds (`1770000000`). Bare numbers
/// above this threshold are treated as absolute; below it, as a relative
/// second count.
pub fn parse_deadline(s: &str, now_epoch_ms: u64) -> Result<u64, String> {
    const ABSOLUTE_EPOCH_THRESHOLD: u64 = 100_000_000; // ~1973 in epoch seconds

    let s = s.trim();
    if s.chars().all(|c| c.is_ascii_digit()) {
        let n: u64 = s.parse().map_err(|_| format!("invalid deadline: {}", s))?;
        if n >= ABSOLUTE_EPOCH_THRESHOLD {
            return Ok(n * 1000);
        }
    }
    let dur = parse_duration(s)?;
    Ok(now_epoch_ms + dur.as_millis() as u64)
}

/// Format elapsed milliseconds as a compact human string ("4s", "2m30s", "1h05m").
pub fn format_elapsed_ms(ms: u64) -> String {
    let secs = ms / 1000;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod tests;
