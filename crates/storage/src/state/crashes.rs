// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash event handlers.

use fawkes_core::{Event, Severity};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::CrashRecorded { record } => {
            // Idempotency: skip if already present
            if !state.crashes.contains_key(&record.id) {
                state.crash_hashes.insert(record.stack_hash.clone(), record.id);
                state.crashes.insert(record.id, record.clone());
            }
            state.next_crash_id = state.next_crash_id.max(record.id.0 + 1);
        }

        Event::CrashDuplicate {
            of,
            duplicate_count,
            exploitability_score,
            replace_payload,
            ..
        } => {
            if let Some(record) = state.crashes.get_mut(of) {
                // Assignment with max, not increment: replay-safe
                record.duplicate_count = record.duplicate_count.max(*duplicate_count);
                if *replace_payload {
                    record.exploitability_score =
                        record.exploitability_score.max(*exploitability_score);
                    record.severity = Severity::from_score(record.exploitability_score);
                }
            }
        }

        _ => {}
    }
}
