// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker event handlers.

use fawkes_core::{Event, WorkerRecord};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::WorkerRegistered {
            id,
            address,
            hostname,
            capabilities,
            tags,
            registered_at_epoch_ms,
        } => {
            // Idempotency: first registration wins; refreshes arrive as
            // worker:updated events
            if !state.workers.contains_key(id) {
                state.workers.insert(
                    *id,
                    WorkerRecord {
                        id: *id,
                        address: address.clone(),
                        hostname: hostname.clone(),
                        capabilities: capabilities.clone(),
                        tags: tags.clone(),
                        registered_at_epoch_ms: *registered_at_epoch_ms,
                    },
                );
            }
        }

        Event::WorkerUpdated { id, hostname, capabilities, tags } => {
            if let Some(record) = state.workers.get_mut(id) {
                record.hostname.clone_from(hostname);
                record.capabilities.clone_from(capabilities);
                record.tags.clone_from(tags);
            }
        }

        _ => {}
    }
}
