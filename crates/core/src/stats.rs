// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Aggregate counts reported by `stats` queries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Counts by status plus crash totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub jobs: HashMap<String, u64>,
    pub workers: HashMap<String, u64>,
    pub unique_crashes: u64,
    pub duplicate_crashes: u64,
}
