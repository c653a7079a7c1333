// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `workers`.

use anyhow::bail;

use fawkes_core::WorkerStatus;
use fawkes_wire::{Request, Response};

use crate::client::Client;
use crate::output::format_table;

pub async fn workers(client: &Client, status: Option<&str>) -> anyhow::Result<()> {
    let status = match status {
        None => None,
        Some(s) => Some(
            WorkerStatus::parse(s).ok_or_else(|| anyhow::anyhow!("unknown status: {s}"))?,
        ),
    };

    let response = client.request(&Request::ListWorkers { status }).await?;
    let Response::Workers { workers } = response else {
        bail!("unexpected response: {response:?}");
    };

    let rows: Vec<Vec<String>> = workers
        .iter()
        .map(|w| {
            let tags: Vec<&str> = w.tags.iter().map(String::as_str).collect();
            vec![
                w.id.to_string(),
                w.hostname.clone(),
                w.address.clone(),
                w.status.to_string(),
                format!("{}/{}", w.used_vms, w.max_vms),
                w.active_jobs.to_string(),
                if tags.is_empty() { "-".to_string() } else { tags.join(",") },
            ]
        })
        .collect();
    print!(
        "{}",
        format_table(&["ID", "HOST", "ADDRESS", "STATUS", "VMS", "JOBS", "TAGS"], &rows)
    );
    Ok(())
}
