// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `stats`.

use anyhow::bail;

use fawkes_wire::{Request, Response};

use crate::client::Client;

const JOB_STATUSES: &[&str] =
    &["pending", "queued", "assigned", "running", "completed", "failed", "cancelled"];
const WORKER_STATUSES: &[&str] = &["online", "busy", "offline"];

pub async fn stats(client: &Client) -> anyhow::Result<()> {
    let response = client.request(&Request::Stats).await?;
    let Response::Stats { counts } = response else {
        bail!("unexpected response: {response:?}");
    };

    println!("jobs:");
    for status in JOB_STATUSES {
        let count = counts.jobs.get(*status).copied().unwrap_or(0);
        println!("  {status:<10} {count}");
    }
    println!("workers:");
    for status in WORKER_STATUSES {
        let count = counts.workers.get(*status).copied().unwrap_or(0);
        println!("  {status:<10} {count}");
    }
    println!("crashes:");
    println!("  {:<10} {}", "unique", counts.unique_crashes);
    println!("  {:<10} {}", "duplicate", counts.duplicate_crashes);
    Ok(())
}
