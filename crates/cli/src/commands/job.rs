// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `add`, `list`, `status`, and `cancel`.

use std::path::Path;

use anyhow::{bail, Context};

use fawkes_core::{
    format_elapsed_ms, parse_deadline, Clock, JobId, JobSpec, JobStatus, ResourceSpec,
    SystemClock,
};
use fawkes_wire::{JobSummary, Request, Response};

use crate::client::Client;
use crate::output::{format_epoch_ms, format_table};

pub struct AddArgs<'a> {
    pub name: &'a str,
    pub config_path: &'a Path,
    pub priority: u8,
    pub deadline: Option<&'a str>,
    pub depends_on: &'a [u64],
    pub resources: Option<&'a str>,
    pub max_retries: u32,
}

pub async fn add(client: &Client, args: AddArgs<'_>) -> anyhow::Result<()> {
    let config_text = std::fs::read_to_string(args.config_path)
        .with_context(|| format!("cannot read {}", args.config_path.display()))?;
    let config: serde_json::Value = serde_json::from_str(&config_text)
        .with_context(|| format!("{} is not valid JSON", args.config_path.display()))?;

    let mut builder = JobSpec::builder(args.name)
        .config(config)
        .priority(args.priority)
        .max_retries(args.max_retries)
        .dependencies(args.depends_on.iter().map(|id| JobId(*id)).collect());

    if let Some(deadline) = args.deadline {
        let deadline_ms = parse_deadline(deadline, SystemClock.epoch_ms())
            .map_err(|e| anyhow::anyhow!("invalid --deadline: {e}"))?;
        builder = builder.deadline_epoch_ms(deadline_ms);
    }
    if let Some(resources) = args.resources {
        let spec = ResourceSpec::parse(resources)
            .map_err(|e| anyhow::anyhow!("invalid --resources: {e}"))?;
        builder = builder.resources(spec);
    }

    let response = client.request(&Request::AddJob { spec: builder.build() }).await?;
    match response {
        Response::JobAdded { id } => {
            println!("{id}");
            Ok(())
        }
        other => bail!("unexpected response: {other:?}"),
    }
}

pub async fn list(
    client: &Client,
    status: Option<&str>,
    min_priority: Option<u8>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let status = parse_status_filter(status)?;
    let response =
        client.request(&Request::ListJobs { status, min_priority, limit }).await?;
    let Response::Jobs { jobs } = response else {
        bail!("unexpected response: {response:?}");
    };

    let rows: Vec<Vec<String>> = jobs.iter().map(job_row).collect();
    print!(
        "{}",
        format_table(&["ID", "NAME", "PRI", "STATUS", "RETRIES", "WORKER", "CREATED"], &rows)
    );
    Ok(())
}

fn job_row(job: &JobSummary) -> Vec<String> {
    vec![
        job.id.to_string(),
        job.name.clone(),
        job.priority.to_string(),
        job.status.to_string(),
        job.retries.to_string(),
        job.assigned_worker.map(|w| w.to_string()).unwrap_or_else(|| "-".to_string()),
        format_epoch_ms(job.created_at_epoch_ms),
    ]
}

pub async fn status(client: &Client, id: u64) -> anyhow::Result<()> {
    let response = client.request(&Request::GetJob { id: JobId(id) }).await?;
    let Response::Job { job } = response else {
        bail!("unexpected response: {response:?}");
    };

    println!("id:        {}", job.id);
    println!("name:      {}", job.name);
    println!("status:    {}", job.status);
    println!("priority:  {}", job.priority);
    println!("retries:   {}/{}", job.retries, job.max_retries);
    if !job.dependencies.is_empty() {
        let deps: Vec<String> = job.dependencies.iter().map(|d| d.to_string()).collect();
        println!("depends:   {}", deps.join(", "));
    }
    if let Some(worker) = &job.assigned_worker {
        println!("worker:    {worker}");
    }
    println!("created:   {}", format_epoch_ms(job.created_at_epoch_ms));
    if let Some(deadline) = job.deadline_epoch_ms {
        println!("deadline:  {}", format_epoch_ms(deadline));
    }
    if let (Some(started), Some(finished)) = (job.started_at_epoch_ms, job.finished_at_epoch_ms)
    {
        println!("ran for:   {}", format_elapsed_ms(finished.saturating_sub(started)));
    }
    if let Some(reason) = &job.failure_reason {
        println!("failure:   {reason}");
    }
    Ok(())
}

pub async fn cancel(client: &Client, id: u64) -> anyhow::Result<()> {
    let response = client.request(&Request::CancelJob { id: JobId(id) }).await?;
    match response {
        Response::Ok => {
            println!("job {id} cancelled");
            Ok(())
        }
        other => bail!("unexpected response: {other:?}"),
    }
}

pub(crate) fn parse_status_filter(status: Option<&str>) -> anyhow::Result<Option<JobStatus>> {
    match status {
        None => Ok(None),
        Some(s) => JobStatus::parse(s)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("unknown status: {s}")),
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
