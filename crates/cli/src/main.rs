// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fawkes` — scheduler control plane CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use fawkes_cli::client::Client;
use fawkes_cli::commands;

#[derive(Parser)]
#[command(name = "fawkes", about = "Fawkes scheduler control plane", version)]
struct Cli {
    /// Controller endpoint (or FAWKES_CONTROLLER_ADDR)
    #[arg(long, global = true, env = "FAWKES_CONTROLLER_ADDR", default_value = "127.0.0.1:7700")]
    controller: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a fuzzing job
    Add {
        /// Job name
        name: String,
        /// Path to the job config (JSON consumed by the worker harness)
        config_path: PathBuf,
        /// Priority in [0, 100]; higher runs first
        #[arg(long, default_value_t = 50)]
        priority: u8,
        /// Deadline: duration (2h, 30m, 1d) or absolute epoch seconds
        #[arg(long)]
        deadline: Option<String>,
        /// Job IDs that must complete first
        #[arg(long, value_delimiter = ',')]
        depends_on: Vec<u64>,
        /// Resource requirements: cpu=N,ram=N,vms=N
        #[arg(long)]
        resources: Option<String>,
        /// Re-queue attempts after worker loss before failing
        #[arg(long, default_value_t = 3)]
        max_retries: u32,
    },

    /// List jobs
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        min_priority: Option<u8>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one job in detail
    Status { job_id: u64 },

    /// Cancel a job
    Cancel { job_id: u64 },

    /// List workers
    Workers {
        #[arg(long)]
        status: Option<String>,
    },

    /// Counts by status
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = Client::new(&cli.controller);

    let result = match &cli.command {
        Command::Add {
            name,
            config_path,
            priority,
            deadline,
            depends_on,
            resources,
            max_retries,
        } => {
            commands::job::add(
                &client,
                commands::job::AddArgs {
                    name,
                    config_path,
                    priority: *priority,
                    deadline: deadline.as_deref(),
                    depends_on,
                    resources: resources.as_deref(),
                    max_retries: *max_retries,
                },
            )
            .await
        }
        Command::List { status, min_priority, limit } => {
            commands::job::list(&client, status.as_deref(), *min_priority, *limit).await
        }
        Command::Status { job_id } => commands::job::status(&client, *job_id).await,
        Command::Cancel { job_id } => commands::job::cancel(&client, *job_id).await,
        Command::Workers { status } => {
            commands::workers::workers(&client, status.as_deref()).await
        }
        Command::Stats => commands::stats::stats(&client).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fawkes: {e}");
            ExitCode::FAILURE
        }
    }
}
