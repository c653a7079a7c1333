// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request handlers bridging the wire protocol and the scheduler store.

use std::sync::Arc;

use tracing::{info, warn};

use fawkes_core::{JobStatus, SystemClock};
use fawkes_scheduler::{JobDispatcher, SchedulerError};
use fawkes_wire::{ErrorKind, JobSummary, Request, Response, WorkerSummary};

use crate::listener::ListenCtx;

/// Collapse scheduler errors onto the wire taxonomy.
fn error_response(e: SchedulerError) -> Response {
    let kind = match &e {
        SchedulerError::UnknownEntity(_) => ErrorKind::UnknownEntity,
        SchedulerError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
        SchedulerError::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
        SchedulerError::DependencyUnsatisfied { .. } => ErrorKind::DependencyUnsatisfied,
        SchedulerError::Storage(_) | SchedulerError::Fatal(_) => ErrorKind::Internal,
    };
    Response::error(kind, e.to_string())
}

/// Handle a single request and return a response.
pub async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,

        // -- worker plane --
        Request::Hello { worker_id: _, address, hostname, capabilities, tags } => {
            match ctx.store.register_worker(&address, &hostname, capabilities, tags) {
                Ok(worker_id) => {
                    info!(worker = %worker_id, %address, "worker registered");
                    Response::Hello {
                        worker_id,
                        heartbeat_interval_ms: ctx.heartbeat_interval_ms,
                    }
                }
                Err(e) => error_response(e),
            }
        }

        Request::Heartbeat { worker_id, load, progress } => {
            if let Some(progress) = progress {
                tracing::debug!(
                    worker = %worker_id,
                    job = %progress.job_id,
                    executions = progress.executions,
                    exec_per_sec = format!("{:.1}", progress.exec_per_sec),
                    crashes = progress.crashes,
                    "progress"
                );
            }
            match ctx.store.update_worker_heartbeat(worker_id, load) {
                Ok(ack) => Response::HeartbeatAck { assignments_pending: ack.assignments_pending },
                Err(e) => error_response(e),
            }
        }

        Request::ReportCrash { worker_id, report, testcase } => {
            match ctx.store.record_crash(worker_id, &report) {
                Ok(outcome) => {
                    if !outcome.is_duplicate {
                        if let Err(e) = ctx.artifacts.store_unique(
                            outcome.crash_id,
                            &report,
                            &testcase,
                            None,
                        ) {
                            warn!(crash = %outcome.crash_id, error = %e, "artifact store failed");
                        }
                    } else if outcome.replace_payload {
                        if let Err(e) =
                            ctx.artifacts.replace_testcase(outcome.crash_id, &testcase, None)
                        {
                            warn!(crash = %outcome.crash_id, error = %e, "testcase replace failed");
                        }
                    }
                    Response::CrashAck {
                        crash_id: outcome.crash_id,
                        is_duplicate: outcome.is_duplicate,
                    }
                }
                Err(e) => error_response(e),
            }
        }

        Request::JobDone { worker_id, job_id, status, failure_reason } => {
            if !matches!(status, JobStatus::Completed | JobStatus::Failed) {
                return Response::error(
                    ErrorKind::IllegalTransition,
                    format!("JobDone only accepts completed/failed, got {status}"),
                );
            }
            info!(job = %job_id, worker = %worker_id, %status, "job finished");
            match ctx.store.update_job_status(job_id, status, failure_reason) {
                Ok(()) => Response::Ok,
                Err(e) => error_response(e),
            }
        }

        // -- control plane --
        Request::AddJob { spec } => match ctx.store.add_job(spec) {
            Ok(id) => {
                info!(job = %id, "job added");
                Response::JobAdded { id }
            }
            Err(e) => error_response(e),
        },

        Request::ListJobs { status, min_priority, limit } => {
            let jobs = ctx
                .store
                .list_jobs(status, min_priority, limit)
                .iter()
                .map(JobSummary::from)
                .collect();
            Response::Jobs { jobs }
        }

        Request::GetJob { id } => match ctx.store.get_job(id) {
            Ok(job) => Response::Job { job: Box::new(job) },
            Err(e) => error_response(e),
        },

        Request::CancelJob { id } => match ctx.store.cancel_job(id) {
            Ok(owner) => {
                info!(job = %id, "job cancelled");
                if let Some(worker) = owner {
                    // Fire-and-forget: the drain is asynchronous and the
                    // scheduler observes completion via heartbeats
                    let dispatcher = Arc::clone(&ctx.dispatcher);
                    tokio::spawn(async move {
                        if let Err(e) = dispatcher.cancel_job(&worker, id).await {
                            warn!(job = %id, worker = %worker.id, error = %e, "cancel signal failed");
                        }
                    });
                }
                Response::Ok
            }
            Err(e) => error_response(e),
        },

        Request::ListWorkers { status } => {
            let workers = ctx
                .store
                .list_workers()
                .into_iter()
                .filter(|(_, s, _)| status.map_or(true, |wanted| *s == wanted))
                .map(|(record, status, load)| WorkerSummary {
                    id: record.id,
                    address: record.address,
                    hostname: record.hostname,
                    status,
                    used_vms: load.used_vms,
                    max_vms: record.capabilities.max_vms,
                    active_jobs: load.active_jobs,
                    tags: record.tags,
                })
                .collect();
            Response::Workers { workers }
        }

        Request::Stats => Response::Stats { counts: ctx.store.stats() },

        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }
    }
}

/// Shared context alias used by the listener.
pub type Store = fawkes_scheduler::SchedulerStore<SystemClock>;

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
