// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, recovery, loop wiring, shutdown.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fawkes_core::SystemClock;
use fawkes_scheduler::{
    run_allocator, run_deadline_enforcer, run_health_monitor, AllocatorConfig, DeadlineConfig,
    HealthConfig, JobDispatcher, SchedulerError, SchedulerStore,
};
use fawkes_storage::Checkpointer;

use crate::artifacts::ArtifactStore;
use crate::config::{ConfigError, ControllerConfig};
use crate::dispatch::TcpDispatcher;
use crate::listener::{run_listener, ListenCtx};

/// How often the checkpoint task looks for accumulated events.
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("another fawkesd owns {0}")]
    AlreadyRunning(String),

    #[error("scheduler: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("checkpoint: {0}")]
    Checkpoint(#[from] fawkes_storage::CheckpointError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Install the tracing subscriber: env-filtered stdout plus a daily log
/// file under the state dir.
pub fn init_logging(config: &ControllerConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_env("FAWKES_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = std::fs::create_dir_all(config.log_dir());
    let file = tracing_appender::rolling::daily(config.log_dir(), "fawkesd.log");

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file))
        .init();
}

/// Run the controller until shutdown is requested.
pub async fn run(config: ControllerConfig) -> Result<(), DaemonError> {
    std::fs::create_dir_all(&config.state_dir)?;
    let _pid_lock = acquire_pid_lock(&config)?;

    let store = SchedulerStore::recover(&config.wal_path(), &config.snapshot_path(), SystemClock)?
        .with_heartbeat_timeout_ms(config.heartbeat_timeout_ms());
    let mut checkpointer =
        Checkpointer::new(config.snapshot_path(), store.wal_processed_seq());
    let artifacts = ArtifactStore::open(&config.crashes_dir())?;
    let dispatcher: Arc<dyn JobDispatcher> =
        Arc::new(TcpDispatcher::new(config.dispatch_timeout()));

    let listener = TcpListener::bind(&config.listen_addr).await?;
    let shutdown = Arc::new(Notify::new());
    let cancel = CancellationToken::new();

    let ctx = Arc::new(ListenCtx {
        store: store.clone(),
        artifacts,
        dispatcher: Arc::clone(&dispatcher),
        shutdown: Arc::clone(&shutdown),
        heartbeat_interval_ms: config.heartbeat_interval_secs * 1_000,
    });

    // The four controller tasks: three control loops plus the listener.
    let allocator_config = AllocatorConfig {
        poll_interval: config.poll_interval(),
        strategy: config.parsed_strategy()?,
        allocate_past_head: config.allocate_past_head,
        dispatch_failure_limit: config.dispatch_failure_limit,
    };
    tokio::spawn(run_allocator(
        store.clone(),
        Arc::clone(&dispatcher),
        allocator_config,
        cancel.clone(),
    ));
    tokio::spawn(run_health_monitor(
        store.clone(),
        HealthConfig { poll_interval: config.poll_interval() },
        cancel.clone(),
    ));
    tokio::spawn(run_deadline_enforcer(
        store.clone(),
        Arc::clone(&dispatcher),
        DeadlineConfig { poll_interval: config.poll_interval() },
        cancel.clone(),
    ));
    tokio::spawn(run_listener(listener, Arc::clone(&ctx), cancel.clone()));

    // Checkpoint task: flush + snapshot when enough events accumulate.
    let checkpoint_store = store.clone();
    let checkpoint_cancel = cancel.clone();
    let checkpoint_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHECKPOINT_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = checkpoint_store.flush() {
                        error!(error = %e, "WAL flush failed");
                    }
                    match checkpoint_store.checkpoint(&mut checkpointer) {
                        Ok(true) => info!("checkpoint written"),
                        Ok(false) => {}
                        Err(e) => error!(error = %e, "checkpoint failed"),
                    }
                }
                _ = checkpoint_cancel.cancelled() => return checkpointer,
            }
        }
    });

    info!(addr = %config.listen_addr, state = %config.state_dir.display(), "fawkesd up");

    // Wait for an operator shutdown request or a signal.
    tokio::select! {
        _ = shutdown.notified() => info!("shutdown requested"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    cancel.cancel();
    if let Ok(mut checkpointer) = checkpoint_task.await {
        store.checkpoint_now(&mut checkpointer)?;
    }
    store.flush()?;
    info!("fawkesd stopped");
    Ok(())
}

/// Take the exclusive PID lock, failing if another instance holds it.
fn acquire_pid_lock(config: &ControllerConfig) -> Result<std::fs::File, DaemonError> {
    let path = config.pid_path();
    let mut file = OpenOptions::new().create(true).write(true).truncate(false).open(&path)?;
    file.try_lock_exclusive()
        .map_err(|_| DaemonError::AlreadyRunning(path.display().to_string()))?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}
