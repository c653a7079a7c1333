// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fawkes-workerd` — the Fawkes worker daemon.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fawkes_workerd::config::WorkerConfig;
use fawkes_workerd::dispatch_server::run_dispatch_server;
use fawkes_workerd::heartbeat::run_heartbeat;
use fawkes_workerd::registration::register_with_retry;
use fawkes_workerd::state::WorkerState;

fn init_logging(config: &WorkerConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_env("FAWKES_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = std::fs::create_dir_all(config.log_dir());
    let file = tracing_appender::rolling::daily(config.log_dir(), "fawkes-workerd.log");

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file))
        .init();
}

fn main() {
    let config_path = std::env::args().nth(1);
    let config = match WorkerConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fawkes-workerd: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("fawkes-workerd: failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config)) {
        eprintln!("fawkes-workerd: {e}");
        std::process::exit(1);
    }
}

async fn run(config: WorkerConfig) -> std::io::Result<()> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Bind the dispatch endpoint before registering so the controller can
    // reach us the moment it learns our address
    let listener = TcpListener::bind(&config.listen_addr).await?;

    let state = WorkerState::new();
    let registration = register_with_retry(&config).await;
    state.set_worker_id(registration.worker_id);

    let cancel = CancellationToken::new();
    let config = Arc::new(config);

    tokio::spawn(run_heartbeat(
        (*config).clone(),
        state.clone(),
        registration.heartbeat_interval,
        cancel.clone(),
    ));
    tokio::spawn(run_dispatch_server(
        listener,
        Arc::clone(&config),
        state.clone(),
        cancel.clone(),
    ));

    info!(
        worker = %registration.worker_id,
        dispatch = %config.listen_addr,
        "fawkes-workerd up"
    );

    tokio::signal::ctrl_c().await?;
    info!("interrupted; cancelling active job");
    state.cancel_all();
    cancel.cancel();

    // Leave the harness its grace window to drain and report
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    while state.active().is_some() {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
    info!("fawkes-workerd stopped");
    Ok(())
}
