// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fawkesd` — the Fawkes controller daemon.

use fawkes_controllerd::config::ControllerConfig;
use fawkes_controllerd::daemon;

fn main() {
    let config_path = std::env::args().nth(1);
    let config = match ControllerConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fawkesd: {e}");
            std::process::exit(1);
        }
    };

    daemon::init_logging(&config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("fawkesd: failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(daemon::run(config)) {
        eprintln!("fawkesd: {e}");
        std::process::exit(1);
    }
}
