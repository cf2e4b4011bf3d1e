/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use icapd::config::Config;
use icapd::error::IcapError;
use icapd::manager::Manager;
use icapd::modules::{known_module_names, ModifierRegistry};
use icapd::opts::ProcArgs;
use icapd::stats::IcapStats;
use icapd::{daemon, log as icap_log, signal};

fn main() -> anyhow::Result<()> {
    let args = ProcArgs::parse_args();

    let config = Config::load(&args.config, known_module_names())
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    // Daemonize before building the logger: `slog_async`'s drain spawns a
    // background thread, and `fork()` in a multi-threaded process only
    // duplicates the calling thread, which would leave that thread's
    // lock/channel state corrupted in the child. `--debug` runs stay
    // attached to the terminal and skip both.
    if !args.debug {
        unsafe {
            daemon::daemonize(&config.run_dir).map_err(|e| anyhow::anyhow!("{e}"))?;
        }
    }
    let _pid_guard = if !args.debug {
        Some(daemon::acquire_pid_file(&config.pid_file).map_err(|e| anyhow::anyhow!("{e}"))?)
    } else {
        None
    };

    let logger = icap_log::build_root_logger(config.log_file.as_deref(), args.debug)?;

    let registry = ModifierRegistry::from_config(&config);
    let stats = IcapStats::new();

    let mut manager = Manager::bind(&config).map_err(to_anyhow)?;
    signal::register().map_err(|e| anyhow::anyhow!("failed to install signal handlers: {e}"))?;

    manager.spawn(&registry, &stats, &logger).map_err(to_anyhow)?;
    manager.run(&registry, &stats, &logger).map_err(to_anyhow)?;

    Ok(())
}

fn to_anyhow(err: IcapError) -> anyhow::Error {
    anyhow::anyhow!("{err}")
}
