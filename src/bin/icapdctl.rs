/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

//! `icapdctl` — start, stop, and inspect the `icapd` daemon via its PID file.
//!
//! There is no control socket or IPC channel: every subcommand reads or
//! signals the process named by the configured `pid_file`, the same
//! mechanism `icapd` itself uses to refuse a second instance.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use clap::Parser;

#[derive(Parser)]
#[command(name = "icapdctl", about = "Control utility for the icapd ICAP server")]
struct Cli {
    /// Path to the icapd configuration file.
    #[arg(short = 'c', long, value_name = "PATH")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the daemon if it isn't already running.
    Start,
    /// Stop the running daemon.
    Stop,
    /// Stop then start the daemon.
    Restart,
    /// Report whether the daemon is running.
    Status,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = icapd::config::Config::load(&cli.config, icapd::modules::known_module_names())?;

    match cli.command {
        Commands::Start => start(&cli.config, &config),
        Commands::Stop => stop(&config),
        Commands::Restart => {
            stop(&config)?;
            start(&cli.config, &config)
        }
        Commands::Status => status(&config),
    }
}

fn running_pid(config: &icapd::config::Config) -> anyhow::Result<Option<i32>> {
    let Ok(contents) = std::fs::read_to_string(&config.pid_file) else {
        return Ok(None);
    };
    let Ok(pid) = contents.trim().parse::<i32>() else {
        return Ok(None);
    };
    let alive = unsafe { libc::kill(pid, 0) == 0 };
    Ok(if alive { Some(pid) } else { None })
}

fn start(config_path: &std::path::Path, config: &icapd::config::Config) -> anyhow::Result<()> {
    if running_pid(config)?.is_some() {
        println!("icapd is already running ({})", config.pid_file.display());
        return Ok(());
    }
    Command::new("icapd")
        .arg("-c")
        .arg(config_path)
        .spawn()?
        .wait()?;
    println!("icapd started");
    Ok(())
}

fn stop(config: &icapd::config::Config) -> anyhow::Result<()> {
    let Some(pid) = running_pid(config)? else {
        println!("icapd is not running");
        return Ok(());
    };
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if running_pid(config)?.is_none() {
            println!("icapd stopped");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    anyhow::bail!("icapd ({pid}) did not stop within 5s");
}

fn status(config: &icapd::config::Config) -> anyhow::Result<()> {
    match running_pid(config)? {
        Some(pid) => println!("icapd is running (pid {pid})"),
        None => println!("icapd is not running"),
    }
    Ok(())
}
