// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `aeterna`: the UPHR-O process orchestrator CLI.
//!
//! Grounded on `examples/original_source/internal/cli/root.go` and
//! `cmd/aeterna/main.go`. `cobra`'s root/subcommand/persistent-flag
//! shape maps onto `clap::Parser` derive; the top-level `defer
//! recover()` in `main.go` maps onto a `std::panic::set_hook` that logs
//! the panic and exits 1, since Rust has no `defer`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use aeterna_core::config::Config;
use aeterna_daemon::{logging, Daemon};

#[derive(Parser)]
#[command(name = "aeterna", about = "Aeterna: The UPHR-O Process Orchestrator")]
struct Cli {
    /// Config file path.
    #[arg(short = 'c', long = "config", default_value = "aeterna.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the orchestrator daemon.
    Start,
    /// Trigger a hot reload (SIGHUP).
    Reload,
}

fn main() -> ExitCode {
    std::panic::set_hook(Box::new(|info| {
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(%message, location = %info.location().map(ToString::to_string).unwrap_or_default(), "panic recovered");
        std::process::exit(1);
    }));

    run()
}

fn run() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Start => start(&cli.config),
        Command::Reload => reload(),
    }
}

fn start(config_path: &std::path::Path) -> ExitCode {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error reading config: {err}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_tracing(config.observability.log_level.as_deref());
    tracing::info!(service = %config.service.name, "booting Aeterna UPHR-O engine");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    let daemon = Daemon::new(config);
    match runtime.block_on(daemon.run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "engine fatal error");
            ExitCode::FAILURE
        }
    }
}

fn reload() -> ExitCode {
    println!("Please send SIGHUP to the running Aeterna process.");
    ExitCode::SUCCESS
}
