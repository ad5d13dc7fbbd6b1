#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Dispenser CLI: loads the TOML config, assembles the dispenser over the
//! simulator or GPIO, and runs one subcommand.

mod backend;
mod cli;
mod commands;
mod error_fmt;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use dispenser_config::{Config, Logging};
use dispenser_core::EventBus;
use eyre::{WrapErr, eyre};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::backend::Backend;
use crate::cli::{Cli, Commands, JSON_MODE, json_mode};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

/// Engine events buffered per command before they are printed.
const EVENT_CAPACITY: usize = 1024;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        if json_mode() {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    color_eyre::install()?;

    let cfg = load_config(&cli.config)?;
    // Flushes the file log when dropped at the end of the run.
    let _file_guard = init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    let (events, rx) = if cli.json {
        let (bus, rx) = EventBus::bounded(EVENT_CAPACITY);
        (bus, Some(rx))
    } else {
        (EventBus::disabled(), None)
    };
    let config_dir = cli
        .config
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let mut backend = Backend::open(&cfg, &config_dir, events)?;

    match cli.cmd {
        Commands::Calibrate { force } => commands::calibrate(&mut backend, rx.as_ref(), force),
        Commands::Dispense { calibrate } => {
            commands::dispense(&mut backend, rx.as_ref(), calibrate)
        }
        Commands::Run { slots } => commands::run(&mut backend, rx.as_ref(), slots),
        Commands::Status => commands::status(&backend),
        Commands::SelfCheck => commands::self_check(&backend),
        Commands::Console => commands::console(backend, rx),
        Commands::Idle { poll_ms } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .wrap_err("install Ctrl-C handler")?;
            commands::idle(backend, rx, shutdown, Duration::from_millis(poll_ms.max(1)))
        }
    }
}

fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = dispenser_config::load_toml(&text)
        .map_err(|e| eyre!("invalid configuration in {}: {e}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// Console logs go to stderr so stdout carries only results (and JSON lines).
fn init_tracing(json: bool, level: &str, logging: &Logging) -> eyre::Result<Option<WorkerGuard>> {
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("invalid --log-level {level}"))?,
    };
    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let mut guard = None;
    let file_layer = match logging.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre!("logging.file has no file name: {file}"))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, g) = tracing_appender::non_blocking(appender);
            guard = Some(g);
            let file_filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))
                .wrap_err("invalid logging.level")?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file_layer)
        .try_init()
        .map_err(|e| eyre!("init logging: {e}"))?;
    Ok(guard)
}
