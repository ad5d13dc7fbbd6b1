//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "dispenser", version, about = "Rotary pill dispenser CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/dispenser.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Measure steps per revolution and align the carousel on slot 0
    Calibrate {
        /// Measure even when a valid calibration is already held
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
    /// Run one dispensing cycle (calibration does not survive between invocations)
    Dispense {
        /// Calibrate first in the same process
        #[arg(long, action = ArgAction::SetTrue)]
        calibrate: bool,
    },
    /// Advance the carousel by N slot fractions
    Run {
        /// Slot fractions to advance (8 = one revolution)
        #[arg(value_name = "N", default_value_t = 8)]
        slots: u32,
    },
    /// Print calibration state, motor position and mode
    Status,
    /// Interactive line console against one long-lived dispenser
    Console,
    /// Poll the operator buttons until Ctrl-C
    ///
    /// With the simulator backend, presses are read from stdin as lines
    /// (calibrate|dispense). They are queued: lines typed while an engine runs
    /// are handled after it finishes. Closing stdin stops the loop.
    Idle {
        /// Button poll interval in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 50)]
        poll_ms: u64,
    },
    /// Quick health check (config valid, backend assembles)
    SelfCheck,
}
