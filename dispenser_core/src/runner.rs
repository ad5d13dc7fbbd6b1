//! Idle operator loop.
//!
//! Polls operator input, runs the selected engine to completion, keeps the
//! indicator cadence current, and exits when `shutdown` is raised. Engine
//! and input failures are logged and the loop returns to idle.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dispenser_traits::{CoilDriver, OperatorInput, StatusIndicator};
use tracing::{info, warn};

use crate::error::DispenserError;
use crate::hw_error::map_hw_error;
use crate::machine::{CommandOutcome, Dispenser};

/// Counters for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub polls: u64,
    pub calibrations: u32,
    pub cycles: u32,
    pub pills_dispensed: u32,
    /// Engine runs that ended in an error (refusals included).
    pub failures: u32,
    pub input_errors: u32,
}

pub fn run_operator_loop<C, I, O>(
    dispenser: &mut Dispenser<C, I>,
    input: &mut O,
    shutdown: &AtomicBool,
    poll_interval: Duration,
) -> LoopSummary
where
    C: CoilDriver,
    I: StatusIndicator,
    O: OperatorInput + ?Sized,
{
    let mut summary = LoopSummary::default();
    dispenser.refresh_indicator();
    info!(poll_ms = poll_interval.as_millis() as u64, "operator loop started");

    while !shutdown.load(Ordering::Relaxed) {
        summary.polls += 1;
        let cmd = match input.poll() {
            Ok(cmd) => cmd,
            Err(e) => {
                summary.input_errors += 1;
                let mapped = map_hw_error(&*e);
                warn!(error = %mapped, "operator input failed");
                None
            }
        };

        if let Some(cmd) = cmd {
            match dispenser.handle(cmd) {
                Ok(CommandOutcome::Calibrated(report)) => {
                    if !report.skipped {
                        summary.calibrations += 1;
                    }
                }
                Ok(CommandOutcome::Dispensed(outcome)) => {
                    summary.cycles += 1;
                    summary.pills_dispensed += outcome.dispensed;
                }
                Err(e) => {
                    summary.failures += 1;
                    match e.downcast_ref::<DispenserError>() {
                        Some(DispenserError::NotCalibrated) => {
                            info!("dispense ignored: calibrate first");
                        }
                        _ => warn!(error = %e, ?cmd, "command failed; back to idle"),
                    }
                }
            }
            dispenser.refresh_indicator();
            continue;
        }

        dispenser.clock().sleep(poll_interval);
    }

    info!(
        polls = summary.polls,
        calibrations = summary.calibrations,
        cycles = summary.cycles,
        failures = summary.failures,
        "operator loop stopped"
    );
    summary
}
