//! Subcommand bodies: run an operation, then report it as text or JSON lines.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use dispenser_core::{
    CalibrationReport, DispenseOutcome, DispenserEvent, LoopSummary, Status, run_operator_loop,
};
use serde_json::{Value, json};

use crate::backend::Backend;
use crate::cli::json_mode;
use crate::error_fmt::{format_error_json, humanize};

/// JSON object for one engine event (`{"event": kind, ...fields}`).
pub fn event_json(ev: &DispenserEvent) -> Value {
    let fields = match ev {
        DispenserEvent::CalibrationStarted { forced } => json!({ "forced": forced }),
        DispenserEvent::CalibrationSkipped {
            steps_per_revolution,
        } => json!({ "steps_per_revolution": steps_per_revolution }),
        DispenserEvent::HomeFound { steps } | DispenserEvent::Aligned { steps } => {
            json!({ "steps": steps })
        }
        DispenserEvent::SampleMeasured {
            index,
            steps,
            accepted,
        } => json!({ "index": index, "steps": steps, "accepted": accepted }),
        DispenserEvent::AttemptFailed {
            attempt,
            accepted,
            measured,
        } => json!({ "attempt": attempt, "accepted": accepted, "measured": measured }),
        DispenserEvent::Calibrated {
            steps_per_revolution,
            accepted,
            rejected,
            attempts,
        } => json!({
            "steps_per_revolution": steps_per_revolution,
            "accepted": accepted,
            "rejected": rejected,
            "attempts": attempts,
        }),
        DispenserEvent::CalibrationFailed { reason } => json!({ "reason": reason }),
        DispenserEvent::SlotDispensed { slot } | DispenserEvent::SlotMissed { slot } => {
            json!({ "slot": slot })
        }
        DispenserEvent::CycleComplete {
            dispensed,
            slots,
            steps,
        } => json!({ "dispensed": dispensed, "slots": slots, "steps": steps }),
        DispenserEvent::DispenseRefused => json!({}),
        DispenserEvent::Advanced { slots, steps } => json!({ "slots": slots, "steps": steps }),
    };
    let mut obj = json!({ "event": ev.kind() });
    if let (Some(dst), Value::Object(src)) = (obj.as_object_mut(), fields) {
        dst.extend(src);
    }
    obj
}

/// Print whatever the engines published since the last drain.
pub fn drain_events(rx: Option<&Receiver<DispenserEvent>>) {
    if let Some(rx) = rx {
        for ev in rx.try_iter() {
            println!("{}", event_json(&ev));
        }
    }
}

fn report_calibration(report: &CalibrationReport) {
    let spr = report.calibration.steps_per_revolution;
    if json_mode() {
        println!(
            "{}",
            json!({
                "result": if report.skipped { "calibration_kept" } else { "calibrated" },
                "steps_per_revolution": spr,
                "accepted": report.accepted,
                "rejected": report.rejected,
                "attempts": report.attempts,
                "steps_issued": report.steps_issued,
            })
        );
    } else if report.skipped {
        println!("calibration kept: {spr} half-steps per revolution");
    } else {
        println!(
            "calibrated: {spr} half-steps per revolution ({} accepted, {} rejected, {} attempt(s))",
            report.accepted.len(),
            report.rejected.len(),
            report.attempts
        );
    }
}

fn report_dispense(outcome: &DispenseOutcome) {
    let missed: Vec<u32> = outcome.missed().collect();
    let slots = outcome.slots.len();
    if json_mode() {
        println!(
            "{}",
            json!({
                "result": "dispensed",
                "dispensed": outcome.dispensed,
                "slots": slots,
                "missed": missed,
                "steps": outcome.steps,
            })
        );
        return;
    }
    for slot in &missed {
        println!("slot {slot}: no pill detected");
    }
    println!("dispensed {} of {slots} slots", outcome.dispensed);
}

fn report_status(status: &Status, sim_position: Option<i64>) {
    if json_mode() {
        println!(
            "{}",
            json!({
                "calibrated": status.calibrated,
                "steps_per_revolution": status.steps_per_revolution,
                "position": status.position,
                "phase": status.phase,
                "mode": status.mode.to_string(),
                "sim_position": sim_position,
            })
        );
    } else {
        print!("{status}");
        if let Some(p) = sim_position {
            println!("simulated rotor: {p}");
        }
    }
}

pub fn calibrate(
    backend: &mut Backend,
    rx: Option<&Receiver<DispenserEvent>>,
    force: bool,
) -> eyre::Result<()> {
    let res = backend.dispenser.calibrate(force);
    drain_events(rx);
    report_calibration(&res?);
    Ok(())
}

pub fn dispense(
    backend: &mut Backend,
    rx: Option<&Receiver<DispenserEvent>>,
    calibrate_first: bool,
) -> eyre::Result<()> {
    if calibrate_first {
        calibrate(backend, rx, false)?;
    }
    let res = backend.dispenser.dispense();
    drain_events(rx);
    report_dispense(&res?);
    Ok(())
}

pub fn run(
    backend: &mut Backend,
    rx: Option<&Receiver<DispenserEvent>>,
    slots: u32,
) -> eyre::Result<()> {
    let res = backend.dispenser.advance_slots(slots);
    drain_events(rx);
    let steps = res?;
    if json_mode() {
        println!(
            "{}",
            json!({ "result": "advanced", "slots": slots, "steps": steps })
        );
    } else {
        println!("advanced {slots} slot(s) ({steps} half-steps)");
    }
    Ok(())
}

pub fn status(backend: &Backend) -> eyre::Result<()> {
    report_status(&backend.dispenser.status(), backend.sim_position());
    Ok(())
}

pub fn self_check(backend: &Backend) -> eyre::Result<()> {
    if json_mode() {
        println!(
            "{}",
            json!({ "result": "ok", "backend": backend.kind.name() })
        );
    } else {
        println!("self-check ok (backend: {})", backend.kind.name());
    }
    Ok(())
}

pub fn idle(
    mut backend: Backend,
    rx: Option<Receiver<DispenserEvent>>,
    shutdown: Arc<AtomicBool>,
    poll: Duration,
) -> eyre::Result<()> {
    // Events arrive while the loop owns the thread, so print them from a helper.
    let printer = rx.map(|rx| {
        thread::spawn(move || {
            for ev in rx.iter() {
                println!("{}", event_json(&ev));
            }
        })
    });

    let mut input = backend.operator_input(poll, shutdown.clone());
    let summary = run_operator_loop(&mut backend.dispenser, &mut *input, &shutdown, poll);

    // Dropping the dispenser drops the event sender and ends the printer.
    drop(input);
    drop(backend);
    if let Some(h) = printer {
        let _ = h.join();
    }
    report_loop(&summary);
    Ok(())
}

fn report_loop(s: &LoopSummary) {
    if json_mode() {
        println!(
            "{}",
            json!({
                "result": "stopped",
                "polls": s.polls,
                "calibrations": s.calibrations,
                "cycles": s.cycles,
                "pills_dispensed": s.pills_dispensed,
                "failures": s.failures,
                "input_errors": s.input_errors,
            })
        );
    } else {
        println!(
            "stopped: {} calibration(s), {} cycle(s), {} pill(s) dispensed, {} failure(s)",
            s.calibrations, s.cycles, s.pills_dispensed, s.failures
        );
    }
}

const CONSOLE_HELP: &str = "commands:
  status          show calibration, position and mode
  calib [force]   calibrate (force re-measures a valid calibration)
  dispense        run one dispensing cycle
  run [N]         advance N slots (default 8)
  help            this text
  quit            leave the console";

#[derive(Debug, PartialEq, Eq)]
enum ConsoleCmd {
    Status,
    Calibrate { force: bool },
    Dispense,
    Run(u32),
    Help,
    Quit,
}

fn parse_console(line: &str) -> Result<Option<ConsoleCmd>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    let cmd = match (head.to_ascii_lowercase().as_str(), arg) {
        ("status", None) => ConsoleCmd::Status,
        ("calib" | "calibrate", None) => ConsoleCmd::Calibrate { force: false },
        ("calib" | "calibrate", Some("force")) => ConsoleCmd::Calibrate { force: true },
        ("dispense", None) => ConsoleCmd::Dispense,
        ("run", None) => ConsoleCmd::Run(8),
        ("run", Some(n)) => ConsoleCmd::Run(
            n.parse()
                .map_err(|_| format!("run expects a slot count, got '{n}'"))?,
        ),
        ("help" | "?", None) => ConsoleCmd::Help,
        ("quit" | "exit", None) => ConsoleCmd::Quit,
        _ => return Err(format!("unknown command '{}'; type 'help'", line.trim())),
    };
    Ok(Some(cmd))
}

fn report_console_error(err: &eyre::Report) {
    if json_mode() {
        println!("{}", format_error_json(err));
    } else {
        eprintln!("{}", humanize(err));
    }
}

/// Line console on stdin. Command failures are reported and the session goes on.
pub fn console(mut backend: Backend, rx: Option<Receiver<DispenserEvent>>) -> eyre::Result<()> {
    let rx = rx.as_ref();
    if !json_mode() {
        eprintln!("dispenser console; type 'help' for commands");
    }
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let cmd = match parse_console(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(msg) => {
                report_console_error(&eyre::eyre!(msg));
                continue;
            }
        };
        tracing::debug!(?cmd, "console command");
        let res = match cmd {
            ConsoleCmd::Status => status(&backend),
            ConsoleCmd::Calibrate { force } => calibrate(&mut backend, rx, force),
            ConsoleCmd::Dispense => dispense(&mut backend, rx, false),
            ConsoleCmd::Run(n) => run(&mut backend, rx, n),
            ConsoleCmd::Help => {
                println!("{CONSOLE_HELP}");
                Ok(())
            }
            ConsoleCmd::Quit => break,
        };
        if let Err(e) = res {
            report_console_error(&e);
        }
    }
    Ok(())
}
