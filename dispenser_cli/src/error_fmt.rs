//! Human-readable error descriptions and structured JSON error formatting.

use dispenser_core::error::{BuildError, DispenserError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensors => {
                "What happened: No sensor event source was wired into the dispenser.\nLikely causes: The backend failed to attach the home/drop sensor interrupts.\nHow to fix: Check [pins].home_sensor and [pins].drop_sensor and that the process may access GPIO.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the [calibration] or [dispense] sections.\nHow to fix: Edit the config file, then rerun. See etc/dispenser.toml for a sample."
            ),
        };
    }

    if let Some(de) = err.downcast_ref::<DispenserError>() {
        return match de {
            DispenserError::NotCalibrated => "What happened: Dispensing was refused because the carousel is not calibrated.\nLikely causes: Calibration is not kept between runs, or the weekly profile invalidated it after the last cycle.\nHow to fix: Run `dispenser calibrate` first, or use `dispenser dispense --calibrate`.".to_string(),
            DispenserError::CalibrationTimeout { phase, limit } => format!(
                "What happened: No home edge was seen while {phase} within {limit} half-steps.\nLikely causes: Home sensor disconnected or misaligned, coils not energized, or a jammed carousel.\nHow to fix: Check the optical sensor wiring on [pins].home_sensor and that the carousel turns freely; raise calibration.seek_limit_factor only if the mechanics need it."
            ),
            DispenserError::CalibrationRejected { accepted, measured } => format!(
                "What happened: Calibration rejected; only {accepted} of {measured} revolution samples were within tolerance.\nLikely causes: Missed steps from a slipping or overloaded motor, or a noisy home sensor.\nHow to fix: Reduce load on the carousel, raise motor.step_delay_ms, or loosen calibration.tolerance_divisor."
            ),
            DispenserError::Timeout => "What happened: Timed out waiting for hardware.\nLikely causes: An operator button is stuck pressed.\nHow to fix: Release the button and check its wiring.".to_string(),
            // Fallback to generic for other domain errors
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("slot plan") {
        return format!(
            "What happened: The simulator slot plan could not be used.\nLikely causes: Wrong path, headers other than 'slot,pill', or slots outside the carousel.\nHow to fix: Fix [sim].slot_plan or the CSV itself. Details: {msg}"
        );
    }

    if lower.contains("open gpio") {
        return format!(
            "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO. Details: {msg}"
        );
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing file.\nHow to fix: Pass --config <FILE> or create etc/dispenser.toml. Details: {msg}"
        );
    }

    if lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: Missing [pins] entries or out-of-range values.\nHow to fix: Edit the TOML config and try again. Details: {msg}"
        );
    }

    // Generic fallback
    format!(
        "Something went wrong.\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes for the failures scripts care about; everything else is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<DispenserError>() {
        Some(DispenserError::NotCalibrated) => 3,
        Some(DispenserError::CalibrationTimeout { .. }) => 4,
        Some(DispenserError::CalibrationRejected { .. }) => 5,
        _ => 1,
    }
}

/// Stable machine-readable name for the error, used as the JSON `reason`.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(de) = err.downcast_ref::<DispenserError>() {
        return match de {
            DispenserError::CalibrationTimeout { .. } => "CalibrationTimeout",
            DispenserError::CalibrationRejected { .. } => "CalibrationRejected",
            DispenserError::NotCalibrated => "NotCalibrated",
            DispenserError::Hardware(_) | DispenserError::HardwareFault(_) => "Hardware",
            DispenserError::Config(_) => "Config",
            DispenserError::Timeout => "Timeout",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let details = match err.downcast_ref::<DispenserError>() {
        Some(DispenserError::CalibrationTimeout { phase, limit }) => {
            Some(json!({ "phase": phase.to_string(), "limit": limit }))
        }
        Some(DispenserError::CalibrationRejected { accepted, measured }) => {
            Some(json!({ "accepted": accepted, "measured": measured }))
        }
        _ => None,
    };

    let obj = match details {
        Some(d) => json!({ "reason": reason_name(err), "details": d, "message": humanize(err) }),
        None => json!({ "reason": reason_name(err), "message": humanize(err) }),
    };
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispenser_core::CalibrationPhase;

    #[test]
    fn exit_codes_are_stable() {
        let not_cal = eyre::Report::new(DispenserError::NotCalibrated);
        let timeout = eyre::Report::new(DispenserError::CalibrationTimeout {
            phase: CalibrationPhase::SeekingHome,
            limit: 8192,
        });
        let rejected = eyre::Report::new(DispenserError::CalibrationRejected {
            accepted: 0,
            measured: 6,
        });
        assert_eq!(exit_code_for_error(&not_cal), 3);
        assert_eq!(exit_code_for_error(&timeout), 4);
        assert_eq!(exit_code_for_error(&rejected), 5);
        assert_eq!(exit_code_for_error(&eyre::eyre!("boom")), 1);
    }

    #[test]
    fn timeout_json_carries_phase_and_limit() {
        let err = eyre::Report::new(DispenserError::CalibrationTimeout {
            phase: CalibrationPhase::Measuring(1),
            limit: 8192,
        });
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "CalibrationTimeout");
        assert_eq!(v["details"]["limit"], 8192);
        assert_eq!(v["details"]["phase"], "measuring sample 1");
        assert!(v["message"].as_str().unwrap().contains("What happened"));
    }

    #[test]
    fn wrapped_config_errors_are_explained() {
        let err = eyre::eyre!("calibration.samples must be >= 1").wrap_err("invalid configuration");
        let text = humanize(&err);
        assert!(text.contains("Configuration is invalid"), "{text}");
        assert!(text.contains("samples must be >= 1"), "{text}");
    }
}
