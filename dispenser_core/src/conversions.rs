//! `From` implementations bridging `dispenser_config` types to `dispenser_core` types.

use std::time::Duration;

use crate::config::{CalibrationCfg, DispenseCfg, MotorCfg, RecalibrationPolicy};

// ── MotorCfg ─────────────────────────────────────────────────────────────────

impl From<&dispenser_config::MotorCfg> for MotorCfg {
    fn from(c: &dispenser_config::MotorCfg) -> Self {
        Self {
            step_delay: Duration::from_millis(c.step_delay_ms),
            alignment_step_delay: c.alignment_step_delay_ms.map(Duration::from_millis),
        }
    }
}

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl From<dispenser_config::RecalibrationPolicy> for RecalibrationPolicy {
    fn from(p: dispenser_config::RecalibrationPolicy) -> Self {
        match p {
            dispenser_config::RecalibrationPolicy::SkipIfValid => Self::SkipIfValid,
            dispenser_config::RecalibrationPolicy::Always => Self::Always,
        }
    }
}

impl From<&dispenser_config::CalibrationCfg> for CalibrationCfg {
    fn from(c: &dispenser_config::CalibrationCfg) -> Self {
        Self {
            nominal_steps: c.nominal_steps,
            tolerance_divisor: c.tolerance_divisor,
            samples: c.samples,
            min_accepted: c.min_accepted,
            max_measurements: c.max_measurements,
            max_attempts: c.max_attempts,
            seek_limit_factor: c.seek_limit_factor,
            alignment_steps: c.alignment_steps,
            sample_pause: Duration::from_millis(c.sample_pause_ms),
            policy: c.policy.into(),
            sanity_floor: c.sanity_floor,
        }
    }
}

// ── DispenseCfg ──────────────────────────────────────────────────────────────

impl From<&dispenser_config::DispenseCfg> for DispenseCfg {
    fn from(c: &dispenser_config::DispenseCfg) -> Self {
        Self {
            slots_per_cycle: c.effective_slots(),
            slot_divisor: c.slot_divisor,
            settle: Duration::from_millis(c.settle_ms),
            attention_pulses: c.attention_pulses,
            invalidate_after_cycle: c.effective_invalidate(),
        }
    }
}
