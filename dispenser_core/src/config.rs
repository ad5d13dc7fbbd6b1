//! Runtime configuration for the dispenser engines.
//!
//! These are separate from the TOML-deserialized config in `dispenser_config`;
//! see `conversions` for the bridge.
use std::time::Duration;

/// Motor timing.
#[derive(Debug, Clone, Copy)]
pub struct MotorCfg {
    /// Settle delay after every half-step.
    pub step_delay: Duration,
    /// Step delay for the post-calibration alignment move; `None` uses `step_delay`.
    pub alignment_step_delay: Option<Duration>,
}

impl Default for MotorCfg {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(2),
            alignment_step_delay: None,
        }
    }
}

/// What `calibrate` does when a sane calibration already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecalibrationPolicy {
    #[default]
    SkipIfValid,
    Always,
}

#[derive(Debug, Clone)]
pub struct CalibrationCfg {
    /// Expected half-steps per revolution.
    pub nominal_steps: u32,
    /// Tolerance band is `nominal_steps / tolerance_divisor`.
    pub tolerance_divisor: u32,
    /// Accepted samples wanted per attempt.
    pub samples: u32,
    /// Minimum accepted samples for an attempt to pass validation.
    pub min_accepted: u32,
    /// Cap on measurements (accepted + rejected) per attempt.
    pub max_measurements: u32,
    pub max_attempts: u32,
    /// Seek/measure safety limit, in multiples of `nominal_steps`.
    pub seek_limit_factor: u32,
    /// Half-steps past the last home edge to center the first slot.
    pub alignment_steps: u32,
    /// Dwell after each accepted sample.
    pub sample_pause: Duration,
    pub policy: RecalibrationPolicy,
    /// A stored result must exceed this to be skipped under `SkipIfValid`.
    pub sanity_floor: u32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            nominal_steps: 4096,
            tolerance_divisor: 50,
            samples: 3,
            min_accepted: 1,
            max_measurements: 6,
            max_attempts: 3,
            seek_limit_factor: 2,
            alignment_steps: 166,
            sample_pause: Duration::ZERO,
            policy: RecalibrationPolicy::SkipIfValid,
            sanity_floor: 4090,
        }
    }
}

impl CalibrationCfg {
    pub fn tolerance(&self) -> u32 {
        crate::util::tolerance(self.nominal_steps, self.tolerance_divisor)
    }

    /// Half-steps allowed while seeking home or measuring one sample.
    pub fn step_limit(&self) -> u64 {
        u64::from(self.nominal_steps) * u64::from(self.seek_limit_factor.max(1))
    }
}

#[derive(Debug, Clone)]
pub struct DispenseCfg {
    pub slots_per_cycle: u32,
    /// Each slot advance is `1 / slot_divisor` of a revolution.
    pub slot_divisor: u32,
    /// Wait after each advance before checking the drop sensor.
    pub settle: Duration,
    pub attention_pulses: u8,
    /// Drop the calibration after every completed cycle.
    pub invalidate_after_cycle: bool,
}

impl DispenseCfg {
    /// Eight slots per cycle, calibration kept.
    pub fn continuous() -> Self {
        Self {
            slots_per_cycle: 8,
            slot_divisor: 8,
            settle: Duration::from_millis(80),
            attention_pulses: 6,
            invalidate_after_cycle: false,
        }
    }

    /// Seven slots per cycle, calibration must be re-earned after each cycle.
    pub fn weekly() -> Self {
        Self {
            slots_per_cycle: 7,
            invalidate_after_cycle: true,
            ..Self::continuous()
        }
    }
}

impl Default for DispenseCfg {
    fn default() -> Self {
        Self::continuous()
    }
}
