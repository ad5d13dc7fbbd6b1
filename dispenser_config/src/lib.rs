#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and slot-plan parsing for the carousel dispenser.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section except `[pins]` has defaults matching the stock
//!   28BYJ-48 carousel, so a minimal file only names pins.
//! - The slot-plan CSV loader enforces headers and rejects out-of-range slots.
use std::collections::BTreeSet;

use serde::Deserialize;

/// Slot plan CSV schema (simulator only).
///
/// Expected headers:
/// slot,pill
///
/// Example:
/// slot,pill
/// 0,true
/// 1,false
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SlotPlanRow {
    pub slot: u32,
    pub pill: bool,
}

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub home_sensor: u8,
    pub drop_sensor: u8,
    /// IN1..IN4 of the coil driver board, in half-step table order.
    pub coils: [u8; 4],
    pub status_led: u8,
    pub calibrate_button: u8,
    pub dispense_button: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotorCfg {
    /// Settle delay after every half-step (ms).
    pub step_delay_ms: u64,
    /// Step delay for the alignment move; falls back to `step_delay_ms`.
    pub alignment_step_delay_ms: Option<u64>,
}

impl Default for MotorCfg {
    fn default() -> Self {
        Self {
            step_delay_ms: 2,
            alignment_step_delay_ms: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RecalibrationPolicy {
    /// Return the stored result when it is valid and above the sanity floor.
    #[default]
    SkipIfValid,
    /// Always measure again.
    Always,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    pub nominal_steps: u32,
    /// Tolerance is `nominal_steps / tolerance_divisor` (50 => 2%).
    pub tolerance_divisor: u32,
    /// Accepted samples wanted per attempt.
    pub samples: u32,
    /// Fewer accepted samples than this fails the attempt.
    pub min_accepted: u32,
    /// Hard cap on measurements (accepted + rejected) per attempt.
    pub max_measurements: u32,
    pub max_attempts: u32,
    /// Safety limit for seeking/measuring is `nominal_steps * seek_limit_factor`.
    pub seek_limit_factor: u32,
    pub alignment_steps: u32,
    pub sample_pause_ms: u64,
    pub policy: RecalibrationPolicy,
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
            sample_pause_ms: 0,
            policy: RecalibrationPolicy::SkipIfValid,
            sanity_floor: 4090,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispenseProfile {
    /// Full revolution per cycle; calibration survives the cycle.
    #[default]
    Continuous,
    /// Seven slots per cycle (one day each); calibration is invalidated after every cycle.
    Weekly,
}

impl DispenseProfile {
    pub const fn slots_per_cycle(self) -> u32 {
        match self {
            Self::Continuous => 8,
            Self::Weekly => 7,
        }
    }

    pub const fn invalidate_after_cycle(self) -> bool {
        matches!(self, Self::Weekly)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DispenseCfg {
    pub profile: DispenseProfile,
    /// Overrides the profile's slot count.
    pub slots_per_cycle: Option<u32>,
    /// Overrides the profile's invalidation rule.
    pub invalidate_after_cycle: Option<bool>,
    /// A revolution is divided into this many slot fractions.
    pub slot_divisor: u32,
    pub settle_ms: u64,
    pub attention_pulses: u8,
}

impl Default for DispenseCfg {
    fn default() -> Self {
        Self {
            profile: DispenseProfile::Continuous,
            slots_per_cycle: None,
            invalidate_after_cycle: None,
            slot_divisor: 8,
            settle_ms: 80,
            attention_pulses: 6,
        }
    }
}

impl DispenseCfg {
    /// Slot count after applying the explicit override, if any.
    pub fn effective_slots(&self) -> u32 {
        self.slots_per_cycle
            .unwrap_or_else(|| self.profile.slots_per_cycle())
    }

    pub fn effective_invalidate(&self) -> bool {
        self.invalidate_after_cycle
            .unwrap_or_else(|| self.profile.invalidate_after_cycle())
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IndicatorCfg {
    pub slow_period_ms: u64,
    pub fast_period_ms: u64,
    pub pulse_ms: u64,
    /// Software PWM duty while lit (0.0..=1.0).
    pub duty: f64,
}

impl Default for IndicatorCfg {
    fn default() -> Self {
        Self {
            slow_period_ms: 500,
            fast_period_ms: 250,
            pulse_ms: 100,
            duty: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimCfg {
    pub steps_per_revolution: u32,
    pub home_offset: u32,
    /// Half-steps between home edges, cycled; empty = one nominal revolution.
    pub home_gaps: Vec<u32>,
    pub home_connected: bool,
    /// Defaults to `calibration.alignment_steps` so an aligned carousel sits on slot 0.
    pub chute_offset: Option<u32>,
    pub empty_slots: Vec<u32>,
    /// CSV with `slot,pill` rows; replaces `empty_slots` when set.
    pub slot_plan: Option<String>,
    /// Sleep for real instead of advancing a manual clock.
    pub realtime: bool,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            steps_per_revolution: 4096,
            home_offset: 300,
            home_gaps: Vec::new(),
            home_connected: true,
            chute_offset: None,
            empty_slots: Vec::new(),
            slot_plan: None,
            realtime: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub motor: MotorCfg,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub dispense: DispenseCfg,
    #[serde(default)]
    pub indicator: IndicatorCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub sim: SimCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Load a slot plan and return the set of empty slots.
///
/// Slots missing from the file are treated as filled.
pub fn load_slot_plan_csv(path: &std::path::Path, slots: u32) -> eyre::Result<BTreeSet<u32>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open slot plan CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["slot", "pill"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "slot plan CSV must have headers 'slot,pill', got: {}",
            actual.join(",")
        );
    }

    let mut seen = BTreeSet::new();
    let mut empty = BTreeSet::new();
    for (idx, rec) in rdr.deserialize::<SlotPlanRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if row.slot >= slots {
            eyre::bail!(
                "slot plan row {}: slot {} out of range (carousel has {} slots)",
                idx + 2,
                row.slot,
                slots
            );
        }
        if !seen.insert(row.slot) {
            eyre::bail!("slot plan row {}: slot {} listed twice", idx + 2, row.slot);
        }
        if !row.pill {
            empty.insert(row.slot);
        }
    }
    Ok(empty)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        let p = &self.pins;
        let mut all = vec![
            p.home_sensor,
            p.drop_sensor,
            p.status_led,
            p.calibrate_button,
            p.dispense_button,
        ];
        all.extend_from_slice(&p.coils);
        let unique: BTreeSet<u8> = all.iter().copied().collect();
        if unique.len() != all.len() {
            eyre::bail!("pins must be distinct, got {:?}", all);
        }

        // Motor
        if self.motor.step_delay_ms > 1000 {
            eyre::bail!("motor.step_delay_ms is unreasonably large (>1s)");
        }
        if let Some(d) = self.motor.alignment_step_delay_ms
            && d > 1000
        {
            eyre::bail!("motor.alignment_step_delay_ms is unreasonably large (>1s)");
        }

        // Calibration
        let c = &self.calibration;
        if c.tolerance_divisor == 0 {
            eyre::bail!("calibration.tolerance_divisor must be >= 1");
        }
        if c.samples == 0 {
            eyre::bail!("calibration.samples must be >= 1");
        }
        if c.min_accepted == 0 || c.min_accepted > c.samples {
            eyre::bail!("calibration.min_accepted must be in [1, samples]");
        }
        if c.max_measurements < c.samples {
            eyre::bail!("calibration.max_measurements must be >= samples");
        }
        if c.max_attempts == 0 {
            eyre::bail!("calibration.max_attempts must be >= 1");
        }
        if c.seek_limit_factor < 2 {
            // One revolution from an arbitrary start may be needed just to find home.
            eyre::bail!("calibration.seek_limit_factor must be >= 2");
        }
        if c.alignment_steps >= c.nominal_steps {
            eyre::bail!("calibration.alignment_steps must be < nominal_steps");
        }
        if c.sample_pause_ms > 60_000 {
            eyre::bail!("calibration.sample_pause_ms is unreasonably large (>60s)");
        }

        // Dispense
        let d = &self.dispense;
        if d.slot_divisor == 0 {
            eyre::bail!("dispense.slot_divisor must be >= 1");
        }
        if c.nominal_steps < d.slot_divisor {
            eyre::bail!("calibration.nominal_steps must be >= dispense.slot_divisor");
        }
        let slots = d.effective_slots();
        if slots == 0 || slots > d.slot_divisor {
            eyre::bail!("dispense.slots_per_cycle must be in [1, slot_divisor]");
        }
        if d.settle_ms > 60_000 {
            eyre::bail!("dispense.settle_ms is unreasonably large (>60s)");
        }

        // Indicator
        let i = &self.indicator;
        if i.slow_period_ms == 0 || i.fast_period_ms == 0 || i.pulse_ms == 0 {
            eyre::bail!("indicator periods must be >= 1 ms");
        }
        if !(i.duty > 0.0 && i.duty <= 1.0) {
            eyre::bail!("indicator.duty must be in (0.0, 1.0]");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be never|daily|hourly, got {r:?}");
        }

        // Sim
        if self.sim.steps_per_revolution < d.slot_divisor {
            eyre::bail!("sim.steps_per_revolution must be >= dispense.slot_divisor");
        }
        if self.sim.home_gaps.contains(&0) {
            eyre::bail!("sim.home_gaps entries must be >= 1");
        }
        if let Some(s) = self.sim.empty_slots.iter().find(|&&s| s >= d.slot_divisor) {
            eyre::bail!("sim.empty_slots entry {s} out of range");
        }

        Ok(())
    }
}
