//! Type-state builder for `Dispenser`.
//!
//! `build()` only exists once a coil driver has been supplied; the indicator
//! defaults to `NullIndicator`. The sensor source is checked at runtime since
//! its trigger must be wired into the backend before the builder sees it.

use std::sync::Arc;

use dispenser_traits::clock::{Clock, MonotonicClock};
use dispenser_traits::{CoilDriver, StatusIndicator};

use crate::calibration::{Calibration, CalibrationEngine};
use crate::config::{CalibrationCfg, DispenseCfg, MotorCfg};
use crate::dispense::DispenseController;
use crate::error::{BuildError, Result};
use crate::events::EventBus;
use crate::machine::Dispenser;
use crate::mocks::NullIndicator;
use crate::motor::MotorDriver;
use crate::sensor::SensorEventSource;
use crate::status::Mode;

/// Type-state marker: no coil driver yet.
pub struct Missing;

pub struct DispenserBuilder<C, I> {
    coils: C,
    indicator: I,
    sensors: Option<SensorEventSource>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    motor: Option<MotorCfg>,
    calibration_cfg: Option<CalibrationCfg>,
    dispense: Option<DispenseCfg>,
    events: Option<EventBus>,
    calibration: Option<Calibration>,
}

impl Default for DispenserBuilder<Missing, NullIndicator> {
    fn default() -> Self {
        Self {
            coils: Missing,
            indicator: NullIndicator,
            sensors: None,
            clock: None,
            motor: None,
            calibration_cfg: None,
            dispense: None,
            events: None,
            calibration: None,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(cal: &CalibrationCfg, disp: &DispenseCfg) -> Result<()> {
    if cal.tolerance_divisor == 0 {
        return Err(invalid("tolerance_divisor must be >= 1"));
    }
    if cal.samples == 0 {
        return Err(invalid("samples must be >= 1"));
    }
    if cal.min_accepted == 0 || cal.min_accepted > cal.samples {
        return Err(invalid("min_accepted must be in [1, samples]"));
    }
    if cal.max_measurements < cal.samples {
        return Err(invalid("max_measurements must be >= samples"));
    }
    if cal.max_attempts == 0 {
        return Err(invalid("max_attempts must be >= 1"));
    }
    if cal.seek_limit_factor == 0 {
        return Err(invalid("seek_limit_factor must be >= 1"));
    }
    if disp.slot_divisor == 0 {
        return Err(invalid("slot_divisor must be >= 1"));
    }
    if cal.nominal_steps < disp.slot_divisor {
        return Err(invalid("nominal_steps must be >= slot_divisor"));
    }
    if disp.slots_per_cycle == 0 || disp.slots_per_cycle > disp.slot_divisor {
        return Err(invalid("slots_per_cycle must be in [1, slot_divisor]"));
    }
    Ok(())
}

// Setters that advance type-state
impl<I> DispenserBuilder<Missing, I> {
    pub fn with_coils<C: CoilDriver>(self, coils: C) -> DispenserBuilder<C, I> {
        DispenserBuilder {
            coils,
            indicator: self.indicator,
            sensors: self.sensors,
            clock: self.clock,
            motor: self.motor,
            calibration_cfg: self.calibration_cfg,
            dispense: self.dispense,
            events: self.events,
            calibration: self.calibration,
        }
    }
}

impl<C, I> DispenserBuilder<C, I> {
    pub fn with_indicator<J: StatusIndicator>(self, indicator: J) -> DispenserBuilder<C, J> {
        DispenserBuilder {
            coils: self.coils,
            indicator,
            sensors: self.sensors,
            clock: self.clock,
            motor: self.motor,
            calibration_cfg: self.calibration_cfg,
            dispense: self.dispense,
            events: self.events,
            calibration: self.calibration,
        }
    }
}

/// Chainable setters that do not affect type-state.
impl<C, I> DispenserBuilder<C, I> {
    pub fn with_sensors(mut self, sensors: SensorEventSource) -> Self {
        self.sensors = Some(sensors);
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
    pub fn with_motor(mut self, motor: MotorCfg) -> Self {
        self.motor = Some(motor);
        self
    }
    pub fn with_calibration_cfg(mut self, cfg: CalibrationCfg) -> Self {
        self.calibration_cfg = Some(cfg);
        self
    }
    pub fn with_dispense(mut self, cfg: DispenseCfg) -> Self {
        self.dispense = Some(cfg);
        self
    }
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }
    /// Start from a known calibration instead of an uncalibrated carousel.
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }
}

impl<C: CoilDriver, I: StatusIndicator> DispenserBuilder<C, I> {
    pub fn build(self) -> Result<Dispenser<C, I>> {
        let sensors = self
            .sensors
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensors))?;
        let motor_cfg = self.motor.unwrap_or_default();
        let cal_cfg = self.calibration_cfg.unwrap_or_default();
        let disp_cfg = self.dispense.unwrap_or_default();
        validate(&cal_cfg, &disp_cfg)?;

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };

        let mut dispenser = Dispenser {
            motor: MotorDriver::new(self.coils, motor_cfg.step_delay, clock.clone()),
            sensors,
            indicator: self.indicator,
            calibration_engine: CalibrationEngine::new(cal_cfg)
                .with_alignment_delay(motor_cfg.alignment_step_delay),
            dispense_controller: DispenseController::new(disp_cfg),
            calibration: self.calibration.unwrap_or_default(),
            mode: Mode::Idle,
            shown: None,
            events: self.events.unwrap_or_default(),
            clock,
        };
        dispenser.refresh_indicator();
        Ok(dispenser)
    }
}
