//! Top-level dispenser: engine selection and indicator cadence.
//!
//! `IDLE -> CALIBRATING -> IDLE` and `IDLE -> DISPENSING -> IDLE`. An engine
//! runs to completion (or its own failure exit) before the next command is
//! looked at; there is no mid-cycle cancellation.
use std::sync::Arc;

use dispenser_traits::{Clock, CoilDriver, IndicatorMode, OperatorCommand, StatusIndicator};
use tracing::{debug, info, warn};

use crate::builder::{DispenserBuilder, Missing};
use crate::calibration::{Calibration, CalibrationEngine, CalibrationReport};
use crate::dispense::{DispenseController, DispenseOutcome};
use crate::error::Result;
use crate::events::{DispenserEvent, EventBus};
use crate::mocks::NullIndicator;
use crate::motor::MotorDriver;
use crate::sensor::SensorEventSource;
use crate::status::{Mode, Status};

/// What a handled operator command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Calibrated(CalibrationReport),
    Dispensed(DispenseOutcome),
}

pub struct Dispenser<C, I> {
    pub(crate) motor: MotorDriver<C>,
    pub(crate) sensors: SensorEventSource,
    pub(crate) indicator: I,
    pub(crate) calibration_engine: CalibrationEngine,
    pub(crate) dispense_controller: DispenseController,
    pub(crate) calibration: Calibration,
    pub(crate) mode: Mode,
    pub(crate) shown: Option<IndicatorMode>,
    pub(crate) events: EventBus,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
}

impl<C, I> core::fmt::Debug for Dispenser<C, I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispenser")
            .field("motor", &self.motor)
            .field("calibration", &self.calibration)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Dispenser<Missing, NullIndicator> {
    pub fn builder() -> DispenserBuilder<Missing, NullIndicator> {
        DispenserBuilder::default()
    }
}

impl<C: CoilDriver, I: StatusIndicator> Dispenser<C, I> {
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    pub fn status(&self) -> Status {
        Status {
            calibrated: self.calibration.is_valid,
            steps_per_revolution: self
                .calibration
                .is_valid
                .then_some(self.calibration.steps_per_revolution),
            position: self.motor.position(),
            phase: self.motor.phase(),
            mode: self.mode,
        }
    }

    /// Run the calibration engine. `force` overrides the skip-if-valid policy.
    ///
    /// A non-skipped run drops the stored result first, so a failed run leaves
    /// the dispenser uncalibrated.
    pub fn calibrate(&mut self, force: bool) -> Result<CalibrationReport> {
        if self
            .calibration_engine
            .would_skip(&self.calibration, force)
        {
            return self.calibration_engine.calibrate(
                &mut self.motor,
                &self.sensors,
                self.calibration,
                force,
                &self.events,
            );
        }
        self.calibration.invalidate();
        self.enter(Mode::Calibrating);
        let res = self.calibration_engine.calibrate(
            &mut self.motor,
            &self.sensors,
            self.calibration,
            force,
            &self.events,
        );
        if let Ok(report) = &res {
            self.calibration = report.calibration;
        }
        self.leave();
        res
    }

    /// Run one dispensing cycle against the stored calibration.
    pub fn dispense(&mut self) -> Result<DispenseOutcome> {
        // Refused before the indicator or coils are touched.
        self.dispense_controller
            .ensure_calibrated(self.calibration, &self.events)?;
        self.enter(Mode::Dispensing);
        let res = self.dispense_controller.dispense_all(
            &mut self.motor,
            &self.sensors,
            &mut self.indicator,
            self.calibration,
            &self.events,
        );
        if res.is_ok() && self.dispense_controller.cfg().invalidate_after_cycle {
            info!("calibration invalidated after cycle");
            self.calibration.invalidate();
        }
        self.leave();
        res
    }

    /// Advance `slots` slot fractions using the calibrated revolution, or the
    /// nominal one when uncalibrated. Returns half-steps issued.
    pub fn advance_slots(&mut self, slots: u32) -> Result<u64> {
        let total = if self.calibration.is_valid {
            self.calibration.steps_per_revolution
        } else {
            self.calibration_engine.cfg().nominal_steps
        };
        let divisor = self.dispense_controller.cfg().slot_divisor;
        self.enter(Mode::Advancing);
        let res = self.motor.advance_fraction(total, slots, divisor);
        self.leave();
        let steps = res?;
        info!(slots, steps, calibrated = self.calibration.is_valid, "carousel advanced");
        self.events
            .publish(DispenserEvent::Advanced { slots, steps });
        Ok(steps)
    }

    pub fn handle(&mut self, cmd: OperatorCommand) -> Result<CommandOutcome> {
        debug!(?cmd, "operator command");
        match cmd {
            OperatorCommand::Calibrate => self.calibrate(false).map(CommandOutcome::Calibrated),
            OperatorCommand::Dispense => self.dispense().map(CommandOutcome::Dispensed),
        }
    }

    /// Push the indicator intent for the current state, if it changed.
    pub fn refresh_indicator(&mut self) {
        let want = match self.mode {
            Mode::Idle if self.calibration.is_valid => IndicatorMode::BlinkFast,
            Mode::Idle => IndicatorMode::BlinkSlow,
            _ => IndicatorMode::Off,
        };
        if self.shown == Some(want) {
            return;
        }
        match self.indicator.set_mode(want) {
            Ok(()) => self.shown = Some(want),
            Err(e) => warn!(error = %e, ?want, "indicator update failed"),
        }
    }

    fn enter(&mut self, mode: Mode) {
        self.mode = mode;
        self.refresh_indicator();
    }

    /// Back to idle with the coils de-energized.
    fn leave(&mut self) {
        if let Err(e) = self.motor.release() {
            warn!(error = %e, "coil release failed");
        }
        self.mode = Mode::Idle;
        self.refresh_indicator();
    }
}
