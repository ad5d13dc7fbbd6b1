//! Slot-by-slot dispensing with drop confirmation.
use dispenser_traits::{CoilDriver, StatusIndicator};
use tracing::{info, warn};

use crate::calibration::Calibration;
use crate::config::DispenseCfg;
use crate::error::{DispenserError, Result};
use crate::events::{DispenserEvent, EventBus};
use crate::motor::MotorDriver;
use crate::sensor::SensorEventSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    Dispensed,
    /// No drop edge inside the settle window. Not an error; the cycle continues.
    Missed,
}

/// Result of one cycle. A fresh value is built for every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispenseOutcome {
    pub slots: Vec<SlotOutcome>,
    pub dispensed: u32,
    pub steps: u64,
}

impl DispenseOutcome {
    pub fn missed(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == SlotOutcome::Missed)
            .map(|(i, _)| i as u32)
    }
}

#[derive(Debug, Clone)]
pub struct DispenseController {
    cfg: DispenseCfg,
}

impl DispenseController {
    pub fn new(cfg: DispenseCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &DispenseCfg {
        &self.cfg
    }

    /// Refuse a cycle against an invalid calibration: logs, publishes
    /// `DispenseRefused` and returns `NotCalibrated`.
    pub fn ensure_calibrated(&self, calib: Calibration, events: &EventBus) -> Result<()> {
        if calib.is_valid {
            return Ok(());
        }
        warn!("dispense refused: carousel is not calibrated");
        events.publish(DispenserEvent::DispenseRefused);
        Err(eyre::Report::new(DispenserError::NotCalibrated))
    }

    /// Advance one slot at a time for a whole cycle, checking for a drop after each.
    ///
    /// Refuses with `NotCalibrated` before touching the motor if `calib` is not valid.
    /// Indicator failures are logged and do not stop the cycle.
    pub fn dispense_all<C: CoilDriver, I: StatusIndicator + ?Sized>(
        &self,
        motor: &mut MotorDriver<C>,
        sensors: &SensorEventSource,
        indicator: &mut I,
        calib: Calibration,
        events: &EventBus,
    ) -> Result<DispenseOutcome> {
        self.ensure_calibrated(calib, events)?;

        let slots = self.cfg.slots_per_cycle;
        let mut outcome = DispenseOutcome {
            slots: Vec::with_capacity(slots as usize),
            ..DispenseOutcome::default()
        };
        info!(
            slots,
            steps_per_revolution = calib.steps_per_revolution,
            "dispense cycle started"
        );

        for slot in 0..slots {
            // Only a drop caused by this advance counts.
            let _ = sensors.poll_drop();
            outcome.steps +=
                motor.advance_fraction(calib.steps_per_revolution, 1, self.cfg.slot_divisor)?;
            motor.dwell(self.cfg.settle);

            if sensors.poll_drop() {
                outcome.dispensed += 1;
                outcome.slots.push(SlotOutcome::Dispensed);
                info!(slot, dispensed = outcome.dispensed, "pill dispensed");
                events.publish(DispenserEvent::SlotDispensed { slot });
            } else {
                outcome.slots.push(SlotOutcome::Missed);
                warn!(slot, "no dispense detected");
                events.publish(DispenserEvent::SlotMissed { slot });
                if let Err(e) = indicator.attention(self.cfg.attention_pulses) {
                    warn!(error = %e, slot, "attention signal failed");
                }
            }
        }

        info!(
            dispensed = outcome.dispensed,
            slots,
            steps = outcome.steps,
            "dispense cycle complete"
        );
        events.publish(DispenserEvent::CycleComplete {
            dispensed: outcome.dispensed,
            slots,
            steps: outcome.steps,
        });
        Ok(outcome)
    }
}
