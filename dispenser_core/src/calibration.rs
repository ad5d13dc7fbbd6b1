//! Steps-per-revolution calibration.
//!
//! ```text
//! SEEKING_HOME -> MEASURING(0..samples) -> VALIDATING -> ALIGNING -> DONE
//!      ^                                        |
//!      +------------ next attempt --------------+
//! ```
//!
//! A sample is the half-step count between two consecutive home edges. Out of
//! band samples are retried in place; an attempt that ends with fewer than
//! `min_accepted` good samples restarts from home seeking. Seeking and each
//! measurement are bounded by `nominal_steps * seek_limit_factor` half-steps.
use std::fmt;
use std::time::Duration;

use dispenser_traits::CoilDriver;
use tracing::{debug, info, warn};

use crate::config::{CalibrationCfg, RecalibrationPolicy};
use crate::error::{DispenserError, Result};
use crate::events::{DispenserEvent, EventBus};
use crate::motor::MotorDriver;
use crate::sensor::SensorEventSource;
use crate::util::{integer_average, within_tolerance};

/// Result of the last calibration. Lives only in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Calibration {
    pub steps_per_revolution: u32,
    pub is_valid: bool,
}

impl Calibration {
    pub const fn valid(steps_per_revolution: u32) -> Self {
        Self {
            steps_per_revolution,
            is_valid: true,
        }
    }

    pub const fn invalid() -> Self {
        Self {
            steps_per_revolution: 0,
            is_valid: false,
        }
    }

    /// Keep the last value for display but require it to be re-earned.
    pub fn invalidate(&mut self) {
        self.is_valid = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationReport {
    pub calibration: Calibration,
    /// Accepted samples of the successful attempt.
    pub accepted: Vec<u64>,
    /// Rejected samples of the successful attempt.
    pub rejected: Vec<u64>,
    pub attempts: u32,
    /// True when the stored result was returned without moving.
    pub skipped: bool,
    /// Half-steps issued, alignment included.
    pub steps_issued: u64,
}

impl CalibrationReport {
    fn skipped(calibration: Calibration) -> Self {
        Self {
            calibration,
            accepted: Vec::new(),
            rejected: Vec::new(),
            attempts: 0,
            skipped: true,
            steps_issued: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    Idle,
    SeekingHome,
    Measuring(u32),
    Validating,
    Aligning,
    Done,
    Failed,
}

impl fmt::Display for CalibrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::SeekingHome => f.write_str("seeking home"),
            Self::Measuring(i) => write!(f, "measuring sample {i}"),
            Self::Validating => f.write_str("validating"),
            Self::Aligning => f.write_str("aligning"),
            Self::Done => f.write_str("done"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug)]
pub struct CalibrationEngine {
    cfg: CalibrationCfg,
    alignment_delay: Option<Duration>,
    phase: CalibrationPhase,
}

impl CalibrationEngine {
    pub fn new(cfg: CalibrationCfg) -> Self {
        Self {
            cfg,
            alignment_delay: None,
            phase: CalibrationPhase::Idle,
        }
    }

    /// Step delay for the alignment move; `None` uses the motor's own.
    pub fn with_alignment_delay(mut self, delay: Option<Duration>) -> Self {
        self.alignment_delay = delay;
        self
    }

    pub fn cfg(&self) -> &CalibrationCfg {
        &self.cfg
    }

    /// Where the last (or current) run is or stopped.
    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn accepts(&self, sample: u64) -> bool {
        within_tolerance(sample, self.cfg.nominal_steps, self.cfg.tolerance())
    }

    /// True if `calibrate(current, force)` would return `current` without moving.
    pub fn would_skip(&self, current: &Calibration, force: bool) -> bool {
        !force
            && self.cfg.policy == RecalibrationPolicy::SkipIfValid
            && current.is_valid
            && current.steps_per_revolution > self.cfg.sanity_floor
    }

    pub fn calibrate<C: CoilDriver>(
        &mut self,
        motor: &mut MotorDriver<C>,
        sensors: &SensorEventSource,
        current: Calibration,
        force: bool,
        events: &EventBus,
    ) -> Result<CalibrationReport> {
        if self.would_skip(&current, force) {
            info!(
                steps_per_revolution = current.steps_per_revolution,
                "calibration skipped: stored result is valid"
            );
            events.publish(DispenserEvent::CalibrationSkipped {
                steps_per_revolution: current.steps_per_revolution,
            });
            return Ok(CalibrationReport::skipped(current));
        }

        info!(
            forced = force,
            nominal = self.cfg.nominal_steps,
            tolerance = self.cfg.tolerance(),
            limit = self.cfg.step_limit(),
            "calibration started"
        );
        events.publish(DispenserEvent::CalibrationStarted { forced: force });

        let start = motor.position();
        match self.run_attempts(motor, sensors, events) {
            Ok(mut report) => {
                report.steps_issued = motor.position().wrapping_sub(start).unsigned_abs();
                self.phase = CalibrationPhase::Done;
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, phase = %self.phase, "calibration failed");
                self.phase = CalibrationPhase::Failed;
                events.publish(DispenserEvent::CalibrationFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn run_attempts<C: CoilDriver>(
        &mut self,
        motor: &mut MotorDriver<C>,
        sensors: &SensorEventSource,
        events: &EventBus,
    ) -> Result<CalibrationReport> {
        let wanted = self.cfg.samples as usize;
        let cap = self.cfg.max_measurements.max(self.cfg.samples) as usize;
        let mut last = (0u32, 0u32);

        for attempt in 1..=self.cfg.max_attempts {
            // An edge latched before this attempt is not a home crossing we caused.
            if sensors.poll_home() {
                debug!(attempt, "discarded stale home edge");
            }

            self.phase = CalibrationPhase::SeekingHome;
            let seek = self.count_to_home(motor, sensors)?;
            info!(attempt, steps = seek, "home found");
            events.publish(DispenserEvent::HomeFound { steps: seek });

            let mut accepted = Vec::with_capacity(wanted);
            let mut rejected = Vec::new();
            while accepted.len() < wanted && accepted.len() + rejected.len() < cap {
                let index = (accepted.len() + rejected.len()) as u32;
                self.phase = CalibrationPhase::Measuring(index);
                let steps = self.count_to_home(motor, sensors)?;
                let ok = self.accepts(steps);
                events.publish(DispenserEvent::SampleMeasured {
                    index,
                    steps,
                    accepted: ok,
                });
                if ok {
                    info!(attempt, index, steps, "sample accepted");
                    accepted.push(steps);
                    if !self.cfg.sample_pause.is_zero() {
                        motor.dwell(self.cfg.sample_pause);
                    }
                } else {
                    warn!(
                        attempt,
                        index,
                        steps,
                        tolerance = self.cfg.tolerance(),
                        "sample rejected: outside tolerance"
                    );
                    rejected.push(steps);
                }
            }

            self.phase = CalibrationPhase::Validating;
            let n_ok = accepted.len() as u32;
            let measured = n_ok + rejected.len() as u32;
            if n_ok < self.cfg.min_accepted.max(1) {
                warn!(attempt, accepted = n_ok, measured, "calibration attempt failed validation");
                events.publish(DispenserEvent::AttemptFailed {
                    attempt,
                    accepted: n_ok,
                    measured,
                });
                last = (n_ok, measured);
                continue;
            }

            let steps_per_revolution = integer_average(&accepted)
                .and_then(|avg| u32::try_from(avg).ok())
                .ok_or_else(|| {
                    eyre::Report::new(DispenserError::Config(
                        "calibrated revolution does not fit in u32".into(),
                    ))
                })?;
            info!(
                steps_per_revolution,
                accepted = n_ok,
                rejected = rejected.len(),
                attempt,
                "average computed"
            );

            self.phase = CalibrationPhase::Aligning;
            let delay = self.alignment_delay.unwrap_or(motor.step_delay());
            let aligned = motor.advance(u64::from(self.cfg.alignment_steps), delay)?;
            info!(steps = aligned, "aligned to first slot");
            events.publish(DispenserEvent::Aligned { steps: aligned });
            events.publish(DispenserEvent::Calibrated {
                steps_per_revolution,
                accepted: n_ok,
                rejected: rejected.len() as u32,
                attempts: attempt,
            });

            return Ok(CalibrationReport {
                calibration: Calibration::valid(steps_per_revolution),
                accepted,
                rejected,
                attempts: attempt,
                skipped: false,
                steps_issued: 0,
            });
        }

        Err(eyre::Report::new(DispenserError::CalibrationRejected {
            accepted: last.0,
            measured: last.1,
        }))
    }

    /// Step until the home flag is observed; returns steps taken.
    fn count_to_home<C: CoilDriver>(
        &self,
        motor: &mut MotorDriver<C>,
        sensors: &SensorEventSource,
    ) -> Result<u64> {
        let limit = self.cfg.step_limit();
        let mut steps = 0u64;
        loop {
            motor.advance_one_half_step()?;
            steps += 1;
            if sensors.poll_home() {
                return Ok(steps);
            }
            if steps >= limit {
                return Err(eyre::Report::new(DispenserError::CalibrationTimeout {
                    phase: self.phase,
                    limit,
                }));
            }
        }
    }
}
