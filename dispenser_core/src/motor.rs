//! Half-step motor driver.
//!
//! Owns the logical step position. The coil pattern for a step is always
//! `HALF_STEP_SEQUENCE[position mod 8]`, so the physical phase never drifts
//! from the counter as long as every write succeeds.
use std::sync::Arc;
use std::time::Duration;

use dispenser_traits::{Clock, CoilDriver, HALF_STEP_SEQUENCE};

use crate::error::{DispenserError, Result};
use crate::hw_error;

pub struct MotorDriver<C> {
    coils: C,
    position: i64,
    step_delay: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<C> core::fmt::Debug for MotorDriver<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MotorDriver")
            .field("position", &self.position)
            .field("phase", &self.phase())
            .field("step_delay", &self.step_delay)
            .finish()
    }
}

impl<C> MotorDriver<C> {
    /// Half-steps issued since boot. Wraps on overflow; only deltas and phase matter.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Index into `HALF_STEP_SEQUENCE` of the next pattern to be written.
    pub fn phase(&self) -> usize {
        self.position.rem_euclid(8) as usize
    }

    pub fn step_delay(&self) -> Duration {
        self.step_delay
    }
}

impl<C: CoilDriver> MotorDriver<C> {
    pub fn new(coils: C, step_delay: Duration, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            coils,
            position: 0,
            step_delay,
            clock,
        }
    }

    /// Start from a non-zero counter (e.g. to exercise wrap-around).
    pub fn with_position(mut self, position: i64) -> Self {
        self.position = position;
        self
    }

    /// Write the pattern for the current phase, count it, then settle.
    pub fn advance_one_half_step(&mut self) -> Result<()> {
        self.step_with_delay(self.step_delay)
    }

    fn step_with_delay(&mut self, delay: Duration) -> Result<()> {
        let pattern = HALF_STEP_SEQUENCE[self.phase()];
        self.coils
            .energize(pattern)
            .map_err(|e| hw_error::report(&*e))?;
        self.position = self.position.wrapping_add(1);
        tracing::trace!(position = self.position, ?pattern, "half-step");
        self.clock.sleep(delay);
        Ok(())
    }

    /// Issue `steps` half-steps with a custom settle delay. Returns steps issued.
    pub fn advance(&mut self, steps: u64, delay: Duration) -> Result<u64> {
        for _ in 0..steps {
            self.step_with_delay(delay)?;
        }
        Ok(steps)
    }

    /// Advance `numerator / denominator` of a `total`-step revolution.
    pub fn advance_fraction(&mut self, total: u32, numerator: u32, denominator: u32) -> Result<u64> {
        let steps = crate::util::fraction_steps(total, numerator, denominator).ok_or_else(|| {
            eyre::Report::new(DispenserError::Config(
                "fraction denominator must be >= 1".into(),
            ))
        })?;
        self.advance(steps, self.step_delay)
    }

    /// Block without moving.
    pub fn dwell(&self, d: Duration) {
        self.clock.sleep(d);
    }

    /// De-energize all coils. The position counter is untouched.
    pub fn release(&mut self) -> Result<()> {
        self.coils.release().map_err(|e| hw_error::report(&*e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispenser_traits::{CoilPattern, HwResult, ManualClock};

    #[derive(Default)]
    struct Recorder {
        writes: Vec<CoilPattern>,
    }

    impl CoilDriver for &mut Recorder {
        fn energize(&mut self, pattern: CoilPattern) -> HwResult<()> {
            self.writes.push(pattern);
            Ok(())
        }
    }

    fn motor<'a>(rec: &'a mut Recorder, clock: &ManualClock) -> MotorDriver<&'a mut Recorder> {
        MotorDriver::new(rec, Duration::from_millis(2), Arc::new(clock.clone()))
    }

    #[test]
    fn each_half_step_writes_table_entry_and_counts_one() {
        let clock = ManualClock::new();
        let mut rec = Recorder::default();
        let mut m = motor(&mut rec, &clock);
        for i in 0..10 {
            assert_eq!(m.position(), i);
            m.advance_one_half_step().unwrap();
        }
        assert_eq!(clock.elapsed(), Duration::from_millis(20));
        drop(m);
        for (i, w) in rec.writes.iter().enumerate() {
            assert_eq!(*w, HALF_STEP_SEQUENCE[i % 8]);
        }
    }

    #[test]
    fn position_wraps_without_losing_phase() {
        let clock = ManualClock::new();
        let mut rec = Recorder::default();
        let mut m = motor(&mut rec, &clock).with_position(i64::MAX);
        let phase = m.phase();
        m.advance_one_half_step().unwrap();
        assert_eq!(m.position(), i64::MIN);
        assert_eq!(m.phase(), (phase + 1) % 8);
    }

    #[test]
    fn zero_denominator_is_a_config_error() {
        let clock = ManualClock::new();
        let mut rec = Recorder::default();
        let mut m = motor(&mut rec, &clock);
        let err = m.advance_fraction(4096, 1, 0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DispenserError>(),
            Some(DispenserError::Config(_))
        ));
        assert_eq!(m.position(), 0);
    }

    #[test]
    fn release_writes_all_off_without_moving() {
        let clock = ManualClock::new();
        let mut rec = Recorder::default();
        let mut m = motor(&mut rec, &clock);
        m.advance(3, Duration::ZERO).unwrap();
        m.release().unwrap();
        assert_eq!(m.position(), 3);
        drop(m);
        assert_eq!(rec.writes.last(), Some(&[false; 4]));
    }

    #[test]
    fn debug_shows_position_and_phase() {
        let clock = ManualClock::new();
        let mut rec = Recorder::default();
        let m = motor(&mut rec, &clock).with_position(-3);
        let text = format!("{m:?}");
        assert!(text.contains("position: -3"), "{text}");
        assert!(text.contains("phase: 5"), "{text}");
    }
}
