//! Hardware seams for the carousel dispenser.
//!
//! The core engine only talks to the outside world through these traits, so
//! the same control code runs against Raspberry Pi GPIO or the simulator.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Boxed error used at every trait boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Energization state of the four motor coils (IN1..IN4).
pub type CoilPattern = [bool; 4];

/// Half-step energization table for a unipolar 4-coil stepper (28BYJ-48 style).
///
/// Consecutive entries differ in exactly one coil; index arithmetic is mod 8.
pub const HALF_STEP_SEQUENCE: [CoilPattern; 8] = [
    [true, false, false, false],
    [true, true, false, false],
    [false, true, false, false],
    [false, true, true, false],
    [false, false, true, false],
    [false, false, true, true],
    [false, false, false, true],
    [true, false, false, true],
];

/// Index of `pattern` in [`HALF_STEP_SEQUENCE`], if it is one of the eight phases.
pub fn phase_of(pattern: CoilPattern) -> Option<usize> {
    HALF_STEP_SEQUENCE.iter().position(|p| *p == pattern)
}

/// Four digital outputs driving the stepper coils.
pub trait CoilDriver {
    fn energize(&mut self, pattern: CoilPattern) -> HwResult<()>;

    /// De-energize all coils (motor free-wheels, no holding torque).
    fn release(&mut self) -> HwResult<()> {
        self.energize([false; 4])
    }
}

/// Edge-triggered sensor lines feeding the sticky event flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorLine {
    /// Optical home/reference sensor, fires once per revolution.
    Home,
    /// Piezo drop sensor, fires when a pill falls.
    Drop,
}

/// Receiver of falling edges, called from interrupt context.
///
/// Implementations must not block.
pub trait EdgeSink: Send + Sync {
    fn falling_edge(&self, line: SensorLine);
}

/// Intent shown by the status LED. The indicator owns the blink timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorMode {
    /// Waiting for calibration.
    BlinkSlow,
    /// Calibrated and ready to dispense.
    BlinkFast,
    /// Busy (calibrating or dispensing).
    Off,
}

pub trait StatusIndicator {
    fn set_mode(&mut self, mode: IndicatorMode) -> HwResult<()>;

    /// One-shot attention signal: `pulses` on/off blinks, then back to the current mode.
    fn attention(&mut self, pulses: u8) -> HwResult<()>;
}

/// Discrete commands produced by the two operator buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Calibrate,
    Dispense,
}

pub trait OperatorInput {
    /// Returns at most one press, or `None` when no button is down.
    ///
    /// A held button blocks the call until it is released (or the
    /// implementation's release timeout expires), so one press yields one
    /// command.
    fn poll(&mut self) -> HwResult<Option<OperatorCommand>>;
}

impl<T: CoilDriver + ?Sized> CoilDriver for Box<T> {
    fn energize(&mut self, pattern: CoilPattern) -> HwResult<()> {
        (**self).energize(pattern)
    }
    fn release(&mut self) -> HwResult<()> {
        (**self).release()
    }
}

impl<T: EdgeSink + ?Sized> EdgeSink for std::sync::Arc<T> {
    fn falling_edge(&self, line: SensorLine) {
        (**self).falling_edge(line)
    }
}

impl<T: StatusIndicator + ?Sized> StatusIndicator for Box<T> {
    fn set_mode(&mut self, mode: IndicatorMode) -> HwResult<()> {
        (**self).set_mode(mode)
    }
    fn attention(&mut self, pulses: u8) -> HwResult<()> {
        (**self).attention(pulses)
    }
}

impl<T: OperatorInput + ?Sized> OperatorInput for Box<T> {
    fn poll(&mut self) -> HwResult<Option<OperatorCommand>> {
        (**self).poll()
    }
}
