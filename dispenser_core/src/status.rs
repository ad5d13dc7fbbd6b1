//! Dispenser mode and status snapshot.
use std::fmt;

/// Which engine, if any, owns the motor. Engines run to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Idle,
    Calibrating,
    Dispensing,
    /// Manual slot advance.
    Advancing,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Calibrating => "calibrating",
            Self::Dispensing => "dispensing",
            Self::Advancing => "advancing",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub calibrated: bool,
    /// `None` until a calibration has been earned.
    pub steps_per_revolution: Option<u32>,
    pub position: i64,
    pub phase: usize,
    pub mode: Mode,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "calibrated: {}", if self.calibrated { "yes" } else { "no" })?;
        match self.steps_per_revolution {
            Some(n) => writeln!(f, "steps per revolution: {n}")?,
            None => writeln!(f, "steps per revolution: not available")?,
        }
        writeln!(f, "position: {} (phase {})", self.position, self.phase)?;
        write!(f, "mode: {}", self.mode)
    }
}
