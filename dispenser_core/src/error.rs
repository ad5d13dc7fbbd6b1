use thiserror::Error;

use crate::calibration::CalibrationPhase;

#[derive(Debug, Error, Clone)]
pub enum DispenserError {
    #[error("calibration timed out while {phase}: no home edge within {limit} half-steps")]
    CalibrationTimeout { phase: CalibrationPhase, limit: u64 },
    #[error("calibration rejected: {accepted} of {measured} samples within tolerance")]
    CalibrationRejected { accepted: u32, measured: u32 },
    #[error("carousel is not calibrated")]
    NotCalibrated,
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for hardware")]
    Timeout,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing sensor event source")]
    MissingSensors,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
