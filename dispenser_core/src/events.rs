//! Progress events published by the engines.
//!
//! Publishing never blocks the control thread: with no subscriber the bus is
//! a no-op, and a full or disconnected channel drops the event.
use crossbeam_channel::{Receiver, Sender, TrySendError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispenserEvent {
    CalibrationStarted { forced: bool },
    CalibrationSkipped { steps_per_revolution: u32 },
    HomeFound { steps: u64 },
    SampleMeasured { index: u32, steps: u64, accepted: bool },
    AttemptFailed { attempt: u32, accepted: u32, measured: u32 },
    Calibrated { steps_per_revolution: u32, accepted: u32, rejected: u32, attempts: u32 },
    Aligned { steps: u64 },
    CalibrationFailed { reason: String },
    SlotDispensed { slot: u32 },
    SlotMissed { slot: u32 },
    CycleComplete { dispensed: u32, slots: u32, steps: u64 },
    DispenseRefused,
    Advanced { slots: u32, steps: u64 },
}

impl DispenserEvent {
    /// Stable snake_case name for structured output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CalibrationStarted { .. } => "calibration_started",
            Self::CalibrationSkipped { .. } => "calibration_skipped",
            Self::HomeFound { .. } => "home_found",
            Self::SampleMeasured { .. } => "sample_measured",
            Self::AttemptFailed { .. } => "attempt_failed",
            Self::Calibrated { .. } => "calibrated",
            Self::Aligned { .. } => "aligned",
            Self::CalibrationFailed { .. } => "calibration_failed",
            Self::SlotDispensed { .. } => "slot_dispensed",
            Self::SlotMissed { .. } => "slot_missed",
            Self::CycleComplete { .. } => "cycle_complete",
            Self::DispenseRefused => "dispense_refused",
            Self::Advanced { .. } => "advanced",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventBus {
    tx: Option<Sender<DispenserEvent>>,
}

impl EventBus {
    pub fn new(tx: Sender<DispenserEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Bus plus receiver over a bounded channel.
    pub fn bounded(cap: usize) -> (Self, Receiver<DispenserEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(cap);
        (Self::new(tx), rx)
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn publish(&self, ev: DispenserEvent) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(ev) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                tracing::debug!(kind = ev.kind(), "event channel full, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
