#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Calibration and dispense control engine (hardware-agnostic).
//!
//! All hardware goes through `dispenser_traits`: coils (`CoilDriver`), the
//! status LED (`StatusIndicator`), operator buttons (`OperatorInput`), and
//! sensor interrupts (`EdgeSink`, implemented here by `EdgeTrigger`).
//!
//! ## Architecture
//!
//! - **Motor**: half-step position counter and coil sequencing (`motor`)
//! - **Sensors**: sticky, coalescing home/drop flags (`sensor`)
//! - **Calibration**: steps-per-revolution measurement and slot alignment (`calibration`)
//! - **Dispense**: slot-by-slot advance with drop confirmation (`dispense`)
//! - **Dispenser**: engine selection, indicator cadence, coil release (`machine`)
//! - **Runner**: idle loop driven by operator input (`runner`)

pub mod builder;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod dispense;
pub mod error;
pub mod events;
pub mod hw_error;
pub mod machine;
pub mod mocks;
pub mod motor;
pub mod runner;
pub mod sensor;
pub mod status;
pub mod util;

pub use builder::{DispenserBuilder, Missing};
pub use calibration::{Calibration, CalibrationEngine, CalibrationPhase, CalibrationReport};
pub use config::{CalibrationCfg, DispenseCfg, MotorCfg, RecalibrationPolicy};
pub use dispense::{DispenseController, DispenseOutcome, SlotOutcome};
pub use error::{BuildError, DispenserError, Report, Result};
pub use events::{DispenserEvent, EventBus};
pub use machine::{CommandOutcome, Dispenser};
pub use motor::MotorDriver;
pub use runner::{LoopSummary, run_operator_loop};
pub use sensor::{EdgeTrigger, SensorEventSource};
pub use status::{Mode, Status};
