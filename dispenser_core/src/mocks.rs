//! Stand-ins for optional collaborators.

use dispenser_traits::{HwResult, IndicatorMode, StatusIndicator};

/// Indicator that discards every intent; the builder default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn set_mode(&mut self, _mode: IndicatorMode) -> HwResult<()> {
        Ok(())
    }

    fn attention(&mut self, _pulses: u8) -> HwResult<()> {
        Ok(())
    }
}
