//! Maps `Box<dyn Error>` from trait boundaries to typed `DispenserError`.
//!
//! The traits in `dispenser_traits` use `Box<dyn Error + Send + Sync>` so any
//! backend can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `dispenser_hardware::HwError`.

use crate::error::DispenserError;

/// Map a trait-boundary error to a typed `DispenserError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> DispenserError {
    #[cfg(feature = "hardware-errors")]
    {
        use dispenser_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::ReleaseTimeout => DispenserError::Timeout,
                HwError::Io(io) => DispenserError::Hardware(io.to_string()),
                other => DispenserError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        DispenserError::Timeout
    } else {
        DispenserError::Hardware(s)
    }
}

/// Wrap a trait-boundary error into an `eyre::Report` carrying the typed error.
pub(crate) fn report(e: &(dyn std::error::Error + 'static)) -> eyre::Report {
    eyre::Report::new(map_hw_error(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_text_maps_to_timeout() {
        let e = std::io::Error::other("button release timeout");
        assert!(matches!(map_hw_error(&e), DispenserError::Timeout));
    }

    #[test]
    fn other_text_maps_to_hardware() {
        let e = std::io::Error::other("gpio busy");
        match map_hw_error(&e) {
            DispenserError::Hardware(s) => assert_eq!(s, "gpio busy"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn typed_hw_errors_are_downcast() {
        use dispenser_hardware::error::HwError;
        assert!(matches!(
            map_hw_error(&HwError::ReleaseTimeout),
            DispenserError::Timeout
        ));
        assert!(matches!(
            map_hw_error(&HwError::SimPoisoned),
            DispenserError::HardwareFault(_)
        ));
    }
}
