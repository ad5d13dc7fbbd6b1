//! Integer helpers shared by the engines.

/// Half-steps for `numerator / denominator` of a revolution.
///
/// Divides first, as the carousel firmware always has: with
/// `total = 4095, den = 8` each slot is 511 steps, not 511.875.
/// Returns `None` for a zero denominator.
#[inline]
pub fn fraction_steps(total: u32, numerator: u32, denominator: u32) -> Option<u64> {
    if denominator == 0 {
        return None;
    }
    Some(u64::from(total / denominator) * u64::from(numerator))
}

/// Acceptance band half-width; a zero divisor collapses the band to exact matches.
#[inline]
pub fn tolerance(nominal: u32, divisor: u32) -> u32 {
    nominal.checked_div(divisor).unwrap_or(0)
}

#[inline]
pub fn within_tolerance(sample: u64, nominal: u32, tolerance: u32) -> bool {
    sample.abs_diff(u64::from(nominal)) <= u64::from(tolerance)
}

/// Truncating mean; `None` for an empty slice.
pub fn integer_average(samples: &[u64]) -> Option<u64> {
    if samples.is_empty() {
        return None;
    }
    let sum: u128 = samples.iter().map(|&s| u128::from(s)).sum();
    u64::try_from(sum / samples.len() as u128).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_fraction_divides_before_multiplying() {
        assert_eq!(fraction_steps(4096, 1, 8), Some(512));
        assert_eq!(fraction_steps(4095, 1, 8), Some(511));
        assert_eq!(fraction_steps(4095, 8, 8), Some(4088));
        assert_eq!(fraction_steps(4096, 3, 0), None);
    }

    #[test]
    fn nominal_tolerance_is_two_percent() {
        assert_eq!(tolerance(4096, 50), 81);
        assert!(within_tolerance(4015, 4096, 81));
        assert!(within_tolerance(4177, 4096, 81));
        assert!(!within_tolerance(4178, 4096, 81));
        assert!(!within_tolerance(3000, 4096, 81));
    }

    #[test]
    fn average_truncates() {
        assert_eq!(integer_average(&[4090, 4100, 4097]), Some(4095));
        assert_eq!(integer_average(&[]), None);
    }
}
