use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Wait until the provided `is_pressed` predicate becomes false (active-low
/// button released, line back high), or a timeout expires. Sleeps in small
/// intervals to avoid CPU spinning.
pub fn wait_until_released(
    mut is_pressed: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while is_pressed() {
        if Instant::now() >= deadline {
            return Err(HwError::ReleaseTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}
