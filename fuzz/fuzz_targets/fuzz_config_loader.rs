#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = dispenser_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A validated config must keep its derived values in range.
            let slots = cfg.dispense.effective_slots();
            assert!(slots >= 1 && slots <= cfg.dispense.slot_divisor);
            assert!(cfg.calibration.nominal_steps >= cfg.dispense.slot_divisor);
        }
    }
});
