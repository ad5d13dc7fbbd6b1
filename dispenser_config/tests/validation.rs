use dispenser_config::{DispenseProfile, RecalibrationPolicy, load_toml};
use rstest::rstest;

const PINS: &str = r#"
[pins]
home_sensor = 17
drop_sensor = 27
coils = [2, 3, 4, 6]
status_led = 22
calibrate_button = 9
dispense_button = 10
"#;

fn with(extra: &str) -> String {
    format!("{PINS}\n{extra}")
}

#[test]
fn minimal_file_gets_stock_defaults() {
    let cfg = load_toml(PINS).expect("parse TOML");
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.motor.step_delay_ms, 2);
    assert_eq!(cfg.calibration.nominal_steps, 4096);
    assert_eq!(cfg.calibration.tolerance_divisor, 50);
    assert_eq!(cfg.calibration.alignment_steps, 166);
    assert_eq!(cfg.calibration.policy, RecalibrationPolicy::SkipIfValid);
    assert_eq!(cfg.dispense.profile, DispenseProfile::Continuous);
    assert_eq!(cfg.dispense.effective_slots(), 8);
    assert!(!cfg.dispense.effective_invalidate());
    assert_eq!(cfg.dispense.settle_ms, 80);
    assert_eq!(cfg.dispense.attention_pulses, 6);
}

#[test]
fn weekly_profile_presets_and_overrides() {
    let cfg = load_toml(&with("[dispense]\nprofile = \"weekly\"\n")).expect("parse");
    assert_eq!(cfg.dispense.effective_slots(), 7);
    assert!(cfg.dispense.effective_invalidate());

    let cfg = load_toml(&with(
        "[dispense]\nprofile = \"weekly\"\nslots_per_cycle = 8\ninvalidate_after_cycle = false\n",
    ))
    .expect("parse");
    assert_eq!(cfg.dispense.effective_slots(), 8);
    assert!(!cfg.dispense.effective_invalidate());
}

#[test]
fn policy_accepts_kebab_case() {
    let cfg = load_toml(&with("[calibration]\npolicy = \"always\"\n")).expect("parse");
    assert_eq!(cfg.calibration.policy, RecalibrationPolicy::Always);
    let cfg = load_toml(&with("[calibration]\npolicy = \"skip-if-valid\"\n")).expect("parse");
    assert_eq!(cfg.calibration.policy, RecalibrationPolicy::SkipIfValid);
}

#[test]
fn unknown_profile_fails_to_parse() {
    assert!(load_toml(&with("[dispense]\nprofile = \"monthly\"\n")).is_err());
}

#[test]
fn missing_pins_fails_to_parse() {
    assert!(load_toml("[motor]\nstep_delay_ms = 2\n").is_err());
}

#[rstest]
#[case("[calibration]\nsamples = 0\n", "samples must be >= 1")]
#[case("[calibration]\ntolerance_divisor = 0\n", "tolerance_divisor must be >= 1")]
#[case("[calibration]\nmin_accepted = 4\n", "min_accepted must be in [1, samples]")]
#[case("[calibration]\nmax_measurements = 2\n", "max_measurements must be >= samples")]
#[case("[calibration]\nseek_limit_factor = 1\n", "seek_limit_factor must be >= 2")]
#[case("[calibration]\nmax_attempts = 0\n", "max_attempts must be >= 1")]
#[case("[calibration]\nnominal_steps = 4\n", "alignment_steps must be < nominal_steps")]
#[case("[dispense]\nslots_per_cycle = 9\n", "slots_per_cycle must be in [1, slot_divisor]")]
#[case("[dispense]\nslot_divisor = 0\n", "slot_divisor must be >= 1")]
#[case("[dispense]\nsettle_ms = 120000\n", "settle_ms is unreasonably large")]
#[case("[indicator]\npulse_ms = 0\n", "periods must be >= 1 ms")]
#[case("[sim]\nhome_gaps = [4096, 0]\n", "home_gaps entries must be >= 1")]
#[case("[sim]\nempty_slots = [8]\n", "empty_slots entry 8 out of range")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation must be never|daily|hourly")]
fn rejects_bad_values(#[case] extra: &str, #[case] needle: &str) {
    let cfg = load_toml(&with(extra)).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        err.to_string().contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[test]
fn rejects_shared_pins() {
    let toml = r#"
[pins]
home_sensor = 17
drop_sensor = 17
coils = [2, 3, 4, 6]
status_led = 22
calibrate_button = 9
dispense_button = 10
"#;
    let cfg = load_toml(toml).expect("parse");
    let err = cfg.validate().expect_err("duplicate pin");
    assert!(err.to_string().contains("pins must be distinct"));
}
