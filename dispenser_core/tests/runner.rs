use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dispenser_core::{
    CalibrationCfg, DispenseCfg, Dispenser, LoopSummary, SensorEventSource, run_operator_loop,
};
use dispenser_hardware::{SimButtons, SimCarousel, SimCarouselCfg, SimCoils, SimIndicator};
use dispenser_traits::{HwResult, IndicatorMode, ManualClock, OperatorCommand, OperatorInput};

/// Feeds queued presses, then raises shutdown once the queue is drained.
struct Scripted<'a> {
    buttons: SimButtons,
    shutdown: &'a AtomicBool,
    fail_first: bool,
}

impl OperatorInput for Scripted<'_> {
    fn poll(&mut self) -> HwResult<Option<OperatorCommand>> {
        if std::mem::take(&mut self.fail_first) {
            return Err(Box::new(std::io::Error::other("button line stuck")));
        }
        let cmd = self.buttons.poll()?;
        if cmd.is_none() {
            self.shutdown.store(true, Ordering::Relaxed);
        }
        Ok(cmd)
    }
}

fn dispenser(led: &SimIndicator, clock: &ManualClock) -> Dispenser<SimCoils, SimIndicator> {
    let sensors = SensorEventSource::new();
    let sim = SimCarousel::new(SimCarouselCfg::default(), sensors.trigger());
    Dispenser::builder()
        .with_coils(sim.coils())
        .with_indicator(led.clone())
        .with_sensors(sensors)
        .with_clock(Box::new(clock.clone()))
        .with_calibration_cfg(CalibrationCfg::default())
        .with_dispense(DispenseCfg::continuous())
        .build()
        .unwrap()
}

#[test]
fn loop_runs_commands_and_survives_refusal() {
    let led = SimIndicator::new();
    let clock = ManualClock::new();
    let mut d = dispenser(&led, &clock);
    let shutdown = AtomicBool::new(false);
    let buttons = SimButtons::new();
    buttons.press(OperatorCommand::Dispense);
    buttons.press(OperatorCommand::Calibrate);
    buttons.press(OperatorCommand::Dispense);
    let mut input = Scripted {
        buttons,
        shutdown: &shutdown,
        fail_first: false,
    };

    let summary = run_operator_loop(&mut d, &mut input, &shutdown, Duration::from_millis(50));
    assert_eq!(
        summary,
        LoopSummary {
            polls: 4,
            calibrations: 1,
            cycles: 1,
            pills_dispensed: 8,
            failures: 1,
            input_errors: 0,
        }
    );
    assert_eq!(led.current_mode(), Some(IndicatorMode::BlinkFast));
}

#[test]
fn input_errors_are_logged_and_polling_continues() {
    let led = SimIndicator::new();
    let clock = ManualClock::new();
    let mut d = dispenser(&led, &clock);
    let shutdown = AtomicBool::new(false);
    let mut input = Scripted {
        buttons: SimButtons::new(),
        shutdown: &shutdown,
        fail_first: true,
    };

    let summary = run_operator_loop(&mut d, &mut input, &shutdown, Duration::from_millis(50));
    assert_eq!(summary.input_errors, 1);
    assert_eq!(summary.polls, 2);
    // Idle polls sleep on the dispenser clock.
    assert_eq!(clock.elapsed(), Duration::from_millis(100));
}

#[test]
fn raised_shutdown_exits_before_polling() {
    let led = SimIndicator::new();
    let clock = ManualClock::new();
    let mut d = dispenser(&led, &clock);
    let shutdown = AtomicBool::new(true);
    let mut buttons = SimButtons::new();
    buttons.press(OperatorCommand::Calibrate);

    let summary = run_operator_loop(&mut d, &mut buttons, &shutdown, Duration::from_millis(50));
    assert_eq!(summary.polls, 0);
    assert_eq!(buttons.pending(), 1);
}
