use std::sync::Arc;
use std::time::Duration;

use dispenser_core::{
    Calibration, DispenseCfg, DispenseController, DispenserError, DispenserEvent, EventBus,
    MotorDriver, SensorEventSource, SlotOutcome,
};
use dispenser_hardware::{SimCarousel, SimCarouselCfg, SimCoils, SimIndicator};
use dispenser_traits::{EdgeSink, ManualClock, SensorLine};

struct Rig {
    sim: SimCarousel,
    sensors: SensorEventSource,
    motor: MotorDriver<SimCoils>,
    led: SimIndicator,
    clock: ManualClock,
}

/// Carousel sitting exactly on the home mark with slot 0 at the chute.
fn aligned(empty_slots: &[u32]) -> Rig {
    let sensors = SensorEventSource::new();
    let sim = SimCarousel::new(
        SimCarouselCfg {
            home_offset: 0,
            chute_offset: 0,
            empty_slots: empty_slots.to_vec(),
            ..SimCarouselCfg::default()
        },
        sensors.trigger(),
    );
    let clock = ManualClock::new();
    let motor = MotorDriver::new(sim.coils(), Duration::from_millis(2), Arc::new(clock.clone()));
    Rig {
        sim,
        sensors,
        motor,
        led: SimIndicator::new(),
        clock,
    }
}

fn cycle(
    r: &mut Rig,
    cfg: DispenseCfg,
    calib: Calibration,
) -> dispenser_core::Result<dispenser_core::DispenseOutcome> {
    DispenseController::new(cfg).dispense_all(
        &mut r.motor,
        &r.sensors,
        &mut r.led,
        calib,
        &EventBus::disabled(),
    )
}

#[test]
fn full_cycle_dispenses_every_slot() {
    let mut r = aligned(&[]);
    let out = cycle(&mut r, DispenseCfg::continuous(), Calibration::valid(4096)).unwrap();
    assert_eq!(out.dispensed, 8);
    assert_eq!(out.steps, 4096);
    assert_eq!(r.motor.position(), 4096);
    assert_eq!(out.slots, vec![SlotOutcome::Dispensed; 8]);
    assert!(r.led.attention_signals().is_empty());
    // 4096 steps at 2 ms plus eight 80 ms settle windows
    assert_eq!(r.clock.elapsed(), Duration::from_millis(4096 * 2 + 8 * 80));
}

#[test]
fn missed_slots_raise_attention_and_cycle_continues() {
    let mut r = aligned(&[2, 5]);
    let out = cycle(&mut r, DispenseCfg::continuous(), Calibration::valid(4096)).unwrap();
    assert_eq!(out.dispensed, 6);
    assert_eq!(out.missed().collect::<Vec<_>>(), vec![2, 5]);
    assert_eq!(r.led.attention_signals(), vec![6, 6]);
    assert_eq!(out.steps, 4096);
    assert_eq!(r.sim.position(), 4096);
}

#[test]
fn uncalibrated_cycle_is_refused_without_motion() {
    let mut r = aligned(&[]);
    let err = cycle(&mut r, DispenseCfg::continuous(), Calibration::invalid()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DispenserError>(),
        Some(DispenserError::NotCalibrated)
    ));
    assert_eq!(r.motor.position(), 0);
    assert_eq!(r.sim.snapshot().energized, [false; 4]);
}

#[test]
fn stale_drop_edge_does_not_count() {
    let mut r = aligned(&[0, 1, 2, 3, 4, 5, 6, 7]);
    r.sensors.trigger().falling_edge(SensorLine::Drop);
    let out = cycle(&mut r, DispenseCfg::continuous(), Calibration::valid(4096)).unwrap();
    assert_eq!(out.dispensed, 0);
    assert_eq!(r.led.attention_signals().len(), 8);
}

#[test]
fn every_cycle_starts_a_fresh_count() {
    let mut r = aligned(&[3]);
    let ctl = DispenseController::new(DispenseCfg::continuous());
    for _ in 0..2 {
        let out = ctl
            .dispense_all(
                &mut r.motor,
                &r.sensors,
                &mut r.led,
                Calibration::valid(4096),
                &EventBus::disabled(),
            )
            .unwrap();
        assert_eq!(out.dispensed, 7);
        assert_eq!(out.slots.len(), 8);
    }
    assert_eq!(r.motor.position(), 2 * 4096);
}

#[test]
fn weekly_profile_stops_after_seven_slots() {
    let mut r = aligned(&[]);
    let out = cycle(&mut r, DispenseCfg::weekly(), Calibration::valid(4096)).unwrap();
    assert_eq!(out.slots.len(), 7);
    assert_eq!(out.dispensed, 7);
    assert_eq!(out.steps, 7 * 512);
}

#[test]
fn slot_size_follows_calibrated_revolution() {
    let mut r = aligned(&[]);
    let out = cycle(&mut r, DispenseCfg::continuous(), Calibration::valid(4095)).unwrap();
    assert_eq!(out.steps, 8 * 511);
}

#[test]
fn cycle_events_report_each_slot() {
    let mut r = aligned(&[1]);
    let (bus, rx) = EventBus::bounded(32);
    DispenseController::new(DispenseCfg::continuous())
        .dispense_all(
            &mut r.motor,
            &r.sensors,
            &mut r.led,
            Calibration::valid(4096),
            &bus,
        )
        .unwrap();
    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events[0], DispenserEvent::SlotDispensed { slot: 0 });
    assert_eq!(events[1], DispenserEvent::SlotMissed { slot: 1 });
    assert_eq!(
        events.last(),
        Some(&DispenserEvent::CycleComplete {
            dispensed: 7,
            slots: 8,
            steps: 4096
        })
    );
}
