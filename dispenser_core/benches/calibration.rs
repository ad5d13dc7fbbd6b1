use std::sync::Arc;
use std::time::Duration;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use dispenser_core::{
    Calibration, CalibrationCfg, CalibrationEngine, DispenseCfg, DispenseController, EventBus,
    MotorDriver, SensorEventSource, mocks::NullIndicator,
};
use dispenser_hardware::{SimCarousel, SimCarouselCfg, SimCoils};
use dispenser_traits::ManualClock;

fn rig(gaps: Vec<u32>) -> (SensorEventSource, MotorDriver<SimCoils>) {
    let sensors = SensorEventSource::new();
    let sim = SimCarousel::new(
        SimCarouselCfg {
            home_gaps: gaps,
            ..SimCarouselCfg::default()
        },
        sensors.trigger(),
    );
    let motor = MotorDriver::new(sim.coils(), Duration::ZERO, Arc::new(ManualClock::new()));
    (sensors, motor)
}

pub fn bench_calibration(c: &mut Criterion) {
    let mut g = c.benchmark_group("calibration");
    // Allow quick tweaking without CLI flags (Criterion 0.5):
    //   BENCH_SAMPLE_SIZE=10 cargo bench -p dispenser_core --bench calibration
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(10));
        }
    } else {
        g.sample_size(20);
    }

    for (name, gaps) in [
        ("nominal", vec![]),
        ("noisy", vec![3000, 4090, 4100, 4097]),
    ] {
        g.bench_function(name, |b| {
            b.iter_batched(
                || rig(gaps.clone()),
                |(sensors, mut motor)| {
                    let report = CalibrationEngine::new(CalibrationCfg::default())
                        .calibrate(
                            &mut motor,
                            &sensors,
                            Calibration::invalid(),
                            false,
                            &EventBus::disabled(),
                        )
                        .ok();
                    black_box(report)
                },
                BatchSize::SmallInput,
            )
        });
    }
    g.finish();
}

pub fn bench_dispense(c: &mut Criterion) {
    c.bench_function("dispense_cycle", |b| {
        b.iter_batched(
            || rig(vec![]),
            |(sensors, mut motor)| {
                let out = DispenseController::new(DispenseCfg::continuous())
                    .dispense_all(
                        &mut motor,
                        &sensors,
                        &mut NullIndicator,
                        Calibration::valid(4096),
                        &EventBus::disabled(),
                    )
                    .ok();
                black_box(out)
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_calibration, bench_dispense);
criterion_main!(benches);
