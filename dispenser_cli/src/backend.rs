//! Assembles a `Dispenser` over the simulator or the Raspberry Pi GPIO rig.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use dispenser_config::Config;
use dispenser_core::{Dispenser, EventBus, SensorEventSource};
use dispenser_hardware::{SimCarousel, SimCarouselCfg, SimIndicator};
use dispenser_traits::{
    Clock, CoilDriver, HwResult, ManualClock, MonotonicClock, OperatorCommand, OperatorInput,
    StatusIndicator,
};
use eyre::WrapErr;

pub type Rig = Dispenser<Box<dyn CoilDriver>, Box<dyn StatusIndicator>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sim,
    Gpio,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sim => "sim",
            Self::Gpio => "gpio",
        }
    }
}

pub struct Backend {
    pub kind: BackendKind,
    pub dispenser: Rig,
    /// Physical buttons; the simulator reads presses from stdin instead.
    buttons: Option<Box<dyn OperatorInput>>,
    /// Simulated rotor, for reporting where the carousel physically is.
    sim: Option<SimCarousel>,
    /// Owns interrupt registrations that must outlive the dispenser.
    _keepalive: Option<Box<dyn std::any::Any>>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("kind", &self.kind)
            .field("dispenser", &self.dispenser)
            .finish_non_exhaustive()
    }
}

impl Backend {
    /// GPIO when built with `--features hardware` on Linux, unless `DISPENSER_SIM`
    /// is set; the simulator otherwise.
    pub fn open(cfg: &Config, config_dir: &Path, events: EventBus) -> eyre::Result<Self> {
        #[cfg(all(feature = "hardware", target_os = "linux"))]
        if std::env::var_os("DISPENSER_SIM").is_none() {
            return gpio(cfg, events);
        }
        sim(cfg, config_dir, events)
    }

    /// Physical half-steps moved by the simulated rotor, if simulated.
    pub fn sim_position(&self) -> Option<i64> {
        self.sim.as_ref().map(SimCarousel::position)
    }

    /// Operator input for the idle loop. Sim presses come from stdin lines
    /// (`calibrate` / `dispense`); EOF raises `shutdown`.
    pub fn operator_input(
        &mut self,
        poll: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Box<dyn OperatorInput> {
        match self.buttons.take() {
            Some(b) => b,
            None => Box::new(StdinButtons::spawn(poll, shutdown)),
        }
    }
}

fn assemble(
    cfg: &Config,
    coils: Box<dyn CoilDriver>,
    indicator: Box<dyn StatusIndicator>,
    sensors: SensorEventSource,
    clock: Box<dyn Clock + Send + Sync>,
    events: EventBus,
) -> eyre::Result<Rig> {
    Dispenser::builder()
        .with_coils(coils)
        .with_indicator(indicator)
        .with_sensors(sensors)
        .with_clock(clock)
        .with_motor((&cfg.motor).into())
        .with_calibration_cfg((&cfg.calibration).into())
        .with_dispense((&cfg.dispense).into())
        .with_events(events)
        .build()
}

fn sim_empty_slots(cfg: &Config, config_dir: &Path) -> eyre::Result<Vec<u32>> {
    match cfg.sim.slot_plan.as_deref() {
        Some(plan) => {
            let path = config_dir.join(plan);
            let empty = dispenser_config::load_slot_plan_csv(&path, cfg.dispense.slot_divisor)
                .wrap_err_with(|| format!("load slot plan {}", path.display()))?;
            Ok(empty.into_iter().collect())
        }
        None => Ok(cfg.sim.empty_slots.clone()),
    }
}

fn sim(cfg: &Config, config_dir: &Path, events: EventBus) -> eyre::Result<Backend> {
    let sensors = SensorEventSource::new();
    let carousel = SimCarousel::new(
        SimCarouselCfg {
            steps_per_revolution: cfg.sim.steps_per_revolution,
            home_offset: cfg.sim.home_offset,
            home_gaps: cfg.sim.home_gaps.clone(),
            home_connected: cfg.sim.home_connected,
            chute_offset: cfg.sim.chute_offset.unwrap_or(cfg.calibration.alignment_steps),
            slots: cfg.dispense.slot_divisor,
            empty_slots: sim_empty_slots(cfg, config_dir)?,
        },
        sensors.trigger(),
    );
    let clock: Box<dyn Clock + Send + Sync> = if cfg.sim.realtime {
        Box::new(MonotonicClock::new())
    } else {
        Box::new(ManualClock::new())
    };
    tracing::info!(
        steps_per_revolution = cfg.sim.steps_per_revolution,
        home_connected = cfg.sim.home_connected,
        realtime = cfg.sim.realtime,
        "using simulated carousel"
    );

    let dispenser = assemble(
        cfg,
        Box::new(carousel.coils()),
        Box::new(SimIndicator::new()),
        sensors,
        clock,
        events,
    )?;
    Ok(Backend {
        kind: BackendKind::Sim,
        dispenser,
        buttons: None,
        sim: Some(carousel),
        _keepalive: None,
    })
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn gpio(cfg: &Config, events: EventBus) -> eyre::Result<Backend> {
    use dispenser_hardware::{BlinkTiming, GpioRig, RigPins};

    let p = &cfg.pins;
    let pins = RigPins {
        home_sensor: p.home_sensor,
        drop_sensor: p.drop_sensor,
        coils: p.coils,
        status_led: p.status_led,
        calibrate_button: p.calibrate_button,
        dispense_button: p.dispense_button,
    };
    let i = &cfg.indicator;
    let timing = BlinkTiming {
        slow_period: Duration::from_millis(i.slow_period_ms),
        fast_period: Duration::from_millis(i.fast_period_ms),
        pulse: Duration::from_millis(i.pulse_ms),
        duty: i.duty,
    };
    let sensors = SensorEventSource::new();
    let rig = GpioRig::open(pins, timing, Arc::new(sensors.trigger())).wrap_err("open GPIO rig")?;
    let GpioRig {
        coils,
        indicator,
        buttons,
        sensors: sensor_pins,
    } = rig;

    let dispenser = assemble(
        cfg,
        Box::new(coils),
        Box::new(indicator),
        sensors,
        Box::new(MonotonicClock::new()),
        events,
    )?;
    Ok(Backend {
        kind: BackendKind::Gpio,
        dispenser,
        buttons: Some(Box::new(buttons)),
        sim: None,
        _keepalive: Some(Box::new(sensor_pins)),
    })
}

fn parse_press(line: &str) -> Option<OperatorCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "c" | "calibrate" => Some(OperatorCommand::Calibrate),
        "d" | "dispense" => Some(OperatorCommand::Dispense),
        _ => None,
    }
}

/// Simulated buttons fed by a stdin reader thread.
///
/// Lines are queued as they are read, so presses typed while an engine is
/// running are handled in order once it finishes. Physical buttons are not
/// read during a run.
struct StdinButtons {
    rx: Receiver<OperatorCommand>,
    wait: Duration,
    shutdown: Arc<AtomicBool>,
}

impl StdinButtons {
    fn spawn(wait: Duration, shutdown: Arc<AtomicBool>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines().map_while(Result::ok) {
                match parse_press(&line) {
                    Some(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => tracing::warn!(input = %line.trim(), "unknown button; use calibrate|dispense"),
                }
            }
        });
        Self::from_channel(rx, wait, shutdown)
    }

    fn from_channel(
        rx: Receiver<OperatorCommand>,
        wait: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self { rx, wait, shutdown }
    }
}

impl OperatorInput for StdinButtons {
    fn poll(&mut self) -> HwResult<Option<OperatorCommand>> {
        match self.rx.recv_timeout(self.wait) {
            Ok(cmd) => Ok(Some(cmd)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("button input closed");
                self.shutdown.store(true, Ordering::Relaxed);
                Ok(None)
            }
        }
    }
}
