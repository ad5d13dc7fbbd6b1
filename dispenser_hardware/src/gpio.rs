//! Raspberry Pi GPIO backends (rppal).
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dispenser_traits::{
    CoilDriver, CoilPattern, EdgeSink, HwResult, IndicatorMode, OperatorCommand, OperatorInput,
    SensorLine, StatusIndicator,
};
use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use tracing::{debug, trace, warn};

use crate::error::{HwError, Result};
use crate::util::wait_until_released;

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

/// Four coil outputs (IN1..IN4 on the ULN2003 board).
pub struct GpioCoils {
    pins: Vec<OutputPin>,
}

impl GpioCoils {
    pub fn new(gpio: &Gpio, coil_pins: [u8; 4]) -> Result<Self> {
        let mut pins = Vec::with_capacity(coil_pins.len());
        for p in coil_pins {
            pins.push(gpio.get(p).map_err(gpio_err)?.into_output_low());
        }
        debug!(?coil_pins, "coil outputs ready");
        Ok(Self { pins })
    }
}

impl CoilDriver for GpioCoils {
    fn energize(&mut self, pattern: CoilPattern) -> HwResult<()> {
        for (pin, on) in self.pins.iter_mut().zip(pattern) {
            pin.write(if on { Level::High } else { Level::Low });
        }
        trace!(?pattern, "coils");
        Ok(())
    }
}

/// Keeps the sensor inputs (and their interrupt threads) alive.
pub struct SensorPins {
    _home: InputPin,
    _drop: InputPin,
}

/// Register falling-edge interrupts on both sensor inputs, forwarding to `sink`.
///
/// The callbacks only touch the sink; no motion or blocking happens there.
pub fn attach_sensors(
    gpio: &Gpio,
    home_pin: u8,
    drop_pin: u8,
    sink: Arc<dyn EdgeSink>,
) -> Result<SensorPins> {
    let mut home = gpio.get(home_pin).map_err(gpio_err)?.into_input_pullup();
    let home_sink = sink.clone();
    home.set_async_interrupt(Trigger::FallingEdge, move |_level: Level| {
        home_sink.falling_edge(SensorLine::Home)
    })
    .map_err(gpio_err)?;

    let mut drop = gpio.get(drop_pin).map_err(gpio_err)?.into_input_pullup();
    drop.set_async_interrupt(Trigger::FallingEdge, move |_level: Level| {
        sink.falling_edge(SensorLine::Drop)
    })
    .map_err(gpio_err)?;

    debug!(home_pin, drop_pin, "sensor interrupts armed");
    Ok(SensorPins {
        _home: home,
        _drop: drop,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct BlinkTiming {
    pub slow_period: Duration,
    pub fast_period: Duration,
    pub pulse: Duration,
    /// Software PWM duty cycle while lit (0.0..=1.0).
    pub duty: f64,
}

const MODE_SLOW: u8 = 0;
const MODE_FAST: u8 = 1;
const MODE_OFF: u8 = 2;
const PWM_HZ: f64 = 1000.0;

fn encode(mode: IndicatorMode) -> u8 {
    match mode {
        IndicatorMode::BlinkSlow => MODE_SLOW,
        IndicatorMode::BlinkFast => MODE_FAST,
        IndicatorMode::Off => MODE_OFF,
    }
}

fn light(pin: &Mutex<OutputPin>, on: bool, duty: f64) {
    if let Ok(mut p) = pin.lock() {
        let res = if on {
            p.set_pwm_frequency(PWM_HZ, duty)
        } else {
            p.clear_pwm().map(|()| p.set_low())
        };
        if let Err(e) = res {
            warn!(error = %e, "status LED write failed");
        }
    }
}

/// Status LED driven by software PWM with its own blink thread.
pub struct PwmIndicator {
    pin: Arc<Mutex<OutputPin>>,
    mode: Arc<AtomicU8>,
    busy: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    timing: BlinkTiming,
    join_handle: Option<JoinHandle<()>>,
}

impl PwmIndicator {
    pub fn new(gpio: &Gpio, led_pin: u8, timing: BlinkTiming) -> Result<Self> {
        let pin = Arc::new(Mutex::new(
            gpio.get(led_pin).map_err(gpio_err)?.into_output_low(),
        ));
        let mode = Arc::new(AtomicU8::new(MODE_SLOW));
        let busy = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let (t_pin, t_mode, t_busy, t_shutdown) =
            (pin.clone(), mode.clone(), busy.clone(), shutdown.clone());
        let join_handle = thread::spawn(move || {
            let mut lit = false;
            while !t_shutdown.load(Ordering::Relaxed) {
                let period = match t_mode.load(Ordering::Relaxed) {
                    MODE_SLOW => timing.slow_period,
                    MODE_FAST => timing.fast_period,
                    _ => {
                        if lit && !t_busy.load(Ordering::Relaxed) {
                            light(&t_pin, false, timing.duty);
                            lit = false;
                        }
                        thread::sleep(Duration::from_millis(20));
                        continue;
                    }
                };
                if !t_busy.load(Ordering::Relaxed) {
                    lit = !lit;
                    light(&t_pin, lit, timing.duty);
                }
                thread::sleep(period);
            }
            light(&t_pin, false, timing.duty);
            trace!("blink thread exiting");
        });

        Ok(Self {
            pin,
            mode,
            busy,
            shutdown,
            timing,
            join_handle: Some(join_handle),
        })
    }
}

impl StatusIndicator for PwmIndicator {
    fn set_mode(&mut self, mode: IndicatorMode) -> HwResult<()> {
        self.mode.store(encode(mode), Ordering::Relaxed);
        Ok(())
    }

    fn attention(&mut self, pulses: u8) -> HwResult<()> {
        self.busy.store(true, Ordering::Relaxed);
        for _ in 0..pulses {
            light(&self.pin, true, self.timing.duty);
            thread::sleep(self.timing.pulse);
            light(&self.pin, false, self.timing.duty);
            thread::sleep(self.timing.pulse);
        }
        self.busy.store(false, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for PwmIndicator {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(h) = self.join_handle.take() {
            let _ = h.join();
        }
    }
}

/// Active-low momentary buttons; a press is reported once the button is released.
pub struct GpioButtons {
    calibrate: InputPin,
    dispense: InputPin,
    release_timeout: Duration,
}

impl GpioButtons {
    pub fn new(gpio: &Gpio, calibrate_pin: u8, dispense_pin: u8) -> Result<Self> {
        Ok(Self {
            calibrate: gpio.get(calibrate_pin).map_err(gpio_err)?.into_input_pullup(),
            dispense: gpio.get(dispense_pin).map_err(gpio_err)?.into_input_pullup(),
            release_timeout: Duration::from_secs(30),
        })
    }
}

impl OperatorInput for GpioButtons {
    fn poll(&mut self) -> HwResult<Option<OperatorCommand>> {
        let poll = Duration::from_millis(50);
        if self.calibrate.is_low() {
            let pin = &self.calibrate;
            wait_until_released(|| pin.is_low(), self.release_timeout, poll)?;
            return Ok(Some(OperatorCommand::Calibrate));
        }
        if self.dispense.is_low() {
            let pin = &self.dispense;
            wait_until_released(|| pin.is_low(), self.release_timeout, poll)?;
            return Ok(Some(OperatorCommand::Dispense));
        }
        Ok(None)
    }
}

/// BCM pin assignment for a full rig.
#[derive(Debug, Clone, Copy)]
pub struct RigPins {
    pub home_sensor: u8,
    pub drop_sensor: u8,
    pub coils: [u8; 4],
    pub status_led: u8,
    pub calibrate_button: u8,
    pub dispense_button: u8,
}

/// Every GPIO peripheral of the dispenser, opened together.
pub struct GpioRig {
    pub coils: GpioCoils,
    pub indicator: PwmIndicator,
    pub buttons: GpioButtons,
    /// Dropping this disarms the sensor interrupts.
    pub sensors: SensorPins,
}

impl GpioRig {
    pub fn open(pins: RigPins, timing: BlinkTiming, sink: Arc<dyn EdgeSink>) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let rig = Self {
            coils: GpioCoils::new(&gpio, pins.coils)?,
            indicator: PwmIndicator::new(&gpio, pins.status_led, timing)?,
            buttons: GpioButtons::new(&gpio, pins.calibrate_button, pins.dispense_button)?,
            sensors: attach_sensors(&gpio, pins.home_sensor, pins.drop_sensor, sink)?,
        };
        debug!(?pins, "GPIO rig ready");
        Ok(rig)
    }
}
