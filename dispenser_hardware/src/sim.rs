//! Simulated carousel, status LED, and operator buttons.
//!
//! The carousel model reacts to coil patterns the way the real 28BYJ-48 does:
//! a pattern one phase ahead of the rotor moves it forward one half-step, one
//! phase behind moves it back, anything else is a missed step. Rotation
//! drives the home sensor (scripted gaps between edges) and the drop sensor
//! (one edge per filled slot as it passes the chute).
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use dispenser_traits::{
    CoilDriver, CoilPattern, EdgeSink, HwResult, IndicatorMode, OperatorCommand, OperatorInput,
    SensorLine, StatusIndicator, phase_of,
};

use crate::error::HwError;

/// Physical parameters of the simulated carousel.
#[derive(Debug, Clone)]
pub struct SimCarouselCfg {
    /// True half-steps per revolution; sets slot pitch for the drop chute.
    pub steps_per_revolution: u32,
    /// Position of the first home edge after boot. 0 means the rotor boots
    /// exactly on the home mark (that edge is never seen).
    pub home_offset: u32,
    /// Half-steps between consecutive home edges, cycled. Empty = one nominal revolution.
    pub home_gaps: Vec<u32>,
    /// When false the home sensor never fires (disconnected cable).
    pub home_connected: bool,
    /// Distance from the home mark to the leading edge of slot 0 at the chute.
    pub chute_offset: u32,
    pub slots: u32,
    /// Slots that hold no pill and therefore never trigger the drop sensor.
    pub empty_slots: Vec<u32>,
}

impl Default for SimCarouselCfg {
    fn default() -> Self {
        Self {
            steps_per_revolution: 4096,
            home_offset: 300,
            home_gaps: Vec::new(),
            home_connected: true,
            chute_offset: 166,
            slots: 8,
            empty_slots: Vec::new(),
        }
    }
}

/// Counters exposed for assertions and the CLI status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimSnapshot {
    pub position: i64,
    pub home_edges: u64,
    pub drop_edges: u64,
    pub missed_steps: u64,
    pub reverse_steps: u64,
    pub energized: CoilPattern,
}

#[derive(Debug)]
struct SimState {
    cfg: SimCarouselCfg,
    rotor_phase: usize,
    last_home: i64,
    next_home: i64,
    gap_idx: usize,
    snap: SimSnapshot,
}

impl SimState {
    fn new(cfg: SimCarouselCfg) -> Self {
        let mut st = Self {
            rotor_phase: 7, // one phase behind HALF_STEP_SEQUENCE[0]
            last_home: 0,
            next_home: 0,
            gap_idx: 0,
            snap: SimSnapshot::default(),
            cfg,
        };
        let offset = i64::from(st.cfg.home_offset);
        if offset == 0 {
            st.last_home = 0;
            st.next_home = st.gap(0);
            st.gap_idx = 1;
        } else {
            st.last_home = offset - i64::from(st.cfg.steps_per_revolution);
            st.next_home = offset;
        }
        st
    }

    fn gap(&self, idx: usize) -> i64 {
        if self.cfg.home_gaps.is_empty() {
            i64::from(self.cfg.steps_per_revolution.max(1))
        } else {
            i64::from(self.cfg.home_gaps[idx % self.cfg.home_gaps.len()].max(1))
        }
    }

    fn apply(&mut self, pattern: CoilPattern) -> Vec<SensorLine> {
        self.snap.energized = pattern;
        // Released or malformed pattern: no torque, rotor stays put.
        let Some(next) = phase_of(pattern) else {
            return Vec::new();
        };
        let delta = (next + 8 - self.rotor_phase) % 8;
        self.rotor_phase = next;
        match delta {
            0 => Vec::new(),
            1 => self.forward(),
            7 => {
                self.snap.position -= 1;
                self.snap.reverse_steps += 1;
                Vec::new()
            }
            _ => {
                self.snap.missed_steps += 1;
                tracing::warn!(delta, "simulated rotor skipped phases");
                Vec::new()
            }
        }
    }

    fn forward(&mut self) -> Vec<SensorLine> {
        let mut edges = Vec::new();
        self.snap.position += 1;
        let pos = self.snap.position;

        if pos == self.next_home {
            if self.cfg.home_connected {
                edges.push(SensorLine::Home);
                self.snap.home_edges += 1;
            }
            self.last_home = pos;
            self.next_home = pos + self.gap(self.gap_idx);
            self.gap_idx = self.gap_idx.wrapping_add(1);
        }

        let slots = i64::from(self.cfg.slots.max(1));
        let pitch = i64::from(self.cfg.steps_per_revolution) / slots;
        if pitch > 0 {
            let first = i64::from(self.cfg.chute_offset) + pitch / 2;
            let since_home = pos - self.last_home;
            if since_home >= first && (since_home - first) % pitch == 0 {
                let slot = (since_home - first) / pitch;
                if slot < slots && !self.cfg.empty_slots.contains(&(slot as u32)) {
                    edges.push(SensorLine::Drop);
                    self.snap.drop_edges += 1;
                }
            }
        }
        edges
    }
}

/// Shared handle to the simulated carousel. Clones observe the same rotor.
#[derive(Clone)]
pub struct SimCarousel {
    state: Arc<Mutex<SimState>>,
    sink: Arc<dyn EdgeSink>,
}

impl SimCarousel {
    pub fn new(cfg: SimCarouselCfg, sink: impl EdgeSink + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(cfg))),
            sink: Arc::new(sink),
        }
    }

    /// Coil driver that moves this carousel.
    pub fn coils(&self) -> SimCoils {
        SimCoils {
            carousel: self.clone(),
        }
    }

    pub fn snapshot(&self) -> SimSnapshot {
        self.state.lock().map(|s| s.snap).unwrap_or_default()
    }

    /// Physical half-steps moved since boot (forward minus reverse).
    pub fn position(&self) -> i64 {
        self.snapshot().position
    }
}

pub struct SimCoils {
    carousel: SimCarousel,
}

impl CoilDriver for SimCoils {
    fn energize(&mut self, pattern: CoilPattern) -> HwResult<()> {
        // Edges fire after the lock is released, like an ISR running after the GPIO write.
        let edges = {
            let mut st = self
                .carousel
                .state
                .lock()
                .map_err(|_| HwError::SimPoisoned)?;
            st.apply(pattern)
        };
        for line in edges {
            tracing::trace!(?line, "simulated falling edge");
            self.carousel.sink.falling_edge(line);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct IndicatorLog {
    modes: Vec<IndicatorMode>,
    attention: Vec<u8>,
}

/// Status LED stand-in that records every intent it receives.
#[derive(Clone, Default)]
pub struct SimIndicator {
    log: Arc<Mutex<IndicatorLog>>,
}

impl SimIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mode change, in order.
    pub fn modes(&self) -> Vec<IndicatorMode> {
        self.log.lock().map(|l| l.modes.clone()).unwrap_or_default()
    }

    pub fn current_mode(&self) -> Option<IndicatorMode> {
        self.log.lock().ok().and_then(|l| l.modes.last().copied())
    }

    /// Pulse counts of every attention signal, in order.
    pub fn attention_signals(&self) -> Vec<u8> {
        self.log
            .lock()
            .map(|l| l.attention.clone())
            .unwrap_or_default()
    }
}

impl StatusIndicator for SimIndicator {
    fn set_mode(&mut self, mode: IndicatorMode) -> HwResult<()> {
        tracing::debug!(?mode, "indicator mode (simulated)");
        let mut log = self.log.lock().map_err(|_| HwError::SimPoisoned)?;
        log.modes.push(mode);
        Ok(())
    }

    fn attention(&mut self, pulses: u8) -> HwResult<()> {
        tracing::debug!(pulses, "indicator attention (simulated)");
        let mut log = self.log.lock().map_err(|_| HwError::SimPoisoned)?;
        log.attention.push(pulses);
        Ok(())
    }
}

/// Operator buttons fed from a queue; `press()` may be called from any thread.
#[derive(Clone, Default)]
pub struct SimButtons {
    queue: Arc<Mutex<VecDeque<OperatorCommand>>>,
}

impl SimButtons {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, cmd: OperatorCommand) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(cmd);
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl OperatorInput for SimButtons {
    fn poll(&mut self) -> HwResult<Option<OperatorCommand>> {
        let mut q = self
            .queue
            .lock()
            .map_err(|_| HwError::SimPoisoned)?;
        Ok(q.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispenser_traits::HALF_STEP_SEQUENCE;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingSink {
        home: AtomicU32,
        drop: AtomicU32,
    }

    impl EdgeSink for CountingSink {
        fn falling_edge(&self, line: SensorLine) {
            match line {
                SensorLine::Home => self.home.fetch_add(1, Ordering::Relaxed),
                SensorLine::Drop => self.drop.fetch_add(1, Ordering::Relaxed),
            };
        }
    }

    fn step(coils: &mut SimCoils, from: i64, n: i64) {
        for p in from..from + n {
            coils
                .energize(HALF_STEP_SEQUENCE[p.rem_euclid(8) as usize])
                .unwrap();
        }
    }

    #[test]
    fn first_table_entry_is_a_forward_step() {
        let sim = SimCarousel::new(SimCarouselCfg::default(), Arc::new(CountingSink::default()));
        let mut coils = sim.coils();
        step(&mut coils, 0, 1);
        assert_eq!(sim.position(), 1);
    }

    #[test]
    fn reverse_and_skipped_phases_are_tracked() {
        let sim = SimCarousel::new(SimCarouselCfg::default(), Arc::new(CountingSink::default()));
        let mut coils = sim.coils();
        step(&mut coils, 0, 4); // rotor at phase 3, position 4
        coils.energize(HALF_STEP_SEQUENCE[2]).unwrap();
        assert_eq!(sim.position(), 3);
        coils.energize(HALF_STEP_SEQUENCE[6]).unwrap();
        let snap = sim.snapshot();
        assert_eq!(snap.reverse_steps, 1);
        assert_eq!(snap.missed_steps, 1);
        assert_eq!(snap.position, 3);
    }

    #[test]
    fn release_does_not_move_rotor() {
        let sim = SimCarousel::new(SimCarouselCfg::default(), Arc::new(CountingSink::default()));
        let mut coils = sim.coils();
        step(&mut coils, 0, 3);
        coils.release().unwrap();
        step(&mut coils, 3, 1);
        assert_eq!(sim.position(), 4);
    }

    #[test]
    fn home_edges_follow_scripted_gaps() {
        let sink = Arc::new(CountingSink::default());
        let cfg = SimCarouselCfg {
            home_offset: 10,
            home_gaps: vec![100, 50],
            ..SimCarouselCfg::default()
        };
        let sim = SimCarousel::new(cfg, sink.clone());
        let mut coils = sim.coils();
        step(&mut coils, 0, 10);
        assert_eq!(sink.home.load(Ordering::Relaxed), 1);
        step(&mut coils, 10, 100);
        assert_eq!(sink.home.load(Ordering::Relaxed), 2);
        step(&mut coils, 110, 49);
        assert_eq!(sink.home.load(Ordering::Relaxed), 2);
        step(&mut coils, 159, 1);
        assert_eq!(sink.home.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn disconnected_home_sensor_never_fires() {
        let sink = Arc::new(CountingSink::default());
        let cfg = SimCarouselCfg {
            home_connected: false,
            ..SimCarouselCfg::default()
        };
        let sim = SimCarousel::new(cfg, sink.clone());
        let mut coils = sim.coils();
        step(&mut coils, 0, 10_000);
        assert_eq!(sink.home.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn filled_slots_drop_once_per_revolution() {
        let sink = Arc::new(CountingSink::default());
        let cfg = SimCarouselCfg {
            home_offset: 0,
            chute_offset: 0,
            empty_slots: vec![2, 5],
            ..SimCarouselCfg::default()
        };
        let sim = SimCarousel::new(cfg, sink.clone());
        let mut coils = sim.coils();
        step(&mut coils, 0, 4096);
        assert_eq!(sink.drop.load(Ordering::Relaxed), 6);
        step(&mut coils, 4096, 4096);
        assert_eq!(sink.drop.load(Ordering::Relaxed), 12);
    }

    #[test]
    fn buttons_pop_in_press_order() {
        let mut buttons = SimButtons::new();
        let presser = buttons.clone();
        presser.press(OperatorCommand::Calibrate);
        presser.press(OperatorCommand::Dispense);
        assert_eq!(buttons.poll().unwrap(), Some(OperatorCommand::Calibrate));
        assert_eq!(buttons.poll().unwrap(), Some(OperatorCommand::Dispense));
        assert_eq!(buttons.poll().unwrap(), None);
    }
}
