//! Simulated hardware for host builds and tests.
//!
//! Every adapter keeps its state in cells so tests can drive inputs and
//! inspect outputs through shared `Rc` handles while the controller and
//! sensors hold the same objects behind port traits.

use core::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use embedded_hal::digital::PinState;
use log::trace;

use crate::app::controller::IoController;
use crate::app::ports::{Clock, ExpanderDevice, GpioDriver, OneWireBus, TempHumidityDevice};
use crate::config::IoConfig;
use crate::drivers::onewire::{
    CMD_READ_SCRATCHPAD, CMD_WRITE_SCRATCHPAD, MAX_RESOLUTION_BITS, MIN_RESOLUTION_BITS, Rom,
    encode_scratchpad,
};
use crate::pins::{EXPANDER_BLOCK_WIDTH, PinMode, PinNumber, PwmConfig};

// ── GPIO ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct SimGpio {
    modes: RefCell<BTreeMap<PinNumber, PinMode>>,
    levels: RefCell<BTreeMap<PinNumber, PinState>>,
    analog: RefCell<BTreeMap<PinNumber, u32>>,
    queued: RefCell<BTreeMap<PinNumber, VecDeque<u32>>>,
    analog_out: RefCell<BTreeMap<PinNumber, u32>>,
    pwm: RefCell<BTreeMap<PinNumber, PwmConfig>>,
    interrupt_capable: RefCell<BTreeSet<PinNumber>>,
    attached: RefCell<BTreeSet<PinNumber>>,
    writes: Cell<usize>,
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drives an input level as seen by `read`.
    pub fn set_level(&self, pin: PinNumber, state: PinState) {
        self.levels.borrow_mut().insert(pin, state);
    }

    pub fn level_of(&self, pin: PinNumber) -> Option<PinState> {
        self.levels.borrow().get(&pin).copied()
    }

    pub fn mode_of(&self, pin: PinNumber) -> Option<PinMode> {
        self.modes.borrow().get(&pin).copied()
    }

    /// Steady converter code returned once queued samples run out.
    pub fn set_analog(&self, pin: PinNumber, raw: u32) {
        self.analog.borrow_mut().insert(pin, raw);
    }

    pub fn queue_analog(&self, pin: PinNumber, samples: &[u32]) {
        self.queued
            .borrow_mut()
            .entry(pin)
            .or_default()
            .extend(samples.iter().copied());
    }

    pub fn analog_output(&self, pin: PinNumber) -> Option<u32> {
        self.analog_out.borrow().get(&pin).copied()
    }

    pub fn pwm_of(&self, pin: PinNumber) -> Option<PwmConfig> {
        self.pwm.borrow().get(&pin).copied()
    }

    pub fn allow_interrupts(&self, pin: PinNumber) {
        self.interrupt_capable.borrow_mut().insert(pin);
    }

    pub fn has_interrupt(&self, pin: PinNumber) -> bool {
        self.attached.borrow().contains(&pin)
    }

    /// Digital writes issued so far.
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }
}

impl GpioDriver for SimGpio {
    fn set_mode(&self, pin: PinNumber, mode: PinMode) {
        trace!("sim gpio {}: mode {:?}", pin, mode);
        self.modes.borrow_mut().insert(pin, mode);
    }

    fn read(&self, pin: PinNumber) -> PinState {
        if let Some(level) = self.level_of(pin) {
            return level;
        }
        match self.mode_of(pin) {
            Some(PinMode::DigitalInputPullUp) => PinState::High,
            _ => PinState::Low,
        }
    }

    fn write(&self, pin: PinNumber, state: PinState) {
        self.writes.set(self.writes.get() + 1);
        self.levels.borrow_mut().insert(pin, state);
    }

    fn analog_read(&self, pin: PinNumber, bits: u8) -> u32 {
        let queued = self
            .queued
            .borrow_mut()
            .get_mut(&pin)
            .and_then(VecDeque::pop_front);
        let raw = queued
            .or_else(|| self.analog.borrow().get(&pin).copied())
            .unwrap_or(0);
        let max = (1u32 << bits.min(31)) - 1;
        raw.min(max)
    }

    fn analog_write(&self, pin: PinNumber, value: u32, _bits: u8) {
        self.analog_out.borrow_mut().insert(pin, value);
    }

    fn configure_pwm(&self, pin: PinNumber, pwm: PwmConfig, _bits: u8) {
        self.pwm.borrow_mut().insert(pin, pwm);
    }

    fn can_interrupt(&self, pin: PinNumber) -> bool {
        self.interrupt_capable.borrow().contains(&pin)
    }

    fn attach_change_interrupt(&self, pin: PinNumber) -> bool {
        if !self.can_interrupt(pin) {
            return false;
        }
        self.attached.borrow_mut().insert(pin);
        true
    }
}

// ── I/O expander ─────────────────────────────────────────────

const LINES: usize = EXPANDER_BLOCK_WIDTH as usize;

pub struct SimExpander {
    directions: RefCell<[PinMode; LINES]>,
    values: RefCell<[u32; LINES]>,
    bit_depth: Option<u8>,
    writes: Cell<usize>,
    syncs: Cell<usize>,
}

impl Default for SimExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl SimExpander {
    pub fn new() -> Self {
        Self {
            directions: RefCell::new([PinMode::Undefined; LINES]),
            values: RefCell::new([0; LINES]),
            bit_depth: None,
            writes: Cell::new(0),
            syncs: Cell::new(0),
        }
    }

    /// Expander with analog-capable lines.
    pub fn with_bit_depth(bits: u8) -> Self {
        Self {
            bit_depth: Some(bits),
            ..Self::new()
        }
    }

    /// Sets what the chip reports on an input line.
    pub fn set_input(&self, channel: u8, value: u32) {
        if let Some(v) = self.values.borrow_mut().get_mut(channel as usize) {
            *v = value;
        }
    }

    pub fn direction(&self, channel: u8) -> PinMode {
        self.directions
            .borrow()
            .get(channel as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    pub fn syncs(&self) -> usize {
        self.syncs.get()
    }
}

impl ExpanderDevice for SimExpander {
    fn set_direction(&self, channel: u8, mode: PinMode) {
        if let Some(d) = self.directions.borrow_mut().get_mut(channel as usize) {
            *d = mode;
        }
    }

    fn read_value(&self, channel: u8) -> u32 {
        self.values
            .borrow()
            .get(channel as usize)
            .copied()
            .unwrap_or(0)
    }

    fn write_value(&self, channel: u8, value: u32) {
        self.writes.set(self.writes.get() + 1);
        self.set_input(channel, value);
    }

    fn sync(&self) -> bool {
        self.syncs.set(self.syncs.get() + 1);
        true
    }

    fn bit_depth(&self, _channel: u8, _output: bool) -> Option<u8> {
        self.bit_depth
    }
}

// ── Single-wire bus ──────────────────────────────────────────

struct SimProbe {
    rom: Rom,
    celsius: f32,
    config: Option<u8>,
}

/// Bus populated with DS18-style probes. Answers the command subset the
/// driver issues: convert, read and write scratchpad.
#[derive(Default)]
pub struct SimOneWireBus {
    probes: RefCell<Vec<SimProbe>>,
    selected: Cell<Option<usize>>,
    cursor: Cell<usize>,
    pending: RefCell<VecDeque<u8>>,
    writing_scratchpad: RefCell<Option<Vec<u8>>>,
}

impl SimOneWireBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a probe; search order follows insertion order.
    pub fn add_probe(&self, rom: Rom, celsius: f32) {
        self.probes.borrow_mut().push(SimProbe {
            rom,
            celsius,
            config: None,
        });
    }

    pub fn set_temperature(&self, rom: &Rom, celsius: f32) {
        if let Some(p) = self.probes.borrow_mut().iter_mut().find(|p| p.rom == *rom) {
            p.celsius = celsius;
        }
    }

    /// Configuration register last written to a probe.
    pub fn config_register(&self, rom: &Rom) -> Option<u8> {
        self.probes
            .borrow()
            .iter()
            .find(|p| p.rom == *rom)
            .and_then(|p| p.config)
    }
}

impl OneWireBus for SimOneWireBus {
    fn reset(&self) -> bool {
        self.selected.set(None);
        self.pending.borrow_mut().clear();
        *self.writing_scratchpad.borrow_mut() = None;
        !self.probes.borrow().is_empty()
    }

    fn select(&self, rom: &[u8; 8]) {
        let index = self.probes.borrow().iter().position(|p| p.rom == *rom);
        self.selected.set(index);
    }

    fn write_byte(&self, byte: u8) {
        let Some(index) = self.selected.get() else {
            return;
        };
        let mut writing = self.writing_scratchpad.borrow_mut();
        if let Some(buf) = writing.as_mut() {
            buf.push(byte);
            if buf.len() == 3 {
                self.probes.borrow_mut()[index].config = Some(buf[2]);
                *writing = None;
            }
            return;
        }
        match byte {
            CMD_WRITE_SCRATCHPAD => *writing = Some(Vec::with_capacity(3)),
            CMD_READ_SCRATCHPAD => {
                let probes = self.probes.borrow();
                let probe = &probes[index];
                let bits = probe
                    .config
                    .map_or(MAX_RESOLUTION_BITS, |c| ((c >> 5) & 0x03) + MIN_RESOLUTION_BITS);
                self.pending
                    .borrow_mut()
                    .extend(encode_scratchpad(probe.celsius, bits));
            }
            _ => {}
        }
    }

    fn read_byte(&self) -> u8 {
        self.pending.borrow_mut().pop_front().unwrap_or(0xFF)
    }

    fn reset_search(&self) {
        self.cursor.set(0);
    }

    fn search(&self, rom: &mut [u8; 8]) -> bool {
        let probes = self.probes.borrow();
        let Some(probe) = probes.get(self.cursor.get()) else {
            return false;
        };
        *rom = probe.rom;
        self.cursor.set(self.cursor.get() + 1);
        true
    }
}

// ── Temperature / humidity module ────────────────────────────

pub struct SimDht {
    celsius: Cell<f32>,
    humidity: Cell<f32>,
    failing: Cell<bool>,
    starts: bool,
}

impl SimDht {
    pub fn new(celsius: f32, humidity: f32) -> Self {
        Self {
            celsius: Cell::new(celsius),
            humidity: Cell::new(humidity),
            failing: Cell::new(false),
            starts: true,
        }
    }

    /// Module whose `begin` fails.
    pub fn dead() -> Self {
        Self {
            starts: false,
            ..Self::new(0.0, 0.0)
        }
    }

    pub fn set_reading(&self, celsius: f32, humidity: f32) {
        self.celsius.set(celsius);
        self.humidity.set(humidity);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }
}

impl TempHumidityDevice for SimDht {
    fn begin(&self) -> bool {
        self.starts
    }

    fn read_temperature(&self) -> Option<f32> {
        (!self.failing.get()).then(|| self.celsius.get())
    }

    fn read_humidity(&self) -> Option<f32> {
        (!self.failing.get()).then(|| self.humidity.get())
    }
}

// ── Clock ────────────────────────────────────────────────────

/// Manually advanced clock.
pub struct SimClock {
    epoch: i64,
    uptime_ms: Cell<u64>,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            // 2024-01-01T00:00:00Z
            epoch: 1_704_067_200,
            uptime_ms: Cell::new(0),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.uptime_ms.set(self.uptime_ms.get() + ms);
    }
}

impl Clock for SimClock {
    fn unix_now(&self) -> i64 {
        self.epoch + (self.uptime_ms.get() / 1000) as i64
    }

    fn uptime_ms(&self) -> u64 {
        self.uptime_ms.get()
    }
}

// ── Wiring ───────────────────────────────────────────────────

pub fn sim_controller_with_config(
    config: IoConfig,
) -> (Rc<IoController>, Rc<SimGpio>, Rc<SimClock>) {
    let gpio = Rc::new(SimGpio::new());
    let clock = Rc::new(SimClock::new());
    let ctl = Rc::new(IoController::new(config, gpio.clone(), clock.clone()));
    (ctl, gpio, clock)
}

pub fn sim_controller_with_clock() -> (Rc<IoController>, Rc<SimGpio>, Rc<SimClock>) {
    sim_controller_with_config(IoConfig::default())
}

/// Controller over simulated GPIO with the default configuration.
pub fn sim_controller() -> (Rc<IoController>, Rc<SimGpio>) {
    let (ctl, gpio, _clock) = sim_controller_with_clock();
    (ctl, gpio)
}
