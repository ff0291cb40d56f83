//! Mock GPIO driver for integration tests.
//!
//! Records every driver call so tests can assert on the full history of
//! select-line writes and mode changes without touching real registers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use embedded_hal::digital::PinState;
use helio_io::adapters::sim::SimClock;
use helio_io::app::ports::GpioDriver;
use helio_io::config::IoConfig;
use helio_io::pins::{PinMode, PinNumber};
use helio_io::IoController;

// ── GPIO call record ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioCall {
    SetMode { pin: PinNumber, mode: PinMode },
    Write { pin: PinNumber, high: bool },
    Read { pin: PinNumber },
    AnalogRead { pin: PinNumber },
}

// ── MockGpio ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MockGpio {
    pub calls: RefCell<Vec<GpioCall>>,
    levels: RefCell<HashMap<PinNumber, PinState>>,
    analog: RefCell<HashMap<PinNumber, u32>>,
}

#[allow(dead_code)]
impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_level(&self, pin: PinNumber, state: PinState) {
        self.levels.borrow_mut().insert(pin, state);
    }

    pub fn set_analog(&self, pin: PinNumber, raw: u32) {
        self.analog.borrow_mut().insert(pin, raw);
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Writes issued to any of `pins`, in order.
    pub fn writes_to(&self, pins: &[PinNumber]) -> Vec<(PinNumber, bool)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match *c {
                GpioCall::Write { pin, high } if pins.contains(&pin) => Some((pin, high)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&GpioCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }
}

impl GpioDriver for MockGpio {
    fn set_mode(&self, pin: PinNumber, mode: PinMode) {
        self.calls.borrow_mut().push(GpioCall::SetMode { pin, mode });
    }

    fn read(&self, pin: PinNumber) -> PinState {
        self.calls.borrow_mut().push(GpioCall::Read { pin });
        self.levels
            .borrow()
            .get(&pin)
            .copied()
            .unwrap_or(PinState::Low)
    }

    fn write(&self, pin: PinNumber, state: PinState) {
        self.calls.borrow_mut().push(GpioCall::Write {
            pin,
            high: state == PinState::High,
        });
        self.levels.borrow_mut().insert(pin, state);
    }

    fn analog_read(&self, pin: PinNumber, _bits: u8) -> u32 {
        self.calls.borrow_mut().push(GpioCall::AnalogRead { pin });
        self.analog.borrow().get(&pin).copied().unwrap_or(0)
    }

    fn analog_write(&self, _pin: PinNumber, _value: u32, _bits: u8) {}
}

/// Controller over the recording GPIO.
pub fn mock_controller(config: IoConfig) -> (Rc<IoController>, Rc<MockGpio>) {
    let gpio = Rc::new(MockGpio::new());
    let ctl = Rc::new(IoController::new(
        config,
        gpio.clone(),
        Rc::new(SimClock::new()),
    ));
    (ctl, gpio)
}
