//! Concrete [`Controller`]: owns the shared state every sensor reaches.
//!
//! ```text
//!   IoController
//!    ├── polling frame        (advanced once per poll cycle)
//!    ├── PinLocks             (one lease per physical pin)
//!    ├── CalibrationStore     (records keyed by sensor name)
//!    ├── muxers / expanders   (bus owners, looked up by pin)
//!    ├── one-wire buses       (by data pin)
//!    └── GpioDriver + Clock   (platform adapters)
//! ```
//!
//! Single-threaded: everything sits behind `Cell`/`RefCell` and is shared
//! through `Rc`.

use core::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, info};

use super::ports::{Clock, Controller, GpioDriver, OneWireBus};
use crate::calibration::{CalibrationKey, CalibrationRecord, CalibrationStore};
use crate::config::IoConfig;
use crate::diagnostics::Diagnostics;
use crate::error::ConfigError;
use crate::measurement::{Frame, INVALID_FRAME};
use crate::pins::{NO_PIN, PinExpander, PinLocks, PinMuxer, PinNumber, expander_pin_base};
use crate::units::MeasurementMode;

pub const MAX_MUXERS: usize = 8;
pub const MAX_EXPANDERS: usize = 8;
pub const MAX_ONE_WIRE_BUSES: usize = 4;

pub struct IoController {
    config: IoConfig,
    frame: Cell<Frame>,
    mode: Cell<MeasurementMode>,
    locks: PinLocks,
    calibrations: CalibrationStore,
    muxers: RefCell<heapless::Vec<Rc<PinMuxer>, MAX_MUXERS>>,
    expanders: RefCell<heapless::Vec<Rc<PinExpander>, MAX_EXPANDERS>>,
    one_wire: RefCell<heapless::Vec<(PinNumber, Rc<dyn OneWireBus>), MAX_ONE_WIRE_BUSES>>,
    gpio: Rc<dyn GpioDriver>,
    clock: Rc<dyn Clock>,
    diagnostics: Diagnostics,
}

impl IoController {
    pub fn new(config: IoConfig, gpio: Rc<dyn GpioDriver>, clock: Rc<dyn Clock>) -> Self {
        info!(
            "io controller: mode={:?} lock_timeout={}ms allowance={}",
            config.measurement_mode, config.pin_lock_timeout_ms, config.polling_allowance
        );
        Self {
            mode: Cell::new(config.measurement_mode),
            config,
            // frame 0 marks "never measured", so counting starts at 1
            frame: Cell::new(1),
            locks: PinLocks::new(),
            calibrations: CalibrationStore::new(),
            muxers: RefCell::new(heapless::Vec::new()),
            expanders: RefCell::new(heapless::Vec::new()),
            one_wire: RefCell::new(heapless::Vec::new()),
            gpio,
            clock,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Starts the next polling generation and returns it.
    pub fn advance_polling_frame(&self) -> Frame {
        let mut next = self.frame.get().wrapping_add(1);
        if next == INVALID_FRAME {
            next = 1;
        }
        self.frame.set(next);
        next
    }

    pub fn set_measurement_mode(&self, mode: MeasurementMode) {
        if self.mode.replace(mode) != mode {
            info!("measurement mode -> {:?}", mode);
        }
    }

    pub fn calibrations(&self) -> &CalibrationStore {
        &self.calibrations
    }

    pub fn pin_locks(&self) -> &PinLocks {
        &self.locks
    }

    /// Registers a muxer and drives its lines to the idle state. A muxer
    /// on the same signal pin is replaced.
    pub fn add_pin_muxer(&self, muxer: PinMuxer) -> Result<Rc<PinMuxer>, ConfigError> {
        let muxer = Rc::new(muxer);
        {
            let mut muxers = self.muxers.borrow_mut();
            let signal = muxer.signal_pin().pin;
            if let Some(slot) = muxers.iter_mut().find(|m| m.signal_pin().pin == signal) {
                *slot = muxer.clone();
            } else {
                muxers
                    .push(muxer.clone())
                    .map_err(|_| ConfigError::CapacityExceeded)?;
            }
        }
        // init drives the shared select lines back to channel 0
        for other in self.muxer_list().iter().filter(|m| m.select_bus() == muxer.select_bus()) {
            other.forget_selection();
        }
        muxer.init(self);
        debug!(
            "muxer on pin {}: {} channels, bus {}",
            muxer.signal_pin().pin,
            muxer.channel_count(),
            muxer.select_bus()
        );
        Ok(muxer)
    }

    pub fn add_pin_expander(&self, expander: PinExpander) -> Result<Rc<PinExpander>, ConfigError> {
        let expander = Rc::new(expander);
        let mut expanders = self.expanders.borrow_mut();
        let base = expander.pin_base();
        if let Some(slot) = expanders.iter_mut().find(|e| e.pin_base() == base) {
            *slot = expander.clone();
        } else {
            expanders
                .push(expander.clone())
                .map_err(|_| ConfigError::CapacityExceeded)?;
        }
        debug!("expander at {}: {} lines", base, expander.channel_bits());
        Ok(expander)
    }

    pub fn add_one_wire_bus(
        &self,
        pin: PinNumber,
        bus: Rc<dyn OneWireBus>,
    ) -> Result<(), ConfigError> {
        let mut buses = self.one_wire.borrow_mut();
        if let Some(slot) = buses.iter_mut().find(|(p, _)| *p == pin) {
            slot.1 = bus;
            return Ok(());
        }
        buses
            .push((pin, bus))
            .map_err(|_| ConfigError::CapacityExceeded)
    }

    /// Snapshot so muxer callbacks into the controller never overlap a
    /// registry borrow.
    fn muxer_list(&self) -> heapless::Vec<Rc<PinMuxer>, MAX_MUXERS> {
        self.muxers.borrow().clone()
    }
}

impl Controller for IoController {
    fn polling_frame(&self) -> Frame {
        self.frame.get()
    }

    fn try_acquire_pin_lock(&self, pin: PinNumber) -> bool {
        self.locks.try_acquire(pin)
    }

    fn release_pin_lock(&self, pin: PinNumber) {
        self.locks.release(pin);
    }

    fn calibration_data(&self, key: CalibrationKey) -> Option<Rc<CalibrationRecord>> {
        self.calibrations.get(key)
    }

    fn measurement_mode(&self) -> MeasurementMode {
        self.mode.get()
    }

    fn pin_expander(&self, pin_base: PinNumber) -> Option<Rc<PinExpander>> {
        let base = expander_pin_base(pin_base);
        if base == NO_PIN {
            return None;
        }
        self.expanders
            .borrow()
            .iter()
            .find(|e| e.pin_base() == base)
            .cloned()
    }

    fn pin_muxer(&self, pin: PinNumber) -> Option<Rc<PinMuxer>> {
        self.muxers
            .borrow()
            .iter()
            .find(|m| m.signal_pin().pin == pin)
            .cloned()
    }

    fn deactivate_all_pin_muxers(&self) {
        for muxer in &self.muxer_list() {
            muxer.set_active(self, false);
            muxer.forget_selection();
        }
    }

    /// Select lines are shared per bus, so the muxers there lose their
    /// cached channel as well.
    fn deactivate_pin_muxers_on_bus(&self, bus: u8) {
        for muxer in self.muxer_list().iter().filter(|m| m.select_bus() == bus) {
            muxer.set_active(self, false);
            muxer.forget_selection();
        }
    }

    fn one_wire_bus(&self, pin: PinNumber) -> Option<Rc<dyn OneWireBus>> {
        self.one_wire
            .borrow()
            .iter()
            .find(|(p, _)| *p == pin)
            .map(|(_, bus)| bus.clone())
    }

    fn gpio(&self) -> &dyn GpioDriver {
        &*self.gpio
    }

    fn unix_now(&self) -> i64 {
        self.clock.unix_now()
    }

    fn uptime_ms(&self) -> u64 {
        self.clock.uptime_ms()
    }

    fn config(&self) -> &IoConfig {
        &self.config
    }

    fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim::{SimExpander, sim_controller};
    use crate::pins::{DigitalPin, Pin, PinMode};

    #[test]
    fn frames_start_at_one_and_skip_zero() {
        let (ctl, _gpio) = sim_controller();
        assert_eq!(ctl.polling_frame(), 1);
        ctl.frame.set(Frame::MAX);
        assert_eq!(ctl.advance_polling_frame(), 1);
        assert_eq!(ctl.advance_polling_frame(), 2);
    }

    #[test]
    fn expander_lookup_by_any_pin_in_block() {
        let (ctl, _gpio) = sim_controller();
        let exp = PinExpander::new(116, 8, Rc::new(SimExpander::new())).unwrap();
        ctl.add_pin_expander(exp).unwrap();
        assert!(ctl.pin_expander(116).is_some());
        assert!(ctl.pin_expander(123).is_some());
        assert!(ctl.pin_expander(100).is_none());
    }

    #[test]
    fn native_pin_has_no_expander() {
        let (ctl, _gpio) = sim_controller();
        let exp = PinExpander::new(100, 16, Rc::new(SimExpander::new())).unwrap();
        ctl.add_pin_expander(exp).unwrap();
        assert!(ctl.pin_expander(50).is_none());
        assert!(ctl.pin_expander(0).is_none());
        assert!(ctl.pin_expander(NO_PIN).is_none());
        assert!(ctl.pin_expander(115).is_some());
    }

    #[test]
    fn muxer_registry_replaces_on_same_signal_pin() {
        let (ctl, _gpio) = sim_controller();
        let make = |bits: &[PinNumber]| {
            PinMuxer::new(
                Pin::new(36, PinMode::AnalogInput, None),
                DigitalPin::new(NO_PIN, PinMode::DigitalOutputPushPull, true, None),
                bits,
            )
            .unwrap()
        };
        ctl.add_pin_muxer(make(&[25, 26])).unwrap();
        ctl.add_pin_muxer(make(&[25, 26, 27])).unwrap();
        assert_eq!(ctl.pin_muxer(36).map(|m| m.channel_count()), Some(8));
        assert!(ctl.pin_muxer(39).is_none());
    }
}
