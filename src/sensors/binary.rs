//! Binary sensor: endstops, ice detectors and other on/off inputs.
//!
//! Sampling is a single level read, so the cycle runs synchronously with a
//! zero-timeout lease. Besides the measurement channel, a second channel
//! carries only state transitions.
//!
//! Pins that can raise change interrupts may register for them; the ISR
//! queues the pin in [`crate::events`] and the poller force-measures the
//! sensor. Polling stays correct either way.

use core::cell::Cell;
use std::rc::Rc;

use embassy_sync::pubsub::PubSubChannel;
use log::{debug, info};

use super::{SensorCore, SensorId, StateChannel, StateSubscriber};
use crate::app::ports::Controller;
use crate::error::{ConfigError, Error};
use crate::measurement::{BinaryMeasurement, Measurement, MeasurementKind};
use crate::pins::{DigitalPin, PinLease, PinNumber};

pub struct BinarySensor {
    core: SensorCore,
    pin: DigitalPin,
    using_isr: Cell<bool>,
    state_changes: StateChannel,
}

impl BinarySensor {
    pub fn new(ctl: Rc<dyn Controller>, id: SensorId, pin: DigitalPin) -> Self {
        let core = SensorCore::new(id, ctl, MeasurementKind::Binary);
        if !pin.is_valid() {
            core.invalidate(ConfigError::InvalidPin);
        } else if !pin.pin.mode.is_input() {
            core.invalidate(ConfigError::InvalidMode);
        } else {
            pin.init(core.controller());
        }
        Self {
            core,
            pin,
            using_isr: Cell::new(false),
            state_changes: PubSubChannel::new(),
        }
    }

    pub fn core(&self) -> &SensorCore {
        &self.core
    }

    pub fn pin(&self) -> &DigitalPin {
        &self.pin
    }

    pub fn pin_number(&self) -> PinNumber {
        self.pin.number()
    }

    pub fn is_using_isr(&self) -> bool {
        self.using_isr.get()
    }

    /// Last known level, `false` before the first read.
    pub fn state(&self) -> bool {
        match self.core.latest_measurement() {
            Measurement::Binary(m) => m.state,
            _ => false,
        }
    }

    /// Reads the level and publishes it. `false` if rejected or the pin
    /// is busy.
    pub fn take_measurement(&self, force: bool) -> bool {
        let Some(_measuring) = self.core.begin(force) else {
            return false;
        };
        let ctl = self.core.controller();
        let Some(_lease) = PinLease::try_new(ctl, self.pin.number()) else {
            debug!("{}: pin {} busy", self.core.name(), self.pin.number());
            return false;
        };

        let previous = self.state();
        let state = self.pin.is_active(ctl);
        let (timestamp, frame) = self.core.stamp();
        self.core.publish(Measurement::Binary(BinaryMeasurement {
            state,
            timestamp,
            frame,
        }));
        if state != previous {
            debug!("{}: state {} -> {}", self.core.name(), previous, state);
            self.state_changes
                .immediate_publisher()
                .publish_immediate(state);
        }
        true
    }

    /// Switches to interrupt-driven updates when the pin supports it.
    pub fn try_register_isr(&self) -> bool {
        if self.using_isr.get() {
            return true;
        }
        if !self.core.is_valid() {
            return false;
        }
        let gpio = self.core.controller().gpio();
        let pin = self.pin.number();
        if self.pin.pin.is_muxed() || self.pin.pin.is_expanded() || !gpio.can_interrupt(pin) {
            return false;
        }
        if gpio.attach_change_interrupt(pin) {
            self.using_isr.set(true);
            info!("{}: using change interrupt on pin {}", self.core.name(), pin);
        }
        self.using_isr.get()
    }

    pub fn subscribe_state_changes(&self) -> Result<StateSubscriber<'_>, Error> {
        self.state_changes
            .subscriber()
            .map_err(|_| Error::SubscriberSlotsFull)
    }
}
