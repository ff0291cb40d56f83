//! Channel-select multiplexer.
//!
//! ```text
//!             ┌────────────┐
//!   S0..S4 ──▶│            │── ch 0
//!   CE     ──▶│   muxer    │── ch 1
//!   SIG    ◀─▶│            │── ...
//!             └────────────┘
//! ```
//!
//! Select lines are treated as shared by every muxer on the same select
//! bus, so changing a channel first deactivates all of them and drops
//! their cached selection. Every muxer sits on bus 0 unless configured
//! otherwise, which keeps the conservative "deactivate everything"
//! behaviour.

use core::cell::Cell;

use embedded_hal::digital::PinState;
use log::{debug, warn};

use super::{DigitalPin, Pin, PinMode, PinNumber, NO_PIN};
use crate::app::ports::Controller;
use crate::error::ConfigError;
use crate::persist::{PinMuxerData, comma_join, comma_split};

/// Most channel select lines a muxer drives (32 channels).
pub const MAX_SELECT_PINS: usize = 5;

pub struct PinMuxer {
    signal: Pin,
    chip_enable: DigitalPin,
    select_pins: heapless::Vec<PinNumber, MAX_SELECT_PINS>,
    select_bus: u8,
    /// `None` until [`PinMuxer::init`] or the first selection.
    selected: Cell<Option<u8>>,
}

impl PinMuxer {
    /// Select pins are given least significant bit first. Trailing
    /// [`NO_PIN`] entries are ignored; a gap before a used pin is an error.
    pub fn new(
        signal: Pin,
        chip_enable: DigitalPin,
        select_pins: &[PinNumber],
    ) -> Result<Self, ConfigError> {
        if !signal.is_valid() {
            return Err(ConfigError::InvalidPin);
        }
        if signal.is_expanded() {
            return Err(ConfigError::InvalidMode);
        }
        let used = select_pins
            .iter()
            .rposition(|&p| p != NO_PIN)
            .map_or(0, |i| i + 1);
        let select_pins = &select_pins[..used];
        if select_pins.contains(&NO_PIN) {
            return Err(ConfigError::SelectPinGap);
        }
        let select_pins = heapless::Vec::from_slice(select_pins)
            .map_err(|()| ConfigError::TooManySelectPins)?;
        Ok(Self {
            // the signal pin itself is direct; channels live on the bus
            signal: Pin::new(signal.pin, signal.mode, None),
            chip_enable,
            select_pins,
            select_bus: 0,
            selected: Cell::new(None),
        })
    }

    /// Places the muxer on its own select bus.
    #[must_use]
    pub fn with_select_bus(mut self, bus: u8) -> Self {
        self.select_bus = bus;
        self
    }

    pub fn signal_pin(&self) -> &Pin {
        &self.signal
    }

    pub fn chip_enable_pin(&self) -> &DigitalPin {
        &self.chip_enable
    }

    pub fn select_pins(&self) -> &[PinNumber] {
        &self.select_pins
    }

    pub fn select_bus(&self) -> u8 {
        self.select_bus
    }

    pub fn channel_bits(&self) -> u8 {
        self.select_pins.len() as u8
    }

    pub fn channel_count(&self) -> u8 {
        1 << self.channel_bits()
    }

    pub fn selected_channel(&self) -> Option<u8> {
        self.selected.get()
    }

    /// Drops the cached selection. Called whenever a muxer on the same
    /// select bus is about to drive the shared lines.
    pub fn forget_selection(&self) {
        self.selected.set(None);
    }

    pub fn init(&self, ctl: &dyn Controller) {
        self.signal.deinit(ctl);
        self.chip_enable.init(ctl);
        self.chip_enable.deactivate(ctl);
        for &pin in &self.select_pins {
            ctl.gpio().set_mode(pin, PinMode::DigitalOutputPushPull);
            ctl.gpio().write(pin, PinState::Low);
        }
        self.selected.set(Some(0));
    }

    pub fn deinit(&self, ctl: &dyn Controller) {
        self.set_active(ctl, false);
        self.chip_enable.deinit(ctl);
        for &pin in &self.select_pins {
            ctl.gpio().set_mode(pin, PinMode::DigitalInputFloating);
        }
        self.selected.set(None);
    }

    /// Drives the select lines to `channel`. No pin is touched when the
    /// channel is already selected.
    pub fn select_channel(&self, ctl: &dyn Controller, channel: u8) {
        if self.selected.get() == Some(channel) {
            return;
        }
        if channel >= self.channel_count() {
            warn!(
                "muxer on pin {}: channel {} out of range (max {})",
                self.signal.pin,
                channel,
                self.channel_count() - 1
            );
            return;
        }
        // also clears every cached selection on this bus
        ctl.deactivate_pin_muxers_on_bus(self.select_bus);
        for (bit, &pin) in self.select_pins.iter().enumerate() {
            ctl.gpio().write(pin, PinState::from((channel >> bit) & 1 == 1));
        }
        self.selected.set(Some(channel));
        debug!("muxer on pin {}: channel {}", self.signal.pin, channel);
    }

    /// Enabling brings the signal path up before chip enable; disabling
    /// drops chip enable before the signal path.
    pub fn set_active(&self, ctl: &dyn Controller, active: bool) {
        if active {
            self.signal.init(ctl);
            self.chip_enable.activate(ctl);
        } else {
            self.chip_enable.deactivate(ctl);
            self.signal.deinit(ctl);
        }
    }

    pub fn to_data(&self) -> PinMuxerData {
        PinMuxerData {
            signal_pin: self.signal.to_data(),
            chip_enable_pin: self.chip_enable.to_data(),
            channel_pins: comma_join(&self.select_pins),
            select_bus: self.select_bus,
        }
    }

    pub fn from_data(data: &PinMuxerData) -> anyhow::Result<Self> {
        let select_pins = comma_split(&data.channel_pins)?;
        let muxer = Self::new(
            Pin::from_data(&data.signal_pin),
            DigitalPin::from_data(&data.chip_enable_pin),
            &select_pins,
        )?;
        Ok(muxer.with_select_bus(data.select_bus))
    }
}
