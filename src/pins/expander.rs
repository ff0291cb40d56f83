//! I/O expander wrapper.
//!
//! Owns one block of virtual pins (`pin_base .. pin_base + width`) and
//! forwards direction, value and sync calls to the external device. The
//! device sees only non-negative line numbers inside the block.

use std::rc::Rc;

use log::debug;

use super::{EXPANDER_BLOCK_WIDTH, EXPANDER_PIN_BASE, Pin, PinMode, PinNumber, expander_pin_base};
use crate::app::ports::ExpanderDevice;
use crate::error::ConfigError;
use crate::persist::PinExpanderData;

pub struct PinExpander {
    pin_base: PinNumber,
    channel_bits: u8,
    device: Rc<dyn ExpanderDevice>,
}

impl PinExpander {
    /// `pin` may be any pin in the block; it is normalized to the block
    /// base. `channel_bits` is the number of lines, `1 ..= 16`.
    pub fn new(
        pin: PinNumber,
        channel_bits: u8,
        device: Rc<dyn ExpanderDevice>,
    ) -> Result<Self, ConfigError> {
        if pin < EXPANDER_PIN_BASE || pin == super::NO_PIN {
            return Err(ConfigError::InvalidPin);
        }
        if channel_bits == 0 || channel_bits > EXPANDER_BLOCK_WIDTH {
            return Err(ConfigError::InvalidChannel);
        }
        Ok(Self {
            pin_base: expander_pin_base(pin),
            channel_bits,
            device,
        })
    }

    pub fn pin_base(&self) -> PinNumber {
        self.pin_base
    }

    pub fn channel_bits(&self) -> u8 {
        self.channel_bits
    }

    /// Bookkeeping descriptor: the block base, with the channel slot
    /// holding the block width.
    pub fn signal_pin(&self) -> Pin {
        Pin {
            channel: Some(self.channel_bits),
            ..Pin::new(self.pin_base, PinMode::Undefined, None)
        }
    }

    pub fn owns(&self, pin: PinNumber) -> bool {
        pin >= self.pin_base && pin - self.pin_base < self.channel_bits
    }

    fn in_range(&self, channel: u8) -> bool {
        if channel < self.channel_bits {
            true
        } else {
            debug!("expander {}: line {} out of range", self.pin_base, channel);
            false
        }
    }

    pub fn init(&self, channel: u8, mode: PinMode) {
        if self.in_range(channel) {
            self.device.set_direction(channel, mode);
        }
    }

    pub fn deinit(&self, channel: u8) {
        if self.in_range(channel) {
            self.device
                .set_direction(channel, PinMode::DigitalInputFloating);
        }
    }

    pub fn read(&self, channel: u8) -> Option<u32> {
        self.in_range(channel)
            .then(|| self.device.read_value(channel))
    }

    pub fn write(&self, channel: u8, value: u32) {
        if self.in_range(channel) {
            self.device.write_value(channel, value);
        }
    }

    /// Flushes pending writes and refreshes cached reads on the device.
    pub fn sync_channel(&self) -> bool {
        let ok = self.device.sync();
        if !ok {
            debug!("expander {}: sync failed", self.pin_base);
        }
        ok
    }

    /// Converter depth the device reports for a line, if any.
    pub fn bit_depth(&self, channel: u8, output: bool) -> Option<u8> {
        if self.in_range(channel) {
            self.device.bit_depth(channel, output)
        } else {
            None
        }
    }

    pub fn to_data(&self) -> PinExpanderData {
        PinExpanderData {
            pin_base: self.pin_base,
            channel_bits: self.channel_bits,
        }
    }

    pub fn from_data(
        data: &PinExpanderData,
        device: Rc<dyn ExpanderDevice>,
    ) -> Result<Self, ConfigError> {
        Self::new(data.pin_base, data.channel_bits, device)
    }
}
