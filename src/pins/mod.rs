//! Pin descriptors and addressing.
//!
//! A pin is reached one of three ways:
//!
//! ```text
//!   direct    GPIO n                       pin < 100, no channel
//!   muxed     GPIO n ◀── muxer channel c   pin < 100, channel = Some(c)
//!   expanded  expander block b, line c     pin = 100 + 16·b + c
//! ```
//!
//! [`Pin`] carries the addressing; [`DigitalPin`] and [`AnalogPin`] are
//! the capability views that add polarity or converter resolution. The
//! view a descriptor supports follows from its mode; asking for the wrong
//! view yields an invalid descriptor instead of a misconfigured one.

pub mod expander;
pub mod locks;
pub mod muxer;

use std::rc::Rc;

use embedded_hal::digital::PinState;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::app::ports::Controller;
use crate::persist::PinData;

pub use expander::PinExpander;
pub use locks::{PinLease, PinLocks, acquire_pin_lock};
pub use muxer::PinMuxer;

// ---------------------------------------------------------------------------
// Platform constants
// ---------------------------------------------------------------------------

pub type PinNumber = u8;

/// "No pin" sentinel.
pub const NO_PIN: PinNumber = u8::MAX;
/// First virtual pin number owned by an I/O expander.
pub const EXPANDER_PIN_BASE: PinNumber = 100;
/// Lines per expander block.
pub const EXPANDER_BLOCK_WIDTH: u8 = 16;
/// Native ADC width.
pub const ADC_RESOLUTION_BITS: u8 = 10;
/// Native DAC / PWM width.
pub const DAC_RESOLUTION_BITS: u8 = 8;

/// Expander block base for an expanded pin number, or [`NO_PIN`] for a
/// native pin.
pub const fn expander_pin_base(pin: PinNumber) -> PinNumber {
    if pin < EXPANDER_PIN_BASE {
        return NO_PIN;
    }
    ((pin - EXPANDER_PIN_BASE) & !(EXPANDER_BLOCK_WIDTH - 1)) + EXPANDER_PIN_BASE
}

/// Line within the expander block. Native pins map to line 0.
pub const fn expander_channel(pin: PinNumber) -> u8 {
    pin.saturating_sub(EXPANDER_PIN_BASE) & (EXPANDER_BLOCK_WIDTH - 1)
}

// ---------------------------------------------------------------------------
// Modes and kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PinMode {
    DigitalInputFloating,
    DigitalInputPullUp,
    DigitalInputPullDown,
    DigitalOutputOpenDrain,
    DigitalOutputPushPull,
    AnalogInput,
    AnalogOutput,
    #[default]
    Undefined,
}

impl PinMode {
    pub const fn is_digital(self) -> bool {
        matches!(
            self,
            Self::DigitalInputFloating
                | Self::DigitalInputPullUp
                | Self::DigitalInputPullDown
                | Self::DigitalOutputOpenDrain
                | Self::DigitalOutputPushPull
        )
    }

    pub const fn is_analog(self) -> bool {
        matches!(self, Self::AnalogInput | Self::AnalogOutput)
    }

    pub const fn is_input(self) -> bool {
        matches!(
            self,
            Self::DigitalInputFloating
                | Self::DigitalInputPullUp
                | Self::DigitalInputPullDown
                | Self::AnalogInput
        )
    }

    pub const fn is_output(self) -> bool {
        matches!(
            self,
            Self::DigitalOutputOpenDrain | Self::DigitalOutputPushPull | Self::AnalogOutput
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinKind {
    Unknown,
    Digital,
    Analog,
}

impl From<PinMode> for PinKind {
    fn from(mode: PinMode) -> Self {
        if mode.is_digital() {
            Self::Digital
        } else if mode.is_analog() {
            Self::Analog
        } else {
            Self::Unknown
        }
    }
}

/// Muxed pins can be brought up in one call or in two, so a caller can
/// select a channel before it starts driving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableStep {
    SelectAndActivate,
    Select,
    Activate,
}

// ---------------------------------------------------------------------------
// Pin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pin {
    pub kind: PinKind,
    pub pin: PinNumber,
    pub mode: PinMode,
    /// Muxer channel, or the expander line for expanded pins.
    pub channel: Option<u8>,
}

impl Default for Pin {
    fn default() -> Self {
        Self::NONE
    }
}

impl Pin {
    pub const NONE: Pin = Pin {
        kind: PinKind::Unknown,
        pin: NO_PIN,
        mode: PinMode::Undefined,
        channel: None,
    };

    pub fn new(pin: PinNumber, mode: PinMode, channel: Option<u8>) -> Self {
        let channel = if pin != NO_PIN && pin >= EXPANDER_PIN_BASE {
            Some(expander_channel(pin))
        } else {
            channel
        };
        Self {
            kind: PinKind::from(mode),
            pin,
            mode,
            channel,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.pin != NO_PIN
    }

    pub fn is_digital(&self) -> bool {
        self.kind == PinKind::Digital
    }

    pub fn is_analog(&self) -> bool {
        self.kind == PinKind::Analog
    }

    pub fn is_muxed(&self) -> bool {
        self.is_valid() && self.channel.is_some() && self.pin < EXPANDER_PIN_BASE
    }

    pub fn is_expanded(&self) -> bool {
        self.is_valid() && self.pin >= EXPANDER_PIN_BASE
    }

    fn expander(&self, ctl: &dyn Controller) -> Option<(Rc<PinExpander>, u8)> {
        if !self.is_expanded() {
            return None;
        }
        ctl.pin_expander(expander_pin_base(self.pin))
            .map(|exp| (exp, expander_channel(self.pin)))
    }

    /// Configures direction and pulls for the pin's mode.
    pub fn init(&self, ctl: &dyn Controller) {
        if !self.is_valid() {
            return;
        }
        if self.is_expanded() {
            if let Some((exp, channel)) = self.expander(ctl) {
                exp.init(channel, self.mode);
            }
        } else {
            ctl.gpio().set_mode(self.pin, self.mode);
        }
    }

    /// Returns the pin to a floating input on whichever path owns it.
    pub fn deinit(&self, ctl: &dyn Controller) {
        if !self.is_valid() {
            return;
        }
        if self.is_expanded() {
            if let Some((exp, channel)) = self.expander(ctl) {
                exp.deinit(channel);
            }
        } else {
            ctl.gpio().set_mode(self.pin, PinMode::DigitalInputFloating);
        }
    }

    /// Makes the signal path usable. Direct pins need nothing.
    pub fn enable(&self, ctl: &dyn Controller, step: EnableStep) -> bool {
        if !self.is_valid() {
            return false;
        }
        if self.is_muxed() {
            let (Some(muxer), Some(channel)) = (ctl.pin_muxer(self.pin), self.channel) else {
                debug!("pin {}: no muxer registered", self.pin);
                return false;
            };
            if matches!(step, EnableStep::SelectAndActivate | EnableStep::Select) {
                muxer.select_channel(ctl, channel);
            }
            if matches!(step, EnableStep::SelectAndActivate | EnableStep::Activate) {
                muxer.set_active(ctl, true);
            }
            true
        } else if self.is_expanded() {
            self.expander(ctl).is_some_and(|(exp, _)| exp.sync_channel())
        } else {
            true
        }
    }

    /// Digital view; invalid unless the mode is digital.
    pub fn to_digital(&self) -> DigitalPin {
        if self.is_digital() {
            DigitalPin {
                pin: *self,
                active_low: false,
            }
        } else {
            DigitalPin::default()
        }
    }

    /// Analog view; invalid unless the mode is analog.
    pub fn to_analog(&self) -> AnalogPin {
        if self.is_analog() {
            AnalogPin::from_pin(*self, 0, PwmConfig::default())
        } else {
            AnalogPin::default()
        }
    }

    pub fn to_data(&self) -> PinData {
        PinData {
            pin: self.pin,
            mode: self.mode,
            channel: if self.is_expanded() { None } else { self.channel },
            active_low: None,
            bit_res: None,
            pwm_channel: None,
            pwm_frequency: None,
        }
    }

    pub fn from_data(data: &PinData) -> Self {
        Self::new(data.pin, data.mode, data.channel)
    }
}

// ---------------------------------------------------------------------------
// Digital view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DigitalPin {
    pub pin: Pin,
    pub active_low: bool,
}

impl DigitalPin {
    pub fn new(pin: PinNumber, mode: PinMode, active_low: bool, channel: Option<u8>) -> Self {
        let base = Pin::new(pin, mode, channel);
        if base.is_digital() {
            Self {
                pin: base,
                active_low,
            }
        } else {
            Self::default()
        }
    }

    pub fn number(&self) -> PinNumber {
        self.pin.pin
    }

    pub fn is_valid(&self) -> bool {
        self.pin.is_valid() && self.pin.is_digital()
    }

    pub fn init(&self, ctl: &dyn Controller) {
        self.pin.init(ctl);
    }

    pub fn deinit(&self, ctl: &dyn Controller) {
        self.pin.deinit(ctl);
    }

    pub fn active_state(&self) -> PinState {
        PinState::from(!self.active_low)
    }

    pub fn digital_read(&self, ctl: &dyn Controller) -> Option<PinState> {
        if !self.is_valid() {
            return None;
        }
        if self.pin.channel.is_some() && !self.pin.enable(ctl, EnableStep::SelectAndActivate) {
            return None;
        }
        match self.pin.expander(ctl) {
            Some((exp, channel)) => exp.read(channel).map(|v| PinState::from(v != 0)),
            None if self.pin.is_expanded() => None,
            None => Some(ctl.gpio().read(self.pin.pin)),
        }
    }

    pub fn digital_write(&self, ctl: &dyn Controller, state: PinState) {
        if !self.is_valid() {
            return;
        }
        if self.pin.is_expanded() {
            if let Some((exp, channel)) = self.pin.expander(ctl) {
                exp.write(channel, u32::from(state == PinState::High));
                exp.sync_channel();
            }
            return;
        }
        if self.pin.is_muxed() {
            self.pin.enable(ctl, EnableStep::Select);
        }
        ctl.gpio().write(self.pin.pin, state);
        if self.pin.is_muxed() {
            self.pin.enable(ctl, EnableStep::Activate);
        }
    }

    /// `true` when the line reads at its active level.
    pub fn is_active(&self, ctl: &dyn Controller) -> bool {
        self.digital_read(ctl) == Some(self.active_state())
    }

    pub fn activate(&self, ctl: &dyn Controller) {
        self.digital_write(ctl, self.active_state());
    }

    pub fn deactivate(&self, ctl: &dyn Controller) {
        self.digital_write(ctl, !self.active_state());
    }

    pub fn to_data(&self) -> PinData {
        PinData {
            active_low: Some(self.active_low),
            ..self.pin.to_data()
        }
    }

    pub fn from_data(data: &PinData) -> Self {
        Self::new(
            data.pin,
            data.mode,
            data.active_low.unwrap_or(false),
            data.channel,
        )
    }
}

// ---------------------------------------------------------------------------
// Analog view
// ---------------------------------------------------------------------------

/// Converter width and its full-scale code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitResolution {
    pub bits: u8,
    pub max_value: u32,
}

impl BitResolution {
    pub const fn new(bits: u8) -> Self {
        let bits = if bits == 0 { 1 } else if bits > 31 { 31 } else { bits };
        Self {
            bits,
            max_value: (1u32 << bits) - 1,
        }
    }

    /// Raw code → `0.0 ..= 1.0`.
    pub fn transform(&self, raw: u32) -> f32 {
        raw.min(self.max_value) as f32 / self.max_value as f32
    }

    /// `0.0 ..= 1.0` → raw code.
    pub fn inverse_transform(&self, value: f32) -> u32 {
        (value.clamp(0.0, 1.0) * self.max_value as f32).round() as u32
    }
}

impl Default for BitResolution {
    fn default() -> Self {
        Self::new(ADC_RESOLUTION_BITS)
    }
}

/// PWM output settings. Zero frequency means "no PWM on this pin".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PwmConfig {
    pub channel: u8,
    pub frequency_hz: f32,
}

impl PwmConfig {
    pub fn is_enabled(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnalogPin {
    pub pin: Pin,
    pub bit_res: BitResolution,
    pub pwm: PwmConfig,
}

impl AnalogPin {
    /// `bits == 0` selects the native ADC or DAC width for the mode.
    pub fn new(pin: PinNumber, mode: PinMode, bits: u8, channel: Option<u8>, pwm: PwmConfig) -> Self {
        let base = Pin::new(pin, mode, channel);
        if base.is_analog() {
            Self::from_pin(base, bits, pwm)
        } else {
            Self::default()
        }
    }

    fn from_pin(pin: Pin, bits: u8, pwm: PwmConfig) -> Self {
        let bits = match (bits, pin.mode.is_output()) {
            (0, true) => DAC_RESOLUTION_BITS,
            (0, false) => ADC_RESOLUTION_BITS,
            (bits, _) => bits,
        };
        Self {
            pin,
            bit_res: BitResolution::new(bits),
            pwm,
        }
    }

    pub fn number(&self) -> PinNumber {
        self.pin.pin
    }

    pub fn is_valid(&self) -> bool {
        self.pin.is_valid() && self.pin.is_analog()
    }

    pub fn bit_resolution(&self) -> BitResolution {
        self.bit_res
    }

    /// Configures the pin. Expanded pins adopt the expander's converter
    /// depth; direct outputs with a PWM frequency get their PWM set up.
    pub fn init(&mut self, ctl: &dyn Controller) {
        if !self.is_valid() {
            return;
        }
        self.pin.init(ctl);
        if let Some((exp, channel)) = self.pin.expander(ctl) {
            if let Some(bits) = exp.bit_depth(channel, self.pin.mode.is_output()) {
                if bits != self.bit_res.bits {
                    debug!(
                        "pin {}: expander depth {} bits replaces {}",
                        self.pin.pin, bits, self.bit_res.bits
                    );
                    self.bit_res = BitResolution::new(bits);
                }
            }
        } else if self.pin.mode.is_output() && self.pwm.is_enabled() {
            ctl.gpio()
                .configure_pwm(self.pin.pin, self.pwm, self.bit_res.bits);
        }
    }

    pub fn deinit(&self, ctl: &dyn Controller) {
        self.pin.deinit(ctl);
    }

    pub fn analog_read_raw(&self, ctl: &dyn Controller) -> Option<u32> {
        if !self.is_valid() {
            return None;
        }
        if self.pin.channel.is_some() && !self.pin.enable(ctl, EnableStep::SelectAndActivate) {
            return None;
        }
        match self.pin.expander(ctl) {
            Some((exp, channel)) => exp.read(channel),
            None if self.pin.is_expanded() => None,
            None => Some(ctl.gpio().analog_read(self.pin.pin, self.bit_res.bits)),
        }
    }

    /// Normalized `0.0 ..= 1.0` reading.
    pub fn analog_read(&self, ctl: &dyn Controller) -> Option<f32> {
        self.analog_read_raw(ctl).map(|raw| self.bit_res.transform(raw))
    }

    pub fn analog_write_raw(&self, ctl: &dyn Controller, raw: u32) {
        if !self.is_valid() {
            return;
        }
        let raw = raw.min(self.bit_res.max_value);
        if self.pin.is_expanded() {
            if let Some((exp, channel)) = self.pin.expander(ctl) {
                exp.write(channel, raw);
                exp.sync_channel();
            }
            return;
        }
        if self.pin.is_muxed() {
            self.pin.enable(ctl, EnableStep::Select);
        }
        ctl.gpio().analog_write(self.pin.pin, raw, self.bit_res.bits);
        if self.pin.is_muxed() {
            self.pin.enable(ctl, EnableStep::Activate);
        }
    }

    /// Writes a normalized `0.0 ..= 1.0` output level.
    pub fn analog_write(&self, ctl: &dyn Controller, value: f32) {
        self.analog_write_raw(ctl, self.bit_res.inverse_transform(value));
    }

    pub fn to_data(&self) -> PinData {
        PinData {
            bit_res: Some(self.bit_res.bits),
            pwm_channel: Some(self.pwm.channel),
            pwm_frequency: Some(self.pwm.frequency_hz),
            ..self.pin.to_data()
        }
    }

    pub fn from_data(data: &PinData) -> Self {
        Self::new(
            data.pin,
            data.mode,
            data.bit_res.unwrap_or(0),
            data.channel,
            PwmConfig {
                channel: data.pwm_channel.unwrap_or(0),
                frequency_hz: data.pwm_frequency.unwrap_or(0.0),
            },
        )
    }
}
