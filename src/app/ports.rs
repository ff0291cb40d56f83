//! Port traits: the boundary between the measurement core and the outside world.
//!
//! ```text
//!   Sensor ──▶ Controller ──▶ PinLocks / CalibrationStore / muxers / expanders
//!      │
//!      └──▶ GpioDriver / ExpanderDevice / OneWireBus / TempHumidityDevice
//! ```
//!
//! Sensors receive their [`Controller`] explicitly and reach hardware only
//! through the driver ports, so every piece can run against the simulated
//! adapters in [`crate::adapters::sim`].

use std::rc::Rc;

use embedded_hal::digital::PinState;

use crate::calibration::{CalibrationKey, CalibrationRecord};
use crate::config::IoConfig;
use crate::diagnostics::Diagnostics;
use crate::measurement::{Frame, is_frame_old};
use crate::pins::{PinExpander, PinMode, PinMuxer, PinNumber, PwmConfig};
use crate::units::MeasurementMode;

// ───────────────────────────────────────────────────────────────
// Controller (owning collaborator)
// ───────────────────────────────────────────────────────────────

/// Services a sensor needs from whatever owns it.
pub trait Controller {
    /// Current polling generation.
    fn polling_frame(&self) -> Frame;

    fn is_polling_frame_old(&self, frame: Frame, allowance: Frame) -> bool {
        is_frame_old(frame, self.polling_frame(), allowance)
    }

    /// Zero-timeout lease attempt. Positive timeouts go through
    /// [`crate::pins::acquire_pin_lock`].
    fn try_acquire_pin_lock(&self, pin: PinNumber) -> bool;

    fn release_pin_lock(&self, pin: PinNumber);

    fn calibration_data(&self, key: CalibrationKey) -> Option<Rc<CalibrationRecord>>;

    fn measurement_mode(&self) -> MeasurementMode;

    fn pin_expander(&self, pin_base: PinNumber) -> Option<Rc<PinExpander>>;

    /// Muxer whose signal pin is `pin`.
    fn pin_muxer(&self, pin: PinNumber) -> Option<Rc<PinMuxer>>;

    fn deactivate_all_pin_muxers(&self);

    /// Deactivates the muxers sharing select bus `bus`.
    fn deactivate_pin_muxers_on_bus(&self, bus: u8) {
        let _ = bus;
        self.deactivate_all_pin_muxers();
    }

    fn one_wire_bus(&self, pin: PinNumber) -> Option<Rc<dyn OneWireBus>>;

    fn gpio(&self) -> &dyn GpioDriver;

    /// Wall-clock seconds for measurement timestamps.
    fn unix_now(&self) -> i64;

    /// Monotonic milliseconds since boot.
    fn uptime_ms(&self) -> u64;

    fn config(&self) -> &IoConfig;

    fn diagnostics(&self) -> &Diagnostics;
}

// ───────────────────────────────────────────────────────────────
// Native pin driver
// ───────────────────────────────────────────────────────────────

pub trait GpioDriver {
    fn set_mode(&self, pin: PinNumber, mode: PinMode);

    fn read(&self, pin: PinNumber) -> PinState;

    fn write(&self, pin: PinNumber, state: PinState);

    /// Raw converter code at `bits` resolution.
    fn analog_read(&self, pin: PinNumber, bits: u8) -> u32;

    fn analog_write(&self, pin: PinNumber, value: u32, bits: u8);

    fn configure_pwm(&self, pin: PinNumber, pwm: PwmConfig, bits: u8) {
        let _ = (pin, pwm, bits);
    }

    /// Whether the pin can raise change interrupts on this platform.
    fn can_interrupt(&self, pin: PinNumber) -> bool {
        let _ = pin;
        false
    }

    /// Routes change interrupts on `pin` to [`crate::events::notify_pin_change`].
    fn attach_change_interrupt(&self, pin: PinNumber) -> bool {
        let _ = pin;
        false
    }
}

// ───────────────────────────────────────────────────────────────
// External devices
// ───────────────────────────────────────────────────────────────

/// An I/O expander chip. Line numbers are always inside the block.
pub trait ExpanderDevice {
    fn set_direction(&self, channel: u8, mode: PinMode);

    fn read_value(&self, channel: u8) -> u32;

    fn write_value(&self, channel: u8, value: u32);

    /// Bulk transfer of pending writes and cached reads.
    fn sync(&self) -> bool;

    /// Converter depth for analog-capable lines.
    fn bit_depth(&self, channel: u8, output: bool) -> Option<u8> {
        let _ = (channel, output);
        None
    }
}

/// Single-wire addressable bus master.
pub trait OneWireBus {
    /// Reset pulse; `true` when at least one device answered.
    fn reset(&self) -> bool;

    fn select(&self, rom: &[u8; 8]);

    fn write_byte(&self, byte: u8);

    fn read_byte(&self) -> u8;

    fn reset_search(&self);

    /// Next device in search order, or `false` when exhausted.
    fn search(&self, rom: &mut [u8; 8]) -> bool;
}

/// Combined temperature / humidity module.
pub trait TempHumidityDevice {
    fn begin(&self) -> bool;

    /// Degrees Celsius.
    fn read_temperature(&self) -> Option<f32>;

    /// Relative humidity, percent.
    fn read_humidity(&self) -> Option<f32>;
}

/// Time source for timestamps.
pub trait Clock {
    fn unix_now(&self) -> i64;

    fn uptime_ms(&self) -> u64;
}
