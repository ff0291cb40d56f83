//! Single-wire temperature probe (DS18 family).
//!
//! The probe is addressed by its 8-byte ROM. An unresolved probe finds
//! its address lazily on the first measurement:
//!
//! - a stored address is looked up on the bus and its position recorded
//! - otherwise the device at the stored position index is taken, provided
//!   its ROM checksum verifies
//!
//! A failed resolution clears the address and is reported once; the
//! probe then stops measuring until it is reconfigured.

use core::cell::Cell;
use std::rc::Rc;

use async_io_mini::Timer;
use futures_lite::future::yield_now;
use log::{debug, info, warn};

use super::{SensorCore, SensorId};
use crate::app::ports::{Controller, OneWireBus};
use crate::config::ONEWIRE_SEARCH_LIMIT;
use crate::drivers::onewire::{self as wire, Rom};
use crate::error::{BusError, ConfigError};
use crate::measurement::{Measurement, MeasurementKind, SingleMeasurement};
use crate::pins::{DigitalPin, PinLease, acquire_pin_lock};
use crate::units::Units;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireAddress {
    Unresolved,
    Resolved,
    Failed,
}

pub struct OneWireTemperatureSensor {
    core: SensorCore,
    pin: DigitalPin,
    bus: Option<Rc<dyn OneWireBus>>,
    resolution_bits: u8,
    address: Cell<Rom>,
    position: Cell<Option<u8>>,
    state: Cell<WireAddress>,
}

impl OneWireTemperatureSensor {
    pub fn new(ctl: Rc<dyn Controller>, id: SensorId, pin: DigitalPin, resolution_bits: u8) -> Self {
        let bus = ctl.one_wire_bus(pin.number());
        let core = SensorCore::new(id, ctl, MeasurementKind::Single);
        if !pin.is_valid() || pin.pin.is_expanded() {
            core.invalidate(ConfigError::InvalidPin);
        } else if bus.is_none() {
            core.report_bus_failure(BusError::DeviceInitFailed);
        }
        Self {
            core,
            pin,
            bus,
            resolution_bits: wire::clamp_resolution(resolution_bits),
            address: Cell::new(Rom::default()),
            position: Cell::new(None),
            state: Cell::new(WireAddress::Unresolved),
        }
    }

    pub fn core(&self) -> &SensorCore {
        &self.core
    }

    pub fn resolution_bits(&self) -> u8 {
        self.resolution_bits
    }

    pub fn address_state(&self) -> WireAddress {
        self.state.get()
    }

    /// Device address; all zero until resolved.
    pub fn wire_device_address(&self) -> Rom {
        self.address.get()
    }

    pub fn wire_position_index(&self) -> Option<u8> {
        self.position.get()
    }

    /// Targets the device at `index` in bus search order. Takes effect on
    /// the next measurement. `false` when the index is out of range or
    /// the pin is busy.
    pub fn set_wire_position_index(&self, index: u8) -> bool {
        if index >= ONEWIRE_SEARCH_LIMIT {
            return false;
        }
        let Some(_lease) = PinLease::try_new(self.core.controller(), self.pin.number()) else {
            return false;
        };
        self.position.set(Some(index));
        self.address.set(Rom::default());
        self.state.set(WireAddress::Unresolved);
        true
    }

    /// Targets a device by ROM. Takes effect on the next measurement.
    /// A ROM whose CRC does not match is refused.
    pub fn set_wire_device_address(&self, rom: Rom) -> bool {
        if !wire::rom_is_valid(&rom) {
            warn!("{}: rejecting ROM {:02x?}, bad CRC", self.core.name(), rom);
            return false;
        }
        let Some(_lease) = PinLease::try_new(self.core.controller(), self.pin.number()) else {
            return false;
        };
        self.address.set(rom);
        self.position.set(None);
        self.state.set(WireAddress::Unresolved);
        true
    }

    /// Resolves the device address. Caller holds the pin lease.
    fn resolve_address(&self, bus: &dyn OneWireBus) -> bool {
        match self.state.get() {
            WireAddress::Resolved => return true,
            WireAddress::Failed => return false,
            WireAddress::Unresolved => {}
        }
        let max_search = self.core.controller().config().onewire_max_search;
        let stored = self.address.get();
        let found = if wire::rom_is_empty(&stored) {
            match self.position.get() {
                Some(index) => wire::find_by_position(bus, index, max_search).map(|rom| (rom, index)),
                None => Err(BusError::AddressNotFound),
            }
        } else {
            wire::find_by_address(bus, &stored, max_search).map(|index| (stored, index))
        };

        match found {
            Ok((rom, index)) => {
                self.address.set(rom);
                self.position.set(Some(index));
                self.state.set(WireAddress::Resolved);
                info!(
                    "{}: device {:02x?} at position {}",
                    self.core.name(),
                    rom,
                    index
                );
                if let Err(e) = wire::write_resolution(bus, &rom, self.resolution_bits) {
                    debug!("{}: resolution not written: {}", self.core.name(), e);
                }
                true
            }
            Err(e) => {
                self.address.set(Rom::default());
                self.state.set(WireAddress::Failed);
                self.core.report_bus_failure(e);
                false
            }
        }
    }

    async fn read_celsius(&self, bus: &dyn OneWireBus) -> Result<f32, BusError> {
        let rom = self.address.get();
        wire::start_conversion(bus, &rom)?;
        Timer::after(wire::conversion_time(self.resolution_bits)).await;
        let pad = wire::read_scratchpad(bus, &rom)?;
        Ok(wire::decode_temperature(&pad, self.resolution_bits))
    }

    pub async fn take_measurement(&self, force: bool) -> bool {
        let Some(bus) = self.bus.as_deref() else {
            return false;
        };
        let Some(_measuring) = self.core.begin(force) else {
            return false;
        };
        let ctl = self.core.controller();
        let Some(_lease) =
            acquire_pin_lock(ctl, self.pin.number(), ctl.config().pin_lock_timeout_ms).await
        else {
            debug!("{}: bus pin {} busy, skipping", self.core.name(), self.pin.number());
            return false;
        };
        // bus work runs on a later turn of the executor
        yield_now().await;

        if !self.resolve_address(bus) {
            return false;
        }
        let celsius = match self.read_celsius(bus).await {
            Ok(c) => c,
            Err(e) => {
                self.core.report_bus_failure(e);
                return false;
            }
        };
        self.core.clear_bus_failure();

        let (timestamp, frame) = self.core.stamp();
        let mut m = Measurement::Single(SingleMeasurement::new(
            celsius,
            Units::Celsius,
            timestamp,
            frame,
        ));
        self.core.calibrate_row(&mut m, 0);
        self.core.convert_row(&mut m, 0);
        self.core.publish(m);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim::{SimOneWireBus, sim_controller};
    use crate::drivers::onewire::crc8;
    use crate::pins::PinMode;
    use crate::sensors::SensorType;
    use futures_lite::future::block_on;

    fn rom(serial: u8) -> Rom {
        let mut rom = [0x28, serial, 0x11, 0x22, 0x33, 0x44, 0x55, 0];
        rom[7] = crc8(&rom[..7]);
        rom
    }

    fn probe(
        ctl: &Rc<crate::app::controller::IoController>,
        bus: &Rc<SimOneWireBus>,
    ) -> OneWireTemperatureSensor {
        ctl.add_one_wire_bus(4, bus.clone()).unwrap();
        OneWireTemperatureSensor::new(
            ctl.clone(),
            SensorId::new("Roof", SensorType::TempHumidity),
            DigitalPin::new(4, PinMode::DigitalInputFloating, false, None),
            9,
        )
    }

    #[test]
    fn resolves_by_position_and_reads() {
        let (ctl, _gpio) = sim_controller();
        let bus = Rc::new(SimOneWireBus::new());
        bus.add_probe(rom(1), 10.0);
        bus.add_probe(rom(2), 11.0);
        bus.add_probe(rom(3), 21.5);
        let sensor = probe(&ctl, &bus);
        assert!(sensor.set_wire_position_index(2));
        assert!(block_on(sensor.take_measurement(true)));
        assert_eq!(sensor.address_state(), WireAddress::Resolved);
        assert_eq!(sensor.wire_device_address(), rom(3));
        let m = sensor.core().latest_measurement();
        assert_eq!(m.value_at(0), 21.5);
        assert_eq!(m.units_at(0), Units::Celsius);
    }

    #[test]
    fn corrupt_rom_at_position_fails_once() {
        let (ctl, _gpio) = sim_controller();
        let bus = Rc::new(SimOneWireBus::new());
        bus.add_probe(rom(1), 10.0);
        let mut bad = rom(2);
        bad[7] ^= 0xFF;
        bus.add_probe(bad, 11.0);
        let sensor = probe(&ctl, &bus);
        assert!(sensor.set_wire_position_index(1));
        assert!(!block_on(sensor.take_measurement(true)));
        assert!(!block_on(sensor.take_measurement(true)));
        assert_eq!(sensor.address_state(), WireAddress::Failed);
        assert!(wire::rom_is_empty(&sensor.wire_device_address()));
        assert_eq!(ctl.diagnostics().soft_count(), 1);
        assert!(!sensor.core().latest_measurement().is_valid());
    }

    #[test]
    fn explicit_address_finds_its_position() {
        let (ctl, _gpio) = sim_controller();
        let bus = Rc::new(SimOneWireBus::new());
        bus.add_probe(rom(7), 3.0);
        bus.add_probe(rom(8), -4.5);
        let sensor = probe(&ctl, &bus);
        assert!(sensor.set_wire_device_address(rom(8)));
        assert!(block_on(sensor.take_measurement(true)));
        assert_eq!(sensor.wire_position_index(), Some(1));
        assert_eq!(sensor.core().latest_measurement().value_at(0), -4.5);
        assert_eq!(bus.config_register(&rom(8)), Some(wire::config_register(9)));
    }

    #[test]
    fn corrupt_rom_is_refused() {
        let (ctl, _gpio) = sim_controller();
        let bus = Rc::new(SimOneWireBus::new());
        bus.add_probe(rom(5), 12.0);
        let sensor = probe(&ctl, &bus);
        assert!(sensor.set_wire_position_index(0));

        let mut bad = rom(5);
        bad[7] ^= 0x5a;
        assert!(!sensor.set_wire_device_address(bad));
        assert_eq!(sensor.wire_device_address(), [0; 8]);
        assert_eq!(sensor.wire_position_index(), Some(0));
        assert!(block_on(sensor.take_measurement(true)));
        assert_eq!(sensor.wire_device_address(), rom(5));
    }

    #[test]
    fn reconfigure_needs_free_pin() {
        let (ctl, _gpio) = sim_controller();
        let bus = Rc::new(SimOneWireBus::new());
        let sensor = probe(&ctl, &bus);
        assert!(!sensor.set_wire_position_index(ONEWIRE_SEARCH_LIMIT));
        assert!(ctl.try_acquire_pin_lock(4));
        assert!(!sensor.set_wire_position_index(0));
        ctl.release_pin_lock(4);
        assert!(sensor.set_wire_position_index(0));
    }

    #[test]
    fn missing_bus_is_a_soft_failure() {
        let (ctl, _gpio) = sim_controller();
        let sensor = OneWireTemperatureSensor::new(
            ctl.clone(),
            SensorId::new("Loose", SensorType::TempHumidity),
            DigitalPin::new(4, PinMode::DigitalInputFloating, false, None),
            12,
        );
        assert!(sensor.core().is_valid());
        assert_eq!(ctl.diagnostics().soft_count(), 1);
        assert!(!block_on(sensor.take_measurement(true)));
    }
}
