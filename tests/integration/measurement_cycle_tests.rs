//! End-to-end measurement cycles through the public API.

use std::cell::Cell;
use std::rc::Rc;

use embedded_hal::digital::PinState;
use futures_lite::future::block_on;
use helio_io::adapters::sim::{SimDht, SimExpander, SimOneWireBus, sim_controller_with_config};
use helio_io::app::ports::{GpioDriver, OneWireBus, TempHumidityDevice};
use helio_io::calibration::{
    CalibrationCurve, CalibrationKey, CalibrationPoint, CalibrationRecord, CalibrationStore,
};
use helio_io::config::IoConfig;
use helio_io::diagnostics::Diagnostics;
use helio_io::drivers::dht::DhtKind;
use helio_io::drivers::onewire::{Rom, crc8};
use helio_io::events::PinEventQueue;
use helio_io::measurement::Frame;
use helio_io::pins::{
    AnalogPin, DigitalPin, PinExpander, PinMode, PinMuxer, PinNumber, PwmConfig,
};
use helio_io::sensors::{
    AnalogSensor, BinarySensor, DhtTempHumiditySensor, OneWireTemperatureSensor, SensorId,
    SensorType,
};
use helio_io::units::MeasurementMode;
use helio_io::{Controller, IoController, MeasurementPoller, Units};

fn rom(serial: u8) -> Rom {
    let mut rom = [0x28, serial, 0xA0, 0x0B, 0x16, 0x02, 0x00, 0];
    rom[7] = crc8(&rom[..7]);
    rom
}

// ── Controller that counts lock attempts ─────────────────────

struct CountingController {
    inner: Rc<IoController>,
    lock_attempts: Cell<usize>,
}

impl Controller for CountingController {
    fn polling_frame(&self) -> Frame {
        self.inner.polling_frame()
    }

    fn try_acquire_pin_lock(&self, pin: PinNumber) -> bool {
        self.lock_attempts.set(self.lock_attempts.get() + 1);
        self.inner.try_acquire_pin_lock(pin)
    }

    fn release_pin_lock(&self, pin: PinNumber) {
        self.inner.release_pin_lock(pin);
    }

    fn calibration_data(&self, key: CalibrationKey) -> Option<Rc<CalibrationRecord>> {
        self.inner.calibration_data(key)
    }

    fn measurement_mode(&self) -> MeasurementMode {
        self.inner.measurement_mode()
    }

    fn pin_expander(&self, pin_base: PinNumber) -> Option<Rc<PinExpander>> {
        self.inner.pin_expander(pin_base)
    }

    fn pin_muxer(&self, pin: PinNumber) -> Option<Rc<PinMuxer>> {
        self.inner.pin_muxer(pin)
    }

    fn deactivate_all_pin_muxers(&self) {
        self.inner.deactivate_all_pin_muxers();
    }

    fn one_wire_bus(&self, pin: PinNumber) -> Option<Rc<dyn OneWireBus>> {
        self.inner.one_wire_bus(pin)
    }

    fn gpio(&self) -> &dyn GpioDriver {
        self.inner.gpio()
    }

    fn unix_now(&self) -> i64 {
        self.inner.unix_now()
    }

    fn uptime_ms(&self) -> u64 {
        self.inner.uptime_ms()
    }

    fn config(&self) -> &IoConfig {
        self.inner.config()
    }

    fn diagnostics(&self) -> &Diagnostics {
        self.inner.diagnostics()
    }
}

#[test]
fn fresh_record_is_not_remeasured_and_takes_no_lock() {
    let (inner, gpio, _clock) = sim_controller_with_config(IoConfig::default());
    gpio.set_analog(34, 700);
    let ctl = Rc::new(CountingController {
        inner,
        lock_attempts: Cell::new(0),
    });
    let sensor = AnalogSensor::new(
        ctl.clone(),
        SensorId::new("Tilt", SensorType::TiltAngle),
        AnalogPin::new(34, PinMode::AnalogInput, 10, None, PwmConfig::default()),
        false,
    );

    assert!(block_on(sensor.take_measurement(false)));
    let attempts = ctl.lock_attempts.get();
    assert_eq!(attempts, 1);
    assert_eq!(
        sensor.core().latest_measurement().frame(),
        ctl.polling_frame()
    );

    assert!(!block_on(sensor.take_measurement(false)));
    assert_eq!(ctl.lock_attempts.get(), attempts);

    ctl.inner.advance_polling_frame();
    assert!(block_on(sensor.take_measurement(false)));
    assert_eq!(ctl.lock_attempts.get(), attempts + 1);
}

#[test]
fn lock_timeout_leaves_record_untouched() {
    let config = IoConfig {
        pin_lock_timeout_ms: 20,
        lock_poll_interval_ms: 2,
        ..IoConfig::default()
    };
    let (ctl, gpio, _clock) = sim_controller_with_config(config);
    gpio.set_analog(34, 100);
    let sensor = AnalogSensor::new(
        ctl.clone(),
        SensorId::new("Power", SensorType::PowerLevel),
        AnalogPin::new(34, PinMode::AnalogInput, 10, None, PwmConfig::default()),
        false,
    );
    assert!(block_on(sensor.take_measurement(true)));
    let before = sensor.core().latest_measurement();

    gpio.set_analog(34, 900);
    assert!(ctl.try_acquire_pin_lock(34));
    assert!(!block_on(sensor.take_measurement(true)));
    assert_eq!(sensor.core().latest_measurement(), before);
    assert!(!sensor.core().is_measuring());
    assert_eq!(ctl.diagnostics().soft_count(), 0);

    ctl.release_pin_lock(34);
    assert!(block_on(sensor.take_measurement(true)));
    assert_ne!(sensor.core().latest_measurement(), before);
    assert!(!ctl.pin_locks().is_held(34));
}

#[test]
fn binary_state_channel_reports_transitions_only() {
    let (ctl, gpio, _clock) = sim_controller_with_config(IoConfig::default());
    let sensor = BinarySensor::new(
        ctl.clone(),
        SensorId::new("EndstopW", SensorType::Endstop),
        DigitalPin::new(14, PinMode::DigitalInputFloating, false, None),
    );
    let mut changes = sensor.subscribe_state_changes().unwrap();
    let mut records = sensor.core().subscribe().unwrap();

    for level in [PinState::Low, PinState::High, PinState::High, PinState::Low] {
        gpio.set_level(14, level);
        assert!(sensor.take_measurement(true));
    }

    let mut seen = Vec::new();
    while let Some(state) = changes.try_next_message_pure() {
        seen.push(state);
    }
    assert_eq!(seen, vec![true, false]);

    let mut published = 0;
    while records.try_next_message_pure().is_some() {
        published += 1;
    }
    assert_eq!(published, 4);
}

#[test]
fn one_wire_probes_share_a_bus_pin() {
    let config = IoConfig {
        pin_lock_timeout_ms: 1_000,
        lock_poll_interval_ms: 5,
        ..IoConfig::default()
    };
    let (ctl, _gpio, _clock) = sim_controller_with_config(config);
    let bus = Rc::new(SimOneWireBus::new());
    bus.add_probe(rom(1), 18.5);
    bus.add_probe(rom(2), 19.0);
    bus.add_probe(rom(3), 23.5);
    ctl.add_one_wire_bus(4, bus.clone()).unwrap();

    let probe = |name: &str, index: u8| {
        let s = OneWireTemperatureSensor::new(
            ctl.clone(),
            SensorId::new(name, SensorType::TempHumidity),
            DigitalPin::new(4, PinMode::DigitalInputFloating, false, None),
            9,
        );
        assert!(s.set_wire_position_index(index));
        s
    };

    let queue = PinEventQueue::new();
    let mut poller = MeasurementPoller::with_event_queue(ctl.clone(), &queue);
    let first = poller.add(probe("Panel", 0)).unwrap();
    let third = poller.add(probe("Mast", 2)).unwrap();

    assert_eq!(poller.run_cycle(), 2);
    assert_eq!(first.latest_measurement().value_at(0), 18.5);
    assert_eq!(third.latest_measurement().value_at(0), 23.5);
    assert!(!ctl.pin_locks().is_held(4));
}

#[test]
fn position_beyond_search_limit_fails_resolution() {
    let config = IoConfig {
        onewire_max_search: 2,
        ..IoConfig::default()
    };
    let (ctl, _gpio, _clock) = sim_controller_with_config(config);
    let bus = Rc::new(SimOneWireBus::new());
    for serial in 1..=3 {
        bus.add_probe(rom(serial), 20.0);
    }
    ctl.add_one_wire_bus(4, bus).unwrap();
    let sensor = OneWireTemperatureSensor::new(
        ctl.clone(),
        SensorId::new("Far", SensorType::TempHumidity),
        DigitalPin::new(4, PinMode::DigitalInputFloating, false, None),
        9,
    );
    assert!(sensor.set_wire_position_index(2));
    assert!(!block_on(sensor.take_measurement(true)));
    assert_eq!(sensor.wire_device_address(), [0; 8]);
    assert_eq!(ctl.diagnostics().soft_count(), 1);
}

#[test]
fn cross_category_row_override_is_a_hard_error() {
    let (ctl, _gpio, _clock) = sim_controller_with_config(IoConfig::default());
    let dht = Rc::new(SimDht::new(25.0, 55.0));
    let sensor = DhtTempHumiditySensor::new(
        ctl.clone(),
        SensorId::new("Cabinet", SensorType::TempHumidity),
        DigitalPin::new(15, PinMode::DigitalInputFloating, false, None),
        DhtKind::Dht11,
        Some(dht as Rc<dyn TempHumidityDevice>),
        false,
    );
    sensor.core().set_measurement_units(Units::Celsius, 1);
    assert!(block_on(sensor.take_measurement(true)));

    let m = sensor.core().latest_measurement();
    assert_eq!(m.units_at(1), Units::Percentile);
    assert_eq!(m.value_at(1), 55.0);
    assert_eq!(m.units_at(0), Units::Celsius);
    assert_eq!(ctl.diagnostics().hard_count(), 1);
}

#[test]
fn mode_switch_changes_default_units() {
    let (ctl, _gpio, _clock) = sim_controller_with_config(IoConfig::default());
    let bus = Rc::new(SimOneWireBus::new());
    bus.add_probe(rom(9), 100.0);
    ctl.add_one_wire_bus(4, bus).unwrap();
    let sensor = OneWireTemperatureSensor::new(
        ctl.clone(),
        SensorId::new("Boiler", SensorType::TempHumidity),
        DigitalPin::new(4, PinMode::DigitalInputFloating, false, None),
        9,
    );
    assert!(sensor.set_wire_device_address(rom(9)));

    ctl.set_measurement_mode(MeasurementMode::Scientific);
    assert!(block_on(sensor.take_measurement(true)));
    let m = sensor.core().latest_measurement();
    assert_eq!(m.units_at(0), Units::Kelvin);
    assert!((m.value_at(0) - 373.15).abs() < 1e-3);

    ctl.set_measurement_mode(MeasurementMode::Imperial);
    ctl.advance_polling_frame();
    assert!(block_on(sensor.take_measurement(false)));
    let m = sensor.core().latest_measurement();
    assert_eq!(m.units_at(0), Units::Fahrenheit);
    assert!((m.value_at(0) - 212.0).abs() < 1e-3);
}

#[test]
fn replaced_calibration_needs_reattach() {
    let (ctl, gpio, _clock) = sim_controller_with_config(IoConfig::default());
    gpio.set_analog(34, 1023);
    let store: &CalibrationStore = ctl.calibrations();
    store
        .set(CalibrationRecord::new(
            "Anemo",
            CalibrationCurve::linear(30.0, 0.0),
            Units::MetersPerSecond,
        ))
        .unwrap();
    let sensor = AnalogSensor::new(
        ctl.clone(),
        SensorId::new("Anemo", SensorType::WindSpeed),
        AnalogPin::new(34, PinMode::AnalogInput, 10, None, PwmConfig::default()),
        false,
    );
    sensor.core().set_measurement_units(Units::MetersPerSecond, 0);
    assert!(block_on(sensor.take_measurement(true)));
    assert!((sensor.core().latest_measurement().value_at(0) - 30.0).abs() < 1e-3);

    let points = [
        CalibrationPoint { raw: 0.0, value: 0.0 },
        CalibrationPoint { raw: 0.5, value: 10.0 },
        CalibrationPoint { raw: 1.0, value: 50.0 },
    ];
    store
        .set(CalibrationRecord::new(
            "Anemo",
            CalibrationCurve::table(&points).unwrap(),
            Units::MetersPerSecond,
        ))
        .unwrap();
    assert!(sensor.core().calibration().is_none());

    assert!(sensor.core().attach_calibration());
    assert!(block_on(sensor.take_measurement(true)));
    assert!((sensor.core().latest_measurement().value_at(0) - 50.0).abs() < 1e-3);
}

#[test]
fn expanded_binary_reads_through_expander() {
    let (ctl, _gpio, _clock) = sim_controller_with_config(IoConfig::default());
    let chip = Rc::new(SimExpander::new());
    ctl.add_pin_expander(PinExpander::new(100, 16, chip.clone()).unwrap())
        .unwrap();
    let sensor = BinarySensor::new(
        ctl.clone(),
        SensorId::new("Ice", SensorType::IceDetector),
        DigitalPin::new(105, PinMode::DigitalInputPullUp, false, None),
    );
    assert_eq!(chip.direction(5), PinMode::DigitalInputPullUp);

    chip.set_input(5, 1);
    assert!(sensor.take_measurement(true));
    assert!(sensor.state());
    assert!(chip.syncs() >= 1);

    chip.set_input(5, 0);
    assert!(sensor.take_measurement(true));
    assert!(!sensor.state());
    // expanded pins never get interrupts
    assert!(!sensor.try_register_isr());
}
