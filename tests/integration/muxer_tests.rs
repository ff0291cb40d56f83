//! Channel-select multiplexer behaviour as seen on the GPIO lines.

use futures_lite::future::block_on;
use helio_io::config::IoConfig;
use helio_io::pins::{AnalogPin, DigitalPin, NO_PIN, Pin, PinMode, PinMuxer, PwmConfig};
use helio_io::sensors::{AnalogSensor, SensorId, SensorType};
use helio_io::{ConfigError, Controller, Units};

use crate::mock_hw::{GpioCall, mock_controller};

const SELECT: [u8; 3] = [25, 26, 27];

fn muxer(signal: u8, chip_enable: u8) -> PinMuxer {
    PinMuxer::new(
        Pin::new(signal, PinMode::AnalogInput, None),
        DigitalPin::new(chip_enable, PinMode::DigitalOutputPushPull, true, None),
        &SELECT,
    )
    .unwrap()
}

#[test]
fn select_channel_is_idempotent() {
    let (ctl, gpio) = mock_controller(IoConfig::default());
    let mux = ctl.add_pin_muxer(muxer(36, 13)).unwrap();
    gpio.clear();

    mux.select_channel(&*ctl, 5);
    assert_eq!(
        gpio.writes_to(&SELECT),
        vec![(25, true), (26, false), (27, true)]
    );
    assert_eq!(mux.selected_channel(), Some(5));

    let before = gpio.calls.borrow().len();
    mux.select_channel(&*ctl, 5);
    assert_eq!(gpio.calls.borrow().len(), before);
}

#[test]
fn out_of_range_channel_is_ignored() {
    let (ctl, gpio) = mock_controller(IoConfig::default());
    let mux = ctl.add_pin_muxer(muxer(36, 13)).unwrap();
    gpio.clear();
    mux.select_channel(&*ctl, 8);
    assert!(gpio.calls.borrow().is_empty());
    assert_eq!(mux.selected_channel(), Some(0));
}

#[test]
fn muxed_read_selects_then_enables_then_samples() {
    let (ctl, gpio) = mock_controller(IoConfig::default());
    ctl.add_pin_muxer(muxer(36, 13)).unwrap();
    gpio.set_analog(36, 1023);
    let sensor = AnalogSensor::new(
        ctl.clone(),
        SensorId::new("LightW", SensorType::LightIntensity),
        AnalogPin::new(36, PinMode::AnalogInput, 10, Some(3), PwmConfig::default()),
        false,
    );
    assert!(sensor.core().is_valid());
    gpio.clear();

    assert!(block_on(sensor.take_measurement(true)));
    let m = sensor.core().latest_measurement();
    assert_eq!(m.units_at(0), Units::Percentile);
    assert!((m.value_at(0) - 100.0).abs() < 1e-3);

    let calls = gpio.calls.borrow();
    let pos = |want: GpioCall| calls.iter().position(|c| *c == want);
    let select_last = pos(GpioCall::Write { pin: 27, high: false }).unwrap();
    let enabled = pos(GpioCall::Write { pin: 13, high: false }).unwrap();
    let sampled = pos(GpioCall::AnalogRead { pin: 36 }).unwrap();
    assert!(select_last < enabled && enabled < sampled, "{calls:?}");
    assert_eq!(gpio.writes_to(&SELECT), vec![(25, true), (26, true), (27, false)]);
}

#[test]
fn unregistered_muxer_invalidates_sensor() {
    let (ctl, _gpio) = mock_controller(IoConfig::default());
    let sensor = AnalogSensor::new(
        ctl.clone(),
        SensorId::new("Orphan", SensorType::PowerLevel),
        AnalogPin::new(39, PinMode::AnalogInput, 10, Some(1), PwmConfig::default()),
        false,
    );
    assert_eq!(sensor.core().config_error(), Some(ConfigError::MissingBusOwner));
    assert!(!block_on(sensor.take_measurement(true)));
}

#[test]
fn select_buses_isolate_chip_enables() {
    let (ctl, gpio) = mock_controller(IoConfig::default());
    let a = ctl.add_pin_muxer(muxer(36, 13)).unwrap();
    ctl.add_pin_muxer(muxer(39, 12).with_select_bus(1)).unwrap();
    gpio.clear();

    a.select_channel(&*ctl, 2);
    let chip_enables = gpio.writes_to(&[12, 13]);
    assert!(chip_enables.contains(&(13, true)));
    assert!(!chip_enables.iter().any(|&(pin, _)| pin == 12));
}

#[test]
fn shared_bus_deactivates_every_muxer() {
    let (ctl, gpio) = mock_controller(IoConfig::default());
    let a = ctl.add_pin_muxer(muxer(36, 13)).unwrap();
    ctl.add_pin_muxer(muxer(39, 12)).unwrap();
    gpio.clear();

    a.select_channel(&*ctl, 2);
    let chip_enables = gpio.writes_to(&[12, 13]);
    assert!(chip_enables.contains(&(13, true)));
    assert!(chip_enables.contains(&(12, true)));
}

#[test]
fn shared_select_lines_are_rewritten_after_another_muxer() {
    let (ctl, gpio) = mock_controller(IoConfig::default());
    let a = ctl.add_pin_muxer(muxer(36, 13)).unwrap();
    let b = ctl.add_pin_muxer(muxer(39, 12)).unwrap();

    a.select_channel(&*ctl, 3);
    b.select_channel(&*ctl, 5);
    assert_eq!(a.selected_channel(), None);
    assert_eq!(b.selected_channel(), Some(5));
    gpio.clear();

    a.select_channel(&*ctl, 3);
    assert_eq!(
        gpio.writes_to(&SELECT),
        vec![(25, true), (26, true), (27, false)]
    );
    assert_eq!(a.selected_channel(), Some(3));
    assert_eq!(b.selected_channel(), None);
}

#[test]
fn other_bus_keeps_its_selection() {
    let (ctl, _gpio) = mock_controller(IoConfig::default());
    let a = ctl.add_pin_muxer(muxer(36, 13)).unwrap();
    let b = ctl.add_pin_muxer(
        PinMuxer::new(
            Pin::new(39, PinMode::AnalogInput, None),
            DigitalPin::new(12, PinMode::DigitalOutputPushPull, true, None),
            &[32, 33],
        )
        .unwrap()
        .with_select_bus(1),
    )
    .unwrap();

    b.select_channel(&*ctl, 2);
    a.select_channel(&*ctl, 4);
    assert_eq!(b.selected_channel(), Some(2));
    assert_eq!(a.selected_channel(), Some(4));
}

#[test]
fn muxer_needs_contiguous_select_pins() {
    let err = PinMuxer::new(
        Pin::new(36, PinMode::AnalogInput, None),
        DigitalPin::new(NO_PIN, PinMode::DigitalOutputPushPull, true, None),
        &[25, NO_PIN, 27],
    )
    .err();
    assert_eq!(err, Some(ConfigError::SelectPinGap));
    let (ctl, _gpio) = mock_controller(IoConfig::default());
    assert!(ctl.pin_muxer(36).is_none());
}
