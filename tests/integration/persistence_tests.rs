//! Persisted records: JSON shape, postcard storage and reload semantics.

use std::rc::Rc;

use helio_io::adapters::sim::SimExpander;
use helio_io::config::IoConfig;
use helio_io::measurement::{BinaryMeasurement, MeasurementKind, SingleMeasurement};
use helio_io::persist::{
    MeasurementData, PinData, PinExpanderData, PinMuxerData, from_json, from_postcard, hex_join,
    hex_split, to_json, to_postcard,
};
use helio_io::pins::{AnalogPin, DigitalPin, PinExpander, PinMode, PinMuxer, PwmConfig};
use helio_io::{Measurement, MeasurementMode, Units};

#[test]
fn digital_pin_json_uses_symbolic_mode() {
    let pin = DigitalPin::new(14, PinMode::DigitalInputPullUp, true, None);
    let json = to_json(&pin.to_data()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["pin"], 14);
    assert_eq!(value["mode"], "digitalInputPullUp");
    assert_eq!(value["activeLow"], true);
    assert!(value["bitRes"].is_null());

    let back: PinData = from_json(&json).unwrap();
    assert_eq!(DigitalPin::from_data(&back), pin);
}

#[test]
fn analog_pin_survives_postcard() {
    let pin = AnalogPin::new(
        25,
        PinMode::AnalogOutput,
        0,
        None,
        PwmConfig {
            channel: 2,
            frequency_hz: 5000.0,
        },
    );
    let data = pin.to_data();
    assert_eq!(data.bit_res, Some(8));
    let bytes = to_postcard(&data).unwrap();
    let back: PinData = from_postcard(&bytes).unwrap();
    assert_eq!(AnalogPin::from_data(&back), pin);
}

#[test]
fn hand_written_muxer_record_loads() {
    let json = r#"{
        "signalPin": { "pin": 36, "mode": "analogInput" },
        "chipEnablePin": { "pin": 13, "mode": "digitalOutputPushPull", "activeLow": true },
        "channelPins": "25, 26,27"
    }"#;
    let data: PinMuxerData = from_json(json).unwrap();
    let muxer = PinMuxer::from_data(&data).unwrap();
    assert_eq!(muxer.select_pins(), &[25, 26, 27]);
    assert_eq!(muxer.channel_count(), 8);
    assert_eq!(muxer.select_bus(), 0);
    assert!(muxer.chip_enable_pin().active_low);
    assert_eq!(muxer.to_data().channel_pins.as_str(), "25,26,27");
}

#[test]
fn muxer_record_roundtrips_through_postcard() {
    let muxer = PinMuxer::new(
        helio_io::pins::Pin::new(39, PinMode::AnalogInput, None),
        DigitalPin::new(12, PinMode::DigitalOutputPushPull, true, None),
        &[18, 19],
    )
    .unwrap()
    .with_select_bus(2);
    let bytes = to_postcard(&muxer.to_data()).unwrap();
    let data: PinMuxerData = from_postcard(&bytes).unwrap();
    let back = PinMuxer::from_data(&data).unwrap();
    assert_eq!(back.to_data(), muxer.to_data());
    assert_eq!(back.select_bus(), 2);
}

#[test]
fn muxer_record_with_bad_pin_list_is_rejected() {
    let json = r#"{
        "signalPin": { "pin": 36, "mode": "analogInput" },
        "chipEnablePin": { "pin": 13, "mode": "digitalOutputPushPull" },
        "channelPins": "25,x"
    }"#;
    let data: PinMuxerData = from_json(json).unwrap();
    assert!(PinMuxer::from_data(&data).is_err());
}

#[test]
fn expander_record_normalizes_base() {
    let data: PinExpanderData = from_json(r#"{"pinBase":121,"channelBits":8}"#).unwrap();
    let exp = PinExpander::from_data(&data, Rc::new(SimExpander::new())).unwrap();
    assert_eq!(exp.to_data(), PinExpanderData {
        pin_base: 116,
        channel_bits: 8,
    });

    let bad = PinExpanderData {
        pin_base: 40,
        channel_bits: 8,
    };
    assert!(PinExpander::from_data(&bad, Rc::new(SimExpander::new())).is_err());
}

#[test]
fn measurement_export_rounds_per_mode() {
    let m = Measurement::Single(SingleMeasurement::new(
        21.346,
        Units::Celsius,
        1_704_067_200,
        9,
    ));
    let metric = m.to_data(0, MeasurementMode::Metric, 0);
    assert_eq!(metric.value, 21.3);
    assert_eq!(metric.units, Units::Celsius);
    assert_eq!(metric.state, None);

    let precise = m.to_data(0, MeasurementMode::Scientific, 1);
    assert!((precise.value - 21.346).abs() < 1e-4);

    let json = to_json(&metric).unwrap();
    assert!(json.contains(r#""units":"°C""#), "{json}");
    assert!(json.contains(r#""measureRow":0"#), "{json}");
}

#[test]
fn reloaded_measurement_is_valid_but_stale() {
    let data = MeasurementData {
        measure_row: 0,
        value: 12.5,
        units: Units::MetersPerSecond,
        timestamp: 1_704_067_260,
        state: None,
    };
    let bytes = to_postcard(&data).unwrap();
    let m = Measurement::from_data(&from_postcard(&bytes).unwrap());
    assert_eq!(m.kind(), MeasurementKind::Single);
    assert!(m.is_valid());
    assert_eq!(m.frame(), 1);
    assert_eq!(m.value_at(0), 12.5);
    assert_eq!(m.units_at(0), Units::MetersPerSecond);
}

#[test]
fn binary_record_keeps_state() {
    let m = Measurement::Binary(BinaryMeasurement {
        state: true,
        timestamp: 1_704_067_300,
        frame: 4,
    });
    let data = m.to_data(0, MeasurementMode::Metric, 0);
    assert_eq!(data.state, Some(true));
    let back = Measurement::from_data(&from_json(&to_json(&data).unwrap()).unwrap());
    assert_eq!(back.kind(), MeasurementKind::Binary);
    assert_eq!(back.timestamp(), 1_704_067_300);
}

#[test]
fn unknown_unit_symbol_loads_as_undefined() {
    let data: MeasurementData = from_json(
        r#"{"measureRow":0,"value":1.0,"units":"furlongs","timestamp":0,"state":null}"#,
    )
    .unwrap();
    assert_eq!(data.units, Units::Undefined);
}

#[test]
fn partial_config_fills_defaults() {
    let config =
        IoConfig::from_json(r#"{"measurement_mode":"imperial","pin_lock_timeout_ms":250}"#)
            .unwrap();
    assert_eq!(config.measurement_mode, MeasurementMode::Imperial);
    assert_eq!(config.pin_lock_timeout_ms, 250);
    assert_eq!(config.analog_samples, IoConfig::default().analog_samples);
}

#[test]
fn invalid_config_is_rejected() {
    assert!(IoConfig::from_json(r#"{"analog_samples":0}"#).is_err());
    assert!(IoConfig::from_json(r#"{"onewire_max_search":64}"#).is_err());
    assert!(IoConfig::from_json("not json").is_err());
}

#[test]
fn hex_pin_lists() {
    let joined = hex_join(&[4, 5, 255]);
    assert_eq!(joined.as_str(), "0405FF");
    assert_eq!(hex_split("0405ff").unwrap().as_slice(), &[4, 5, 255]);
    assert!(hex_split("040").is_err());
    assert!(hex_split("04zz").is_err());
}
