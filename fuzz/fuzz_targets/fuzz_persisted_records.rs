//! Fuzz target: persisted record decoders (postcard and JSON)
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - A decoded muxer record either rebuilds a muxer or is rejected
//! - A decoded measurement record reloads as valid at frame 1
//!
//! cargo fuzz run fuzz_persisted_records

#![no_main]

use helio_io::config::IoConfig;
use helio_io::persist::{MeasurementData, PinData, PinMuxerData, from_json, from_postcard};
use helio_io::pins::{AnalogPin, DigitalPin, PinMuxer};
use helio_io::Measurement;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = from_postcard::<MeasurementData>(data) {
        let m = Measurement::from_data(&record);
        assert!(m.is_valid());
        assert_eq!(m.frame(), 1);
    }
    if let Ok(pin) = from_postcard::<PinData>(data) {
        let _ = DigitalPin::from_data(&pin);
        let _ = AnalogPin::from_data(&pin);
    }
    if let Ok(record) = from_postcard::<PinMuxerData>(data) {
        if let Ok(muxer) = PinMuxer::from_data(&record) {
            assert!(muxer.channel_count() >= 1);
        }
    }

    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let _ = IoConfig::from_json(text);
    if let Ok(record) = from_json::<PinMuxerData>(text) {
        let _ = PinMuxer::from_data(&record);
    }
});
