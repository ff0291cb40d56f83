//! Fuzz target: comma and hex pin list parsers
//!
//! Invariants checked:
//! - No panics on arbitrary text
//! - Any list that parses re-joins and re-parses to the same pins
//!
//! cargo fuzz run fuzz_pin_lists

#![no_main]

use helio_io::persist::{comma_join, comma_split, hex_join, hex_split};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|text: &str| {
    if let Ok(pins) = comma_split(text) {
        let again = comma_split(&comma_join(&pins)).unwrap();
        assert_eq!(again, pins);
    }
    if let Ok(pins) = hex_split(text) {
        let again = hex_split(&hex_join(&pins)).unwrap();
        assert_eq!(again, pins);
    }
});
