//! Bus protocol helpers for the external sensor devices.

pub mod dht;
pub mod onewire;
