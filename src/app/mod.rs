//! Application core: the controller every sensor reports to and the port
//! traits that separate it from hardware.
//!
//! Nothing here touches peripherals directly; the adapters in
//! [`crate::adapters`] implement the ports for the ESP32 and for host
//! simulation.

pub mod controller;
pub mod ports;
