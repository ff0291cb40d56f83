//! Helio sensor I/O library.
//!
//! Pin addressing (direct, muxed, expanded), pin lock arbitration, unit
//! conversion, calibration and the per-sensor measurement state machines
//! of the tracker controller. Hardware is reached only through the port
//! traits in [`app::ports`]; ESP-IDF specifics are guarded by
//! `#[cfg(target_os = "espidf")]` within each adapter.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod calibration;
pub mod config;
pub mod diagnostics;
pub mod drivers;
pub mod error;
pub mod events;
pub mod measurement;
pub mod persist;
pub mod pins;
pub mod poller;
pub mod sensors;
pub mod units;

pub use app::controller::IoController;
pub use app::ports::Controller;
pub use error::{BusError, ConfigError, Error, UnitsError};
pub use measurement::Measurement;
pub use poller::MeasurementPoller;
pub use sensors::{Sensor, SensorId, SensorType};
pub use units::{MeasurementMode, Units};
