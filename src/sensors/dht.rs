//! Combined temperature / humidity module (DHT family).
//!
//! Rows: 0 temperature, 1 relative humidity, 2 heat index (optional).
//! Only the temperature row is calibrated. The heat index is derived from
//! the uncalibrated temperature, computed in °F and then converted like
//! any other temperature row.

use core::cell::Cell;
use std::rc::Rc;

use futures_lite::future::yield_now;
use log::debug;

use super::{SensorCore, SensorId};
use crate::app::ports::{Controller, TempHumidityDevice};
use crate::drivers::dht::{DhtKind, heat_index_fahrenheit};
use crate::error::{BusError, ConfigError};
use crate::measurement::{DoubleMeasurement, Measurement, MeasurementKind, TripleMeasurement};
use crate::pins::{DigitalPin, acquire_pin_lock};
use crate::units::{Units, convert};

pub struct DhtTempHumiditySensor {
    core: SensorCore,
    pin: DigitalPin,
    kind: DhtKind,
    device: Option<Rc<dyn TempHumidityDevice>>,
    heat_index: bool,
    last_read_ms: Cell<Option<u64>>,
}

impl DhtTempHumiditySensor {
    /// `device` is `None` when the driver module could not be created.
    pub fn new(
        ctl: Rc<dyn Controller>,
        id: SensorId,
        pin: DigitalPin,
        kind: DhtKind,
        device: Option<Rc<dyn TempHumidityDevice>>,
        heat_index: bool,
    ) -> Self {
        let rows = if heat_index {
            MeasurementKind::Triple
        } else {
            MeasurementKind::Double
        };
        let core = SensorCore::new(id, ctl, rows);
        let device = if !pin.is_valid() || pin.pin.is_muxed() || pin.pin.is_expanded() {
            core.invalidate(ConfigError::InvalidPin);
            None
        } else {
            match device {
                Some(d) if d.begin() => Some(d),
                _ => {
                    core.report_bus_failure(BusError::DeviceInitFailed);
                    None
                }
            }
        };
        Self {
            core,
            pin,
            kind,
            device,
            heat_index,
            last_read_ms: Cell::new(None),
        }
    }

    pub fn core(&self) -> &SensorCore {
        &self.core
    }

    pub fn kind(&self) -> DhtKind {
        self.kind
    }

    pub fn computes_heat_index(&self) -> bool {
        self.heat_index
    }

    fn too_soon(&self) -> bool {
        let now = self.core.controller().uptime_ms();
        self.last_read_ms
            .get()
            .is_some_and(|last| now.saturating_sub(last) < u64::from(self.kind.min_interval_ms()))
    }

    pub async fn take_measurement(&self, force: bool) -> bool {
        let Some(device) = self.device.as_deref() else {
            return false;
        };
        let Some(_measuring) = self.core.begin(force) else {
            return false;
        };
        if self.too_soon() {
            debug!("{}: read interval not elapsed", self.core.name());
            return false;
        }
        let ctl = self.core.controller();
        let Some(_lease) =
            acquire_pin_lock(ctl, self.pin.number(), ctl.config().pin_lock_timeout_ms).await
        else {
            debug!("{}: pin {} busy, skipping", self.core.name(), self.pin.number());
            return false;
        };
        yield_now().await;

        self.last_read_ms.set(Some(ctl.uptime_ms()));
        let (Some(celsius), Some(humidity)) = (device.read_temperature(), device.read_humidity())
        else {
            self.core.report_bus_failure(BusError::ReadFailed);
            return false;
        };
        if celsius.is_nan() || humidity.is_nan() {
            self.core.report_bus_failure(BusError::ReadFailed);
            return false;
        }
        self.core.clear_bus_failure();

        let (timestamp, frame) = self.core.stamp();
        let mut m = if self.heat_index {
            let hi = convert(celsius, Units::Celsius, Units::Fahrenheit)
                .map(|f| heat_index_fahrenheit(f, humidity))
                .unwrap_or(celsius);
            Measurement::Triple(TripleMeasurement {
                value: [celsius, humidity, hi],
                units: [Units::Celsius, Units::Percentile, Units::Fahrenheit],
                timestamp,
                frame,
            })
        } else {
            Measurement::Double(DoubleMeasurement {
                value: [celsius, humidity],
                units: [Units::Celsius, Units::Percentile],
                timestamp,
                frame,
            })
        };
        self.core.calibrate_row(&mut m, 0);
        for row in 0..m.row_count() {
            self.core.convert_row(&mut m, row);
        }
        self.core.publish(m);
        true
    }
}
