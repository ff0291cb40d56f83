//! Analog sensor: light intensity, power level, stroke position, tilt,
//! wind speed.
//!
//! Averages `analog_samples` consecutive reads (optionally spaced by a
//! cooperative delay), inverts the code against full scale when the
//! sensor is wired backwards, then normalizes, calibrates and converts.

use core::time::Duration;
use std::rc::Rc;

use async_io_mini::Timer;
use log::debug;

use super::{SensorCore, SensorId};
use crate::app::ports::Controller;
use crate::error::{BusError, ConfigError};
use crate::measurement::{Measurement, MeasurementKind, SingleMeasurement};
use crate::pins::{AnalogPin, acquire_pin_lock};
use crate::units::Units;

pub struct AnalogSensor {
    core: SensorCore,
    pin: AnalogPin,
    inverted: bool,
}

impl AnalogSensor {
    pub fn new(ctl: Rc<dyn Controller>, id: SensorId, mut pin: AnalogPin, inverted: bool) -> Self {
        let core = SensorCore::new(id, ctl, MeasurementKind::Single);
        if !pin.is_valid() {
            core.invalidate(ConfigError::InvalidPin);
        } else if !pin.pin.mode.is_input() {
            core.invalidate(ConfigError::InvalidMode);
        } else if pin.pin.is_muxed() && core.controller().pin_muxer(pin.number()).is_none() {
            core.invalidate(ConfigError::MissingBusOwner);
        } else {
            pin.init(core.controller());
        }
        Self {
            core,
            pin,
            inverted,
        }
    }

    pub fn core(&self) -> &SensorCore {
        &self.core
    }

    pub fn pin(&self) -> &AnalogPin {
        &self.pin
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub async fn take_measurement(&self, force: bool) -> bool {
        let Some(_measuring) = self.core.begin(force) else {
            return false;
        };
        let ctl = self.core.controller();
        let config = ctl.config();
        let Some(_lease) = acquire_pin_lock(ctl, self.pin.number(), config.pin_lock_timeout_ms).await
        else {
            debug!("{}: pin {} busy, skipping", self.core.name(), self.pin.number());
            return false;
        };

        let samples = config.analog_samples.max(1);
        let delay = Duration::from_millis(u64::from(config.analog_sample_delay_ms));
        let mut total = 0u64;
        for i in 0..samples {
            if i > 0 && !delay.is_zero() {
                Timer::after(delay).await;
            }
            let Some(raw) = self.pin.analog_read_raw(ctl) else {
                self.core.report_bus_failure(BusError::ReadFailed);
                return false;
            };
            total += u64::from(raw);
        }
        self.core.clear_bus_failure();

        let res = self.pin.bit_resolution();
        let mut raw = (total / u64::from(samples)) as u32;
        if self.inverted {
            raw = res.max_value.saturating_sub(raw);
        }

        let (timestamp, frame) = self.core.stamp();
        let mut m = Measurement::Single(SingleMeasurement::new(
            res.transform(raw),
            Units::Raw,
            timestamp,
            frame,
        ));
        self.core.calibrate_row(&mut m, 0);
        self.core.convert_row(&mut m, 0);
        self.core.publish(m);
        true
    }
}
