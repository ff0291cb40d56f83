//! Sensor state machines.
//!
//! Every sensor kind runs the same measurement protocol:
//!
//! ```text
//!   Idle ──take_measurement──▶ Measuring
//!     ▲                          │ lease pin (bounded wait)
//!     │                          │ sample
//!     │                          │ calibrate row 0
//!     │                          │ convert each row
//!     │                          │ replace record, publish
//!     └──────── release ◀────────┘
//! ```
//!
//! A request is rejected while a cycle is in flight, or when the last
//! record is still fresh and the request is not forced. Lock timeouts and
//! bus failures leave the previous record untouched, so a sensor that
//! cannot be read simply stops advancing its frame.

pub mod analog;
pub mod binary;
pub mod dht;
pub mod onewire;

use core::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Subscriber};
use log::{debug, info};

use crate::app::ports::Controller;
use crate::calibration::{CalibrationKey, CalibrationRecord, calibration_key};
use crate::error::{BusError, ConfigError, Error};
use crate::measurement::{Frame, Measurement, MeasurementKind, frame_for};
use crate::units::{Units, UnitsCategory};

pub use analog::AnalogSensor;
pub use binary::BinarySensor;
pub use dht::DhtTempHumiditySensor;
pub use onewire::OneWireTemperatureSensor;

/// Records a notification channel buffers per subscriber.
pub const SIGNAL_QUEUE_DEPTH: usize = 4;
/// Concurrent subscribers per notification channel.
pub const SIGNAL_SUBSCRIBERS: usize = 4;
/// Most value rows any record carries.
pub const MAX_ROWS: usize = 3;

pub type MeasurementChannel =
    PubSubChannel<NoopRawMutex, Measurement, SIGNAL_QUEUE_DEPTH, SIGNAL_SUBSCRIBERS, 1>;
pub type MeasurementSubscriber<'a> =
    Subscriber<'a, NoopRawMutex, Measurement, SIGNAL_QUEUE_DEPTH, SIGNAL_SUBSCRIBERS, 1>;
pub type StateChannel = PubSubChannel<NoopRawMutex, bool, SIGNAL_QUEUE_DEPTH, SIGNAL_SUBSCRIBERS, 1>;
pub type StateSubscriber<'a> =
    Subscriber<'a, NoopRawMutex, bool, SIGNAL_QUEUE_DEPTH, SIGNAL_SUBSCRIBERS, 1>;

// ── Identity ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorType {
    Endstop,
    IceDetector,
    LightIntensity,
    PowerLevel,
    StrokePosition,
    TiltAngle,
    WindSpeed,
    TempHumidity,
}

impl SensorType {
    /// Category a row reports in when nothing else is configured.
    pub const fn default_category(self, row: u8) -> Option<UnitsCategory> {
        match (self, row) {
            (Self::Endstop | Self::IceDetector | Self::LightIntensity, 0)
            | (Self::TempHumidity, 1) => Some(UnitsCategory::Percentile),
            (Self::PowerLevel, 0) => Some(UnitsCategory::Power),
            (Self::StrokePosition, 0) => Some(UnitsCategory::Distance),
            (Self::TiltAngle, 0) => Some(UnitsCategory::Angle),
            (Self::WindSpeed, 0) => Some(UnitsCategory::Speed),
            (Self::TempHumidity, 0 | 2) => Some(UnitsCategory::Temperature),
            _ => None,
        }
    }
}

pub const SENSOR_NAME_LEN: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorId {
    name: heapless::String<SENSOR_NAME_LEN>,
    sensor_type: SensorType,
}

impl SensorId {
    /// Names longer than [`SENSOR_NAME_LEN`] are truncated.
    pub fn new(name: &str, sensor_type: SensorType) -> Self {
        let mut truncated = heapless::String::new();
        for c in name.chars() {
            if truncated.push(c).is_err() {
                break;
            }
        }
        Self {
            name: truncated,
            sensor_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    pub fn key(&self) -> CalibrationKey {
        calibration_key(&self.name)
    }
}

// ── Shared state ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitsSource {
    Override,
    Calibration,
    Default,
}

/// Clears the in-flight flag when the cycle ends, however it ends.
pub(crate) struct MeasuringGuard<'a>(&'a Cell<bool>);

impl Drop for MeasuringGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// State every sensor kind carries.
pub struct SensorCore {
    id: SensorId,
    ctl: Rc<dyn Controller>,
    measuring: Cell<bool>,
    last: Cell<Measurement>,
    calibration: RefCell<Weak<CalibrationRecord>>,
    row_units: Cell<[Units; MAX_ROWS]>,
    measurements: MeasurementChannel,
    config_error: Cell<Option<ConfigError>>,
    bus_fault: Cell<bool>,
}

impl SensorCore {
    pub(crate) fn new(id: SensorId, ctl: Rc<dyn Controller>, kind: MeasurementKind) -> Self {
        let core = Self {
            id,
            ctl,
            measuring: Cell::new(false),
            last: Cell::new(Measurement::invalid(kind)),
            calibration: RefCell::new(Weak::new()),
            row_units: Cell::new([Units::Undefined; MAX_ROWS]),
            measurements: PubSubChannel::new(),
            config_error: Cell::new(None),
            bus_fault: Cell::new(false),
        };
        core.attach_calibration();
        core
    }

    pub fn id(&self) -> &SensorId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    pub fn controller(&self) -> &dyn Controller {
        &*self.ctl
    }

    pub fn latest_measurement(&self) -> Measurement {
        self.last.get()
    }

    pub fn is_measuring(&self) -> bool {
        self.measuring.get()
    }

    pub fn is_valid(&self) -> bool {
        self.config_error.get().is_none()
    }

    pub fn config_error(&self) -> Option<ConfigError> {
        self.config_error.get()
    }

    /// Marks the sensor permanently unusable.
    pub(crate) fn invalidate(&self, err: ConfigError) {
        self.ctl.diagnostics().hard(self.name(), err);
        self.config_error.set(Some(err));
    }

    pub fn needs_polling(&self) -> bool {
        let allowance = self.ctl.config().polling_allowance;
        self.ctl
            .is_polling_frame_old(self.last.get().frame(), allowance)
    }

    /// Enters `Measuring`, or `None` if the request is rejected.
    pub(crate) fn begin(&self, force: bool) -> Option<MeasuringGuard<'_>> {
        if !self.is_valid() || self.measuring.get() {
            return None;
        }
        if !force && !self.needs_polling() {
            return None;
        }
        self.measuring.set(true);
        Some(MeasuringGuard(&self.measuring))
    }

    /// Timestamp and frame for a record taken now.
    pub(crate) fn stamp(&self) -> (i64, Frame) {
        (self.ctl.unix_now(), frame_for(self.ctl.polling_frame()))
    }

    // ── Calibration ──────────────────────────────────────────

    pub fn calibration(&self) -> Option<Rc<CalibrationRecord>> {
        self.calibration.borrow().upgrade()
    }

    /// Looks the sensor's record up in the store. `false` if none exists.
    pub fn attach_calibration(&self) -> bool {
        let record = self.ctl.calibration_data(self.id.key());
        *self.calibration.borrow_mut() = record.as_ref().map(Rc::downgrade).unwrap_or_default();
        record.is_some()
    }

    pub fn detach_calibration(&self) {
        *self.calibration.borrow_mut() = Weak::new();
    }

    pub(crate) fn calibrate_row(&self, m: &mut Measurement, row: u8) {
        if let (Some(cal), Some((value, units))) = (self.calibration(), m.row_mut(row)) {
            cal.transform_row(value, units);
        }
    }

    // ── Units ────────────────────────────────────────────────

    /// First match wins: per-row override, calibration units, then the
    /// type and measurement mode default. Calibration units cover row 0
    /// and any other row that defaults to the same category, such as the
    /// heat-index row of a temperature/humidity sensor.
    pub fn resolve_units(&self, row: u8) -> (Units, UnitsSource) {
        let overridden = self
            .row_units
            .get()
            .get(row as usize)
            .copied()
            .unwrap_or_default();
        if overridden.is_defined() {
            return (overridden, UnitsSource::Override);
        }
        let category = self.id.sensor_type.default_category(row);
        if let Some(cal) = self.calibration().filter(|c| c.units.is_defined()) {
            if row == 0 || (category.is_some() && category == cal.units.category()) {
                return (cal.units, UnitsSource::Calibration);
            }
        }
        let units = category.map_or(Units::Undefined, |c| {
            self.ctl.measurement_mode().default_units(c)
        });
        (units, UnitsSource::Default)
    }

    pub fn measurement_units(&self, row: u8) -> Units {
        self.resolve_units(row).0
    }

    /// Sets a per-row override and converts the held record to match.
    /// `Units::Undefined` clears the override.
    pub fn set_measurement_units(&self, units: Units, row: u8) {
        let mut overrides = self.row_units.get();
        let Some(slot) = overrides.get_mut(row as usize) else {
            return;
        };
        *slot = units;
        self.row_units.set(overrides);

        let mut last = self.last.get();
        if last.is_valid() && units.is_defined() && row < last.row_count() {
            match last.convert_row(row, units) {
                Ok(()) => self.last.set(last),
                Err(e) => self.ctl.diagnostics().hard(self.name(), e),
            }
        }
    }

    /// Converts a row to its resolved units. A type default from another
    /// category (an uncalibrated raw reading) leaves the row as it is.
    pub(crate) fn convert_row(&self, m: &mut Measurement, row: u8) {
        let (target, source) = self.resolve_units(row);
        if source == UnitsSource::Default && !m.units_at(row).same_category(target) {
            debug!("{}: row {} stays {}", self.name(), row, m.units_at(row));
            return;
        }
        if let Err(e) = m.convert_row(row, target) {
            self.ctl.diagnostics().hard(self.name(), e);
        }
    }

    // ── Publication ──────────────────────────────────────────

    pub(crate) fn publish(&self, m: Measurement) {
        self.last.set(m);
        self.measurements.immediate_publisher().publish_immediate(m);
    }

    pub fn subscribe(&self) -> Result<MeasurementSubscriber<'_>, Error> {
        self.measurements
            .subscriber()
            .map_err(|_| Error::SubscriberSlotsFull)
    }

    // ── Bus health ───────────────────────────────────────────

    /// Soft diagnostic on the first failure of a run.
    pub(crate) fn report_bus_failure(&self, err: BusError) {
        if self.bus_fault.replace(true) {
            debug!("{}: {} (repeat)", self.name(), err);
        } else {
            self.ctl.diagnostics().soft(self.name(), err);
        }
    }

    pub(crate) fn clear_bus_failure(&self) {
        if self.bus_fault.replace(false) {
            info!("{}: bus recovered", self.name());
        }
    }
}

// ── Closed sensor set ────────────────────────────────────────

pub enum Sensor {
    Binary(BinarySensor),
    Analog(AnalogSensor),
    OneWire(OneWireTemperatureSensor),
    Dht(DhtTempHumiditySensor),
}

impl Sensor {
    pub fn core(&self) -> &SensorCore {
        match self {
            Self::Binary(s) => s.core(),
            Self::Analog(s) => s.core(),
            Self::OneWire(s) => s.core(),
            Self::Dht(s) => s.core(),
        }
    }

    pub fn id(&self) -> &SensorId {
        self.core().id()
    }

    pub fn is_valid(&self) -> bool {
        self.core().is_valid()
    }

    pub fn latest_measurement(&self) -> Measurement {
        self.core().latest_measurement()
    }

    pub fn needs_polling(&self) -> bool {
        self.core().needs_polling()
    }

    /// Runs one measurement cycle. `true` when a new record was published.
    pub async fn take_measurement(&self, force: bool) -> bool {
        match self {
            Self::Binary(s) => s.take_measurement(force),
            Self::Analog(s) => s.take_measurement(force).await,
            Self::OneWire(s) => s.take_measurement(force).await,
            Self::Dht(s) => s.take_measurement(force).await,
        }
    }

    pub fn subscribe_measurements(&self) -> Result<MeasurementSubscriber<'_>, Error> {
        self.core().subscribe()
    }

    pub fn as_binary(&self) -> Option<&BinarySensor> {
        match self {
            Self::Binary(s) => Some(s),
            _ => None,
        }
    }
}

impl From<BinarySensor> for Sensor {
    fn from(s: BinarySensor) -> Self {
        Self::Binary(s)
    }
}

impl From<AnalogSensor> for Sensor {
    fn from(s: AnalogSensor) -> Self {
        Self::Analog(s)
    }
}

impl From<OneWireTemperatureSensor> for Sensor {
    fn from(s: OneWireTemperatureSensor) -> Self {
        Self::OneWire(s)
    }
}

impl From<DhtTempHumiditySensor> for Sensor {
    fn from(s: DhtTempHumiditySensor) -> Self {
        Self::Dht(s)
    }
}
