//! Calibration curves and the calibration store.
//!
//! A record maps a normalized raw reading onto a physical value in its
//! declared units. Records are owned by the [`CalibrationStore`]; sensors
//! hold weak references and see a removed record as "uncalibrated".

use core::cell::RefCell;
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::units::Units;

/// Stable key derived from a sensor's name.
pub type CalibrationKey = u32;

pub const MAX_CALIBRATIONS: usize = 16;
pub const MAX_CALIBRATION_POINTS: usize = 16;

/// FNV-1a over the name bytes.
pub fn calibration_key(name: &str) -> CalibrationKey {
    name.bytes().fold(0x811c_9dc5, |hash, b| {
        (hash ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub raw: f32,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationCurve {
    /// `value = raw * multiplier + offset`
    Linear { multiplier: f32, offset: f32 },
    /// Piecewise linear over points sorted by `raw`, clamped at both ends.
    Table(heapless::Vec<CalibrationPoint, MAX_CALIBRATION_POINTS>),
}

impl CalibrationCurve {
    pub fn linear(multiplier: f32, offset: f32) -> Self {
        Self::Linear { multiplier, offset }
    }

    /// Sorts the points by raw reading.
    pub fn table(points: &[CalibrationPoint]) -> Result<Self, ConfigError> {
        let mut points = heapless::Vec::<_, MAX_CALIBRATION_POINTS>::from_slice(points)
            .map_err(|()| ConfigError::CapacityExceeded)?;
        if points.is_empty() {
            return Err(ConfigError::MissingCalibration);
        }
        points.sort_unstable_by(|a, b| a.raw.total_cmp(&b.raw));
        Ok(Self::Table(points))
    }

    pub fn transform(&self, raw: f32) -> f32 {
        match self {
            Self::Linear { multiplier, offset } => raw * multiplier + offset,
            Self::Table(points) => interpolate(points, raw, |p| (p.raw, p.value)),
        }
    }

    pub fn inverse_transform(&self, value: f32) -> f32 {
        match self {
            Self::Linear { multiplier, offset } => {
                if *multiplier == 0.0 {
                    0.0
                } else {
                    (value - offset) / multiplier
                }
            }
            Self::Table(points) => interpolate(points, value, |p| (p.value, p.raw)),
        }
    }
}

/// Interpolates along `axis(p) = (x, y)`. Points must be monotonic in x.
fn interpolate(points: &[CalibrationPoint], x: f32, axis: impl Fn(&CalibrationPoint) -> (f32, f32)) -> f32 {
    let mut pairs = points.iter().map(&axis);
    let Some(first) = pairs.next() else {
        return x;
    };
    let ascending = points.last().map(&axis).is_none_or(|last| last.0 >= first.0);
    let mut prev = first;
    if (ascending && x <= first.0) || (!ascending && x >= first.0) {
        return first.1;
    }
    for next in pairs {
        let within = if ascending { x <= next.0 } else { x >= next.0 };
        if within {
            let span = next.0 - prev.0;
            if span == 0.0 {
                return next.1;
            }
            return prev.1 + (x - prev.0) / span * (next.1 - prev.1);
        }
        prev = next;
    }
    prev.1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub key: CalibrationKey,
    pub curve: CalibrationCurve,
    /// Units the curve produces.
    pub units: Units,
}

impl CalibrationRecord {
    pub fn new(sensor_name: &str, curve: CalibrationCurve, units: Units) -> Self {
        Self {
            key: calibration_key(sensor_name),
            curve,
            units,
        }
    }

    pub fn transform(&self, raw: f32) -> f32 {
        self.curve.transform(raw)
    }

    pub fn inverse_transform(&self, value: f32) -> f32 {
        self.curve.inverse_transform(value)
    }

    /// Calibrates one value row in place. A record without units keeps
    /// the row's units.
    pub fn transform_row(&self, value: &mut f32, units: &mut Units) {
        *value = self.transform(*value);
        if self.units.is_defined() {
            *units = self.units;
        }
    }
}

/// Owner of every calibration record.
#[derive(Default)]
pub struct CalibrationStore {
    records: RefCell<heapless::Vec<Rc<CalibrationRecord>, MAX_CALIBRATIONS>>,
}

impl CalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces by key. Replacing orphans the old record, so
    /// attached sensors must re-attach to see the new curve.
    pub fn set(&self, record: CalibrationRecord) -> Result<Rc<CalibrationRecord>, ConfigError> {
        let record = Rc::new(record);
        let mut records = self.records.borrow_mut();
        if let Some(slot) = records.iter_mut().find(|r| r.key == record.key) {
            *slot = record.clone();
        } else {
            records
                .push(record.clone())
                .map_err(|_| ConfigError::CapacityExceeded)?;
        }
        debug!("calibration {:08x} stored ({})", record.key, record.units);
        Ok(record)
    }

    pub fn get(&self, key: CalibrationKey) -> Option<Rc<CalibrationRecord>> {
        self.records.borrow().iter().find(|r| r.key == key).cloned()
    }

    pub fn remove(&self, key: CalibrationKey) -> bool {
        let mut records = self.records.borrow_mut();
        match records.iter().position(|r| r.key == key) {
            Some(i) => {
                records.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
