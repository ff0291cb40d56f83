//! Tagged measurement records.
//!
//! ```text
//!   Binary  { state }            1 row
//!   Single  { value, units }     1 row
//!   Double  { value[2], units[2] } 2 rows
//!   Triple  { value[3], units[3] } 3 rows
//! ```
//!
//! Every record carries the unix timestamp it was taken at and the polling
//! frame it belongs to. Frame 0 means "never measured" and fails every
//! freshness check.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::UnitsError;
use crate::persist::MeasurementData;
use crate::units::{self, MeasurementMode, Units};

/// Polling generation counter. Wraps.
pub type Frame = u32;

/// Frame value reserved for "no valid data".
pub const INVALID_FRAME: Frame = 0;

/// `true` if a measurement from `frame` is too old relative to `current`.
pub fn is_frame_old(frame: Frame, current: Frame, allowance: Frame) -> bool {
    frame == INVALID_FRAME || current.wrapping_sub(frame) > allowance
}

/// Frame stamped onto a fresh measurement; never the invalid frame.
pub fn frame_for(current: Frame) -> Frame {
    current.max(1)
}

/// Rounds to `decimals` places for export.
pub fn round_for_export(value: f32, decimals: u8) -> f32 {
    let scale = 10f32.powi(i32::from(decimals));
    (value * scale).round() / scale
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementKind {
    Binary,
    Single,
    Double,
    Triple,
}

impl MeasurementKind {
    pub const fn row_count(self) -> u8 {
        match self {
            Self::Binary | Self::Single => 1,
            Self::Double => 2,
            Self::Triple => 3,
        }
    }
}

// ── Variants ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BinaryMeasurement {
    pub state: bool,
    pub timestamp: i64,
    pub frame: Frame,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SingleMeasurement {
    pub value: f32,
    pub units: Units,
    pub timestamp: i64,
    pub frame: Frame,
}

impl SingleMeasurement {
    pub fn new(value: f32, units: Units, timestamp: i64, frame: Frame) -> Self {
        Self {
            value,
            units,
            timestamp,
            frame,
        }
    }
}

/// Fixed-width multi-row record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowMeasurement<const N: usize> {
    pub value: [f32; N],
    pub units: [Units; N],
    pub timestamp: i64,
    pub frame: Frame,
}

impl<const N: usize> Default for RowMeasurement<N> {
    fn default() -> Self {
        Self {
            value: [0.0; N],
            units: [Units::Undefined; N],
            timestamp: 0,
            frame: INVALID_FRAME,
        }
    }
}

impl<const N: usize> RowMeasurement<N> {
    fn reloaded(row: usize, data: &MeasurementData, frame: Frame) -> Self {
        let mut m = Self {
            timestamp: data.timestamp,
            frame,
            ..Self::default()
        };
        m.value[row] = data.value;
        m.units[row] = data.units;
        m
    }
}

pub type DoubleMeasurement = RowMeasurement<2>;
pub type TripleMeasurement = RowMeasurement<3>;

// ── Measurement ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Binary(BinaryMeasurement),
    Single(SingleMeasurement),
    Double(DoubleMeasurement),
    Triple(TripleMeasurement),
}

impl Measurement {
    /// Empty record of the given kind, frame 0.
    pub fn invalid(kind: MeasurementKind) -> Self {
        match kind {
            MeasurementKind::Binary => Self::Binary(BinaryMeasurement::default()),
            MeasurementKind::Single => Self::Single(SingleMeasurement::default()),
            MeasurementKind::Double => Self::Double(DoubleMeasurement::default()),
            MeasurementKind::Triple => Self::Triple(TripleMeasurement::default()),
        }
    }

    pub fn kind(&self) -> MeasurementKind {
        match self {
            Self::Binary(_) => MeasurementKind::Binary,
            Self::Single(_) => MeasurementKind::Single,
            Self::Double(_) => MeasurementKind::Double,
            Self::Triple(_) => MeasurementKind::Triple,
        }
    }

    pub fn row_count(&self) -> u8 {
        self.kind().row_count()
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Binary(m) => m.timestamp,
            Self::Single(m) => m.timestamp,
            Self::Double(m) => m.timestamp,
            Self::Triple(m) => m.timestamp,
        }
    }

    pub fn frame(&self) -> Frame {
        match self {
            Self::Binary(m) => m.frame,
            Self::Single(m) => m.frame,
            Self::Double(m) => m.frame,
            Self::Triple(m) => m.frame,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.frame() != INVALID_FRAME
    }

    /// Stamps the record with `frame_for(current)`.
    pub fn set_frame(&mut self, current: Frame) {
        let frame = frame_for(current);
        match self {
            Self::Binary(m) => m.frame = frame,
            Self::Single(m) => m.frame = frame,
            Self::Double(m) => m.frame = frame,
            Self::Triple(m) => m.frame = frame,
        }
    }

    /// Binary state as 1.0 / 0.0. `0.0` for rows that do not exist.
    pub fn value_at(&self, row: u8) -> f32 {
        match self {
            Self::Binary(m) if row == 0 => {
                if m.state {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Single(m) if row == 0 => m.value,
            Self::Double(m) => m.value.get(row as usize).copied().unwrap_or_default(),
            Self::Triple(m) => m.value.get(row as usize).copied().unwrap_or_default(),
            _ => 0.0,
        }
    }

    pub fn units_at(&self, row: u8) -> Units {
        match self {
            Self::Binary(_) if row == 0 => Units::Raw,
            Self::Single(m) if row == 0 => m.units,
            Self::Double(m) => m.units.get(row as usize).copied().unwrap_or_default(),
            Self::Triple(m) => m.units.get(row as usize).copied().unwrap_or_default(),
            _ => Units::Undefined,
        }
    }

    /// Projects one row down to a single-value record. Rows that do not
    /// exist come back with the invalid frame.
    pub fn as_single_at(&self, row: u8) -> SingleMeasurement {
        if row >= self.row_count() {
            return SingleMeasurement {
                timestamp: self.timestamp(),
                ..SingleMeasurement::default()
            };
        }
        SingleMeasurement::new(
            self.value_at(row),
            self.units_at(row),
            self.timestamp(),
            self.frame(),
        )
    }

    /// Mutable access to a value row. `None` for binary records and rows
    /// out of range.
    pub fn row_mut(&mut self, row: u8) -> Option<(&mut f32, &mut Units)> {
        let row = row as usize;
        match self {
            Self::Binary(_) => None,
            Self::Single(m) => (row == 0).then_some((&mut m.value, &mut m.units)),
            Self::Double(m) => m.value.get_mut(row).zip(m.units.get_mut(row)),
            Self::Triple(m) => m.value.get_mut(row).zip(m.units.get_mut(row)),
        }
    }

    /// Converts one row into `to` in place.
    pub fn convert_row(&mut self, row: u8, to: Units) -> Result<(), UnitsError> {
        let (value, units) = self.row_mut(row).ok_or(UnitsError::RowOutOfRange(row))?;
        *value = units::convert(*value, *units, to)?;
        // an unlabelled value passes through unconverted, so it stays unlabelled
        if to.is_defined() && units.is_defined() {
            *units = to;
        }
        Ok(())
    }

    /// Persisted form of one row, rounded to the mode's baseline plus
    /// `extra_decimals`.
    pub fn to_data(&self, row: u8, mode: MeasurementMode, extra_decimals: u8) -> MeasurementData {
        let decimals = mode.decimal_places().saturating_add(extra_decimals);
        let state = match self {
            Self::Binary(m) => Some(m.state),
            _ => None,
        };
        MeasurementData {
            measure_row: row,
            value: round_for_export(self.value_at(row), decimals),
            units: self.units_at(row),
            timestamp: self.timestamp(),
            state,
        }
    }

    /// Rebuilds a record from persisted data. The frame is not persisted;
    /// a loaded record starts at frame 1 so it reads as stale but valid.
    ///
    /// `measure_row` picks the record width: the value lands in that row
    /// and the rows before it stay unlabelled zeros. A row past the widest
    /// record loads as row 0.
    pub fn from_data(data: &MeasurementData) -> Self {
        const RELOADED: Frame = 1;
        if let Some(state) = data.state {
            return Self::Binary(BinaryMeasurement {
                state,
                timestamp: data.timestamp,
                frame: RELOADED,
            });
        }
        match data.measure_row {
            1 => Self::Double(RowMeasurement::reloaded(1, data, RELOADED)),
            2 => Self::Triple(RowMeasurement::reloaded(2, data, RELOADED)),
            row => {
                if row > 2 {
                    warn!("persisted row {} out of range, loading as row 0", row);
                }
                Self::Single(SingleMeasurement::new(
                    data.value,
                    data.units,
                    data.timestamp,
                    RELOADED,
                ))
            }
        }
    }
}

impl From<SingleMeasurement> for Measurement {
    fn from(m: SingleMeasurement) -> Self {
        Self::Single(m)
    }
}

impl From<BinaryMeasurement> for Measurement {
    fn from(m: BinaryMeasurement) -> Self {
        Self::Binary(m)
    }
}
