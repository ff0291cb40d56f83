//! Measurement units, unit categories and conversion.
//!
//! ```text
//!   Temperature  °C  °F  °K
//!   Distance     m   ft
//!   Power        W   kW
//!   Angle        °   rad
//!   Speed        m/s km/h mi/h
//!   Percentile   raw (0..1)  % (0..100)
//! ```
//!
//! Conversion is only defined inside a category. Units always serialise
//! by symbol so stored data survives reordering of this enum.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::UnitsError;

const FEET_PER_METER: f32 = 3.280_84;
const KMH_PER_MPS: f32 = 3.6;
const MPH_PER_MPS: f32 = 2.236_936;
const KELVIN_OFFSET: f32 = 273.15;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    /// Normalized reading, 0.0 ..= 1.0.
    Raw,
    /// Percentage, 0.0 ..= 100.0.
    Percentile,
    Celsius,
    Fahrenheit,
    Kelvin,
    Meters,
    Feet,
    Watts,
    Kilowatts,
    Degrees,
    Radians,
    MetersPerSecond,
    KilometersPerHour,
    MilesPerHour,
    #[default]
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitsCategory {
    Temperature,
    Distance,
    Power,
    Angle,
    Speed,
    Percentile,
}

impl Units {
    pub const ALL: [Units; 15] = [
        Units::Raw,
        Units::Percentile,
        Units::Celsius,
        Units::Fahrenheit,
        Units::Kelvin,
        Units::Meters,
        Units::Feet,
        Units::Watts,
        Units::Kilowatts,
        Units::Degrees,
        Units::Radians,
        Units::MetersPerSecond,
        Units::KilometersPerHour,
        Units::MilesPerHour,
        Units::Undefined,
    ];

    /// `None` only for [`Units::Undefined`].
    pub const fn category(self) -> Option<UnitsCategory> {
        Some(match self {
            Units::Raw | Units::Percentile => UnitsCategory::Percentile,
            Units::Celsius | Units::Fahrenheit | Units::Kelvin => UnitsCategory::Temperature,
            Units::Meters | Units::Feet => UnitsCategory::Distance,
            Units::Watts | Units::Kilowatts => UnitsCategory::Power,
            Units::Degrees | Units::Radians => UnitsCategory::Angle,
            Units::MetersPerSecond | Units::KilometersPerHour | Units::MilesPerHour => {
                UnitsCategory::Speed
            }
            Units::Undefined => return None,
        })
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Units::Raw => "raw",
            Units::Percentile => "%",
            Units::Celsius => "°C",
            Units::Fahrenheit => "°F",
            Units::Kelvin => "°K",
            Units::Meters => "m",
            Units::Feet => "ft",
            Units::Watts => "W",
            Units::Kilowatts => "kW",
            Units::Degrees => "°",
            Units::Radians => "rad",
            Units::MetersPerSecond => "m/s",
            Units::KilometersPerHour => "km/h",
            Units::MilesPerHour => "mi/h",
            Units::Undefined => "undefined",
        }
    }

    /// Unknown symbols map to [`Units::Undefined`].
    pub fn from_symbol(symbol: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|u| u.symbol() == symbol)
            .unwrap_or(Units::Undefined)
    }

    pub fn is_defined(self) -> bool {
        self != Units::Undefined
    }

    pub fn same_category(self, other: Units) -> bool {
        self.category().is_some() && self.category() == other.category()
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Serialize for Units {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

impl<'de> Deserialize<'de> for Units {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let symbol: heapless::String<16> = Deserialize::deserialize(deserializer)?;
        Ok(Units::from_symbol(&symbol))
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Converts `value` from `from` into `to`.
///
/// Identical units, or an undefined unit on either side, pass the value
/// through unchanged. Units from different categories are an error.
pub fn convert(value: f32, from: Units, to: Units) -> Result<f32, UnitsError> {
    if from == to || !from.is_defined() || !to.is_defined() {
        return Ok(value);
    }
    if !from.same_category(to) {
        return Err(UnitsError::CrossCategory { from, to });
    }
    Ok(from_base(to_base(value, from), to))
}

/// Category base units: °C, m, W, °, m/s, raw.
fn to_base(value: f32, from: Units) -> f32 {
    match from {
        Units::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
        Units::Kelvin => value - KELVIN_OFFSET,
        Units::Feet => value / FEET_PER_METER,
        Units::Kilowatts => value * 1000.0,
        Units::Radians => value.to_degrees(),
        Units::KilometersPerHour => value / KMH_PER_MPS,
        Units::MilesPerHour => value / MPH_PER_MPS,
        Units::Percentile => value / 100.0,
        _ => value,
    }
}

fn from_base(value: f32, to: Units) -> f32 {
    match to {
        Units::Fahrenheit => value * 9.0 / 5.0 + 32.0,
        Units::Kelvin => value + KELVIN_OFFSET,
        Units::Feet => value * FEET_PER_METER,
        Units::Kilowatts => value / 1000.0,
        Units::Radians => value.to_radians(),
        Units::KilometersPerHour => value * KMH_PER_MPS,
        Units::MilesPerHour => value * MPH_PER_MPS,
        Units::Percentile => value * 100.0,
        _ => value,
    }
}

// ---------------------------------------------------------------------------
// Measurement mode
// ---------------------------------------------------------------------------

/// System-wide unit preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementMode {
    Imperial,
    #[default]
    Metric,
    Scientific,
}

impl MeasurementMode {
    pub const fn default_units(self, category: UnitsCategory) -> Units {
        match (category, self) {
            (UnitsCategory::Temperature, Self::Imperial) => Units::Fahrenheit,
            (UnitsCategory::Temperature, Self::Metric) => Units::Celsius,
            (UnitsCategory::Temperature, Self::Scientific) => Units::Kelvin,
            (UnitsCategory::Distance, Self::Imperial) => Units::Feet,
            (UnitsCategory::Distance, _) => Units::Meters,
            (UnitsCategory::Speed, Self::Imperial) => Units::MilesPerHour,
            (UnitsCategory::Speed, Self::Metric) => Units::KilometersPerHour,
            (UnitsCategory::Speed, Self::Scientific) => Units::MetersPerSecond,
            (UnitsCategory::Power, _) => Units::Watts,
            (UnitsCategory::Angle, _) => Units::Degrees,
            (UnitsCategory::Percentile, _) => Units::Percentile,
        }
    }

    /// Baseline decimal places used when exporting values.
    pub const fn decimal_places(self) -> u8 {
        match self {
            Self::Imperial | Self::Metric => 1,
            Self::Scientific => 2,
        }
    }
}
