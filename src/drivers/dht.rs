//! DHT-family temperature/humidity module helpers.
//!
//! The module itself sits behind [`crate::app::ports::TempHumidityDevice`];
//! this file holds the model table and the heat-index regression.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DhtKind {
    Dht11,
    Dht12,
    Dht21,
    #[default]
    Dht22,
}

impl DhtKind {
    /// Shortest interval between reads the module tolerates.
    pub const fn min_interval_ms(self) -> u32 {
        match self {
            Self::Dht11 | Self::Dht12 => 1000,
            Self::Dht21 | Self::Dht22 => 2000,
        }
    }
}

/// NOAA heat index in °F from °F and %RH.
///
/// Simple average formula below 80 °F, Rothfusz regression above it with
/// the low- and high-humidity adjustments.
pub fn heat_index_fahrenheit(temp_f: f32, humidity: f32) -> f32 {
    let t = temp_f;
    let rh = humidity;
    let simple = 0.5 * (t + 61.0 + ((t - 68.0) * 1.2) + (rh * 0.094));
    if simple <= 79.0 {
        return simple;
    }
    let mut hi = -42.379 + 2.049_015_2 * t + 10.143_331 * rh
        - 0.224_755_4 * t * rh
        - 0.006_837_83 * t * t
        - 0.054_817_17 * rh * rh
        + 0.001_228_74 * t * t * rh
        + 0.000_852_82 * t * rh * rh
        - 0.000_001_99 * t * t * rh * rh;
    if rh < 13.0 && (80.0..=112.0).contains(&t) {
        hi -= ((13.0 - rh) * 0.25) * ((17.0 - (t - 95.0).abs()) * 0.058_82).sqrt();
    } else if rh > 85.0 && (80.0..=87.0).contains(&t) {
        hi += ((rh - 85.0) * 0.1) * ((87.0 - t) * 0.2);
    }
    hi
}
