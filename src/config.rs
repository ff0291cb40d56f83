//! I/O layer configuration.
//!
//! Tunables for measurement timing, pin arbitration and the unit system.
//! Loaded from JSON at the edge of the system and validated before use.

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};

use crate::measurement::Frame;
use crate::units::MeasurementMode;

/// Positions a single-wire search may visit.
pub const ONEWIRE_SEARCH_LIMIT: u8 = 63;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    // --- Units ---
    /// System-wide unit preference.
    pub measurement_mode: MeasurementMode,

    // --- Pin arbitration ---
    /// Longest a sensor waits for a shared pin (milliseconds)
    pub pin_lock_timeout_ms: u32,
    /// Retry tick while waiting for a pin lock (milliseconds)
    pub lock_poll_interval_ms: u32,

    // --- Polling ---
    /// Frames a measurement may age before it needs re-polling
    pub polling_allowance: Frame,

    // --- Analog sampling ---
    /// Raw reads averaged per analog measurement
    pub analog_samples: u8,
    /// Delay between consecutive analog samples (milliseconds)
    pub analog_sample_delay_ms: u16,

    // --- Single-wire ---
    /// Device positions searched when resolving by index
    pub onewire_max_search: u8,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            measurement_mode: MeasurementMode::Metric,

            pin_lock_timeout_ms: 5,
            lock_poll_interval_ms: 1,

            polling_allowance: 0,

            analog_samples: 5,
            analog_sample_delay_ms: 0,

            onewire_max_search: ONEWIRE_SEARCH_LIMIT,
        }
    }
}

impl IoConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("parsing I/O config")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would stall or break a measurement cycle.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.analog_samples >= 1, "analog_samples must be at least 1");
        ensure!(
            self.lock_poll_interval_ms >= 1,
            "lock_poll_interval_ms must be at least 1"
        );
        ensure!(
            self.onewire_max_search <= ONEWIRE_SEARCH_LIMIT,
            "onewire_max_search must not exceed {ONEWIRE_SEARCH_LIMIT}"
        );
        Ok(())
    }
}
