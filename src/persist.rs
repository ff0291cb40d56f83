//! Persisted record shapes for pins, buses and measurements.
//!
//! Records are plain serde structs with symbolic field names and
//! symbolic enum values (pin modes, units). Two encodings are supported:
//!
//! - JSON via `serde_json` for human-editable configuration
//! - postcard for compact storage and transmission
//!
//! Optional fields are always present in the encoding (JSON `null`) so the
//! same structs round-trip through postcard, which is not self-describing.

use core::fmt::Write;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::pins::{PinMode, PinNumber};
use crate::units::Units;

/// Capacity of a joined pin list string.
pub const PIN_LIST_CAP: usize = 32;
/// Most pins a joined list can hold.
pub const MAX_LISTED_PINS: usize = 8;

pub type PinList = heapless::Vec<PinNumber, MAX_LISTED_PINS>;
pub type PinListString = heapless::String<PIN_LIST_CAP>;

// ── Records ──────────────────────────────────────────────────

/// One pin descriptor. `activeLow` is set for digital modes, `bitRes`
/// and the PWM pair for analog modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinData {
    pub pin: PinNumber,
    pub mode: PinMode,
    #[serde(default)]
    pub channel: Option<u8>,
    #[serde(default)]
    pub active_low: Option<bool>,
    #[serde(default)]
    pub bit_res: Option<u8>,
    #[serde(default)]
    pub pwm_channel: Option<u8>,
    #[serde(default)]
    pub pwm_frequency: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinMuxerData {
    pub signal_pin: PinData,
    pub chip_enable_pin: PinData,
    /// Comma-joined channel select pins, least significant bit first.
    pub channel_pins: PinListString,
    #[serde(default)]
    pub select_bus: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinExpanderData {
    pub pin_base: PinNumber,
    pub channel_bits: u8,
}

/// One row of a measurement. `state` is set only for binary records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementData {
    pub measure_row: u8,
    pub value: f32,
    pub units: Units,
    pub timestamp: i64,
    #[serde(default)]
    pub state: Option<bool>,
}

// ── Encodings ────────────────────────────────────────────────

pub fn to_json<T: Serialize>(record: &T) -> anyhow::Result<String> {
    serde_json::to_string(record).context("encoding record as JSON")
}

pub fn from_json<T: DeserializeOwned>(json: &str) -> anyhow::Result<T> {
    serde_json::from_str(json).context("decoding record from JSON")
}

pub fn to_postcard<T: Serialize>(record: &T) -> anyhow::Result<Vec<u8>> {
    postcard::to_allocvec(record).context("encoding record as postcard")
}

pub fn from_postcard<T: DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<T> {
    postcard::from_bytes(bytes).context("decoding record from postcard")
}

// ── Pin lists ────────────────────────────────────────────────

/// `[4, 5, 6]` → `"4,5,6"`.
pub fn comma_join(pins: &[PinNumber]) -> PinListString {
    let mut out = PinListString::new();
    for (i, pin) in pins.iter().enumerate() {
        let sep = if i == 0 { "" } else { "," };
        // capacity fits MAX_LISTED_PINS three-digit entries
        let _ = write!(out, "{sep}{pin}");
    }
    out
}

pub fn comma_split(list: &str) -> anyhow::Result<PinList> {
    let mut pins = PinList::new();
    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let pin: PinNumber = entry
            .parse()
            .with_context(|| format!("bad pin entry {entry:?}"))?;
        if pins.push(pin).is_err() {
            bail!("more than {MAX_LISTED_PINS} pins in list");
        }
    }
    Ok(pins)
}

/// `[4, 5, 255]` → `"0405FF"`.
pub fn hex_join(pins: &[PinNumber]) -> PinListString {
    let mut out = PinListString::new();
    for pin in pins {
        let _ = write!(out, "{pin:02X}");
    }
    out
}

pub fn hex_split(list: &str) -> anyhow::Result<PinList> {
    if list.len() % 2 != 0 {
        bail!("hex pin list has odd length {}", list.len());
    }
    let mut pins = PinList::new();
    for i in (0..list.len()).step_by(2) {
        let byte = list
            .get(i..i + 2)
            .context("hex pin list is not ASCII")?;
        let pin = PinNumber::from_str_radix(byte, 16)
            .with_context(|| format!("bad hex pin {byte:?}"))?;
        if pins.push(pin).is_err() {
            bail!("more than {MAX_LISTED_PINS} pins in list");
        }
    }
    Ok(pins)
}
