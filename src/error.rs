//! Unified error types for the sensor I/O layer.
//!
//! A single `Error` enum that every subsystem converts into. All variants
//! are `Copy` so they can be stored in the diagnostics channel and passed
//! through measurement cycles without allocation.

use core::fmt;

use crate::units::Units;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid pin / channel / mode combination or missing setup data.
    Config(ConfigError),
    /// A bus device failed to initialise or answer.
    Bus(BusError),
    /// A unit conversion was requested across categories.
    Units(UnitsError),
    /// Every subscriber slot of a notification channel is taken.
    SubscriberSlotsFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Units(e) => write!(f, "units: {e}"),
            Self::SubscriberSlotsFull => write!(f, "subscriber slots exhausted"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Pin number is the "no pin" sentinel.
    InvalidPin,
    /// Pin mode does not fit the requested view (digital vs analog).
    InvalidMode,
    /// Channel is out of range for the owning muxer or expander.
    InvalidChannel,
    /// Channel-select pins are not populated contiguously from index 0.
    SelectPinGap,
    /// More channel-select pins than a muxer supports.
    TooManySelectPins,
    /// No muxer or expander is registered for the pin.
    MissingBusOwner,
    /// A calibration record was required but none is stored.
    MissingCalibration,
    /// A fixed-capacity registry is full.
    CapacityExceeded,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPin => write!(f, "invalid pin"),
            Self::InvalidMode => write!(f, "pin mode does not match pin kind"),
            Self::InvalidChannel => write!(f, "invalid channel"),
            Self::SelectPinGap => write!(f, "channel select pins must be contiguous"),
            Self::TooManySelectPins => write!(f, "too many channel select pins"),
            Self::MissingBusOwner => write!(f, "no muxer/expander owns this pin"),
            Self::MissingCalibration => write!(f, "calibration record missing"),
            Self::CapacityExceeded => write!(f, "registry capacity exceeded"),
        }
    }
}

impl core::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Bus / device errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The device module could not be created or started.
    DeviceInitFailed,
    /// No device answered the reset pulse.
    NoPresence,
    /// Bus search ended without a checksum-valid device at the position.
    AddressNotFound,
    /// Received data failed its CRC.
    ChecksumMismatch,
    /// The device returned no usable value.
    ReadFailed,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceInitFailed => write!(f, "device init failed"),
            Self::NoPresence => write!(f, "no device presence"),
            Self::AddressNotFound => write!(f, "device address not found"),
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
            Self::ReadFailed => write!(f, "device read failed"),
        }
    }
}

impl core::error::Error for BusError {}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Unit errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitsError {
    /// Source and target units belong to different categories.
    CrossCategory { from: Units, to: Units },
    /// Requested row does not exist on the measurement.
    RowOutOfRange(u8),
}

impl fmt::Display for UnitsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CrossCategory { from, to } => write!(
                f,
                "cannot convert {} to {}",
                from.symbol(),
                to.symbol()
            ),
            Self::RowOutOfRange(row) => write!(f, "row {row} out of range"),
        }
    }
}

impl core::error::Error for UnitsError {}

impl From<UnitsError> for Error {
    fn from(e: UnitsError) -> Self {
        Self::Units(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
