//! Single-wire bus protocol helpers for DS18-family temperature probes.
//!
//! ## ROM layout
//!
//! | Byte | Content        |
//! |------|----------------|
//! | 0    | family code    |
//! | 1..6 | serial number  |
//! | 7    | CRC-8 of 0..6  |
//!
//! ## Read sequence
//!
//! ```text
//!   reset ─ select ─ CONVERT_T ─ wait t_conv ─ reset ─ select ─ READ_SCRATCHPAD ─ 9 bytes
//! ```

use core::time::Duration;

use crate::app::ports::OneWireBus;
use crate::error::BusError;

pub const CMD_CONVERT_T: u8 = 0x44;
pub const CMD_WRITE_SCRATCHPAD: u8 = 0x4E;
pub const CMD_READ_SCRATCHPAD: u8 = 0xBE;

pub const SCRATCHPAD_LEN: usize = 9;

pub const MIN_RESOLUTION_BITS: u8 = 9;
pub const MAX_RESOLUTION_BITS: u8 = 12;

/// Default alarm thresholds written alongside the resolution.
const ALARM_HIGH: u8 = 0x4B;
const ALARM_LOW: u8 = 0x46;

pub type Rom = [u8; 8];

/// Dallas/Maxim CRC-8 (poly x^8 + x^5 + x^4 + 1, reflected).
pub fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |mut crc, &byte| {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
        crc
    })
}

/// Trailing byte matches the CRC of the first seven.
pub fn rom_is_valid(rom: &Rom) -> bool {
    crc8(&rom[..7]) == rom[7]
}

pub fn rom_is_empty(rom: &Rom) -> bool {
    rom.iter().all(|&b| b == 0)
}

/// Address of the device at `position` in search order. The device there
/// must carry a valid ROM checksum.
pub fn find_by_position(bus: &dyn OneWireBus, position: u8, max_search: u8) -> Result<Rom, BusError> {
    bus.reset_search();
    let mut rom = Rom::default();
    let mut index = 0u8;
    while index <= position && index < max_search && bus.search(&mut rom) {
        if index == position {
            return if rom_is_valid(&rom) {
                Ok(rom)
            } else {
                Err(BusError::ChecksumMismatch)
            };
        }
        index += 1;
    }
    Err(BusError::AddressNotFound)
}

/// Search position of a known address.
pub fn find_by_address(bus: &dyn OneWireBus, address: &Rom, max_search: u8) -> Result<u8, BusError> {
    bus.reset_search();
    let mut rom = Rom::default();
    let mut index = 0u8;
    while index < max_search && bus.search(&mut rom) {
        if rom == *address {
            return Ok(index);
        }
        index += 1;
    }
    Err(BusError::AddressNotFound)
}

pub fn clamp_resolution(bits: u8) -> u8 {
    bits.clamp(MIN_RESOLUTION_BITS, MAX_RESOLUTION_BITS)
}

/// 750 ms at 12 bits, halving per bit below.
pub fn conversion_time(bits: u8) -> Duration {
    Duration::from_micros(750_000 >> (MAX_RESOLUTION_BITS - clamp_resolution(bits)))
}

/// Configuration register value for a resolution.
pub fn config_register(bits: u8) -> u8 {
    ((clamp_resolution(bits) - MIN_RESOLUTION_BITS) << 5) | 0x1F
}

/// Writes alarm thresholds and resolution into the device scratchpad.
pub fn write_resolution(bus: &dyn OneWireBus, rom: &Rom, bits: u8) -> Result<(), BusError> {
    if !bus.reset() {
        return Err(BusError::NoPresence);
    }
    bus.select(rom);
    bus.write_byte(CMD_WRITE_SCRATCHPAD);
    bus.write_byte(ALARM_HIGH);
    bus.write_byte(ALARM_LOW);
    bus.write_byte(config_register(bits));
    Ok(())
}

pub fn start_conversion(bus: &dyn OneWireBus, rom: &Rom) -> Result<(), BusError> {
    if !bus.reset() {
        return Err(BusError::NoPresence);
    }
    bus.select(rom);
    bus.write_byte(CMD_CONVERT_T);
    Ok(())
}

pub fn read_scratchpad(bus: &dyn OneWireBus, rom: &Rom) -> Result<[u8; SCRATCHPAD_LEN], BusError> {
    if !bus.reset() {
        return Err(BusError::NoPresence);
    }
    bus.select(rom);
    bus.write_byte(CMD_READ_SCRATCHPAD);
    let mut pad = [0u8; SCRATCHPAD_LEN];
    for byte in &mut pad {
        *byte = bus.read_byte();
    }
    if pad.iter().all(|&b| b == 0) || pad.iter().all(|&b| b == 0xFF) {
        return Err(BusError::ReadFailed);
    }
    if crc8(&pad[..SCRATCHPAD_LEN - 1]) != pad[SCRATCHPAD_LEN - 1] {
        return Err(BusError::ChecksumMismatch);
    }
    Ok(pad)
}

/// Degrees Celsius from a verified scratchpad. Low bits the resolution
/// leaves undefined are cleared.
pub fn decode_temperature(pad: &[u8; SCRATCHPAD_LEN], bits: u8) -> f32 {
    let raw = i16::from_le_bytes([pad[0], pad[1]]);
    let undefined = MAX_RESOLUTION_BITS - clamp_resolution(bits);
    let masked = raw & !((1i16 << undefined) - 1);
    f32::from(masked) / 16.0
}

/// Builds a scratchpad image with a valid CRC; used by simulated probes.
pub fn encode_scratchpad(celsius: f32, bits: u8) -> [u8; SCRATCHPAD_LEN] {
    let raw = (celsius * 16.0).round() as i16;
    let [lo, hi] = raw.to_le_bytes();
    let mut pad = [lo, hi, ALARM_HIGH, ALARM_LOW, config_register(bits), 0xFF, 0x0C, 0x10, 0];
    pad[SCRATCHPAD_LEN - 1] = crc8(&pad[..SCRATCHPAD_LEN - 1]);
    pad
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_matches_reference_rom() {
        // Family 0x02, serial 0x000001B81C
        let rom: Rom = [0x02, 0x1C, 0xB8, 0x01, 0x00, 0x00, 0x00, 0xA2];
        assert_eq!(crc8(&rom[..7]), 0xA2);
        assert!(rom_is_valid(&rom));
        assert_eq!(crc8(&rom), 0);
    }

    #[test]
    fn conversion_times() {
        assert_eq!(conversion_time(12), Duration::from_millis(750));
        assert_eq!(conversion_time(9), Duration::from_micros(93_750));
        assert_eq!(conversion_time(4), Duration::from_micros(93_750));
    }

    #[test]
    fn config_register_encodes_resolution() {
        assert_eq!(config_register(9), 0x1F);
        assert_eq!(config_register(12), 0x7F);
    }

    #[test]
    fn decodes_positive_and_negative() {
        let pad = encode_scratchpad(25.0625, 12);
        assert_eq!(decode_temperature(&pad, 12), 25.0625);
        // 9 bits keeps half-degree steps only
        assert_eq!(decode_temperature(&pad, 9), 25.0);
        let cold = encode_scratchpad(-10.125, 12);
        assert_eq!(decode_temperature(&cold, 12), -10.125);
    }
}
