//! CRC-16/CCITT as used by the command protocol's optional `$xxxx` framing.
//!
//! Reflected polynomial 0x8408, seed 0xFFFF, no final XOR - the same update
//! step as avr-libc's `_crc_ccitt_update()`, so packets checksummed by
//! existing host tools verify unchanged.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

/// Seed value for a new CRC.
pub const CRC_INITIAL: u16 = 0xFFFF;

/// Fold one byte into a running CRC.
pub fn crc_ccitt_update(crc: u16, data: u8) -> u16 {
    let mut data = data ^ (crc as u8);
    data ^= data << 4;

    (((data as u16) << 8) | (crc >> 8)) ^ ((data >> 4) as u16) ^ ((data as u16) << 3)
}

/// CRC of a complete buffer.
pub fn checksum(data: &[u8]) -> u16 {
    data.iter()
        .fold(CRC_INITIAL, |crc, &byte| crc_ccitt_update(crc, byte))
}
