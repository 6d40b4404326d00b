//! # S.Port Checksum
//!
//! 8-bit modular sum with end-around carry, accumulated over every packet
//! byte except the leading physical id. A packet is valid when the sum,
//! including the trailing checksum byte, folds to `0xFF`.

use super::protocol::{SPORT_CHECKSUM_VALID, SPORT_PACKET_SIZE};

/// Fold bytes into the running end-around-carry sum
///
/// # Arguments
///
/// * `data` - Bytes to accumulate
///
/// # Returns
///
/// * `u8` - Folded sum
///
/// # Examples
///
/// ```
/// use sport_telemetry::sport::checksum::sport_sum;
///
/// // 0xF0 + 0x20 = 0x110, carry folds back: 0x10 + 0x01
/// assert_eq!(sport_sum(&[0xF0, 0x20]), 0x11);
/// ```
pub fn sport_sum(data: &[u8]) -> u8 {
    let mut crc: u16 = 0;

    for &byte in data {
        crc += u16::from(byte);
        crc += crc >> 8;
        crc &= 0x00FF;
    }

    crc as u8
}

/// Check a deframed packet
///
/// Never fails loudly; callers drop packets that do not validate.
pub fn check_sport_packet(packet: &[u8; SPORT_PACKET_SIZE]) -> bool {
    sport_sum(&packet[1..]) == SPORT_CHECKSUM_VALID
}

/// Write the trailing checksum byte so that the packet validates
pub fn finalize_checksum(packet: &mut [u8; SPORT_PACKET_SIZE]) {
    let sum = sport_sum(&packet[1..SPORT_PACKET_SIZE - 1]);
    packet[SPORT_PACKET_SIZE - 1] = SPORT_CHECKSUM_VALID - sum;
}
