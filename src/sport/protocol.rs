//! # S.Port Protocol Constants and Types
//!
//! Core protocol definitions for the FrSky Smart Port link and the legacy
//! hub identifiers it still carries.

/// Frame start byte on the wire
pub const SPORT_START_BYTE: u8 = 0x7E;

/// Byte-stuffing escape; the following byte is XORed with [`SPORT_STUFF_MASK`]
pub const SPORT_STUFF_BYTE: u8 = 0x7D;

/// XOR mask applied to a stuffed byte
pub const SPORT_STUFF_MASK: u8 = 0x20;

/// Packet size after deframing
/// Packet structure: physical id(1) + frame kind(1) + app id(2) + data(4) + checksum(1)
pub const SPORT_PACKET_SIZE: usize = 9;

/// Value of the checksum accumulator for a valid packet
pub const SPORT_CHECKSUM_VALID: u8 = 0xFF;

/// Frame kind carrying sensor data
pub const SPORT_DATA_FRAME: u8 = 0x10;

/// Reserved application identifiers handled by the link itself
pub const RSSI_ID: u16 = 0xF101;
pub const ADC1_ID: u16 = 0xF102;
pub const ADC2_ID: u16 = 0xF103;
pub const BATT_ID: u16 = 0xF104;
pub const SWR_ID: u16 = 0xF105;

/// Extended identifier ranges (first, last)
pub const ALT_FIRST_ID: u16 = 0x0100;
pub const ALT_LAST_ID: u16 = 0x010F;
pub const VARIO_FIRST_ID: u16 = 0x0110;
pub const VARIO_LAST_ID: u16 = 0x011F;
pub const CURR_FIRST_ID: u16 = 0x0200;
pub const CURR_LAST_ID: u16 = 0x020F;
pub const VFAS_FIRST_ID: u16 = 0x0210;
pub const VFAS_LAST_ID: u16 = 0x021F;
pub const CELLS_FIRST_ID: u16 = 0x0300;
pub const CELLS_LAST_ID: u16 = 0x030F;
pub const T1_FIRST_ID: u16 = 0x0400;
pub const T2_LAST_ID: u16 = 0x041F;
pub const RPM_FIRST_ID: u16 = 0x0500;
pub const RPM_LAST_ID: u16 = 0x050F;
pub const FUEL_FIRST_ID: u16 = 0x0600;
pub const FUEL_LAST_ID: u16 = 0x060F;
pub const ACCX_FIRST_ID: u16 = 0x0700;
pub const ACCX_LAST_ID: u16 = 0x070F;
pub const ACCY_FIRST_ID: u16 = 0x0710;
pub const ACCY_LAST_ID: u16 = 0x071F;
pub const ACCZ_FIRST_ID: u16 = 0x0720;
pub const ACCZ_LAST_ID: u16 = 0x072F;
pub const GPS_LONG_LATI_FIRST_ID: u16 = 0x0800;
pub const GPS_LONG_LATI_LAST_ID: u16 = 0x080F;
pub const GPS_ALT_FIRST_ID: u16 = 0x0820;
pub const GPS_ALT_LAST_ID: u16 = 0x082F;
pub const GPS_SPEED_FIRST_ID: u16 = 0x0830;
pub const GPS_SPEED_LAST_ID: u16 = 0x083F;
pub const GPS_TIME_DATE_FIRST_ID: u16 = 0x0850;
pub const GPS_TIME_DATE_LAST_ID: u16 = 0x085F;
pub const AIR_SPEED_FIRST_ID: u16 = 0x0A00;
pub const AIR_SPEED_LAST_ID: u16 = 0x0A0F;

/// Highest identifier of the legacy single-byte hub protocol
pub const HUB_LAST_ID: u8 = 0x3F;

/// Legacy hub user-data packet header
pub const HUB_USER_PACKET: u8 = 0xFD;

/// Legacy hub stream record delimiter
pub const HUB_START_BYTE: u8 = 0x5E;

/// Legacy hub stream escape; the following byte is XORed with [`HUB_STUFF_MASK`]
pub const HUB_STUFF_BYTE: u8 = 0x5D;

/// XOR mask applied to a stuffed hub byte
pub const HUB_STUFF_MASK: u8 = 0x60;

/// Maximum number of hub data bytes in one user-data packet
pub const HUB_USER_PACKET_MAX_DATA: usize = 7;

/// A deframed S.Port packet
///
/// A plain view over the 9 packet bytes; field accessors decode the
/// little-endian identifier and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SportPacket {
    bytes: [u8; SPORT_PACKET_SIZE],
}

impl SportPacket {
    /// Wrap raw packet bytes
    pub fn new(bytes: [u8; SPORT_PACKET_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a packet from a slice
    ///
    /// # Returns
    ///
    /// * `Option<SportPacket>` - `None` when the slice is not exactly
    ///   [`SPORT_PACKET_SIZE`] bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; SPORT_PACKET_SIZE] = bytes.try_into().ok()?;
        Some(Self { bytes })
    }

    /// Build an unsealed data packet (checksum byte left at zero)
    pub fn data(physical_id: u8, app_id: u16, data: u32) -> Self {
        let mut bytes = [0u8; SPORT_PACKET_SIZE];
        bytes[0] = physical_id;
        bytes[1] = SPORT_DATA_FRAME;
        bytes[2..4].copy_from_slice(&app_id.to_le_bytes());
        bytes[4..8].copy_from_slice(&data.to_le_bytes());
        Self { bytes }
    }

    /// Raw packet bytes
    pub fn as_bytes(&self) -> &[u8; SPORT_PACKET_SIZE] {
        &self.bytes
    }

    /// Mutable raw packet bytes
    pub fn as_bytes_mut(&mut self) -> &mut [u8; SPORT_PACKET_SIZE] {
        &mut self.bytes
    }

    /// Data source (sensor physical id); used as the instance discriminator
    pub fn physical_id(&self) -> u8 {
        self.bytes[0]
    }

    /// Frame kind discriminator
    pub fn frame_kind(&self) -> u8 {
        self.bytes[1]
    }

    /// 16-bit application identifier
    pub fn app_id(&self) -> u16 {
        u16::from_le_bytes([self.bytes[2], self.bytes[3]])
    }

    /// Full 32-bit payload
    pub fn data_u32(&self) -> u32 {
        u32::from_le_bytes([self.bytes[4], self.bytes[5], self.bytes[6], self.bytes[7]])
    }

    /// Full payload as a signed value
    pub fn data_i32(&self) -> i32 {
        self.data_u32() as i32
    }

    /// Low payload byte
    pub fn data_u8(&self) -> u8 {
        self.bytes[4]
    }

    /// Low 16 bits of the payload, as carried by legacy hub identifiers
    pub fn hub_u16(&self) -> u16 {
        u16::from_le_bytes([self.bytes[4], self.bytes[5]])
    }
}
