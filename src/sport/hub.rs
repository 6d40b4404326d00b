//! # Legacy Hub Protocol
//!
//! Decoder for the single-byte identifier protocol of the older FrSky
//! sensor hub. Values reach it two ways:
//! - S.Port data frames whose application id is below `0x0100`
//! - the hub byte stream carried in D-link user-data packets
//!
//! Each identifier maps to one field of [`HubData`]; some fields trigger
//! derived updates (maxima, offsets, GPS distance, cell statistics).

use tracing::trace;

use super::protocol::{
    HUB_LAST_ID, HUB_START_BYTE, HUB_STUFF_BYTE, HUB_STUFF_MASK, HUB_USER_PACKET, HUB_USER_PACKET_MAX_DATA,
};
use crate::telemetry::gps::{dist_from_earth_axis, horizontal_distance_squared, isqrt, GpsPosition};

/// Highest legacy cell index
pub const HUB_MAX_CELLS: usize = 12;

/// Legacy hub identifiers
pub mod ids {
    pub const GPS_ALT_BP_ID: u8 = 0x01;
    pub const TEMP1_ID: u8 = 0x02;
    pub const RPM_ID: u8 = 0x03;
    pub const FUEL_ID: u8 = 0x04;
    pub const TEMP2_ID: u8 = 0x05;
    pub const VOLTS_ID: u8 = 0x06;
    pub const GPS_ALT_AP_ID: u8 = 0x09;
    pub const BARO_ALT_BP_ID: u8 = 0x10;
    pub const GPS_SPEED_BP_ID: u8 = 0x11;
    pub const GPS_LONG_BP_ID: u8 = 0x12;
    pub const GPS_LAT_BP_ID: u8 = 0x13;
    pub const GPS_COURS_BP_ID: u8 = 0x14;
    pub const GPS_DAY_MONTH_ID: u8 = 0x15;
    pub const GPS_YEAR_ID: u8 = 0x16;
    pub const GPS_HOUR_MIN_ID: u8 = 0x17;
    pub const GPS_SEC_ID: u8 = 0x18;
    pub const GPS_SPEED_AP_ID: u8 = 0x19;
    pub const GPS_LONG_AP_ID: u8 = 0x1A;
    pub const GPS_LAT_AP_ID: u8 = 0x1B;
    pub const GPS_COURS_AP_ID: u8 = 0x1C;
    pub const BARO_ALT_AP_ID: u8 = 0x21;
    pub const GPS_LONG_EW_ID: u8 = 0x22;
    pub const GPS_LAT_NS_ID: u8 = 0x23;
    pub const ACCEL_X_ID: u8 = 0x24;
    pub const ACCEL_Y_ID: u8 = 0x25;
    pub const ACCEL_Z_ID: u8 = 0x26;
    pub const CURRENT_ID: u8 = 0x28;
    pub const VARIO_ID: u8 = 0x30;
    pub const VFAS_ID: u8 = 0x39;
    pub const VOLTS_BP_ID: u8 = 0x3A;
    pub const VOLTS_AP_ID: u8 = 0x3B;
}

use ids::*;

/// Field addressed by a legacy identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubField {
    GpsAltitudeBp,
    Temperature1,
    Rpm,
    FuelLevel,
    Temperature2,
    Volts,
    GpsAltitudeAp,
    BaroAltitudeBp,
    GpsSpeedBp,
    GpsLongitudeBp,
    GpsLatitudeBp,
    GpsCourseBp,
    DayMonth,
    Year,
    HourMin,
    Sec,
    GpsSpeedAp,
    GpsLongitudeAp,
    GpsLatitudeAp,
    GpsCourseAp,
    BaroAltitudeAp,
    GpsLongitudeEw,
    GpsLatitudeNs,
    AccelX,
    AccelY,
    AccelZ,
    Current,
    VarioSpeed,
    Vfas,
    VoltsBp,
    VoltsAp,
}

impl HubField {
    /// Map a legacy identifier to its field
    pub fn from_id(id: u8) -> Option<Self> {
        let field = match id {
            GPS_ALT_BP_ID => HubField::GpsAltitudeBp,
            TEMP1_ID => HubField::Temperature1,
            RPM_ID => HubField::Rpm,
            FUEL_ID => HubField::FuelLevel,
            TEMP2_ID => HubField::Temperature2,
            VOLTS_ID => HubField::Volts,
            GPS_ALT_AP_ID => HubField::GpsAltitudeAp,
            BARO_ALT_BP_ID => HubField::BaroAltitudeBp,
            GPS_SPEED_BP_ID => HubField::GpsSpeedBp,
            GPS_LONG_BP_ID => HubField::GpsLongitudeBp,
            GPS_LAT_BP_ID => HubField::GpsLatitudeBp,
            GPS_COURS_BP_ID => HubField::GpsCourseBp,
            GPS_DAY_MONTH_ID => HubField::DayMonth,
            GPS_YEAR_ID => HubField::Year,
            GPS_HOUR_MIN_ID => HubField::HourMin,
            GPS_SEC_ID => HubField::Sec,
            GPS_SPEED_AP_ID => HubField::GpsSpeedAp,
            GPS_LONG_AP_ID => HubField::GpsLongitudeAp,
            GPS_LAT_AP_ID => HubField::GpsLatitudeAp,
            GPS_COURS_AP_ID => HubField::GpsCourseAp,
            BARO_ALT_AP_ID => HubField::BaroAltitudeAp,
            GPS_LONG_EW_ID => HubField::GpsLongitudeEw,
            GPS_LAT_NS_ID => HubField::GpsLatitudeNs,
            ACCEL_X_ID => HubField::AccelX,
            ACCEL_Y_ID => HubField::AccelY,
            ACCEL_Z_ID => HubField::AccelZ,
            CURRENT_ID => HubField::Current,
            VARIO_ID => HubField::VarioSpeed,
            VFAS_ID => HubField::Vfas,
            VOLTS_BP_ID => HubField::VoltsBp,
            VOLTS_AP_ID => HubField::VoltsAp,
            _ => return None,
        };
        Some(field)
    }

    /// GPS-derived fields are dropped while no fix is held
    fn needs_fix(id: u8) -> bool {
        id == GPS_ALT_BP_ID || ((GPS_ALT_AP_ID..=GPS_LAT_NS_ID).contains(&id) && id != BARO_ALT_BP_ID && id != BARO_ALT_AP_ID)
    }
}

/// Model settings used by derived hub values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubSettings {
    /// Propeller blades code; RPM is scaled by `60 / (blades + 2)`
    pub blades: u8,
    /// Current sensor offset in tenths of an amp
    pub fas_offset: i16,
    /// Local time zone offset in hours
    pub timezone: i8,
}

/// Decoded legacy hub record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubData {
    pub gps_altitude_bp: i16,
    pub temperature1: i16,
    pub rpm: u16,
    pub fuel_level: u16,
    pub temperature2: i16,
    pub volts: u16,
    pub gps_altitude_ap: u16,
    pub baro_altitude_bp: i16,
    pub gps_speed_bp: u16,
    pub gps_longitude_bp: u16,
    pub gps_latitude_bp: u16,
    pub gps_course_bp: u16,
    pub day: u8,
    pub month: u8,
    pub year: u16,
    pub hour: u8,
    pub min: u8,
    pub sec: u16,
    pub gps_speed_ap: u16,
    pub gps_longitude_ap: u16,
    pub gps_latitude_ap: u16,
    pub gps_course_ap: u16,
    pub baro_altitude_ap: u16,
    pub gps_longitude_ew: u8,
    pub gps_latitude_ns: u8,
    pub accel_x: i16,
    pub accel_y: i16,
    pub accel_z: i16,
    pub current: u16,
    pub vario_speed: i16,
    pub vfas: u16,
    pub volts_bp: u16,
    pub volts_ap: u16,

    pub gps_fix: bool,
    pub max_rpm: u16,
    pub max_temperature1: i16,
    pub max_temperature2: i16,
    pub max_current: u16,
    pub min_vfas: u16,

    pub vario_high_precision: bool,
    pub baro_altitude_offset: Option<i32>,
    /// Relative barometric altitude in 1/100 m
    pub baro_altitude: i32,
    /// Relative altitude extremes in meters
    pub min_altitude: i32,
    pub max_altitude: i32,

    /// Absolute GPS altitude in 1/100 m
    pub gps_altitude: i32,
    pub gps_altitude_offset: Option<i32>,
    pub max_gps_speed: u16,

    pub pilot_latitude: u32,
    pub pilot_longitude: u32,
    pub dist_from_earth_axis: u32,
    pub gps_distance_needed: bool,
    pub gps_distance: u32,
    pub max_gps_distance: u32,

    pub cells_count: u8,
    /// Cell voltages in 1/100 V
    pub cell_volts: [u16; HUB_MAX_CELLS],
    pub cells_sum: u16,
    /// Lowest total seen since the pack size last changed, 0 until known
    pub min_cells_sum: u16,
    pub min_cell_volts: u16,
    pub min_cell: u16,
}

impl HubData {
    /// Apply one legacy (identifier, value) pair
    ///
    /// # Arguments
    ///
    /// * `id` - Legacy identifier, ignored above `0x3F`
    /// * `value` - Raw 16-bit value
    /// * `settings` - Model settings for derived values
    pub fn process_hub_packet(&mut self, id: u8, value: u16, settings: &HubSettings) {
        if id > HUB_LAST_ID {
            return;
        }

        if id == GPS_LAT_BP_ID {
            self.update_fix(value, self.gps_latitude_bp);
        } else if id == GPS_LONG_BP_ID {
            self.update_fix(value, self.gps_longitude_bp);
        }

        if HubField::needs_fix(id) && !self.gps_fix {
            trace!("Hub id {:#04x} discarded without GPS fix", id);
            return;
        }

        let Some(field) = HubField::from_id(id) else {
            trace!("Hub id {:#04x} not mapped", id);
            return;
        };

        self.store(field, value);
        self.derive(field, settings);
    }

    fn update_fix(&mut self, value: u16, previous: u16) {
        if value != 0 {
            self.gps_fix = true;
        } else if self.gps_fix && previous > 1 {
            self.gps_fix = false;
        }
    }

    fn store(&mut self, field: HubField, value: u16) {
        let [low, high] = value.to_le_bytes();
        match field {
            HubField::GpsAltitudeBp => self.gps_altitude_bp = value as i16,
            HubField::Temperature1 => self.temperature1 = value as i16,
            HubField::Rpm => self.rpm = value,
            HubField::FuelLevel => self.fuel_level = value,
            HubField::Temperature2 => self.temperature2 = value as i16,
            HubField::Volts => self.volts = value,
            HubField::GpsAltitudeAp => self.gps_altitude_ap = value,
            HubField::BaroAltitudeBp => self.baro_altitude_bp = value as i16,
            HubField::GpsSpeedBp => self.gps_speed_bp = value,
            HubField::GpsLongitudeBp => self.gps_longitude_bp = value,
            HubField::GpsLatitudeBp => self.gps_latitude_bp = value,
            HubField::GpsCourseBp => self.gps_course_bp = value,
            HubField::DayMonth => {
                self.day = low;
                self.month = high;
            }
            HubField::Year => self.year = value,
            HubField::HourMin => {
                self.hour = low;
                self.min = high;
            }
            HubField::Sec => self.sec = value,
            HubField::GpsSpeedAp => self.gps_speed_ap = value,
            HubField::GpsLongitudeAp => self.gps_longitude_ap = value,
            HubField::GpsLatitudeAp => self.gps_latitude_ap = value,
            HubField::GpsCourseAp => self.gps_course_ap = value,
            HubField::BaroAltitudeAp => self.baro_altitude_ap = value,
            HubField::GpsLongitudeEw => self.gps_longitude_ew = low,
            HubField::GpsLatitudeNs => self.gps_latitude_ns = low,
            HubField::AccelX => self.accel_x = value as i16,
            HubField::AccelY => self.accel_y = value as i16,
            HubField::AccelZ => self.accel_z = value as i16,
            HubField::Current => self.current = value,
            HubField::VarioSpeed => self.vario_speed = value as i16,
            HubField::Vfas => self.vfas = value,
            HubField::VoltsBp => self.volts_bp = value,
            HubField::VoltsAp => self.volts_ap = value,
        }
    }

    fn derive(&mut self, field: HubField, settings: &HubSettings) {
        match field {
            HubField::Rpm => {
                let factor = 60 / (u16::from(settings.blades) + 2);
                self.rpm = self.rpm.wrapping_mul(factor);
                self.max_rpm = self.max_rpm.max(self.rpm);
            }
            HubField::Temperature1 => self.max_temperature1 = self.max_temperature1.max(self.temperature1),
            HubField::Temperature2 => self.max_temperature2 = self.max_temperature2.max(self.temperature2),
            HubField::Current => {
                let current = self.current as i16;
                if current > 0 && i32::from(current) + i32::from(settings.fas_offset) > 0 {
                    self.current = self.current.wrapping_add_signed(settings.fas_offset);
                } else {
                    self.current = 0;
                }
                self.max_current = self.max_current.max(self.current);
            }
            HubField::VoltsAp => {
                let volts = (u32::from(self.volts_bp) * 100 + u32::from(self.volts_ap) * 10) * 21 / 110;
                self.vfas = volts as u16;
                if self.min_vfas == 0 || self.vfas < self.min_vfas {
                    self.min_vfas = self.vfas;
                }
            }
            HubField::BaroAltitudeAp => {
                if self.baro_altitude_ap > 9 {
                    self.vario_high_precision = true;
                }
                if !self.vario_high_precision {
                    self.baro_altitude_ap = self.baro_altitude_ap.wrapping_mul(10);
                }
                let bp = i32::from(self.baro_altitude_bp);
                let ap = i32::from(self.baro_altitude_ap);
                self.set_baro_altitude(100 * bp + if bp >= 0 { ap } else { -ap });
            }
            HubField::GpsAltitudeAp => self.update_gps_altitude(),
            HubField::GpsSpeedBp => self.max_gps_speed = self.max_gps_speed.max(self.gps_speed_bp),
            HubField::Volts => self.update_cells(),
            HubField::HourMin => {
                self.hour = (i32::from(self.hour) + i32::from(settings.timezone) + 24).rem_euclid(24) as u8;
            }
            HubField::AccelX => self.accel_x /= 10,
            HubField::AccelY => self.accel_y /= 10,
            HubField::AccelZ => self.accel_z /= 10,
            _ => {}
        }
    }

    fn set_baro_altitude(&mut self, altitude: i32) {
        // First reading is the zero point
        let offset = *self.baro_altitude_offset.get_or_insert(-altitude);
        self.baro_altitude = altitude + offset;

        let meters = self.baro_altitude / 100;
        self.max_altitude = self.max_altitude.max(meters);
        self.min_altitude = self.min_altitude.min(meters);
    }

    /// Current position in `DDDMM` + fraction form
    pub fn gps_position(&self) -> GpsPosition {
        GpsPosition {
            latitude_bp: u32::from(self.gps_latitude_bp),
            latitude_ap: u32::from(self.gps_latitude_ap),
            longitude_bp: u32::from(self.gps_longitude_bp),
            longitude_ap: u32::from(self.gps_longitude_ap),
        }
    }

    /// GPS altitude relative to the first reading, in meters
    pub fn relative_gps_altitude(&self) -> i32 {
        (self.gps_altitude + self.gps_altitude_offset.unwrap_or(0)) / 100
    }

    fn update_gps_altitude(&mut self) {
        self.gps_altitude = i32::from(self.gps_altitude_bp) * 100 + i32::from(self.gps_altitude_ap);
        let gps_altitude = self.gps_altitude;
        self.gps_altitude_offset.get_or_insert(-gps_altitude);

        if self.baro_altitude_offset.is_none() {
            let altitude = self.relative_gps_altitude();
            self.max_altitude = self.max_altitude.max(altitude);
            self.min_altitude = self.min_altitude.min(altitude);
        }

        if self.pilot_latitude == 0 && self.pilot_longitude == 0 {
            let (latitude, longitude) = self.gps_position().to_micro_degrees();
            self.pilot_latitude = latitude;
            self.pilot_longitude = longitude;
            self.dist_from_earth_axis = dist_from_earth_axis(latitude);
        } else if self.gps_distance_needed {
            self.update_gps_distance();
        }
    }

    fn update_gps_distance(&mut self) {
        let mut result = horizontal_distance_squared(
            self.gps_position().to_micro_degrees(),
            (self.pilot_latitude, self.pilot_longitude),
            self.dist_from_earth_axis,
        );

        let height = if self.baro_altitude_offset.is_some() {
            self.baro_altitude / 100
        } else {
            self.relative_gps_altitude()
        };
        let height = u64::from(height.unsigned_abs());
        result += height * height;

        self.gps_distance = isqrt(result);
        self.max_gps_distance = self.max_gps_distance.max(self.gps_distance);
    }

    fn update_cells(&mut self) {
        let index = usize::from((self.volts & 0x00F0) >> 4);
        if index >= HUB_MAX_CELLS {
            return;
        }

        // 12-bit reading split around the index nibble, 2 mV per step
        let raw = ((self.volts & 0xFF00) >> 8) | ((self.volts & 0x000F) << 8);
        self.cell_volts[index] = raw / 5;

        let count = index as u8 + 1;
        let grown = self.cells_count < count;
        if grown {
            self.cells_count = count;
            self.min_cells_sum = 0;
        }

        let cells = &self.cell_volts[..usize::from(self.cells_count)];
        self.cells_sum = cells.iter().sum();
        // A growing pack only reports partial totals
        if !grown && (self.min_cells_sum == 0 || self.cells_sum < self.min_cells_sum) {
            self.min_cells_sum = self.cells_sum;
        }
        self.min_cell_volts = cells.iter().copied().filter(|&v| v != 0).min().unwrap_or(0);
        if self.min_cell_volts != 0 && (self.min_cell == 0 || self.min_cell_volts < self.min_cell) {
            self.min_cell = self.min_cell_volts;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum HubState {
    #[default]
    Idle,
    DataId,
    DataLow,
    DataHigh,
}

/// Hub byte-stream parser
///
/// Records are `0x5E id low high`; `0x5D x` stands for `x ^ 0x60`. The state
/// persists across user-data packets, a record may span two of them.
#[derive(Debug, Clone, Default)]
pub struct HubParser {
    state: HubState,
    escaped: bool,
    id: u8,
    low: u8,
}

impl HubParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stream byte
    ///
    /// # Returns
    ///
    /// * `Option<(u8, u16)>` - A completed (identifier, value) record
    pub fn feed(&mut self, byte: u8) -> Option<(u8, u16)> {
        if byte == HUB_START_BYTE {
            self.state = HubState::DataId;
            self.escaped = false;
            return None;
        }

        if self.state == HubState::Idle {
            return None;
        }

        let byte = if self.escaped {
            self.escaped = false;
            byte ^ HUB_STUFF_MASK
        } else if byte == HUB_STUFF_BYTE {
            self.escaped = true;
            return None;
        } else {
            byte
        };

        match self.state {
            HubState::Idle => None,
            HubState::DataId => {
                if byte > HUB_LAST_ID {
                    self.state = HubState::Idle;
                } else {
                    self.id = byte;
                    self.state = HubState::DataLow;
                }
                None
            }
            HubState::DataLow => {
                self.low = byte;
                self.state = HubState::DataHigh;
                None
            }
            HubState::DataHigh => {
                self.state = HubState::Idle;
                Some((self.id, u16::from_le_bytes([self.low, byte])))
            }
        }
    }

    /// Feed the hub bytes of a D-link user-data packet
    ///
    /// Layout: `0xFD`, length, unused, then up to 7 hub bytes. Other packet
    /// types are ignored.
    ///
    /// # Arguments
    ///
    /// * `packet` - Received link packet
    /// * `on_record` - Called for every completed record
    pub fn feed_user_packet<F: FnMut(u8, u16)>(&mut self, packet: &[u8], mut on_record: F) {
        if packet.first() != Some(&HUB_USER_PACKET) || packet.len() < 3 {
            return;
        }

        let len = usize::from(packet[1]) & HUB_USER_PACKET_MAX_DATA;
        let end = (3 + len).min(packet.len());
        for &byte in &packet[3..end] {
            if let Some((id, value)) = self.feed(byte) {
                on_record(id, value);
            }
        }
    }

    /// Drop any partial record
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
