//! # S.Port Sensor Descriptors
//!
//! Compile-time table mapping extended identifier ranges to a name, unit and
//! display precision.

use super::protocol::*;
use crate::telemetry::units::TelemetryUnit;

/// Descriptor for a range of extended identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SportSensor {
    pub first_id: u16,
    pub last_id: u16,
    pub name: &'static str,
    pub unit: TelemetryUnit,
    pub prec: u8,
}

const fn sensor(
    first_id: u16,
    last_id: u16,
    name: &'static str,
    unit: TelemetryUnit,
    prec: u8,
) -> SportSensor {
    SportSensor {
        first_id,
        last_id,
        name,
        unit,
        prec,
    }
}

/// Known extended sensors, first match wins
pub const SPORT_SENSORS: &[SportSensor] = &[
    sensor(RSSI_ID, RSSI_ID, "RSSI", TelemetryUnit::Raw, 0),
    sensor(T1_FIRST_ID, T2_LAST_ID, "Tmp", TelemetryUnit::Celsius, 0),
    sensor(RPM_FIRST_ID, RPM_LAST_ID, "RPM", TelemetryUnit::Rpms, 0),
    sensor(FUEL_FIRST_ID, FUEL_LAST_ID, "Fuel", TelemetryUnit::Percent, 0),
    sensor(ALT_FIRST_ID, ALT_LAST_ID, "Alt", TelemetryUnit::Meters, 2),
    sensor(VARIO_FIRST_ID, VARIO_LAST_ID, "VSpd", TelemetryUnit::MetersPerSecond, 2),
    sensor(ACCX_FIRST_ID, ACCX_LAST_ID, "AccX", TelemetryUnit::G, 2),
    sensor(ACCY_FIRST_ID, ACCY_LAST_ID, "AccY", TelemetryUnit::G, 2),
    sensor(ACCZ_FIRST_ID, ACCZ_LAST_ID, "AccZ", TelemetryUnit::G, 2),
    sensor(CURR_FIRST_ID, CURR_LAST_ID, "Curr", TelemetryUnit::Amps, 1),
    sensor(VFAS_FIRST_ID, VFAS_LAST_ID, "VFAS", TelemetryUnit::Volts, 2),
    sensor(AIR_SPEED_FIRST_ID, AIR_SPEED_LAST_ID, "ASpd", TelemetryUnit::MetersPerSecond, 1),
    sensor(GPS_SPEED_FIRST_ID, GPS_SPEED_LAST_ID, "GSpd", TelemetryUnit::Knots, 3),
    sensor(CELLS_FIRST_ID, CELLS_LAST_ID, "Cels", TelemetryUnit::Cells, 2),
    sensor(GPS_ALT_FIRST_ID, GPS_ALT_LAST_ID, "GAlt", TelemetryUnit::Meters, 2),
    sensor(GPS_TIME_DATE_FIRST_ID, GPS_TIME_DATE_LAST_ID, "Date", TelemetryUnit::DateTime, 0),
    sensor(GPS_LONG_LATI_FIRST_ID, GPS_LONG_LATI_LAST_ID, "GPS", TelemetryUnit::Gps, 0),
];

/// Look up the descriptor covering `id`
///
/// # Examples
///
/// ```
/// use sport_telemetry::sport::sensors::get_sport_sensor;
///
/// let sensor = get_sport_sensor(0x0210).unwrap();
/// assert_eq!(sensor.name, "VFAS");
/// assert!(get_sport_sensor(0x5000).is_none());
/// ```
pub fn get_sport_sensor(id: u16) -> Option<&'static SportSensor> {
    SPORT_SENSORS
        .iter()
        .find(|sensor| id >= sensor.first_id && id <= sensor.last_id)
}
