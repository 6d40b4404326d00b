//! # Telemetry Units
//!
//! Units carried by sensor values and the integer conversion between them.
//!
//! Values are fixed-point integers: a value `v` with precision `p` means
//! `v / 10^p`. Conversions use fixed rational approximations so that results
//! match the values shown by existing radios bit for bit.

use serde::{Deserialize, Serialize};

/// Semantic unit of a telemetry value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryUnit {
    #[default]
    Raw,
    Volts,
    Amps,
    Milliamps,
    Knots,
    MetersPerSecond,
    FeetPerSecond,
    Kmh,
    Mph,
    Meters,
    Feet,
    Celsius,
    Fahrenheit,
    Percent,
    MilliampHours,
    Watts,
    Db,
    Rpms,
    G,
    Degree,
    /// Multi-cell battery payload; stored as [`TelemetryUnit::Volts`]
    Cells,
    /// Date/time sub-frames
    DateTime,
    /// Latitude/longitude sub-frames
    Gps,
}

impl TelemetryUnit {
    /// Short display suffix
    pub fn symbol(&self) -> &'static str {
        match self {
            TelemetryUnit::Raw => "",
            TelemetryUnit::Volts | TelemetryUnit::Cells => "V",
            TelemetryUnit::Amps => "A",
            TelemetryUnit::Milliamps => "mA",
            TelemetryUnit::Knots => "kts",
            TelemetryUnit::MetersPerSecond => "m/s",
            TelemetryUnit::FeetPerSecond => "f/s",
            TelemetryUnit::Kmh => "kmh",
            TelemetryUnit::Mph => "mph",
            TelemetryUnit::Meters => "m",
            TelemetryUnit::Feet => "ft",
            TelemetryUnit::Celsius => "C",
            TelemetryUnit::Fahrenheit => "F",
            TelemetryUnit::Percent => "%",
            TelemetryUnit::MilliampHours => "mAh",
            TelemetryUnit::Watts => "W",
            TelemetryUnit::Db => "dB",
            TelemetryUnit::Rpms => "rpm",
            TelemetryUnit::G => "g",
            TelemetryUnit::Degree => "deg",
            TelemetryUnit::DateTime | TelemetryUnit::Gps => "",
        }
    }
}

/// Convert a fixed-point value to another unit and precision
///
/// Up-scaling to the destination precision happens before the unit
/// conversion and down-scaling after it. Unknown unit pairs only get their
/// precision adjusted.
///
/// # Arguments
///
/// * `value` - Source value
/// * `unit` / `prec` - Source unit and decimal precision
/// * `dest_unit` / `dest_prec` - Destination unit and decimal precision
///
/// # Examples
///
/// ```
/// use sport_telemetry::telemetry::units::{convert_telemetry_value, TelemetryUnit};
///
/// // 100 m = 328 ft (x105/32)
/// assert_eq!(
///     convert_telemetry_value(100, TelemetryUnit::Meters, 0, TelemetryUnit::Feet, 0),
///     328
/// );
/// ```
pub fn convert_telemetry_value(
    value: i32,
    unit: TelemetryUnit,
    prec: u8,
    dest_unit: TelemetryUnit,
    dest_prec: u8,
) -> i32 {
    let mut value = i64::from(value);

    for _ in prec..dest_prec {
        value *= 10;
    }

    value = match (unit, dest_unit) {
        (TelemetryUnit::Meters, TelemetryUnit::Feet) => (value * 105) / 32,
        (TelemetryUnit::Knots, TelemetryUnit::Kmh) => (value * 1852) / 1000,
        (TelemetryUnit::Knots, TelemetryUnit::Mph) => (value * 23) / 20,
        (TelemetryUnit::Celsius, TelemetryUnit::Fahrenheit) => 32 + (value * 18) / 10,
        _ => value,
    };

    for _ in dest_prec..prec {
        value /= 10;
    }

    value as i32
}
