//! # GPS Fixed-Point Helpers
//!
//! Positions are carried as `DDDMM` whole parts (degrees * 100 + minutes)
//! plus a 1/10000 minute fraction. Distances use a flat-earth approximation
//! around the pilot position, entirely in integer arithmetic.

use serde::Serialize;

/// Meters per degree of latitude
pub const EARTH_RADIUS: u64 = 111_194;

/// One GPS position in `DDDMM` + 1/10000 minute form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GpsPosition {
    pub latitude_bp: u32,
    pub latitude_ap: u32,
    pub longitude_bp: u32,
    pub longitude_ap: u32,
}

impl GpsPosition {
    /// Latitude and longitude in micro-degrees
    ///
    /// # Examples
    ///
    /// ```
    /// use sport_telemetry::telemetry::gps::GpsPosition;
    ///
    /// // 45 deg 30.0000' = 45.5 deg
    /// let position = GpsPosition { latitude_bp: 4530, latitude_ap: 0, longitude_bp: 0, longitude_ap: 0 };
    /// assert_eq!(position.to_micro_degrees().0, 45_500_000);
    /// ```
    pub fn to_micro_degrees(&self) -> (u32, u32) {
        (
            micro_degrees(self.latitude_bp, self.latitude_ap),
            micro_degrees(self.longitude_bp, self.longitude_ap),
        )
    }
}

fn micro_degrees(bp: u32, ap: u32) -> u32 {
    let degrees = u64::from(bp / 100);
    let minutes = u64::from(bp % 100);
    (degrees * 1_000_000 + ((minutes * 10_000 + u64::from(ap)) * 5) / 3) as u32
}

/// Split a raw minute-of-arc reading (1/10000 minute) into `DDDMM` and fraction
pub fn split_minutes(raw: u32) -> (u32, u32) {
    let whole = raw / 10_000;
    let fraction = raw % 10_000;
    ((whole / 60 * 100) + (whole % 60), fraction)
}

/// Meters per degree of longitude at the given latitude (micro-degrees)
///
/// Cosine comes from a truncated Taylor series, good for the latitudes
/// people fly at.
pub fn dist_from_earth_axis(latitude: u32) -> u32 {
    let lat = u64::from(latitude / 10_000);
    let angle2 = (lat * lat) / 10_000;
    let angle4 = angle2 * angle2;
    let cos = (10_000_000u64 + angle4 / 25).saturating_sub((angle2 * 123_370) / 81);
    (139 * (cos / 12_500)) as u32
}

/// Squared horizontal distance in meters between a position and the pilot
pub fn horizontal_distance_squared(
    position: (u32, u32),
    pilot: (u32, u32),
    dist_from_earth_axis: u32,
) -> u64 {
    let (latitude, longitude) = position;
    let (pilot_latitude, pilot_longitude) = pilot;

    let angle = u64::from(latitude.abs_diff(pilot_latitude));
    let dist = EARTH_RADIUS * angle / 1_000_000;
    let mut result = dist * dist;

    let angle = u64::from(longitude.abs_diff(pilot_longitude));
    let dist = u64::from(dist_from_earth_axis) * angle / 1_000_000;
    result += dist * dist;

    result
}

/// Integer square root, rounded down
pub fn isqrt(value: u64) -> u32 {
    if value < 2 {
        return value as u32;
    }

    // Newton iteration from an upper bound
    let mut x = value;
    let mut y = x / 2 + (x & 1);
    while y < x {
        x = y;
        y = (x + value / x) / 2;
    }

    x as u32
}
