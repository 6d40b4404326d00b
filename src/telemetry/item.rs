//! # Telemetry Values
//!
//! Runtime state of one sensor slot: current value, running min/max,
//! freshness, and a payload whose shape follows the kind of data the slot
//! receives (plain scalar, battery cells, GPS, date/time).
//!
//! ## Freshness
//!
//! Timestamps are positions on a wrapping cycle counter driven by the
//! periodic tick. A value is fresh while fewer than
//! [`TELEMETRY_FRESH_CYCLES`] cycles elapsed since it was stamped; the tick
//! then marks it [`LastReceived::Old`], which is distinct from never having
//! received anything.

use serde::Serialize;

use super::gps::{dist_from_earth_axis, split_minutes, GpsPosition};
use super::sensor::{InputFlags, TelemetrySensor};
use super::units::TelemetryUnit;

/// Length of the freshness cycle counter
pub const TELEMETRY_VALUE_TIMER_CYCLE: u8 = 200;

/// Cycles after which a value stops being fresh
pub const TELEMETRY_FRESH_CYCLES: u8 = 2;

/// History length of the moving-average filter
pub const TELEMETRY_AVERAGE_COUNT: usize = 3;

/// Cell slots in a multi-cell payload (the index field is 4 bits wide)
pub const TELEMETRY_MAX_CELLS: usize = 16;

/// Last update of a value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LastReceived {
    /// Never received since the last reset
    #[default]
    Unavailable,
    /// Received once, but not refreshed in time
    Old,
    /// Received at this cycle
    At(u8),
}

/// Externally visible freshness state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueState {
    Unavailable,
    Fresh,
    Old,
}

/// Clock and locale needed while updating a value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateContext {
    /// Current position on the freshness cycle
    pub now: u8,
    /// Local time zone offset in hours
    pub timezone: i8,
}

/// One cell voltage in 1/100 V
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CellValue {
    pub value: u16,
    pub present: bool,
}

impl CellValue {
    fn set(&mut self, value: u16) {
        self.value = value;
        self.present = true;
    }
}

/// Battery pack reassembled from several packets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CellsData {
    pub count: u8,
    pub values: [CellValue; TELEMETRY_MAX_CELLS],
}

impl CellsData {
    /// Cells of the declared count
    pub fn cells(&self) -> &[CellValue] {
        &self.values[..usize::from(self.count).min(TELEMETRY_MAX_CELLS)]
    }

    /// Sum of all declared cells, or `None` while any is missing
    pub fn total(&self) -> Option<i32> {
        self.cells()
            .iter()
            .try_fold(0i32, |sum, cell| cell.present.then(|| sum + i32::from(cell.value)))
    }
}

/// GPS sub-record with the pilot reference position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GpsData {
    pub position: GpsPosition,
    pub latitude_ns: Option<char>,
    pub longitude_ew: Option<char>,
    /// Pilot position in micro-degrees, latched with the first full fix
    pub pilot_latitude: u32,
    pub pilot_longitude: u32,
    /// Meters per degree of longitude at the pilot latitude; 0 until latched
    pub dist_from_earth_axis: u32,
}

/// Date/time sub-record; date and time arrive in separate frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateTimeData {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    pub date_received: bool,
    pub time_received: bool,
}

/// Slot payload, shaped by the kind of data the slot receives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemPayload {
    #[default]
    Scalar,
    AutoOffset { offset: i32 },
    Filtered { history: [i32; TELEMETRY_AVERAGE_COUNT] },
    Cells(CellsData),
    Gps(GpsData),
    DateTime(DateTimeData),
}

/// Live value of one sensor slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryItem {
    pub value: i32,
    pub min: i32,
    pub max: i32,
    pub last_received: LastReceived,
    pub payload: ItemPayload,
}

impl TelemetryItem {
    /// Forget everything, back to [`LastReceived::Unavailable`]
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_available(&self) -> bool {
        self.last_received != LastReceived::Unavailable
    }

    pub fn is_old(&self) -> bool {
        self.last_received == LastReceived::Old
    }

    pub fn is_fresh(&self, now: u8) -> bool {
        match self.last_received {
            LastReceived::At(stamp) => cycles_since(now, stamp) < TELEMETRY_FRESH_CYCLES,
            _ => false,
        }
    }

    pub fn state(&self, now: u8) -> ValueState {
        match self.last_received {
            LastReceived::Unavailable => ValueState::Unavailable,
            LastReceived::Old => ValueState::Old,
            LastReceived::At(_) if self.is_fresh(now) => ValueState::Fresh,
            LastReceived::At(_) => ValueState::Old,
        }
    }

    /// Mark the value old once it missed its refresh window
    pub fn age(&mut self, now: u8) {
        if matches!(self.last_received, LastReceived::At(_)) && !self.is_fresh(now) {
            self.last_received = LastReceived::Old;
        }
    }

    /// Mark the value old regardless of its timestamp
    pub fn mark_old(&mut self) {
        self.last_received = LastReceived::Old;
    }

    pub fn cells(&self) -> Option<&CellsData> {
        match &self.payload {
            ItemPayload::Cells(cells) => Some(cells),
            _ => None,
        }
    }

    pub fn gps(&self) -> Option<&GpsData> {
        match &self.payload {
            ItemPayload::Gps(gps) => Some(gps),
            _ => None,
        }
    }

    pub fn datetime(&self) -> Option<&DateTimeData> {
        match &self.payload {
            ItemPayload::DateTime(datetime) => Some(datetime),
            _ => None,
        }
    }

    /// Apply a decoded reading
    ///
    /// # Arguments
    ///
    /// * `sensor` - Configuration of this slot
    /// * `value` - Reading; for cells, GPS and date/time the packed payload
    /// * `unit` / `prec` - Unit and precision the reading was sent in
    /// * `ctx` - Clock and time zone
    ///
    /// Partial reconstructions (cells, GPS, date/time) leave the aggregate
    /// value untouched until they are complete.
    pub fn set_value(
        &mut self,
        sensor: &TelemetrySensor,
        value: i32,
        unit: TelemetryUnit,
        prec: u8,
        ctx: UpdateContext,
    ) {
        let value = match unit {
            TelemetryUnit::Cells => match self.set_cells(sensor, value as u32, prec) {
                Some(value) => value,
                None => return,
            },
            TelemetryUnit::DateTime => {
                if !self.set_datetime(value as u32, ctx.timezone) {
                    return;
                }
                0
            }
            TelemetryUnit::Gps => {
                if self.set_gps(value as u32) {
                    self.last_received = LastReceived::At(ctx.now);
                }
                return;
            }
            _ => self.filter_input(sensor, sensor.get_value(value, unit, prec)),
        };

        if !self.is_available() {
            self.min = value;
            self.max = value;
        } else if value < self.min {
            self.min = value;
        } else if value > self.max {
            self.max = value;
        }

        self.value = value;
        self.last_received = LastReceived::At(ctx.now);
    }

    /// Store one or two cells; returns the pack voltage once complete
    fn set_cells(&mut self, sensor: &TelemetrySensor, data: u32, prec: u8) -> Option<i32> {
        let cell_index = (data & 0x0F) as usize;
        let count = ((data & 0xF0) >> 4) as u8;

        if self.cells().map(|cells| cells.count) != Some(count) {
            self.clear();
            self.payload = ItemPayload::Cells(CellsData {
                count,
                ..Default::default()
            });
        }

        let ItemPayload::Cells(cells) = &mut self.payload else {
            return None;
        };

        cells.values[cell_index].set((((data & 0x000F_FF00) >> 8) / 5) as u16);
        if cell_index + 1 < usize::from(count) {
            cells.values[cell_index + 1].set((((data & 0xFFF0_0000) >> 20) / 5) as u16);
        }

        // Only the packet carrying the last cells may complete the pack
        if cell_index + 2 < usize::from(count) {
            return None;
        }

        let total = cells.total()?;
        Some(sensor.get_value(total, TelemetryUnit::Volts, prec))
    }

    /// Store a date or time sub-frame; true once a valid date is known
    fn set_datetime(&mut self, data: u32, timezone: i8) -> bool {
        if !matches!(self.payload, ItemPayload::DateTime(_)) {
            self.payload = ItemPayload::DateTime(DateTimeData::default());
        }

        let ItemPayload::DateTime(datetime) = &mut self.payload else {
            return false;
        };

        let [flag, low, mid, high] = data.to_le_bytes();
        if flag != 0 {
            datetime.year = high;
            datetime.month = mid;
            datetime.day = low;
            datetime.date_received = true;
        } else {
            datetime.hour = (i32::from(high) + i32::from(timezone) + 24).rem_euclid(24) as u8;
            datetime.min = mid;
            datetime.sec = low;
            datetime.time_received = true;
        }

        datetime.year != 0
    }

    /// Store a latitude or longitude; true once both hemispheres are known
    fn set_gps(&mut self, data: u32) -> bool {
        if !matches!(self.payload, ItemPayload::Gps(_)) {
            self.payload = ItemPayload::Gps(GpsData::default());
        }

        let ItemPayload::Gps(gps) = &mut self.payload else {
            return false;
        };

        let (bp, ap) = split_minutes(data & 0x3FFF_FFFF);
        match data >> 30 {
            0 | 1 => {
                gps.position.latitude_bp = bp;
                gps.position.latitude_ap = ap;
                gps.latitude_ns = Some(if data >> 30 == 0 { 'N' } else { 'S' });
            }
            _ => {
                gps.position.longitude_bp = bp;
                gps.position.longitude_ap = ap;
                gps.longitude_ew = Some(if data >> 30 == 2 { 'E' } else { 'W' });
            }
        }

        if gps.latitude_ns.is_none() || gps.longitude_ew.is_none() {
            return false;
        }

        if gps.dist_from_earth_axis == 0 {
            let (latitude, longitude) = gps.position.to_micro_degrees();
            gps.pilot_latitude = latitude;
            gps.pilot_longitude = longitude;
            gps.dist_from_earth_axis = dist_from_earth_axis(latitude);
        }

        true
    }

    /// Auto-offset and moving-average input processing
    fn filter_input(&mut self, sensor: &TelemetrySensor, mut value: i32) -> i32 {
        let available = self.is_available();

        match sensor.input {
            InputFlags::None => {}
            InputFlags::AutoOffset => {
                let offset = match self.payload {
                    ItemPayload::AutoOffset { offset } if available => offset,
                    _ => -value,
                };
                self.payload = ItemPayload::AutoOffset { offset };
                value += offset;
            }
            InputFlags::Filtering => match &mut self.payload {
                ItemPayload::Filtered { history } if available => {
                    // History plus the new sample, divided by one more than
                    // the history length
                    let mut sum = i64::from(history[0]);
                    for i in 0..TELEMETRY_AVERAGE_COUNT - 1 {
                        history[i] = history[i + 1];
                        sum += i64::from(history[i]);
                    }
                    history[TELEMETRY_AVERAGE_COUNT - 1] = value;
                    sum += i64::from(value);
                    value = (sum / (TELEMETRY_AVERAGE_COUNT as i64 + 1)) as i32;
                }
                payload => {
                    *payload = ItemPayload::Filtered {
                        history: [value; TELEMETRY_AVERAGE_COUNT],
                    };
                }
            },
        }

        value
    }
}

/// Cycles elapsed on the wrapping freshness counter
pub fn cycles_since(now: u8, stamp: u8) -> u8 {
    let cycle = u16::from(TELEMETRY_VALUE_TIMER_CYCLE);
    ((u16::from(now) + cycle - u16::from(stamp) % cycle) % cycle) as u8
}
