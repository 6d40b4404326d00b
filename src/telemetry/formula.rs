//! # Calculated Sensors
//!
//! Formula evaluation reads the other slots and yields a [`FormulaOutcome`];
//! the store then applies it to the calculated slot. Keeping evaluation
//! read-only lets a formula look at every slot while its own slot is
//! updated afterwards.

use super::gps::{horizontal_distance_squared, isqrt};
use super::item::TelemetryItem;
use super::sensor::{Formula, TelemetrySensor, CELL_INDEX_HIGHEST, CELL_INDEX_LOWEST, MAX_FORMULA_SOURCES};
use super::units::{convert_telemetry_value, TelemetryUnit};

/// What evaluating a formula asks the store to do with the calculated slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaOutcome {
    /// Leave the slot as it is
    Unchanged,
    /// A required source went stale, propagate
    MarkOld,
    /// Write a new value through the generic update path
    Value {
        value: i32,
        unit: TelemetryUnit,
        prec: u8,
    },
}

/// Read-only view of all slots used during evaluation
pub struct SlotView<'a> {
    pub sensors: &'a [TelemetrySensor],
    pub items: &'a [TelemetryItem],
}

impl<'a> SlotView<'a> {
    fn get(&self, slot: usize) -> Option<(&'a TelemetrySensor, &'a TelemetryItem)> {
        Some((self.sensors.get(slot)?, self.items.get(slot)?))
    }
}

/// Evaluate `formula` for the calculated `sensor`
///
/// # Arguments
///
/// * `formula` - Formula of the calculated slot
/// * `sensor` - Configuration of the calculated slot (destination unit and precision)
/// * `slots` - All slots, including the calculated one
///
/// # Returns
///
/// The outcome to apply; references to unknown slots yield
/// [`FormulaOutcome::Unchanged`].
pub fn evaluate(formula: &Formula, sensor: &TelemetrySensor, slots: &SlotView<'_>) -> FormulaOutcome {
    match formula {
        Formula::Cell { source, index } => eval_cell(*source, *index, slots),
        Formula::Dist { gps, alt } => eval_dist(*gps, *alt, slots),
        Formula::Add { sources } => eval_add(sources, sensor, slots),
        Formula::Multiply { sources } => eval_multiply(sources, sensor, slots),
        Formula::Average { sources } => eval_average(sources, sensor, slots),
    }
}

fn eval_cell(source: usize, index: u8, slots: &SlotView<'_>) -> FormulaOutcome {
    let Some((_, item)) = slots.get(source) else {
        return FormulaOutcome::Unchanged;
    };

    if item.is_old() {
        return FormulaOutcome::MarkOld;
    }

    let Some(cells) = item.cells() else {
        return FormulaOutcome::Unchanged;
    };
    let cells = cells.cells();

    let selected = match index {
        CELL_INDEX_LOWEST | CELL_INDEX_HIGHEST => {
            // Every declared cell must be known to pick an extremum
            if cells.is_empty() || cells.iter().any(|cell| !cell.present) {
                return FormulaOutcome::Unchanged;
            }
            let values = cells.iter().map(|cell| cell.value);
            if index == CELL_INDEX_LOWEST {
                values.min()
            } else {
                values.max()
            }
        }
        _ => cells
            .get(usize::from(index) - 1)
            .filter(|cell| cell.present)
            .map(|cell| cell.value),
    };

    match selected {
        Some(value) => FormulaOutcome::Value {
            value: i32::from(value),
            unit: TelemetryUnit::Volts,
            prec: 2,
        },
        None => FormulaOutcome::Unchanged,
    }
}

fn eval_dist(gps: usize, alt: Option<usize>, slots: &SlotView<'_>) -> FormulaOutcome {
    let Some((_, gps_item)) = slots.get(gps) else {
        return FormulaOutcome::Unchanged;
    };

    if !gps_item.is_available() {
        return FormulaOutcome::Unchanged;
    }
    if gps_item.is_old() {
        return FormulaOutcome::MarkOld;
    }

    let Some(fix) = gps_item.gps() else {
        return FormulaOutcome::Unchanged;
    };
    if fix.pilot_latitude == 0 && fix.pilot_longitude == 0 {
        return FormulaOutcome::Unchanged;
    }

    let mut result = horizontal_distance_squared(
        fix.position.to_micro_degrees(),
        (fix.pilot_latitude, fix.pilot_longitude),
        fix.dist_from_earth_axis,
    );

    if let Some(alt) = alt {
        let Some((alt_sensor, alt_item)) = slots.get(alt) else {
            return FormulaOutcome::Unchanged;
        };
        if !alt_item.is_available() {
            return FormulaOutcome::Unchanged;
        }
        if alt_item.is_old() {
            return FormulaOutcome::MarkOld;
        }

        let mut height = u64::from(alt_item.value.unsigned_abs());
        match alt_sensor.prec {
            0 => {}
            2 => height /= 100,
            _ => height /= 10,
        }
        result += height * height;
    }

    FormulaOutcome::Value {
        value: isqrt(result) as i32,
        unit: TelemetryUnit::Meters,
        prec: 0,
    }
}

/// Sources of Add/Multiply: all must be available and not old
fn required_sources<'a>(
    sources: &[usize],
    slots: &SlotView<'a>,
) -> Result<Vec<(&'a TelemetrySensor, &'a TelemetryItem)>, FormulaOutcome> {
    let mut resolved = Vec::with_capacity(MAX_FORMULA_SOURCES);

    for &source in sources.iter().take(MAX_FORMULA_SOURCES) {
        let Some((sensor, item)) = slots.get(source) else {
            return Err(FormulaOutcome::Unchanged);
        };
        if !item.is_available() {
            return Err(FormulaOutcome::Unchanged);
        }
        if item.is_old() {
            return Err(FormulaOutcome::MarkOld);
        }
        resolved.push((sensor, item));
    }

    Ok(resolved)
}

fn eval_add(sources: &[usize], sensor: &TelemetrySensor, slots: &SlotView<'_>) -> FormulaOutcome {
    let resolved = match required_sources(sources, slots) {
        Ok(resolved) => resolved,
        Err(outcome) => return outcome,
    };

    let sum: i64 = resolved
        .iter()
        .map(|(source, item)| {
            i64::from(convert_telemetry_value(item.value, source.unit, source.prec, sensor.unit, sensor.prec))
        })
        .sum();

    FormulaOutcome::Value {
        value: sum as i32,
        unit: sensor.unit,
        prec: sensor.prec,
    }
}

fn eval_multiply(sources: &[usize], sensor: &TelemetrySensor, slots: &SlotView<'_>) -> FormulaOutcome {
    let resolved = match required_sources(sources, slots) {
        Ok(resolved) => resolved,
        Err(outcome) => return outcome,
    };

    if resolved.is_empty() {
        return FormulaOutcome::Unchanged;
    }

    let mut product: i64 = 1;
    let mut prec: u8 = 0;
    for (source, item) in &resolved {
        prec = prec.saturating_add(source.prec);
        // Unit conversion only; precisions are accumulated instead
        let factor = convert_telemetry_value(item.value, source.unit, 0, sensor.unit, 0);
        product = product.saturating_mul(i64::from(factor));
    }

    let value = product.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    FormulaOutcome::Value {
        value: convert_telemetry_value(value, sensor.unit, prec, sensor.unit, sensor.prec),
        unit: sensor.unit,
        prec: sensor.prec,
    }
}

fn eval_average(sources: &[usize], sensor: &TelemetrySensor, slots: &SlotView<'_>) -> FormulaOutcome {
    let mut sum: i64 = 0;
    let mut count: i64 = 0;
    let mut any_available = false;

    for &source in sources.iter().take(MAX_FORMULA_SOURCES) {
        let Some((source_sensor, item)) = slots.get(source) else {
            continue;
        };
        if !item.is_available() {
            continue;
        }
        any_available = true;
        if item.is_old() {
            continue;
        }

        sum += i64::from(convert_telemetry_value(
            item.value,
            source_sensor.unit,
            source_sensor.prec,
            sensor.unit,
            sensor.prec,
        ));
        count += 1;
    }

    if count == 0 {
        return if any_available {
            FormulaOutcome::MarkOld
        } else {
            FormulaOutcome::Unchanged
        };
    }

    FormulaOutcome::Value {
        value: ((sum + count / 2) / count) as i32,
        unit: sensor.unit,
        prec: sensor.prec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::item::{CellValue, CellsData, GpsData, ItemPayload, LastReceived};
    use crate::telemetry::sensor::SensorKind;

    fn fresh(value: i32) -> TelemetryItem {
        TelemetryItem {
            value,
            min: value,
            max: value,
            last_received: LastReceived::At(0),
            payload: ItemPayload::Scalar,
        }
    }

    fn raw_sensor(unit: TelemetryUnit, prec: u8) -> TelemetrySensor {
        TelemetrySensor {
            id: 0x0100,
            unit,
            prec,
            ..Default::default()
        }
    }

    fn calculated(formula: Formula, unit: TelemetryUnit, prec: u8) -> TelemetrySensor {
        TelemetrySensor {
            unit,
            prec,
            kind: SensorKind::Calculated { formula },
            ..Default::default()
        }
    }

    fn cells_item(values: &[u16], present: &[bool]) -> TelemetryItem {
        let mut cells = CellsData {
            count: values.len() as u8,
            ..Default::default()
        };
        for (i, (value, present)) in values.iter().zip(present).enumerate() {
            cells.values[i] = CellValue {
                value: *value,
                present: *present,
            };
        }
        TelemetryItem {
            last_received: LastReceived::At(0),
            payload: ItemPayload::Cells(cells),
            ..Default::default()
        }
    }

    fn eval(formula: Formula, sensor_unit: TelemetryUnit, sensors: &[TelemetrySensor], items: &[TelemetryItem]) -> FormulaOutcome {
        let sensor = calculated(formula.clone(), sensor_unit, 0);
        evaluate(&formula, &sensor, &SlotView { sensors, items })
    }

    #[test]
    fn test_average_rounds_half_up() {
        let sensors = vec![raw_sensor(TelemetryUnit::Raw, 0); 3];
        let items = vec![fresh(10), fresh(20), fresh(30)];
        let outcome = eval(Formula::Average { sources: vec![0, 1, 2] }, TelemetryUnit::Raw, &sensors, &items);
        assert!(matches!(outcome, FormulaOutcome::Value { value: 20, .. }));

        let items = vec![fresh(10), fresh(11)];
        let outcome = eval(Formula::Average { sources: vec![0, 1] }, TelemetryUnit::Raw, &sensors, &items);
        assert!(matches!(outcome, FormulaOutcome::Value { value: 11, .. }));
    }

    #[test]
    fn test_average_skips_stale_sources() {
        let sensors = vec![raw_sensor(TelemetryUnit::Raw, 0); 3];
        let mut stale = fresh(100);
        stale.last_received = LastReceived::Old;
        let items = vec![fresh(10), stale, TelemetryItem::default()];

        let outcome = eval(Formula::Average { sources: vec![0, 1, 2] }, TelemetryUnit::Raw, &sensors, &items);
        assert!(matches!(outcome, FormulaOutcome::Value { value: 10, .. }));
    }

    #[test]
    fn test_average_marks_old_when_nothing_fresh() {
        let sensors = vec![raw_sensor(TelemetryUnit::Raw, 0); 2];
        let mut stale = fresh(100);
        stale.last_received = LastReceived::Old;

        let items = vec![stale, TelemetryItem::default()];
        let outcome = eval(Formula::Average { sources: vec![0, 1] }, TelemetryUnit::Raw, &sensors, &items);
        assert_eq!(outcome, FormulaOutcome::MarkOld);

        let items = vec![TelemetryItem::default(), TelemetryItem::default()];
        let outcome = eval(Formula::Average { sources: vec![0, 1] }, TelemetryUnit::Raw, &sensors, &items);
        assert_eq!(outcome, FormulaOutcome::Unchanged);
    }

    #[test]
    fn test_add_converts_precision() {
        // 12.34 V (prec 2) + 0.5 V (prec 1) into prec 1
        let sensors = vec![raw_sensor(TelemetryUnit::Volts, 2), raw_sensor(TelemetryUnit::Volts, 1)];
        let items = vec![fresh(1234), fresh(5)];
        let formula = Formula::Add { sources: vec![0, 1] };
        let sensor = calculated(formula.clone(), TelemetryUnit::Volts, 1);

        let outcome = evaluate(&formula, &sensor, &SlotView { sensors: &sensors, items: &items });
        assert!(matches!(outcome, FormulaOutcome::Value { value: 128, prec: 1, .. }));
    }

    #[test]
    fn test_add_propagates_staleness() {
        let sensors = vec![raw_sensor(TelemetryUnit::Raw, 0); 2];
        let mut stale = fresh(5);
        stale.last_received = LastReceived::Old;

        let items = vec![fresh(1), stale];
        assert_eq!(
            eval(Formula::Add { sources: vec![0, 1] }, TelemetryUnit::Raw, &sensors, &items),
            FormulaOutcome::MarkOld
        );

        let items = vec![fresh(1), TelemetryItem::default()];
        assert_eq!(
            eval(Formula::Add { sources: vec![0, 1] }, TelemetryUnit::Raw, &sensors, &items),
            FormulaOutcome::Unchanged
        );
    }

    #[test]
    fn test_multiply_rescales_once() {
        // 12.00 V (prec 2) * 2.5 A (prec 1) = 30.0 W at prec 1
        let sensors = vec![raw_sensor(TelemetryUnit::Volts, 2), raw_sensor(TelemetryUnit::Amps, 1)];
        let items = vec![fresh(1200), fresh(25)];
        let formula = Formula::Multiply { sources: vec![0, 1] };
        let sensor = calculated(formula.clone(), TelemetryUnit::Watts, 1);

        let outcome = evaluate(&formula, &sensor, &SlotView { sensors: &sensors, items: &items });
        assert!(matches!(outcome, FormulaOutcome::Value { value: 300, .. }));
    }

    #[test]
    fn test_cell_extremes() {
        let sensors = vec![raw_sensor(TelemetryUnit::Volts, 2)];
        let items = vec![cells_item(&[418, 408, 415, 420, 410], &[true; 5])];

        let lowest = eval(Formula::Cell { source: 0, index: CELL_INDEX_LOWEST }, TelemetryUnit::Volts, &sensors, &items);
        assert!(matches!(lowest, FormulaOutcome::Value { value: 408, prec: 2, .. }));

        let highest = eval(Formula::Cell { source: 0, index: CELL_INDEX_HIGHEST }, TelemetryUnit::Volts, &sensors, &items);
        assert!(matches!(highest, FormulaOutcome::Value { value: 420, .. }));

        let second = eval(Formula::Cell { source: 0, index: 2 }, TelemetryUnit::Volts, &sensors, &items);
        assert!(matches!(second, FormulaOutcome::Value { value: 408, .. }));
    }

    #[test]
    fn test_cell_withheld_when_partial() {
        let sensors = vec![raw_sensor(TelemetryUnit::Volts, 2)];
        let items = vec![cells_item(&[418, 408, 415, 420, 410], &[true, true, false, true, true])];

        let lowest = eval(Formula::Cell { source: 0, index: CELL_INDEX_LOWEST }, TelemetryUnit::Volts, &sensors, &items);
        assert_eq!(lowest, FormulaOutcome::Unchanged);

        let third = eval(Formula::Cell { source: 0, index: 3 }, TelemetryUnit::Volts, &sensors, &items);
        assert_eq!(third, FormulaOutcome::Unchanged);

        // Index past the declared count
        let sixth = eval(Formula::Cell { source: 0, index: 6 }, TelemetryUnit::Volts, &sensors, &items);
        assert_eq!(sixth, FormulaOutcome::Unchanged);
    }

    #[test]
    fn test_dist_with_altitude() {
        let sensors = vec![raw_sensor(TelemetryUnit::Gps, 0), raw_sensor(TelemetryUnit::Meters, 2)];
        let gps = GpsData {
            position: crate::telemetry::gps::GpsPosition {
                latitude_bp: 4530,
                latitude_ap: 0,
                longitude_bp: 700,
                longitude_ap: 0,
            },
            latitude_ns: Some('N'),
            longitude_ew: Some('E'),
            pilot_latitude: 45_500_000,
            pilot_longitude: 7_000_000,
            dist_from_earth_axis: 78_000,
        };
        let gps_item = TelemetryItem {
            last_received: LastReceived::At(0),
            payload: ItemPayload::Gps(gps),
            ..Default::default()
        };
        // 40.00 m above home
        let items = vec![gps_item, fresh(4000)];

        let outcome = eval(Formula::Dist { gps: 0, alt: Some(1) }, TelemetryUnit::Meters, &sensors, &items);
        assert!(matches!(outcome, FormulaOutcome::Value { value: 40, unit: TelemetryUnit::Meters, .. }));

        let outcome = eval(Formula::Dist { gps: 0, alt: None }, TelemetryUnit::Meters, &sensors, &items);
        assert!(matches!(outcome, FormulaOutcome::Value { value: 0, .. }));
    }

    #[test]
    fn test_dist_waits_for_pilot_position() {
        let sensors = vec![raw_sensor(TelemetryUnit::Gps, 0)];
        let items = vec![TelemetryItem::default()];
        assert_eq!(
            eval(Formula::Dist { gps: 0, alt: None }, TelemetryUnit::Meters, &sensors, &items),
            FormulaOutcome::Unchanged
        );
    }
}
