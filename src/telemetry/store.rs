//! # Telemetry Value Store
//!
//! Owns the sensor registry, one [`TelemetryItem`] per slot and the
//! freshness clock. Decoders write through [`TelemetryStore::set_telemetry_value`];
//! display, alarm and logging code reads through [`TelemetryStore::readings`].

use serde::Serialize;
use tracing::trace;

use super::formula::{evaluate, FormulaOutcome, SlotView};
use super::item::{TelemetryItem, UpdateContext, ValueState, TELEMETRY_VALUE_TIMER_CYCLE};
use super::registry::{SensorRegistry, TelemetryProtocol, MAX_SENSORS};
use super::sensor::TelemetrySensor;
use super::units::TelemetryUnit;
use crate::error::Result;

/// Read-only view of one occupied slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorReading {
    pub index: usize,
    pub label: String,
    pub unit: TelemetryUnit,
    pub prec: u8,
    pub value: i32,
    pub min: i32,
    pub max: i32,
    pub state: ValueState,
}

/// Live values of all sensor slots
#[derive(Debug, Clone)]
pub struct TelemetryStore {
    registry: SensorRegistry,
    items: Vec<TelemetryItem>,
    clock: u8,
    timezone: i8,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new(SensorRegistry::new(), 0)
    }
}

impl TelemetryStore {
    /// Create a store over a registry
    ///
    /// # Arguments
    ///
    /// * `registry` - Sensor configuration
    /// * `timezone` - Hours added to received GPS times
    pub fn new(registry: SensorRegistry, timezone: i8) -> Self {
        Self {
            registry,
            items: vec![TelemetryItem::default(); MAX_SENSORS],
            clock: 0,
            timezone,
        }
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SensorRegistry {
        &mut self.registry
    }

    pub fn items(&self) -> &[TelemetryItem] {
        &self.items
    }

    pub fn item(&self, slot: usize) -> Option<&TelemetryItem> {
        self.items.get(slot)
    }

    /// Current position on the freshness cycle
    pub fn now(&self) -> u8 {
        self.clock
    }

    fn context(&self) -> UpdateContext {
        UpdateContext {
            now: self.clock,
            timezone: self.timezone,
        }
    }

    /// Route a decoded reading to the slot configured for its identity
    ///
    /// Unknown identities are provisioned into the first free slot. When the
    /// table is full the reading is dropped.
    pub fn set_telemetry_value(
        &mut self,
        protocol: TelemetryProtocol,
        id: u16,
        instance: u8,
        value: i32,
        unit: TelemetryUnit,
        prec: u8,
    ) {
        let Some(slot) = self.registry.resolve_slot(protocol, id, instance) else {
            return;
        };

        trace!("Slot {} <- {:04X}/{} = {}", slot, id, instance, value);
        let ctx = self.context();
        let sensor = &self.registry.sensors()[slot];
        self.items[slot].set_value(sensor, value, unit, prec, ctx);
    }

    /// Re-evaluate every calculated slot once, in slot order
    pub fn evaluate_calculated(&mut self) {
        let ctx = self.context();

        for slot in 0..MAX_SENSORS {
            let sensors = self.registry.sensors();
            let Some(formula) = sensors[slot].formula() else {
                continue;
            };

            let view = SlotView {
                sensors,
                items: &self.items,
            };

            match evaluate(formula, &sensors[slot], &view) {
                FormulaOutcome::Value { value, unit, prec } => {
                    self.items[slot].set_value(&sensors[slot], value, unit, prec, ctx);
                }
                FormulaOutcome::MarkOld => self.items[slot].mark_old(),
                FormulaOutcome::Unchanged => {}
            }
        }
    }

    /// Advance the freshness clock by one cycle
    ///
    /// Values that missed their refresh window turn old, then calculated
    /// sensors are re-evaluated so staleness propagates.
    pub fn tick(&mut self) {
        self.clock = (self.clock + 1) % TELEMETRY_VALUE_TIMER_CYCLE;

        let now = self.clock;
        for item in &mut self.items {
            item.age(now);
        }

        self.evaluate_calculated();
    }

    /// Replace a slot's configuration and forget its value
    ///
    /// # Errors
    ///
    /// See [`SensorRegistry::configure_sensor`].
    pub fn configure_sensor(&mut self, slot: usize, sensor: TelemetrySensor) -> Result<()> {
        self.registry.configure_sensor(slot, sensor)?;
        self.items[slot].clear();
        Ok(())
    }

    /// Free a slot and forget its value
    pub fn delete_sensor(&mut self, slot: usize) {
        self.registry.delete(slot);
        if let Some(item) = self.items.get_mut(slot) {
            item.clear();
        }
    }

    /// Forget every value, keeping the configuration
    pub fn reset(&mut self) {
        for item in &mut self.items {
            item.clear();
        }
        self.clock = 0;
    }

    pub fn set_timezone(&mut self, timezone: i8) {
        self.timezone = timezone;
    }

    /// Snapshot of every occupied slot
    pub fn readings(&self) -> Vec<SensorReading> {
        self.registry
            .sensors()
            .iter()
            .zip(&self.items)
            .enumerate()
            .filter(|(_, (sensor, _))| !sensor.is_empty())
            .map(|(index, (sensor, item))| SensorReading {
                index,
                label: sensor.label.clone(),
                unit: sensor.unit,
                prec: sensor.prec,
                value: item.value,
                min: item.min,
                max: item.max,
                state: item.state(self.clock),
            })
            .collect()
    }
}
