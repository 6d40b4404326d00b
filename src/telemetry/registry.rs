//! # Sensor Registry
//!
//! Fixed-capacity table of sensor configurations. Readings for an unknown
//! (identifier, instance) pair auto-provision the first free slot from the
//! descriptor table; every change marks the table dirty so the owner can
//! persist it.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::sensor::{Formula, SensorKind, TelemetrySensor, MAX_FORMULA_SOURCES};
use super::units::TelemetryUnit;
use crate::error::{Result, TelemetryError};
use crate::sport::sensors::get_sport_sensor;

/// Slot capacity of the registry
pub const MAX_SENSORS: usize = 32;

/// Link protocol a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryProtocol {
    Sport,
}

/// A pre-configured slot, as found in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorEntry {
    pub slot: usize,
    pub sensor: TelemetrySensor,
}

/// Sensor configuration table
#[derive(Debug, Clone)]
pub struct SensorRegistry {
    sensors: Vec<TelemetrySensor>,
    dirty: bool,
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sensors: vec![TelemetrySensor::default(); MAX_SENSORS],
            dirty: false,
        }
    }

    /// Create a registry from configured entries
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidSensor`] for duplicate or out of range
    /// slots and for invalid formulas.
    pub fn with_entries(entries: &[SensorEntry]) -> Result<Self> {
        let mut registry = Self::new();

        for entry in entries {
            if entry.slot < MAX_SENSORS && !registry.sensors[entry.slot].is_empty() {
                return Err(TelemetryError::InvalidSensor {
                    slot: entry.slot,
                    reason: "slot configured twice".to_string(),
                });
            }
            registry.place(entry.slot, entry.sensor.clone())?;
        }

        // Formulas may reference slots configured further down the list
        for entry in entries {
            registry.validate_formula(entry.slot)?;
        }

        registry.dirty = false;
        Ok(registry)
    }

    pub fn sensors(&self) -> &[TelemetrySensor] {
        &self.sensors
    }

    pub fn sensor(&self, slot: usize) -> Option<&TelemetrySensor> {
        self.sensors.get(slot)
    }

    /// Occupied slots as configuration entries
    pub fn entries(&self) -> Vec<SensorEntry> {
        self.sensors
            .iter()
            .enumerate()
            .filter(|(_, sensor)| !sensor.is_empty())
            .map(|(slot, sensor)| SensorEntry {
                slot,
                sensor: sensor.clone(),
            })
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Record that the current table has been persisted
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Received-sensor slots configured for this identity
    pub fn matching_slots(&self, id: u16, instance: u8) -> impl Iterator<Item = usize> + '_ {
        self.sensors
            .iter()
            .enumerate()
            .filter(move |(_, sensor)| {
                !sensor.is_empty() && !sensor.is_calculated() && sensor.id == id && sensor.instance == instance
            })
            .map(|(slot, _)| slot)
    }

    /// Whether a calculated sensor measures distance from the pilot
    pub fn has_distance_sensor(&self) -> bool {
        self.sensors
            .iter()
            .any(|sensor| matches!(sensor.formula(), Some(Formula::Dist { .. })))
    }

    /// First free slot that can take a received sensor
    pub fn available_index(&self) -> Option<usize> {
        self.sensors.iter().position(TelemetrySensor::is_empty)
    }

    /// Find the slot for an identity, provisioning one if needed
    ///
    /// # Returns
    ///
    /// The slot index, or `None` when the table is full; the reading is then
    /// dropped.
    pub fn resolve_slot(&mut self, protocol: TelemetryProtocol, id: u16, instance: u8) -> Option<usize> {
        if let Some(slot) = self.matching_slots(id, instance).next() {
            return Some(slot);
        }

        let Some(slot) = self.available_index() else {
            warn!("Sensor table full, dropping reading for id {:04X}/{}", id, instance);
            return None;
        };

        self.sensors[slot] = match protocol {
            TelemetryProtocol::Sport => sport_default(id, instance),
        };
        self.dirty = true;

        info!(
            "Provisioned slot {} for {} (id {:04X}, instance {})",
            slot, self.sensors[slot].label, id, instance
        );
        Some(slot)
    }

    /// Clear a slot
    pub fn delete(&mut self, slot: usize) {
        if let Some(sensor) = self.sensors.get_mut(slot) {
            *sensor = TelemetrySensor::default();
            self.dirty = true;
        }
    }

    /// Replace a slot's configuration
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidSensor`] when the slot is out of range
    /// or the formula references missing slots, itself, or forms a cycle. The
    /// previous configuration is kept on error.
    pub fn configure_sensor(&mut self, slot: usize, sensor: TelemetrySensor) -> Result<()> {
        let previous = self.sensor(slot).cloned();
        self.place(slot, sensor)?;

        if let Err(e) = self.validate_formula(slot) {
            if let Some(previous) = previous {
                self.sensors[slot] = previous;
            }
            return Err(e);
        }

        self.dirty = true;
        Ok(())
    }

    fn place(&mut self, slot: usize, mut sensor: TelemetrySensor) -> Result<()> {
        if slot >= MAX_SENSORS {
            return Err(TelemetryError::InvalidSensor {
                slot,
                reason: format!("slot must be below {}", MAX_SENSORS),
            });
        }

        if sensor.unit == TelemetryUnit::Cells && !sensor.is_calculated() {
            sensor.unit = TelemetryUnit::Volts;
        }
        self.sensors[slot] = sensor;
        self.dirty = true;
        Ok(())
    }

    fn validate_formula(&self, slot: usize) -> Result<()> {
        let Some(formula) = self.sensors[slot].formula() else {
            return Ok(());
        };
        let invalid = |reason: String| TelemetryError::InvalidSensor { slot, reason };

        let sources = formula.sources();
        if sources.is_empty() {
            return Err(invalid("formula has no sources".to_string()));
        }
        if sources.len() > MAX_FORMULA_SOURCES {
            return Err(invalid(format!("at most {} sources allowed", MAX_FORMULA_SOURCES)));
        }
        if let Formula::Cell { index, .. } = formula {
            if *index > 7 {
                return Err(invalid(format!("cell index {} out of range 0..=7", index)));
            }
        }

        for source in sources {
            if source >= MAX_SENSORS {
                return Err(invalid(format!("source slot {} out of range", source)));
            }
            if source == slot {
                return Err(invalid("formula references its own slot".to_string()));
            }
            if self.sensors[source].is_empty() {
                return Err(invalid(format!("source slot {} is empty", source)));
            }
        }

        if self.reaches(slot, slot, &mut vec![false; MAX_SENSORS]) {
            return Err(invalid("formula dependencies form a cycle".to_string()));
        }

        Ok(())
    }

    /// Whether `target` is reachable from the sources of `from`
    fn reaches(&self, from: usize, target: usize, visited: &mut [bool]) -> bool {
        let Some(formula) = self.sensors.get(from).and_then(TelemetrySensor::formula) else {
            return false;
        };

        for source in formula.sources() {
            if source == target {
                return true;
            }
            if source < visited.len() && !visited[source] {
                visited[source] = true;
                if self.reaches(source, target, visited) {
                    return true;
                }
            }
        }

        false
    }
}

/// Default configuration of a newly seen S.Port sensor
fn sport_default(id: u16, instance: u8) -> TelemetrySensor {
    let mut sensor = TelemetrySensor {
        id,
        instance,
        ..Default::default()
    };

    match get_sport_sensor(id) {
        Some(descriptor) => {
            let unit = match descriptor.unit {
                TelemetryUnit::Cells => TelemetryUnit::Volts,
                unit => unit,
            };
            sensor.init(descriptor.name, unit, descriptor.prec);
        }
        None => sensor.init(&format!("{:04X}", id), TelemetryUnit::Raw, 0),
    }

    sensor.kind = SensorKind::Raw;
    sensor
}
