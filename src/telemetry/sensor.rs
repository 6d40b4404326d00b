//! # Sensor Configuration
//!
//! Persisted per-slot configuration: identity on the wire, declared unit and
//! precision, and how the slot's value is produced.

use serde::{Deserialize, Serialize};

use super::units::{convert_telemetry_value, TelemetryUnit};

/// Maximum label length
pub const TELEM_LABEL_LEN: usize = 4;

/// Maximum number of sources referenced by an arithmetic formula
pub const MAX_FORMULA_SOURCES: usize = 4;

/// Cell formula index selecting the lowest cell
pub const CELL_INDEX_LOWEST: u8 = 0;

/// Cell formula index selecting the highest cell
pub const CELL_INDEX_HIGHEST: u8 = 7;

/// How a slot's value is produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorKind {
    /// Value received directly from the link
    #[default]
    Raw,
    /// Received value scaled by `ratio` (when non-zero) then shifted by `offset`
    Custom { ratio: i32, offset: i32 },
    /// Value derived from other slots
    Calculated { formula: Formula },
}

/// Calculated-sensor formulas; slot references are 0-based indices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Formula {
    Add { sources: Vec<usize> },
    Average { sources: Vec<usize> },
    Multiply { sources: Vec<usize> },
    /// `index` 0 = lowest, 7 = highest, 1..=6 = that cell
    Cell { source: usize, index: u8 },
    Dist {
        gps: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<usize>,
    },
}

impl Formula {
    /// Slots this formula reads
    pub fn sources(&self) -> Vec<usize> {
        match self {
            Formula::Add { sources } | Formula::Average { sources } | Formula::Multiply { sources } => {
                sources.clone()
            }
            Formula::Cell { source, .. } => vec![*source],
            Formula::Dist { gps, alt } => std::iter::once(*gps).chain(*alt).collect(),
        }
    }
}

/// Input processing applied to received scalar values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFlags {
    #[default]
    None,
    /// First reading becomes the zero point
    AutoOffset,
    /// Moving average over a short history
    Filtering,
}

/// Configuration of one sensor slot
///
/// `id == 0` on a non-calculated sensor marks the slot as free.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySensor {
    #[serde(default)]
    pub id: u16,

    #[serde(default)]
    pub instance: u8,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub unit: TelemetryUnit,

    #[serde(default)]
    pub prec: u8,

    #[serde(default)]
    pub kind: SensorKind,

    #[serde(default)]
    pub input: InputFlags,
}

impl TelemetrySensor {
    /// Whether the slot holds no sensor
    pub fn is_empty(&self) -> bool {
        self.id == 0 && !self.is_calculated()
    }

    /// Whether the slot is a calculated sensor
    pub fn is_calculated(&self) -> bool {
        matches!(self.kind, SensorKind::Calculated { .. })
    }

    /// The formula of a calculated sensor
    pub fn formula(&self) -> Option<&Formula> {
        match &self.kind {
            SensorKind::Calculated { formula } => Some(formula),
            _ => None,
        }
    }

    /// Set label, unit and precision; the label is cut to [`TELEM_LABEL_LEN`]
    pub fn init(&mut self, label: &str, unit: TelemetryUnit, prec: u8) {
        self.label = label.chars().take(TELEM_LABEL_LEN).collect();
        self.unit = unit;
        self.prec = prec;
    }

    /// Convert a received value into this sensor's unit and precision
    ///
    /// Custom sensors then apply their ratio and offset.
    pub fn get_value(&self, value: i32, unit: TelemetryUnit, prec: u8) -> i32 {
        let mut value = convert_telemetry_value(value, unit, prec, self.unit, self.prec);

        if let SensorKind::Custom { ratio, offset } = self.kind {
            if ratio != 0 {
                value = value.wrapping_mul(ratio);
            }
            value = value.wrapping_add(offset);
        }

        value
    }
}
