//! # Telemetry Module
//!
//! Protocol independent sensor handling.
//!
//! This module handles:
//! - Sensor configuration and the slot registry
//! - Live values with min/max, freshness and multi-packet reconstruction
//! - Calculated sensors
//! - Unit conversion
//! - JSONL snapshot logging with rotation

pub mod formula;
pub mod gps;
pub mod item;
pub mod logger;
pub mod registry;
pub mod sensor;
pub mod store;
pub mod units;

pub use item::{TelemetryItem, ValueState};
pub use logger::SnapshotLogger;
pub use registry::{SensorEntry, SensorRegistry, TelemetryProtocol, MAX_SENSORS};
pub use sensor::{Formula, InputFlags, SensorKind, TelemetrySensor};
pub use store::{SensorReading, TelemetryStore};
pub use units::TelemetryUnit;
