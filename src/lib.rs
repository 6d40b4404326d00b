//! # Sport Telemetry Library
//!
//! Decode FrSky S.Port and legacy hub telemetry and fuse it into live sensor
//! values.
//!
//! This library provides the decode pipeline (deframing, checksum, legacy
//! and extended identifiers), the sensor slot registry and the value store
//! with calculated sensors, unit conversion and freshness tracking.

pub mod config;
pub mod error;
pub mod serial;
pub mod session;
pub mod sport;
pub mod telemetry;
