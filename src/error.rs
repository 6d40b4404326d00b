//! # Error Types
//!
//! Custom error types for Sport Telemetry using `thiserror`.
//!
//! The decode and fusion core never produces these: dropped frames, unknown
//! identifiers and full slot tables are ordinary control flow there. Errors
//! come from configuration, the serial layer and the snapshot logger.

use thiserror::Error;

/// Main error type for Sport Telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Configuration write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Rejected sensor configuration
    #[error("Invalid sensor in slot {slot}: {reason}")]
    InvalidSensor { slot: usize, reason: String },

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No receiver found at any of the probed device paths
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Snapshot serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Sport Telemetry
pub type Result<T> = std::result::Result<T, TelemetryError>;
