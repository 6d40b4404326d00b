//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files, and the
//! persisted sensor table.

use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::session::{TelemetrySettings, ANALOG_CHANNELS};
use crate::sport::analog::AnalogChannel;
use crate::sport::hub::HubSettings;
use crate::telemetry::{SensorEntry, SensorRegistry};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub serial: SerialConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Pre-configured sensor slots
    #[serde(default)]
    pub sensors: Vec<SensorEntry>,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Device path, or `auto` to probe the usual USB serial devices
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Telemetry decoding configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub blades: u8,

    /// Current sensor offset in tenths of an amp
    #[serde(default)]
    pub fas_offset: i16,

    /// Hours added to GPS times
    #[serde(default)]
    pub timezone: i8,

    #[serde(default = "default_swr_enabled")]
    pub swr_enabled: bool,

    #[serde(default)]
    pub vario_source: Option<usize>,

    /// Track the legacy hub distance from the pilot without a distance sensor
    #[serde(default)]
    pub gps_distance: bool,

    #[serde(default = "default_analog")]
    pub analog: Vec<AnalogChannel>,

    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,

    #[serde(default = "default_link_timeout_ms")]
    pub link_timeout_ms: u64,

    /// Where the sensor table is persisted when it changes
    #[serde(default)]
    pub sensors_file: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Snapshot logging on/off
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// Directory for daily rolling application logs; stdout only when unset
    #[serde(default)]
    pub dir: Option<String>,

    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Persisted sensor table file
#[derive(Debug, Default, Serialize, Deserialize)]
struct SensorTable {
    #[serde(default)]
    sensors: Vec<SensorEntry>,
}

// Default value functions
fn default_serial_port() -> String { "auto".to_string() }
fn default_baud_rate() -> u32 { 57600 }
fn default_timeout_ms() -> u64 { 100 }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_swr_enabled() -> bool { true }
fn default_analog() -> Vec<AnalogChannel> { vec![AnalogChannel::default(); ANALOG_CHANNELS] }
fn default_cycle_ms() -> u64 { 100 }
fn default_link_timeout_ms() -> u64 { 1000 }

fn default_logging_enabled() -> bool { true }
fn default_snapshot_dir() -> String { "./logs/telemetry".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_snapshot_interval_ms() -> u64 { 1000 }
fn default_log_format() -> String { "jsonl".to_string() }

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            blades: 0,
            fas_offset: 0,
            timezone: 0,
            swr_enabled: default_swr_enabled(),
            vario_source: None,
            gps_distance: false,
            analog: default_analog(),
            cycle_ms: default_cycle_ms(),
            link_timeout_ms: default_link_timeout_ms(),
            sensors_file: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            dir: None,
            snapshot_dir: default_snapshot_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            format: default_log_format(),
        }
    }
}

impl TelemetryConfig {
    /// Session settings described by this section
    pub fn settings(&self) -> TelemetrySettings {
        let channel = |index: usize| self.analog.get(index).copied().unwrap_or_default();

        TelemetrySettings {
            hub: HubSettings {
                blades: self.blades,
                fas_offset: self.fas_offset,
                timezone: self.timezone,
            },
            swr_enabled: self.swr_enabled,
            vario_source: self.vario_source,
            gps_distance: self.gps_distance,
            analog: [channel(0), channel(1)],
        }
    }

    /// Link timeout expressed in freshness ticks
    pub fn link_timeout_ticks(&self) -> u16 {
        (self.link_timeout_ms / self.cycle_ms.max(1)).clamp(1, u64::from(u16::MAX)) as u16
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sport_telemetry::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the sensor registry from the configured slots
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TelemetryError::InvalidSensor`] for duplicate
    /// slots or invalid formulas.
    pub fn sensor_registry(&self) -> Result<SensorRegistry> {
        SensorRegistry::with_entries(&self.sensors)
    }

    /// Validate configuration values
    ///
    /// # Returns
    ///
    /// * `Result<()>` - Ok if valid, Err if invalid
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Validate serial port configuration
        if self.serial.port.is_empty() {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("serial port cannot be empty")
            ));
        }

        if ![57600, 115200].contains(&self.serial.baud_rate) {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("baud_rate must be one of: 57600, 115200")
            ));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("timeout_ms must be between 1 and 10000")
            ));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("reconnect_interval_ms must be between 1 and 60000")
            ));
        }

        // Validate telemetry configuration
        if self.telemetry.blades > 253 {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("blades must be between 0 and 253")
            ));
        }

        if !(-12..=14).contains(&self.telemetry.timezone) {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("timezone must be between -12 and 14")
            ));
        }

        if self.telemetry.analog.len() != ANALOG_CHANNELS {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom(format!("analog must define exactly {} channels", ANALOG_CHANNELS))
            ));
        }

        for (index, channel) in self.telemetry.analog.iter().enumerate() {
            if channel.multiplier > 3 {
                return Err(crate::error::TelemetryError::Config(
                    toml::de::Error::custom(format!("analog channel {} multiplier must be between 0 and 3", index))
                ));
            }
        }

        if let Some(source) = self.telemetry.vario_source {
            if source >= ANALOG_CHANNELS {
                return Err(crate::error::TelemetryError::Config(
                    toml::de::Error::custom("vario_source must be 0 or 1")
                ));
            }
        }

        if self.telemetry.cycle_ms == 0 || self.telemetry.cycle_ms > 10000 {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("cycle_ms must be between 1 and 10000")
            ));
        }

        if self.telemetry.link_timeout_ms < self.telemetry.cycle_ms || self.telemetry.link_timeout_ms > 60000 {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("link_timeout_ms must be between cycle_ms and 60000")
            ));
        }

        if matches!(&self.telemetry.sensors_file, Some(path) if path.is_empty()) {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("sensors_file cannot be empty when set")
            ));
        }

        // Validate logging configuration
        if self.logging.enabled && self.logging.snapshot_dir.is_empty() {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("logging snapshot_dir cannot be empty when enabled")
            ));
        }

        if self.logging.max_records_per_file == 0 {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("max_records_per_file must be greater than 0")
            ));
        }

        if self.logging.max_files_to_keep == 0 {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("max_files_to_keep must be greater than 0")
            ));
        }

        if self.logging.snapshot_interval_ms == 0 || self.logging.snapshot_interval_ms > 60000 {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("snapshot_interval_ms must be between 1 and 60000")
            ));
        }

        if self.logging.format != "jsonl" {
            return Err(crate::error::TelemetryError::Config(
                toml::de::Error::custom("log format must be 'jsonl' (only supported format)")
            ));
        }

        // Slots, duplicates and formulas
        self.sensor_registry()?;

        Ok(())
    }
}

/// Load a persisted sensor table
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_sensor_table<P: AsRef<Path>>(path: P) -> Result<Vec<SensorEntry>> {
    let contents = fs::read_to_string(path)?;
    let table: SensorTable = toml::from_str(&contents)?;
    Ok(table.sensors)
}

/// Persist the sensor table
///
/// # Errors
///
/// Returns error if serialization or the write fails
pub fn save_sensor_table<P: AsRef<Path>>(path: P, entries: &[SensorEntry]) -> Result<()> {
    let table = SensorTable {
        sensors: entries.to_vec(),
    };
    let contents = toml::to_string(&table)?;
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;
    use crate::telemetry::{Formula, SensorKind, TelemetrySensor, TelemetryUnit};

    fn create_valid_config() -> Config {
        Config {
            serial: SerialConfig {
                port: default_serial_port(),
                baud_rate: default_baud_rate(),
                timeout_ms: default_timeout_ms(),
                reconnect_interval_ms: default_reconnect_interval_ms(),
            },
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
            sensors: vec![],
        }
    }

    fn calculated_entry(slot: usize, formula: Formula) -> SensorEntry {
        SensorEntry {
            slot,
            sensor: TelemetrySensor {
                label: "Calc".to_string(),
                kind: SensorKind::Calculated { formula },
                ..Default::default()
            },
        }
    }

    fn raw_entry(slot: usize, id: u16) -> SensorEntry {
        SensorEntry {
            slot,
            sensor: TelemetrySensor {
                id,
                label: "Raw".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_default_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_shipped_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.serial.port, "auto");
        assert_eq!(config.telemetry.link_timeout_ticks(), 10);
        assert!(!config.telemetry.settings().gps_distance);
        assert_eq!(config.sensors.len(), 3);

        let registry = config.sensor_registry().unwrap();
        assert!(registry.sensors()[4].is_calculated());
        assert_eq!(registry.sensors()[3].unit, crate::telemetry::TelemetryUnit::Volts);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyUSB0"

[telemetry]
blades = 1
timezone = -3
vario_source = 1

[[telemetry.analog]]
ratio = 132

[[telemetry.analog]]
ratio = 51
offset = -128
unit = "meters_per_second"

[logging]
enabled = false

[[sensors]]
slot = 0
[sensors.sensor]
id = 0x0210
label = "VFAS"
unit = "volts"
prec = 2

[[sensors]]
slot = 1
[sensors.sensor]
label = "Pwr"
unit = "watts"
prec = 1
[sensors.sensor.kind]
type = "calculated"
[sensors.sensor.kind.formula]
op = "multiply"
sources = [0, 0]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 57600);
        assert_eq!(config.sensors.len(), 2);
        assert_eq!(
            config.sensors[1].sensor.formula(),
            Some(&Formula::Multiply { sources: vec![0, 0] })
        );

        let settings = config.telemetry.settings();
        assert_eq!(settings.hub.blades, 1);
        assert_eq!(settings.hub.timezone, -3);
        assert_eq!(settings.vario_source, Some(1));
        assert_eq!(settings.analog[1].offset, -128);
        assert_eq!(settings.analog[1].unit, TelemetryUnit::MetersPerSecond);

        let registry = config.sensor_registry().unwrap();
        assert_eq!(registry.sensors()[0].label, "VFAS");
        assert!(!registry.is_dirty());
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[serial]\n").unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "auto");
        assert_eq!(config.telemetry.analog.len(), ANALOG_CHANNELS);
        assert_eq!(config.logging.format, "jsonl");
        assert!(config.sensors.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/sport-telemetry.toml");
        assert!(matches!(result, Err(TelemetryError::Io(_))));
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = create_valid_config();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = create_valid_config();
        config.serial.baud_rate = 420000;
        assert!(config.validate().is_err());

        config.serial.baud_rate = 115200;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_bounds() {
        let mut config = create_valid_config();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.serial.reconnect_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blades_bound() {
        let mut config = create_valid_config();
        config.telemetry.blades = 253;
        assert!(config.validate().is_ok());

        config.telemetry.blades = 254;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timezone_bounds() {
        let mut config = create_valid_config();
        config.telemetry.timezone = -12;
        assert!(config.validate().is_ok());

        config.telemetry.timezone = 15;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_analog_channels() {
        let mut config = create_valid_config();
        config.telemetry.analog.pop();
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.telemetry.analog[0].multiplier = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_vario_source_bound() {
        let mut config = create_valid_config();
        config.telemetry.vario_source = Some(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cycle_and_link_timeout() {
        let mut config = create_valid_config();
        config.telemetry.cycle_ms = 0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.telemetry.link_timeout_ms = 50;
        assert!(config.validate().is_err());

        let config = create_valid_config();
        assert_eq!(config.telemetry.link_timeout_ticks(), 10);
        assert!(!config.telemetry.settings().gps_distance);
    }

    #[test]
    fn test_empty_snapshot_dir() {
        let mut config = create_valid_config();
        config.logging.snapshot_dir = String::new();
        assert!(config.validate().is_err());

        config.logging.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_logging_limits() {
        let mut config = create_valid_config();
        config.logging.max_records_per_file = 0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.logging.max_files_to_keep = 0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.logging.snapshot_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = create_valid_config();
        config.logging.format = "csv".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_sensor_slot() {
        let mut config = create_valid_config();
        config.sensors = vec![raw_entry(3, 0x0210), raw_entry(3, 0x0200)];

        match config.validate() {
            Err(TelemetryError::InvalidSensor { slot, .. }) => assert_eq!(slot, 3),
            other => panic!("Expected InvalidSensor, got: {:?}", other),
        }
    }

    #[test]
    fn test_formula_cycle_rejected() {
        let mut config = create_valid_config();
        config.sensors = vec![
            calculated_entry(0, Formula::Add { sources: vec![1] }),
            calculated_entry(1, Formula::Add { sources: vec![0] }),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sensor_table_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensors.toml");
        let entries = vec![
            raw_entry(0, 0x0210),
            calculated_entry(1, Formula::Dist { gps: 0, alt: None }),
        ];

        save_sensor_table(&path, &entries).unwrap();
        let loaded = load_sensor_table(&path).unwrap();

        assert_eq!(loaded, entries);
    }
}
