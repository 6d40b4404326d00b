//! # Serial Communication Module
//!
//! Handles the serial link to the S.Port receiver or inverter cable.
//!
//! This module handles:
//! - Opening the serial port at 57,600 baud (8N1)
//! - Device auto-detection
//! - Async reads, deframed into S.Port packets

pub mod port_trait;

use crate::error::{Result, TelemetryError};
use crate::sport::framer::SportFramer;
use crate::sport::protocol::SportPacket;
use port_trait::{SerialPortIO, TokioSerialPort};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

/// S.Port baud rate
pub const SPORT_BAUD_RATE: u32 = 57_600;

/// Bytes requested per read
const READ_CHUNK_SIZE: usize = 64;

/// Default device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial inverter cables
    "/dev/ttyACM0", // USB CDC devices
];

/// S.Port Serial Reader
///
/// Reads the receiver byte stream and yields deframed packets.
pub struct SportSerial<P: SerialPortIO = TokioSerialPort> {
    port: P,
    device_path: String,
    framer: SportFramer,
}

impl<P: SerialPortIO> std::fmt::Debug for SportSerial<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SportSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SportSerial {
    /// Open the receiver link
    ///
    /// `auto` probes [`DEFAULT_DEVICE_PATHS`]; any other value is opened as is.
    ///
    /// # Arguments
    ///
    /// * `port` - Device path or `auto`
    /// * `baud_rate` - Line speed
    ///
    /// # Errors
    ///
    /// Returns error if no device could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sport_telemetry::serial::{SportSerial, SPORT_BAUD_RATE};
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let serial = SportSerial::open("auto", SPORT_BAUD_RATE)?;
    ///     println!("Connected to: {}", serial.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(port: &str, baud_rate: u32) -> Result<Self> {
        if port == "auto" {
            Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
        } else {
            Self::open_with_paths(&[port], baud_rate)
        }
    }

    /// Open the first device that works from a list of paths
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyUSB0"])
    /// * `baud_rate` - Line speed
    ///
    /// # Returns
    ///
    /// * `Result<SportSerial>` - Connected reader or error
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened S.Port device at {} ({} baud)", path, baud_rate);
                    return Ok(Self::from_port(TokioSerialPort::new(port), path));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(TelemetryError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with S.Port settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| TelemetryError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }
}

impl<P: SerialPortIO> SportSerial<P> {
    /// Wrap an already opened port
    pub fn from_port(port: P, device_path: &str) -> Self {
        Self {
            port,
            device_path: device_path.to_string(),
            framer: SportFramer::new(),
        }
    }

    /// Wait for the next chunk of bytes and deframe it
    ///
    /// # Returns
    ///
    /// * `Result<Vec<SportPacket>>` - Packets completed by this chunk, possibly
    ///   none. Checksums are verified later by the decoder.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Serial`] when the read fails or the port closed
    pub async fn read_packets(&mut self) -> Result<Vec<SportPacket>> {
        let mut buf = [0u8; READ_CHUNK_SIZE];

        let n = self
            .port
            .read(&mut buf)
            .await
            .map_err(|e| TelemetryError::Serial(format!("Failed to read from {}: {}", self.device_path, e)))?;

        if n == 0 {
            return Err(TelemetryError::Serial(format!("{} closed", self.device_path)));
        }

        trace!("Read {} bytes", n);
        Ok(self.framer.push(&buf[..n]))
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sport::checksum::check_sport_packet;
    use tokio_test::io::{Builder, Mock};

    fn mock_serial(stream: Mock) -> SportSerial<TokioSerialPort<Mock>> {
        SportSerial::from_port(TokioSerialPort::new(stream), "/dev/mock0")
    }

    #[test]
    fn test_constants() {
        assert_eq!(SPORT_BAUD_RATE, 57_600);
        assert_eq!(DEFAULT_DEVICE_PATHS.len(), 2);
        assert_eq!(DEFAULT_DEVICE_PATHS[0], "/dev/ttyUSB0");
        assert_eq!(DEFAULT_DEVICE_PATHS[1], "/dev/ttyACM0");
    }

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = SportSerial::open_with_paths(invalid_paths, SPORT_BAUD_RATE);

        match result.unwrap_err() {
            TelemetryError::SerialPortNotFound(msg) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_explicit_path_returns_error() {
        let result = SportSerial::open("/dev/nonexistent_serial_device_12345", SPORT_BAUD_RATE);

        match result.unwrap_err() {
            TelemetryError::SerialPortNotFound(msg) => {
                assert_eq!(msg, "/dev/nonexistent_serial_device_12345");
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let result = SportSerial::open_port("/dev/nonexistent_serial_device_12345", SPORT_BAUD_RATE);

        match result.unwrap_err() {
            TelemetryError::Serial(msg) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_packets_across_chunks() {
        let stream = Builder::new()
            .read(&[0x00, 0x7E, 0x98, 0x10, 0x10])
            .read(&[0x00, 0x7D, 0x5E, 0x02, 0x00, 0x00, 0x5F, 0x7E, 0x1B])
            .build();
        let mut serial = mock_serial(stream);

        assert!(serial.read_packets().await.unwrap().is_empty());

        let packets = serial.read_packets().await.unwrap();
        assert_eq!(packets.len(), 1);
        assert!(check_sport_packet(packets[0].as_bytes()));
        assert_eq!(packets[0].app_id(), 0x0010);
    }

    #[tokio::test]
    async fn test_read_error_is_serial_error() {
        let stream = Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"))
            .build();
        let mut serial = mock_serial(stream);

        match serial.read_packets().await.unwrap_err() {
            TelemetryError::Serial(msg) => assert!(msg.contains("/dev/mock0")),
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_port_is_error() {
        let mut serial = mock_serial(Builder::new().build());
        assert!(serial.read_packets().await.is_err());
    }

    // Integration test - only runs if a receiver is connected
    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_read_with_real_hardware() {
        if let Ok(mut serial) = SportSerial::open("auto", SPORT_BAUD_RATE) {
            let packets = serial.read_packets().await;
            assert!(packets.is_ok(), "Failed to read: {:?}", packets);
        } else {
            println!("No S.Port hardware detected (skipping read test)");
        }
    }
}
