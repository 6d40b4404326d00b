//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Trait for serial port I/O operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Read available bytes into `buf`; `Ok(0)` means the port closed
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Wrapper around any async byte source, `tokio_serial::SerialStream` in
/// production
pub struct TokioSerialPort<R = tokio_serial::SerialStream> {
    port: R,
}

impl<R> TokioSerialPort<R> {
    pub fn new(port: R) -> Self {
        Self { port }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> SerialPortIO for TokioSerialPort<R> {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf).await
    }
}
