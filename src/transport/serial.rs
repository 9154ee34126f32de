//! Serial/USB transport to the EnOcean transceiver.
//!
//! The transceiver (e.g. an EnOcean USB 300 stick) streams ESP3 packets at
//! 57600 baud, 8 data bits, no parity, one stop bit.

use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::error::{Error, Result};

/// Baud rate of ESP3 transceivers.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Configuration for the serial transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }
}

/// Opens the serial port for non-blocking reads.
///
/// The returned stream implements [`tokio::io::AsyncRead`] and can be handed
/// to [`Gateway::run`](crate::Gateway::run) as the telegram source.
pub fn open(config: &SerialConfig) -> Result<SerialStream> {
    tracing::info!(
        "opening serial port {} at {} baud",
        config.port,
        config.baud_rate
    );

    let stream = tokio_serial::new(&config.port, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()
        .map_err(Error::Serial)?;

    tracing::debug!("serial port {} open", config.port);
    Ok(stream)
}

/// Lists available serial ports.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
