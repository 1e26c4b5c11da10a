//! Byte transport to the drive board.
//!
//! The rest of the HAL only talks to the [`SerialLink`] trait, so the real
//! UART ([`SerialPortLink`]) and the in-process [`SimLink`][crate::sim::SimLink]
//! are interchangeable.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use sweepline_types::SweepError;
use tracing::{debug, info, warn};

/// A byte-oriented, non-blocking link to a single serial peer.
pub trait SerialLink: Send {
    /// Human-readable identifier, e.g. the device path.
    fn name(&self) -> &str;

    /// Number of bytes that can be read without blocking.
    fn available(&mut self) -> Result<usize, SweepError>;

    /// Read up to `buffer.len()` bytes; returns the count actually read.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, SweepError>;

    /// Write the whole frame.  Fire-and-forget: no acknowledgement is awaited.
    fn write_all(&mut self, data: &[u8]) -> Result<(), SweepError>;

    /// Drop every byte currently buffered on the receive side.
    fn discard_input(&mut self) -> Result<(), SweepError>;
}

/// [`SerialLink`] over a real UART opened with the `serialport` crate.
pub struct SerialPortLink {
    path: String,
    port: Box<dyn SerialPort>,
}

impl SerialPortLink {
    /// Open `path` at `baud_rate`, 8N1 without flow control.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Link`] when the device cannot be opened.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, SweepError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| link_error(path, e))?;

        info!(port = path, baud = baud_rate, "serial link opened");
        Ok(Self {
            path: path.to_string(),
            port,
        })
    }

    /// Try every candidate path in order and return the first that opens.
    ///
    /// # Errors
    ///
    /// Returns the last [`SweepError::Link`] when no candidate opens, or a
    /// [`SweepError::Config`] when `paths` is empty.
    pub fn open_first<S: AsRef<str>>(paths: &[S], baud_rate: u32) -> Result<Self, SweepError> {
        let mut last_err = SweepError::Config("no serial ports configured".to_string());
        for path in paths {
            match Self::open(path.as_ref(), baud_rate) {
                Ok(link) => return Ok(link),
                Err(e) => {
                    warn!(port = path.as_ref(), error = %e, "serial port unavailable, trying next");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

impl SerialLink for SerialPortLink {
    fn name(&self) -> &str {
        &self.path
    }

    fn available(&mut self) -> Result<usize, SweepError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| link_error(&self.path, e))
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, SweepError> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(link_error(&self.path, e)),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), SweepError> {
        self.port
            .write_all(data)
            .map_err(|e| link_error(&self.path, e))
    }

    fn discard_input(&mut self) -> Result<(), SweepError> {
        debug!(port = %self.path, "discarding residual input");
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| link_error(&self.path, e))
    }
}

fn link_error(path: &str, err: impl std::fmt::Display) -> SweepError {
    SweepError::Link {
        port: path.to_string(),
        details: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_first_with_no_candidates_is_config_error() {
        let paths: [&str; 0] = [];
        let err = SerialPortLink::open_first(&paths, 9600).err().unwrap();
        assert!(matches!(err, SweepError::Config(_)));
    }

    #[test]
    fn open_first_reports_link_error_for_missing_devices() {
        let paths = ["/dev/sweepline-missing-0", "/dev/sweepline-missing-1"];
        let err = SerialPortLink::open_first(&paths, 9600).err().unwrap();
        match err {
            SweepError::Link { port, .. } => assert_eq!(port, "/dev/sweepline-missing-1"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
