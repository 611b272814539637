use std::io::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Serial link settings. Framing is always 8N1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UartConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Write timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyAMA10".to_string(),
            baud_rate: 115_200,
            timeout_ms: 100,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("failed to clear buffers on {port}: {source}")]
    Clear {
        port: String,
        #[source]
        source: serialport::Error,
    },
}

/// Best-effort packet sink owning one connection.
///
/// The connection is released by [`SerialTransport::close`] or on drop,
/// whichever comes first.
pub struct SerialTransport<W: Write = Box<dyn SerialPort>> {
    writer: Option<W>,
    label: String,
}

impl SerialTransport<Box<dyn SerialPort>> {
    /// Open the configured port at 8N1 and discard stale buffered bytes.
    pub fn open(cfg: &UartConfig) -> Result<Self, TransportError> {
        let port = serialport::new(cfg.port.as_str(), cfg.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .open()
            .map_err(|source| TransportError::Open {
                port: cfg.port.clone(),
                source,
            })?;
        port.clear(ClearBuffer::All)
            .map_err(|source| TransportError::Clear {
                port: cfg.port.clone(),
                source,
            })?;
        log::info!("opened {} at {} baud (8N1)", cfg.port, cfg.baud_rate);
        Ok(Self {
            writer: Some(port),
            label: cfg.port.clone(),
        })
    }
}

impl<W: Write> SerialTransport<W> {
    /// Wrap an arbitrary sink, such as a capture file.
    pub fn from_writer(writer: W, label: impl Into<String>) -> Self {
        Self {
            writer: Some(writer),
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Write one whole packet. Failures are logged and reported as `false`.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(len = bytes.len())))]
    pub fn send(&mut self, bytes: &[u8]) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            log::warn!("send on closed transport {}", self.label);
            return false;
        };
        match writer.write_all(bytes) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("write to {} failed: {err}", self.label);
                false
            }
        }
    }

    /// Flush and release the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.flush() {
                log::warn!("flush of {} failed on close: {err}", self.label);
            }
            log::debug!("closed transport {}", self.label);
        }
    }
}

impl<W: Write> Drop for SerialTransport<W> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<W: Write> std::fmt::Debug for SerialTransport<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("label", &self.label)
            .field("open", &self.is_open())
            .finish()
    }
}
