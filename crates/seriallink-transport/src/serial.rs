use std::path::{Path, PathBuf};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::SerialStream;

/// Line speed used by the companion module firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// UART line settings.
///
/// The link runs 8N1 with hardware flow control disabled; software flow
/// control is handled above this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub path: PathBuf,
    /// Baud rate. Default: 115200.
    pub baud_rate: u32,
    /// How long a single driver read may wait before it is retried.
    /// Callers never see this timeout; it only bounds one poll of the driver.
    pub poll_interval: Duration,
}

impl SerialConfig {
    /// Settings for `path` with the default line speed.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/ttyUSB0"),
            baud_rate: DEFAULT_BAUD_RATE,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// UART device opener.
pub struct SerialDevice;

impl SerialDevice {
    /// Open a UART with explicit line settings (blocking).
    ///
    /// Any bytes already sitting in the driver buffers are discarded so the
    /// frame decoder starts from a clean line.
    pub fn open(config: &SerialConfig) -> Result<SerialStream> {
        if config.baud_rate == 0 {
            return Err(TransportError::InvalidBaudRate(config.baud_rate));
        }

        let path = config.path.to_string_lossy().into_owned();
        let port = serialport::new(path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.poll_interval)
            .open()
            .map_err(|source| TransportError::Open {
                path: config.path.clone(),
                source,
            })?;

        port.clear(ClearBuffer::All)
            .map_err(|source| TransportError::Configure {
                path: config.path.clone(),
                source,
            })?;
        debug!(path = ?config.path, "cleared driver buffers");

        info!(
            path = ?config.path,
            baud_rate = config.baud_rate,
            "opened serial device"
        );
        Ok(SerialStream::from_port(port))
    }
}
