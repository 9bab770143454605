use std::path::PathBuf;

/// Errors that can occur while opening or driving a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the serial device.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: serialport::Error,
    },

    /// The device rejected the requested line settings.
    #[error("failed to configure {path}: {source}")]
    Configure {
        path: PathBuf,
        source: serialport::Error,
    },

    /// An I/O error occurred on the byte stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The baud rate is outside what a UART can be asked for.
    #[error("invalid baud rate {0}")]
    InvalidBaudRate(u32),
}

pub type Result<T> = std::result::Result<T, TransportError>;
