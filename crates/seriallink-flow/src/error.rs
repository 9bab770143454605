/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Byte-stream error.
    #[error("transport error: {0}")]
    Transport(#[from] seriallink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] seriallink_frame::FrameError),

    /// Failed to start a link task.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link tasks have stopped; no more packets can be exchanged.
    #[error("link closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, LinkError>;
