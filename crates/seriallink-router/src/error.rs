/// Errors that can occur in router operations.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The router (or its dispatch task) is gone.
    #[error("router closed")]
    Closed,

    /// A packet was too short to hold a route header.
    #[error("malformed packet: {len} bytes is shorter than the route header")]
    MalformedPacket { len: usize },

    /// The dispatch task could not be started.
    #[error("failed to spawn dispatch task: {0}")]
    Spawn(#[from] std::io::Error),

    /// Packet payload does not fit one transport frame.
    #[error("packet payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, RouterError>;
