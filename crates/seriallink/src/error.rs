/// Errors surfaced by the assembled link.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial device error.
    #[error("transport error: {0}")]
    Transport(#[from] seriallink_transport::TransportError),

    /// Packet transport error.
    #[error("link error: {0}")]
    Link(#[from] seriallink_flow::LinkError),

    /// Router error.
    #[error("router error: {0}")]
    Router(#[from] seriallink_router::RouterError),

    /// A pump thread could not be started.
    #[error("failed to spawn bridge task: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
