//! Flow-controlled packet link and router for serial lines without hardware
//! handshaking.
//!
//! # Crate Structure
//!
//! - [`transport`] — Byte-stream devices (UARTs, simulated lines)
//! - [`frame`] — Start-marker framing and the credit sentinel
//! - [`flow`] — Stop-and-wait flow control and the serial packet transport
//! - [`router`] — Function-code dispatch to per-function mailboxes
//! - [`bridge`] — Pumps joining a transport to a router
//! - [`endpoint`] — Transport, router and bridge assembled over one line

pub mod bridge;
pub mod endpoint;
pub mod error;

pub use bridge::{Bridge, BridgeStats};
pub use endpoint::Endpoint;
pub use error::{Error, Result};

/// Re-export transport types.
pub mod transport {
    pub use seriallink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use seriallink_frame::*;
}

/// Re-export flow-control and packet transport types.
pub mod flow {
    pub use seriallink_flow::*;
}

/// Re-export router types.
pub mod router {
    pub use seriallink_router::*;
}
