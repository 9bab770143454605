//! Packet routing above the serial transport.
//!
//! Inbound packets are dispatched by their route's function code to bounded
//! per-function mailboxes. Producers share one bounded outbound queue that
//! the transport side drains.

pub mod config;
pub mod error;
pub mod packet;
pub mod router;

pub use config::RouterConfig;
pub use error::{Result, RouterError};
pub use packet::{
    function_name, max_payload, Function, Mailbox, RoutablePacket, Route, FUNCTION_APP,
    FUNCTION_POWER_MANAGEMENT, FUNCTION_TEST, FUNCTION_WIRELESS_CTRL, ROUTE_HEADER_SIZE,
};
pub use router::{PacketRouter, RouterHandle, RouterStats};
