//! Credit-based software flow control over a UART without handshake wires.
//!
//! Each endpoint runs a transmit task and a receive task. They coordinate
//! through an event group of sticky signal bits and allow at most one data
//! frame in flight per direction: a data frame may only be sent after the
//! peer granted a credit by sending a sentinel frame.
//!
//! [`SerialTransport`] is the only surface exposed upward: blocking `send`
//! and `receive` over bounded egress and ingress queues.

pub mod config;
pub mod error;
pub mod signals;
pub mod transport;

mod engine;
mod startup;

pub use config::TransportConfig;
pub use error::{LinkError, Result};
pub use signals::{EventGroup, Signals};
pub use transport::{LinkStats, SerialTransport, TransportReceiver, TransportSender};
