//! Duplex byte-stream abstraction for serial links.
//!
//! The link core only needs a blocking byte line: read exact N bytes, write
//! N bytes. This crate provides that line over:
//! - UART devices opened with explicit line settings
//! - Simulated in-process lines (socket pairs, Unix only)
//!
//! This is the lowest layer of seriallink. Everything else builds on top of
//! the [`SerialStream`] type provided here.

pub mod error;
pub mod serial;
pub mod traits;

pub use error::{Result, TransportError};
pub use serial::{SerialConfig, SerialDevice, DEFAULT_BAUD_RATE};
pub use traits::SerialStream;
