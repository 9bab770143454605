//! Start-marker/length framing for UART links.
//!
//! Every frame on the wire is:
//! - A 1-byte start marker (`0xFF`) for stream synchronization
//! - A 1-byte payload length
//! - `length` payload bytes
//!
//! A zero length is a credit sentinel: a flow-control signal with no payload.
//! Decoding resynchronizes on the next start marker after any corruption, so
//! callers always get complete frames.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    clamp_mtu, decode_frame, encode_frame, skip_to_start, validate_payload, Frame, FrameConfig,
    DEFAULT_MTU, HEADER_SIZE, MAX_MTU, SENTINEL_WIRE, START_MARKER,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
