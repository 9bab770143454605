use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::error::{FrameError, Result};

/// Frame header: start marker (1) + length (1) = 2 bytes.
pub const HEADER_SIZE: usize = 2;

/// Start marker: every frame begins with 0xFF.
pub const START_MARKER: u8 = 0xFF;

/// Wire bytes of a credit sentinel.
pub const SENTINEL_WIRE: [u8; HEADER_SIZE] = [START_MARKER, 0x00];

/// Default maximum payload size: 100 bytes.
pub const DEFAULT_MTU: usize = 100;

/// The length field is one byte wide.
pub const MAX_MTU: usize = u8::MAX as usize;

/// A transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Zero-length flow-control frame. Its meaning (clear-to-send or credit
    /// grant) comes from protocol state, not from the wire.
    Sentinel,
    /// A data frame carrying `1..=MTU` payload bytes.
    Data(Bytes),
}

impl Frame {
    /// Create a data frame.
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Frame::Data(payload.into())
    }

    /// Whether this is a credit sentinel.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Frame::Sentinel)
    }

    /// The payload of a data frame.
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            Frame::Sentinel => None,
            Frame::Data(payload) => Some(payload),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload().map_or(0, Bytes::len)
    }
}

/// Clamp a configured MTU into what the one-byte length field can express.
pub fn clamp_mtu(mtu: usize) -> usize {
    mtu.clamp(1, MAX_MTU)
}

/// Check that `payload` can travel as a single data frame.
pub fn validate_payload(payload: &[u8], mtu: usize) -> Result<()> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    let max = clamp_mtu(mtu);
    if payload.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }
    Ok(())
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬─────────────────┐
/// │ Start (1B)   │ Length    │ Payload         │
/// │ 0xFF         │ (1B)      │ (Length bytes)  │
/// └──────────────┴───────────┴─────────────────┘
/// ```
///
/// A sentinel is always exactly `FF 00`.
pub fn encode_frame(frame: &Frame, mtu: usize, dst: &mut BytesMut) -> Result<()> {
    match frame {
        Frame::Sentinel => {
            dst.reserve(HEADER_SIZE);
            dst.put_slice(&SENTINEL_WIRE);
        }
        Frame::Data(payload) => {
            validate_payload(payload, mtu)?;
            dst.reserve(HEADER_SIZE + payload.len());
            dst.put_u8(START_MARKER);
            dst.put_u8(payload.len() as u8);
            dst.put_slice(payload);
        }
    }
    Ok(())
}

/// Drop every byte ahead of the next start marker.
///
/// Returns how many bytes were discarded. When no marker is buffered the
/// whole buffer is discarded.
pub fn skip_to_start(src: &mut BytesMut) -> usize {
    match src.iter().position(|&b| b == START_MARKER) {
        Some(offset) => {
            src.advance(offset);
            offset
        }
        None => {
            let discarded = src.len();
            src.clear();
            discarded
        }
    }
}

/// Decode a frame from a buffer.
///
/// Returns `None` if the buffer doesn't contain a complete frame yet.
/// Bytes ahead of a start marker are discarded, and a length above `mtu`
/// is treated as a false start: decoding resumes at the byte after the
/// rejected marker. On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, mtu: usize) -> Option<Frame> {
    let mtu = clamp_mtu(mtu);
    loop {
        let discarded = skip_to_start(src);
        if discarded > 0 {
            debug!(discarded, "discarded bytes while hunting for start marker");
        }

        if src.len() < HEADER_SIZE {
            return None; // Need more data
        }

        let length = src[1] as usize;
        if length == 0 {
            src.advance(HEADER_SIZE);
            return Some(Frame::Sentinel);
        }

        if length > mtu {
            warn!(length, mtu, "frame length exceeds MTU, resynchronizing");
            src.advance(1);
            continue;
        }

        if src.len() < HEADER_SIZE + length {
            return None; // Need more data
        }

        src.advance(HEADER_SIZE);
        return Some(Frame::Data(src.split_to(length).freeze()));
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 100. Clamped to `1..=255`.
    pub mtu: usize,
}

impl FrameConfig {
    /// Configuration with an explicit MTU.
    pub fn with_mtu(mtu: usize) -> Self {
        Self {
            mtu: clamp_mtu(mtu),
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { mtu: DEFAULT_MTU }
    }
}
