use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame, Frame, FrameConfig, HEADER_SIZE, MAX_MTU};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 2 * (HEADER_SIZE + MAX_MTU);

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads and resynchronization internally; callers always
/// get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.mtu) {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};
    use seriallink_transport::SerialStream;

    use super::*;
    use crate::codec::{encode_frame, DEFAULT_MTU, START_MARKER};

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame, DEFAULT_MTU, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let bytes = wire(&[Frame::data(&b"hello"[..])]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn read_interleaved_sentinels_and_data() {
        let bytes = wire(&[
            Frame::Sentinel,
            Frame::data(&b"one"[..]),
            Frame::Sentinel,
            Frame::data(&b"two"[..]),
        ]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert!(reader.read_frame().unwrap().is_sentinel());
        assert_eq!(reader.read_frame().unwrap(), Frame::data(&b"one"[..]));
        assert!(reader.read_frame().unwrap().is_sentinel());
        assert_eq!(reader.read_frame().unwrap(), Frame::data(&b"two"[..]));
    }

    #[test]
    fn garbage_before_frame_is_skipped() {
        let mut bytes = vec![0x00, 0x7E, 0x10, 0x20, 0x30];
        bytes.extend(wire(&[Frame::data(&b"synced"[..])]));
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload().unwrap().as_ref(), b"synced");
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn partial_read_handling() {
        let bytes = wire(&[Frame::data(&b"slow"[..]), Frame::Sentinel]);
        let mut reader = FrameReader::new(ByteByByteReader { bytes, pos: 0 });

        assert_eq!(reader.read_frame().unwrap(), Frame::data(&b"slow"[..]));
        assert!(reader.read_frame().unwrap().is_sentinel());
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_u8(START_MARKER);
        partial.put_u8(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn small_mtu_rejects_longer_frames() {
        let mut bytes = wire(&[Frame::data(&b"too long"[..])]);
        bytes.extend(wire(&[Frame::data(&b"ok"[..])]));

        let mut reader = FrameReader::with_config(Cursor::new(bytes), FrameConfig::with_mtu(4));
        assert_eq!(reader.read_frame().unwrap(), Frame::data(&b"ok"[..]));
    }

    #[test]
    fn interrupted_read_retries() {
        let bytes = wire(&[Frame::data(&b"ok"[..])]);
        let mut reader = FrameReader::new(InterruptedThenData {
            state: 0,
            bytes,
            pos: 0,
        });

        assert_eq!(reader.read_frame().unwrap(), Frame::data(&b"ok"[..]));
    }

    #[test]
    fn read_would_block_propagates_io_error() {
        let mut reader = FrameReader::new(WouldBlockReader);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_simulated_line() {
        let (left, right) = SerialStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.send_sentinel().unwrap();
        writer.send_data(b"ping").unwrap();

        assert!(reader.read_frame().unwrap().is_sentinel());
        assert_eq!(reader.read_frame().unwrap(), Frame::data(&b"ping"[..]));
    }

    #[test]
    #[cfg(unix)]
    fn concurrent_reader_writer_threads() {
        let (left, right) = SerialStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let reader_thread = std::thread::spawn(move || {
            for expected in 0..64u32 {
                let frame = reader.read_frame().unwrap();
                assert_eq!(
                    frame.payload().unwrap().as_ref(),
                    format!("msg-{expected}").as_bytes()
                );
            }
        });

        for i in 0..64u32 {
            writer.send_data(format!("msg-{i}").as_bytes()).unwrap();
        }

        reader_thread.join().unwrap();
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.config().mtu, DEFAULT_MTU);
        let _inner = reader.into_inner();
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct WouldBlockReader;

    impl Read for WouldBlockReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }
}
