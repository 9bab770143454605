use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;

/// A duplex serial byte line implementing Read + Write.
///
/// Reads block until at least one byte arrives; the line never reports a
/// timeout to callers. On a UART the port's poll timeout is retried
/// internally until the line is closed. On a simulated line the socket
/// blocks natively.
pub struct SerialStream {
    inner: SerialStreamInner,
    /// Shared by every clone of the line.
    closed: Arc<AtomicBool>,
}

enum SerialStreamInner {
    Port(Box<dyn serialport::SerialPort>),
    #[cfg(unix)]
    Simulated(std::os::unix::net::UnixStream),
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Port(port) => match retry_timeouts(&self.closed, || port.read(buf)) {
                // A closed UART reads as end-of-stream.
                Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(0),
                other => other,
            },
            #[cfg(unix)]
            SerialStreamInner::Simulated(stream) => stream.read(buf),
        }
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Port(port) => retry_timeouts(&self.closed, || port.write(buf)),
            #[cfg(unix)]
            SerialStreamInner::Simulated(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            SerialStreamInner::Port(port) => port.flush(),
            #[cfg(unix)]
            SerialStreamInner::Simulated(stream) => stream.flush(),
        }
    }
}

/// Retry `op` across port timeouts until it completes or the line closes.
fn retry_timeouts(
    closed: &AtomicBool,
    mut op: impl FnMut() -> std::io::Result<usize>,
) -> std::io::Result<usize> {
    loop {
        if closed.load(Ordering::SeqCst) {
            return Err(ErrorKind::BrokenPipe.into());
        }
        match op() {
            Err(err) if err.kind() == ErrorKind::TimedOut => continue,
            other => return other,
        }
    }
}

impl SerialStream {
    fn new(inner: SerialStreamInner) -> Self {
        Self {
            inner,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wrap an opened serial port.
    pub(crate) fn from_port(port: Box<dyn serialport::SerialPort>) -> Self {
        Self::new(SerialStreamInner::Port(port))
    }

    /// Create a connected pair of simulated lines.
    ///
    /// Bytes written on one end are read on the other, in both directions,
    /// like two UARTs wired TX-to-RX.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::simulated(left), Self::simulated(right)))
    }

    /// Wrap one end of an existing socket as a simulated line.
    #[cfg(unix)]
    pub fn simulated(stream: std::os::unix::net::UnixStream) -> Self {
        Self::new(SerialStreamInner::Simulated(stream))
    }

    /// Try to clone this stream so reads and writes can run on separate threads.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            SerialStreamInner::Port(port) => {
                SerialStreamInner::Port(port.try_clone().map_err(std::io::Error::from)?)
            }
            #[cfg(unix)]
            SerialStreamInner::Simulated(stream) => {
                SerialStreamInner::Simulated(stream.try_clone()?)
            }
        };
        Ok(Self {
            inner,
            closed: Arc::clone(&self.closed),
        })
    }

    /// Close the line for this stream and every clone of it.
    ///
    /// A simulated line is shut down so the peer's reads observe
    /// end-of-stream. A UART has no end-of-stream on the wire; pending and
    /// later local reads return `Ok(0)` within one poll interval and writes
    /// fail with `BrokenPipe`.
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        match &self.inner {
            SerialStreamInner::Port(_) => Ok(()),
            #[cfg(unix)]
            SerialStreamInner::Simulated(stream) => {
                match stream.shutdown(std::net::Shutdown::Both) {
                    Ok(()) => Ok(()),
                    Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    /// Whether [`SerialStream::close`] was called on this line.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Line kind for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            SerialStreamInner::Port(_) => "uart",
            #[cfg(unix)]
            SerialStreamInner::Simulated(_) => "simulated",
        }
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            SerialStreamInner::Port(port) => f
                .debug_struct("SerialStream")
                .field("type", &"uart")
                .field("name", &port.name())
                .finish(),
            #[cfg(unix)]
            SerialStreamInner::Simulated(_) => f
                .debug_struct("SerialStream")
                .field("type", &"simulated")
                .finish(),
        }
    }
}
