use std::io::{Read, Write};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use crossbeam::channel::{bounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use serde::Serialize;
use seriallink_frame::{validate_payload, FrameReader, FrameWriter};
use seriallink_transport::SerialStream;
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::engine::{run_receive, run_transmit, Shared};
use crate::error::{LinkError, Result};
use crate::signals::Signals;

/// Closes the link when the last transport handle goes away.
struct LinkGuard {
    shared: Arc<Shared>,
    line: Mutex<Option<SerialStream>>,
}

impl LinkGuard {
    fn close(&self) {
        self.shared.close();
        if let Some(line) = self.line.lock().as_ref() {
            if let Err(err) = line.close() {
                debug!(error = %err, "failed to close serial line");
            }
        }
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        self.close();
        debug!("serial transport released");
    }
}

/// Sending half of a serial transport.
#[derive(Clone)]
pub struct TransportSender {
    egress: Sender<Bytes>,
    shared: Arc<Shared>,
    mtu: usize,
    guard: Arc<LinkGuard>,
}

impl TransportSender {
    /// Queue a payload for transmission (blocking while the egress queue is full).
    ///
    /// The payload must fit one data frame: `1..=MTU` bytes.
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        validate_payload(&payload, self.mtu)?;
        if self.shared.is_closed() {
            return Err(LinkError::Closed);
        }

        self.egress.send(payload).map_err(|_| LinkError::Closed)?;
        self.shared.signals.set(Signals::OUTBOUND_QUEUED);
        Ok(())
    }

    /// Whether the link tasks have stopped.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Stop the link without waiting for every handle to drop.
    ///
    /// Transports built with [`SerialTransport::over_stream`] also shut the
    /// line down, which ends the receive task.
    pub fn close(&self) {
        self.guard.close();
    }
}

/// Receiving half of a serial transport.
#[derive(Clone)]
pub struct TransportReceiver {
    ingress: Receiver<Bytes>,
    _guard: Arc<LinkGuard>,
}

impl TransportReceiver {
    /// Take the next received payload (blocking).
    ///
    /// Returns `Err(LinkError::Closed)` once the receive task has stopped and
    /// every packet it accepted has been taken.
    pub fn receive(&self) -> Result<Bytes> {
        self.ingress.recv().map_err(|_| LinkError::Closed)
    }

    /// Take the next received payload if one is waiting.
    pub fn try_receive(&self) -> Result<Option<Bytes>> {
        match self.ingress.try_recv() {
            Ok(payload) => Ok(Some(payload)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(LinkError::Closed),
        }
    }
}

/// Snapshot of a transport's queues and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub synchronized: bool,
    pub closed: bool,
    pub ingress_depth: usize,
    pub ingress_capacity: usize,
    pub egress_depth: usize,
    pub egress_capacity: usize,
    pub data_frames_sent: u64,
    pub data_frames_received: u64,
    pub sentinels_sent: u64,
    pub sentinels_received: u64,
}

/// Bidirectional packet channel over one serial line.
///
/// Owns the transmit and receive tasks, their queues and their event group.
/// Dropping the transport (and every half obtained from it) stops the
/// transmit task and closes the line.
pub struct SerialTransport {
    sender: TransportSender,
    receiver: TransportReceiver,
    shared: Arc<Shared>,
    config: TransportConfig,
}

impl SerialTransport {
    /// Start a transport over a serial stream.
    pub fn over_stream(stream: SerialStream, config: TransportConfig) -> Result<Self> {
        let reader = stream.try_clone()?;
        let closer = stream.try_clone()?;
        Self::start(reader, stream, config, Some(closer))
    }

    /// Start a transport over separate read and write halves.
    pub fn spawn<R, W>(reader: R, writer: W, config: TransportConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self::start(reader, writer, config, None)
    }

    fn start<R, W>(
        reader: R,
        writer: W,
        config: TransportConfig,
        line: Option<SerialStream>,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let shared = Arc::new(Shared::new());
        let (ingress_tx, ingress_rx) = bounded(config.ingress_capacity.max(1));
        let (egress_tx, egress_rx) = bounded(config.egress_capacity.max(1));
        let guard = Arc::new(LinkGuard {
            shared: Arc::clone(&shared),
            line: Mutex::new(line),
        });

        let reader = FrameReader::with_config(reader, config.frame_config());
        let writer = FrameWriter::with_config(writer, config.frame_config());

        {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("seriallink-rx".to_string())
                .spawn(move || run_receive(reader, ingress_tx, shared))?;
        }
        {
            let shared = Arc::clone(&shared);
            let config = config.clone();
            thread::Builder::new()
                .name("seriallink-tx".to_string())
                .spawn(move || run_transmit(writer, egress_rx, shared, config))?;
        }

        info!(
            mtu = config.effective_mtu(),
            ingress_capacity = config.ingress_capacity,
            egress_capacity = config.egress_capacity,
            "serial transport started"
        );

        Ok(Self {
            sender: TransportSender {
                egress: egress_tx,
                shared: Arc::clone(&shared),
                mtu: config.effective_mtu(),
                guard: Arc::clone(&guard),
            },
            receiver: TransportReceiver {
                ingress: ingress_rx,
                _guard: guard,
            },
            shared,
            config,
        })
    }

    /// Queue a payload for transmission (blocking while the egress queue is full).
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.sender.send(payload)
    }

    /// Take the next received payload (blocking).
    pub fn receive(&self) -> Result<Bytes> {
        self.receiver.receive()
    }

    /// Take the next received payload if one is waiting.
    pub fn try_receive(&self) -> Result<Option<Bytes>> {
        self.receiver.try_receive()
    }

    /// Whether the startup rendezvous with the peer has completed.
    pub fn is_synchronized(&self) -> bool {
        self.shared.synchronized.load(Ordering::SeqCst)
    }

    /// Whether the link tasks have stopped.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Stop the link. See [`TransportSender::close`].
    pub fn close(&self) {
        self.sender.close();
    }

    /// Current queue depths and frame counters.
    pub fn stats(&self) -> LinkStats {
        let counters = &self.shared.counters;
        LinkStats {
            synchronized: self.is_synchronized(),
            closed: self.is_closed(),
            ingress_depth: self.receiver.ingress.len(),
            ingress_capacity: self.config.ingress_capacity.max(1),
            egress_depth: self.sender.egress.len(),
            egress_capacity: self.config.egress_capacity.max(1),
            data_frames_sent: counters.data_frames_sent.load(Ordering::Relaxed),
            data_frames_received: counters.data_frames_received.load(Ordering::Relaxed),
            sentinels_sent: counters.sentinels_sent.load(Ordering::Relaxed),
            sentinels_received: counters.sentinels_received.load(Ordering::Relaxed),
        }
    }

    /// Transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// A sending half that can move to another thread.
    pub fn sender(&self) -> TransportSender {
        self.sender.clone()
    }

    /// A receiving half that can move to another thread.
    pub fn receiver(&self) -> TransportReceiver {
        self.receiver.clone()
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (TransportSender, TransportReceiver) {
        (self.sender, self.receiver)
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::ErrorKind;
    use std::os::unix::net::UnixStream;
    use std::time::{Duration, Instant};

    use seriallink_frame::{Frame, FrameError};

    use super::*;

    fn fast_config() -> TransportConfig {
        TransportConfig {
            startup_delay: Duration::from_millis(10),
            retry_interval: Duration::from_millis(10),
            ..TransportConfig::default()
        }
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn linked_pair(left: TransportConfig, right: TransportConfig) -> (SerialTransport, SerialTransport) {
        let (a_line, b_line) = SerialStream::pair().unwrap();
        let a = SerialTransport::over_stream(a_line, left).unwrap();
        let b = SerialTransport::over_stream(b_line, right).unwrap();
        assert!(
            wait_until(Duration::from_secs(2), || a.is_synchronized()
                && b.is_synchronized()),
            "endpoints failed to synchronize"
        );
        // Let trailing startup sentinels drain before measuring credits.
        thread::sleep(Duration::from_millis(50));
        (a, b)
    }

    fn next_data<R: Read>(reader: &mut FrameReader<R>) -> Bytes {
        loop {
            match reader.read_frame().unwrap() {
                Frame::Sentinel => continue,
                Frame::Data(payload) => return payload,
            }
        }
    }

    fn assert_send<T: Send>() {}

    #[test]
    fn halves_can_move_across_threads() {
        assert_send::<TransportSender>();
        assert_send::<TransportReceiver>();
        assert_send::<SerialTransport>();

        let (a, b) = linked_pair(fast_config(), fast_config());
        let receiver = b.receiver();
        let reader = thread::spawn(move || receiver.receive());
        let sender = a.sender();
        thread::spawn(move || sender.send(&b"moved"[..]))
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(reader.join().unwrap().unwrap().as_ref(), b"moved");
    }

    #[test]
    fn exchanges_packets_in_both_directions() {
        let (a, b) = linked_pair(fast_config(), fast_config());

        a.send(&b"to-b"[..]).unwrap();
        assert_eq!(b.receive().unwrap().as_ref(), b"to-b");

        b.send(&b"to-a"[..]).unwrap();
        assert_eq!(a.receive().unwrap().as_ref(), b"to-a");
    }

    #[test]
    fn concurrent_bursts_arrive_in_order() {
        let (a, b) = linked_pair(fast_config(), fast_config());
        let (a_tx, a_rx) = a.split();
        let (b_tx, b_rx) = b.split();

        let a_sender = thread::spawn(move || {
            for i in 0..50u32 {
                a_tx.send(format!("a-{i}").into_bytes()).unwrap();
            }
            a_tx
        });
        let b_sender = thread::spawn(move || {
            for i in 0..50u32 {
                b_tx.send(format!("b-{i}").into_bytes()).unwrap();
            }
            b_tx
        });

        for i in 0..50u32 {
            assert_eq!(b_rx.receive().unwrap().as_ref(), format!("a-{i}").as_bytes());
            assert_eq!(a_rx.receive().unwrap().as_ref(), format!("b-{i}").as_bytes());
        }

        let _a_tx = a_sender.join().unwrap();
        let _b_tx = b_sender.join().unwrap();
    }

    #[test]
    fn stop_and_wait_holds_second_frame_until_credit() {
        let (local_end, peer_end) = UnixStream::pair().unwrap();
        let transport =
            SerialTransport::over_stream(SerialStream::simulated(local_end), fast_config())
                .unwrap();
        let mut peer_reader = FrameReader::new(peer_end.try_clone().unwrap());
        let mut peer_writer = FrameWriter::new(peer_end);

        transport.send(&b"first"[..]).unwrap();
        transport.send(&b"second"[..]).unwrap();

        // Answer the local startup sentinel exactly once.
        assert!(peer_reader.read_frame().unwrap().is_sentinel());
        peer_writer.send_sentinel().unwrap();

        assert_eq!(next_data(&mut peer_reader).as_ref(), b"first");

        peer_reader
            .get_ref()
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let err = peer_reader.read_frame().unwrap_err();
        assert!(
            matches!(&err, FrameError::Io(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)),
            "second frame must wait for a credit, got {err:?}"
        );
        assert_eq!(transport.stats().data_frames_sent, 1);
        peer_reader.get_ref().set_read_timeout(None).unwrap();

        peer_writer.send_sentinel().unwrap();
        assert_eq!(peer_reader.read_frame().unwrap(), Frame::data(&b"second"[..]));

        // Inbound data is answered with a credit grant.
        peer_writer.send_data(b"from-peer").unwrap();
        assert_eq!(transport.receive().unwrap().as_ref(), b"from-peer");
        assert!(peer_reader.read_frame().unwrap().is_sentinel());
    }

    #[test]
    fn startup_converges_with_independent_delays() {
        for (delay_a, delay_b) in [(0u64, 60u64), (60, 0), (25, 35)] {
            let config = |delay: u64| TransportConfig {
                startup_delay: Duration::from_millis(delay),
                retry_interval: Duration::from_millis(10),
                ..TransportConfig::default()
            };
            let (a_line, b_line) = SerialStream::pair().unwrap();
            let a = SerialTransport::over_stream(a_line, config(delay_a)).unwrap();
            let b = SerialTransport::over_stream(b_line, config(delay_b)).unwrap();

            // Bounded by the later start plus twenty retry intervals.
            let bound = Duration::from_millis(delay_a.max(delay_b) + 20 * 10);
            assert!(
                wait_until(bound, || a.is_synchronized() && b.is_synchronized()),
                "no convergence for delays ({delay_a}, {delay_b})"
            );
            assert!(a.stats().sentinels_received > 0);
            assert!(b.stats().sentinels_received > 0);
        }
    }

    #[test]
    fn grant_waits_for_ingress_space() {
        let receiver_config = TransportConfig {
            ingress_capacity: 1,
            ..fast_config()
        };
        let (a, b) = linked_pair(fast_config(), receiver_config);

        for payload in [&b"p1"[..], &b"p2"[..], &b"p3"[..]] {
            a.send(payload).unwrap();
        }

        // p1 is queued and granted, p2 is held by the blocked receive task,
        // p3 waits at the sender for a credit that has not been issued.
        assert!(wait_until(Duration::from_secs(1), || a
            .stats()
            .data_frames_sent
            == 2));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(a.stats().data_frames_sent, 2);
        assert_eq!(b.stats().ingress_depth, 1);

        assert_eq!(b.receive().unwrap().as_ref(), b"p1");
        assert_eq!(b.receive().unwrap().as_ref(), b"p2");
        assert_eq!(b.receive().unwrap().as_ref(), b"p3");
        assert!(wait_until(Duration::from_secs(1), || a
            .stats()
            .data_frames_sent
            == 3));
    }

    #[test]
    fn send_validates_payload_size() {
        let (a, _b) = linked_pair(fast_config(), fast_config());

        let err = a.send(Bytes::new()).unwrap_err();
        assert!(matches!(err, LinkError::Frame(FrameError::EmptyPayload)));

        let err = a.send(vec![0u8; 101]).unwrap_err();
        assert!(matches!(
            err,
            LinkError::Frame(FrameError::PayloadTooLarge { size: 101, max: 100 })
        ));

        assert_eq!(a.stats().egress_depth, 0);
    }

    #[test]
    fn dropping_peer_closes_link() {
        let (a, b) = linked_pair(fast_config(), fast_config());
        drop(b);

        assert!(matches!(a.receive(), Err(LinkError::Closed)));
        assert!(wait_until(Duration::from_secs(1), || a.is_closed()));
        assert!(matches!(a.send(&b"late"[..]), Err(LinkError::Closed)));
        assert!(a.stats().closed);
    }

    #[test]
    fn explicit_close_stops_both_ends() {
        let (a, b) = linked_pair(fast_config(), fast_config());
        let receiver = b.receiver();

        b.close();
        assert!(b.is_closed());
        assert!(matches!(b.send(&b"x"[..]), Err(LinkError::Closed)));
        assert!(matches!(receiver.receive(), Err(LinkError::Closed)));
        assert!(matches!(a.receive(), Err(LinkError::Closed)));
    }

    #[test]
    fn spawn_over_separate_halves() {
        let (left, right) = UnixStream::pair().unwrap();
        let a = SerialTransport::spawn(left.try_clone().unwrap(), left, fast_config()).unwrap();
        let b = SerialTransport::spawn(right.try_clone().unwrap(), right, fast_config()).unwrap();
        assert!(wait_until(Duration::from_secs(2), || a.is_synchronized()
            && b.is_synchronized()));

        a.send(&b"halves"[..]).unwrap();
        assert_eq!(b.receive().unwrap().as_ref(), b"halves");
        assert!(b.try_receive().unwrap().is_none());
    }

    #[test]
    fn stats_serialize_to_json() {
        let (a, _b) = linked_pair(fast_config(), fast_config());
        let value = serde_json::to_value(a.stats()).unwrap();
        assert_eq!(value["synchronized"], true);
        assert_eq!(value["ingress_capacity"], 10);
    }
}
