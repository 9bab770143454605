//! Pumps between a serial transport and a packet router.
//!
//! ```text
//! SerialTransport::receive ──> RoutablePacket::from_bytes ──> PacketRouter::post_inbound
//! PacketRouter outbound    ──> RoutablePacket::to_bytes   ──> SerialTransport::send
//! ```
//!
//! Each direction runs on its own thread. Malformed inbound packets (shorter
//! than the route header) are dropped with a warning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender};
use seriallink_flow::{SerialTransport, TransportReceiver, TransportSender};
use seriallink_router::{PacketRouter, RoutablePacket, RouterHandle};
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Default)]
struct PumpCounters {
    inbound: AtomicU64,
    outbound: AtomicU64,
    malformed: AtomicU64,
}

/// Packets moved by a bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct BridgeStats {
    /// Transport packets posted to the router.
    pub inbound: u64,
    /// Router packets handed to the transport.
    pub outbound: u64,
    /// Transport packets dropped for lacking a route header.
    pub malformed: u64,
}

/// Running pumps joining one transport to one router.
///
/// Dropping the bridge stops the outbound pump. The inbound pump stops when
/// the transport closes.
pub struct Bridge {
    counters: Arc<PumpCounters>,
    _shutdown: Sender<()>,
}

impl Bridge {
    /// Start both pumps.
    pub fn start(transport: &SerialTransport, router: &PacketRouter) -> Result<Self> {
        let counters = Arc::new(PumpCounters::default());
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        {
            let receiver = transport.receiver();
            let router = router.handle();
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name("seriallink-bridge-in".to_string())
                .spawn(move || pump_inbound(receiver, router, counters))?;
        }
        {
            let sender = transport.sender();
            let outbound = router.handle().outbound_queue();
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name("seriallink-bridge-out".to_string())
                .spawn(move || pump_outbound(outbound, sender, shutdown_rx, counters))?;
        }

        debug!("bridge started");
        Ok(Self {
            counters,
            _shutdown: shutdown_tx,
        })
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            inbound: self.counters.inbound.load(Ordering::Relaxed),
            outbound: self.counters.outbound.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("stats", &self.stats())
            .finish()
    }
}

fn pump_inbound(receiver: TransportReceiver, router: RouterHandle, counters: Arc<PumpCounters>) {
    loop {
        let bytes = match receiver.receive() {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(error = %err, "inbound pump stopped");
                return;
            }
        };

        let packet = match RoutablePacket::from_bytes(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(error = %err, "dropping malformed packet");
                counters.malformed.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        if let Err(err) = router.post_inbound(packet) {
            debug!(error = %err, "inbound pump stopped");
            return;
        }
        counters.inbound.fetch_add(1, Ordering::Relaxed);
    }
}

fn pump_outbound(
    outbound: Receiver<RoutablePacket>,
    sender: TransportSender,
    shutdown: Receiver<()>,
    counters: Arc<PumpCounters>,
) {
    loop {
        crossbeam::channel::select! {
            recv(outbound) -> packet => {
                let Ok(packet) = packet else {
                    debug!("router outbound queue closed");
                    return;
                };
                if let Err(err) = sender.send(packet.to_bytes()) {
                    debug!(error = %err, "outbound pump stopped");
                    return;
                }
                counters.outbound.fetch_add(1, Ordering::Relaxed);
            }
            recv(shutdown) -> _ => {
                debug!("outbound pump shutting down");
                return;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::time::{Duration, Instant};

    use seriallink_flow::TransportConfig;
    use seriallink_frame::{Frame, FrameReader, FrameWriter};
    use seriallink_router::{Function, Route, RouterConfig};
    use seriallink_transport::SerialStream;

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

    /// A bridged endpoint whose peer is driven frame by frame.
    fn scripted() -> (
        SerialTransport,
        PacketRouter,
        Bridge,
        FrameReader<UnixStream>,
        FrameWriter<UnixStream>,
    ) {
        let (local, peer) = UnixStream::pair().unwrap();
        let transport =
            SerialTransport::over_stream(SerialStream::simulated(local), fast_config()).unwrap();
        let router = PacketRouter::new(RouterConfig::default()).unwrap();
        let bridge = Bridge::start(&transport, &router).unwrap();

        let mut reader = FrameReader::new(peer.try_clone().unwrap());
        let mut writer = FrameWriter::new(peer);
        assert!(reader.read_frame().unwrap().is_sentinel());
        writer.send_sentinel().unwrap();
        assert!(wait_until(Duration::from_secs(1), || transport.is_synchronized()));

        (transport, router, bridge, reader, writer)
    }

    #[test]
    fn inbound_packets_reach_their_mailbox() {
        let (_transport, router, bridge, _reader, mut writer) = scripted();

        writer.send_data(&[0x01, 0x0E, b'h', b'i']).unwrap();

        let packet = router.receive_test().unwrap();
        assert_eq!(packet.route, Route::new(0x01, Function::Test));
        assert_eq!(packet.payload.as_ref(), b"hi");
        assert!(wait_until(Duration::from_secs(1), || bridge.stats().inbound == 1));
    }

    #[test]
    fn malformed_packets_are_dropped() {
        let (_transport, router, bridge, _reader, mut writer) = scripted();

        writer.send_data(&[0x01]).unwrap();
        writer.send_data(&[0x02, 0x04]).unwrap();

        let packet = router.receive_wireless_ctrl().unwrap();
        assert_eq!(packet.route.destination, 0x02);
        assert!(packet.payload.is_empty());
        assert_eq!(bridge.stats().malformed, 1);
    }

    #[test]
    fn outbound_packets_are_framed_onto_the_line() {
        let (_transport, router, bridge, mut reader, _writer) = scripted();

        router
            .submit_outbound(RoutablePacket::new(
                Route::new(0x30, Function::WirelessCtrl),
                &b"tx"[..],
            ))
            .unwrap();

        let frame = loop {
            match reader.read_frame().unwrap() {
                Frame::Sentinel => continue,
                frame => break frame,
            }
        };
        assert_eq!(frame, Frame::data(&[0x30, 0x04, b't', b'x'][..]));
        assert!(wait_until(Duration::from_secs(1), || bridge.stats().outbound == 1));
    }
}
