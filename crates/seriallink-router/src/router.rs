use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender, TryRecvError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::error::{Result, RouterError};
use crate::packet::{Function, Mailbox, RoutablePacket};

#[derive(Debug, Default)]
struct DispatchCounters {
    dispatched: AtomicU64,
    dropped: AtomicU64,
}

/// Sending ends of the per-function mailboxes, owned by the dispatch task.
struct MailboxSenders {
    test: Sender<RoutablePacket>,
    wireless_ctrl: Sender<RoutablePacket>,
}

impl MailboxSenders {
    fn for_function(&self, function: Function) -> Option<&Sender<RoutablePacket>> {
        match function.mailbox()? {
            Mailbox::Test => Some(&self.test),
            Mailbox::WirelessCtrl => Some(&self.wireless_ctrl),
        }
    }
}

/// Queue depths and dispatch counters of a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub inbound_depth: usize,
    pub inbound_capacity: usize,
    pub outbound_depth: usize,
    pub outbound_capacity: usize,
    pub test_depth: usize,
    pub test_capacity: usize,
    pub wireless_ctrl_depth: usize,
    pub wireless_ctrl_capacity: usize,
    /// Packets delivered to a mailbox.
    pub dispatched: u64,
    /// Packets dropped for lack of a mailbox.
    pub dropped: u64,
}

/// Cloneable access to a router's queues.
///
/// Any number of handles may exist; the dispatch task runs until every
/// handle is gone.
#[derive(Clone)]
pub struct RouterHandle {
    inbound: Sender<RoutablePacket>,
    outbound_tx: Sender<RoutablePacket>,
    outbound_rx: Receiver<RoutablePacket>,
    test: Receiver<RoutablePacket>,
    wireless_ctrl: Receiver<RoutablePacket>,
    counters: Arc<DispatchCounters>,
    config: Arc<RouterConfig>,
}

impl RouterHandle {
    /// Queue a packet received from the transport (blocking while full).
    pub fn post_inbound(&self, packet: RoutablePacket) -> Result<()> {
        self.inbound.send(packet).map_err(|_| RouterError::Closed)
    }

    /// Take the next packet dispatched to `mailbox` (blocking).
    pub fn receive_for(&self, mailbox: Mailbox) -> Result<RoutablePacket> {
        self.mailbox(mailbox).recv().map_err(|_| RouterError::Closed)
    }

    /// Take the next packet dispatched to `mailbox` if one is waiting.
    pub fn try_receive_for(&self, mailbox: Mailbox) -> Result<Option<RoutablePacket>> {
        match self.mailbox(mailbox).try_recv() {
            Ok(packet) => Ok(Some(packet)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(RouterError::Closed),
        }
    }

    pub fn receive_test(&self) -> Result<RoutablePacket> {
        self.receive_for(Mailbox::Test)
    }

    pub fn receive_wireless_ctrl(&self) -> Result<RoutablePacket> {
        self.receive_for(Mailbox::WirelessCtrl)
    }

    /// Queue a packet for the transport (blocking while full).
    ///
    /// The packet must fit one transport frame.
    pub fn submit_outbound(&self, packet: RoutablePacket) -> Result<()> {
        packet.validate(self.config.mtu)?;
        self.outbound_tx.send(packet).map_err(|_| RouterError::Closed)
    }

    /// Take the next outbound packet (blocking).
    pub fn next_outbound(&self) -> Result<RoutablePacket> {
        self.outbound_rx.recv().map_err(|_| RouterError::Closed)
    }

    /// Receiving end of the outbound queue, for pumps that also wait on
    /// other channels.
    pub fn outbound_queue(&self) -> Receiver<RoutablePacket> {
        self.outbound_rx.clone()
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            inbound_depth: self.inbound.len(),
            inbound_capacity: self.inbound.capacity().unwrap_or_default(),
            outbound_depth: self.outbound_rx.len(),
            outbound_capacity: self.outbound_rx.capacity().unwrap_or_default(),
            test_depth: self.test.len(),
            test_capacity: self.test.capacity().unwrap_or_default(),
            wireless_ctrl_depth: self.wireless_ctrl.len(),
            wireless_ctrl_capacity: self.wireless_ctrl.capacity().unwrap_or_default(),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    fn mailbox(&self, mailbox: Mailbox) -> &Receiver<RoutablePacket> {
        match mailbox {
            Mailbox::Test => &self.test,
            Mailbox::WirelessCtrl => &self.wireless_ctrl,
        }
    }
}

/// Dispatches inbound packets to per-function mailboxes.
///
/// One dispatch task serves every mailbox in arrival order, so a full
/// mailbox holds up dispatch for all of them until it drains.
pub struct PacketRouter {
    handle: RouterHandle,
}

impl PacketRouter {
    /// Create the queues and start the dispatch task.
    pub fn new(config: RouterConfig) -> Result<Self> {
        let (inbound_tx, inbound_rx) = bounded(config.inbound_capacity.max(1));
        let (outbound_tx, outbound_rx) = bounded(config.outbound_capacity.max(1));
        let (test_tx, test_rx) = bounded(config.test_capacity.max(1));
        let (wireless_tx, wireless_rx) = bounded(config.wireless_ctrl_capacity.max(1));
        let counters = Arc::new(DispatchCounters::default());

        let senders = MailboxSenders {
            test: test_tx,
            wireless_ctrl: wireless_tx,
        };
        {
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name("seriallink-dispatch".to_string())
                .spawn(move || dispatch(inbound_rx, senders, counters))?;
        }

        info!(
            inbound_capacity = config.inbound_capacity,
            outbound_capacity = config.outbound_capacity,
            "packet router started"
        );

        Ok(Self {
            handle: RouterHandle {
                inbound: inbound_tx,
                outbound_tx,
                outbound_rx,
                test: test_rx,
                wireless_ctrl: wireless_rx,
                counters,
                config: Arc::new(config),
            },
        })
    }

    /// A cloneable handle for producers and consumers on other threads.
    pub fn handle(&self) -> RouterHandle {
        self.handle.clone()
    }

    pub fn post_inbound(&self, packet: RoutablePacket) -> Result<()> {
        self.handle.post_inbound(packet)
    }

    pub fn receive_for(&self, mailbox: Mailbox) -> Result<RoutablePacket> {
        self.handle.receive_for(mailbox)
    }

    pub fn try_receive_for(&self, mailbox: Mailbox) -> Result<Option<RoutablePacket>> {
        self.handle.try_receive_for(mailbox)
    }

    pub fn receive_test(&self) -> Result<RoutablePacket> {
        self.handle.receive_test()
    }

    pub fn receive_wireless_ctrl(&self) -> Result<RoutablePacket> {
        self.handle.receive_wireless_ctrl()
    }

    pub fn submit_outbound(&self, packet: RoutablePacket) -> Result<()> {
        self.handle.submit_outbound(packet)
    }

    pub fn next_outbound(&self) -> Result<RoutablePacket> {
        self.handle.next_outbound()
    }

    pub fn stats(&self) -> RouterStats {
        self.handle.stats()
    }

    pub fn config(&self) -> &RouterConfig {
        self.handle.config()
    }
}

impl std::fmt::Debug for PacketRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketRouter")
            .field("config", self.config())
            .field("stats", &self.stats())
            .finish()
    }
}

fn dispatch(
    inbound: Receiver<RoutablePacket>,
    mailboxes: MailboxSenders,
    counters: Arc<DispatchCounters>,
) {
    while let Ok(packet) = inbound.recv() {
        let function = packet.route.function;
        let Some(mailbox) = mailboxes.for_function(function) else {
            warn!(
                function = %function,
                destination = packet.route.destination,
                "no mailbox for function, dropping packet"
            );
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        if mailbox.send(packet).is_err() {
            debug!(function = %function, "mailbox closed");
            break;
        }
        counters.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(function = %function, "dispatched packet");
    }
    debug!("dispatch task stopped");
}
