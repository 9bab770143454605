//! Transmit and receive state machines of one endpoint.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::{Receiver, Sender, TryRecvError};
use seriallink_frame::{Frame, FrameError, FrameReader, FrameWriter};
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::{LinkError, Result};
use crate::signals::{EventGroup, Signals};
use crate::startup::{rendezvous, Rendezvous};

/// Frame counters, updated by the link tasks.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub data_frames_sent: AtomicU64,
    pub data_frames_received: AtomicU64,
    pub sentinels_sent: AtomicU64,
    pub sentinels_received: AtomicU64,
}

/// State owned jointly by the transmit and receive tasks of one endpoint.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub signals: EventGroup,
    pub synchronized: AtomicBool,
    pub closed: AtomicBool,
    pub counters: Counters,
}

impl Shared {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the link closed and wake the transmit task.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.signals.set(Signals::LINK_CLOSED);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Transmit task body. Raises `LINK_CLOSED` on the way out.
pub(crate) fn run_transmit<W: Write>(
    writer: FrameWriter<W>,
    egress: Receiver<Bytes>,
    shared: Arc<Shared>,
    config: TransportConfig,
) {
    match transmit_loop(writer, &egress, &shared, &config) {
        Ok(()) => debug!("transmit task stopped"),
        Err(err) => warn!(error = %err, "transmit task failed"),
    }
    shared.close();
}

fn transmit_loop<W: Write>(
    mut writer: FrameWriter<W>,
    egress: &Receiver<Bytes>,
    shared: &Shared,
    config: &TransportConfig,
) -> Result<()> {
    if rendezvous(&mut writer, shared, config)? == Rendezvous::Closed {
        return Ok(());
    }

    loop {
        // Nothing to send: wait for either a packet or a grant we owe.
        if egress.is_empty() {
            debug!("waiting for owed grant or outbound packet");
            let woke = shared
                .signals
                .wait_any(Signals::OWES_GRANT | Signals::OUTBOUND_QUEUED | Signals::LINK_CLOSED);
            if woke.contains(Signals::LINK_CLOSED) {
                return Ok(());
            }
            if woke.contains(Signals::OWES_GRANT) {
                send_grant(&mut writer, shared)?;
            }
        }

        let payload = match egress.try_recv() {
            Ok(payload) => payload,
            Err(TryRecvError::Empty) => continue,
            Err(TryRecvError::Disconnected) => return Ok(()),
        };

        // Hold the packet until the peer grants a credit. Grants we owe must
        // still go out while we wait.
        loop {
            debug!("waiting for peer credit");
            let woke = shared
                .signals
                .wait_any(Signals::OWES_GRANT | Signals::PEER_GRANTED | Signals::LINK_CLOSED);
            if woke.contains(Signals::LINK_CLOSED) {
                return Ok(());
            }
            if woke.contains(Signals::OWES_GRANT) {
                send_grant(&mut writer, shared)?;
            }
            if woke.contains(Signals::PEER_GRANTED) {
                break;
            }
        }

        writer.send_data(&payload)?;
        shared
            .counters
            .data_frames_sent
            .fetch_add(1, Ordering::Relaxed);
        debug!(len = payload.len(), "sent data frame");
    }
}

fn send_grant<W: Write>(writer: &mut FrameWriter<W>, shared: &Shared) -> Result<()> {
    writer.send_sentinel()?;
    shared.counters.sentinels_sent.fetch_add(1, Ordering::Relaxed);
    debug!("sent credit grant");
    Ok(())
}

/// Receive task body. Raises `LINK_CLOSED` on the way out.
pub(crate) fn run_receive<R: Read>(
    reader: FrameReader<R>,
    ingress: Sender<Bytes>,
    shared: Arc<Shared>,
) {
    match receive_loop(reader, &ingress, &shared) {
        Ok(()) => debug!("ingress queue closed, receive task stopped"),
        Err(LinkError::Frame(FrameError::ConnectionClosed)) => info!("serial line closed"),
        Err(err) => warn!(error = %err, "receive task failed"),
    }
    shared.close();
}

fn receive_loop<R: Read>(
    mut reader: FrameReader<R>,
    ingress: &Sender<Bytes>,
    shared: &Shared,
) -> Result<()> {
    loop {
        match reader.read_frame()? {
            Frame::Sentinel => {
                shared
                    .counters
                    .sentinels_received
                    .fetch_add(1, Ordering::Relaxed);
                debug!("received sentinel");
                shared.signals.set(Signals::PEER_GRANTED);
            }
            Frame::Data(payload) => {
                shared
                    .counters
                    .data_frames_received
                    .fetch_add(1, Ordering::Relaxed);
                debug!(len = payload.len(), "received data frame");

                // Grant first only when the enqueue cannot block; otherwise
                // grant once the packet has been accepted. This task is the
                // sole producer, so a free slot seen here is still free when
                // the packet is queued.
                if ingress.is_full() {
                    if ingress.send(payload).is_err() {
                        return Ok(());
                    }
                    shared.signals.set(Signals::OWES_GRANT);
                } else {
                    shared.signals.set(Signals::OWES_GRANT);
                    if ingress.send(payload).is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
