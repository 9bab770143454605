use std::io::Write;
use std::sync::atomic::Ordering;
use std::thread;

use seriallink_frame::FrameWriter;
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::engine::Shared;
use crate::error::Result;
use crate::signals::Signals;

/// Outcome of the cold-start rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rendezvous {
    /// The peer's sentinel was observed; steady state may begin.
    Synchronized { attempts: u32 },
    /// The link closed before the peer answered.
    Closed,
}

/// Send sentinels until the peer's first sentinel has been observed.
///
/// Both endpoints run this same phase, so neither needs to lead. The
/// `PEER_GRANTED` bit is only inspected, never cleared: the sentinel that
/// ends the rendezvous also serves as the first transmit credit.
pub(crate) fn rendezvous<W: Write>(
    writer: &mut FrameWriter<W>,
    shared: &Shared,
    config: &TransportConfig,
) -> Result<Rendezvous> {
    // The local receive task must be reading before our first sentinel goes out.
    thread::sleep(config.startup_delay);

    let mut attempts = 0u32;
    loop {
        if shared.is_closed() {
            debug!(attempts, "link closed during startup");
            return Ok(Rendezvous::Closed);
        }

        writer.send_sentinel()?;
        shared.counters.sentinels_sent.fetch_add(1, Ordering::Relaxed);
        attempts += 1;

        thread::sleep(config.retry_interval);
        if shared.signals.get().contains(Signals::PEER_GRANTED) {
            break;
        }
    }

    shared.synchronized.store(true, Ordering::SeqCst);
    info!(attempts, "link synchronized");
    Ok(Rendezvous::Synchronized { attempts })
}
