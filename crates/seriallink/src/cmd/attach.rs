use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError};
use seriallink::flow::TransportConfig;
use seriallink::router::{Mailbox, RouterConfig};
use seriallink::transport::SerialConfig;
use seriallink::Endpoint;

use crate::cmd::AttachArgs;
use crate::exit::{link_stack_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_packet, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: AttachArgs, format: OutputFormat) -> CliResult<i32> {
    let serial = SerialConfig {
        baud_rate: args.baud,
        ..SerialConfig::new(&args.path)
    };
    let transport_config = TransportConfig {
        mtu: args.mtu,
        ..TransportConfig::default()
    };
    let endpoint = Endpoint::open(&serial, transport_config, RouterConfig::default())
        .map_err(|err| link_stack_error("attach failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    // Every mailbox is drained so unselected traffic cannot stall dispatch.
    let (tx, rx) = bounded(Mailbox::ALL.len());
    for mailbox in Mailbox::ALL {
        let router = endpoint.router_handle();
        let tx = tx.clone();
        thread::Builder::new()
            .name(format!("seriallink-{}", mailbox.name().to_ascii_lowercase()))
            .spawn(move || {
                while let Ok(packet) = router.receive_for(mailbox) {
                    if tx.send((mailbox, packet)).is_err() {
                        break;
                    }
                }
            })
            .map_err(|err| crate::exit::io_error("failed to start mailbox reader", err))?;
    }
    drop(tx);

    let selected = args.mailbox.mailboxes();
    let path = args.path.display().to_string();
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let (mailbox, packet) = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(received) => received,
            Err(RecvTimeoutError::Timeout) => {
                if endpoint.transport().is_closed() {
                    return Err(CliError::new(FAILURE, "serial line closed"));
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if !selected.contains(&mailbox) {
            continue;
        }

        print_packet(&packet, &path, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    endpoint.close();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
