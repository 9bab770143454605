#[cfg(unix)]
use std::thread;
use std::time::Duration;

use seriallink::flow::TransportConfig;
use seriallink::router::{RoutablePacket, Route, RouterConfig};
use seriallink::Endpoint;

use crate::cmd::LoopbackArgs;
use crate::exit::{link_stack_error, router_error, CliError, CliResult, SUCCESS};
use crate::output::{print_packet, print_stats, OutputFormat};

/// A simulated line is ready as soon as both tasks run.
#[cfg(unix)]
const SIMULATED_STARTUP: Duration = Duration::from_millis(10);

#[cfg(not(unix))]
pub fn run(_args: LoopbackArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(CliError::usage(
        "loopback needs simulated lines, which are only available on Unix",
    ))
}

#[cfg(unix)]
pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let Some(mailbox) = args.function.mailbox() else {
        return Err(CliError::usage(format!(
            "function {} has no mailbox; its packets are dropped by the router",
            args.function
        )));
    };

    let transport_config = TransportConfig {
        mtu: args.mtu,
        startup_delay: SIMULATED_STARTUP,
        retry_interval: SIMULATED_STARTUP,
        ..TransportConfig::default()
    };
    let (a, b) = Endpoint::simulated_pair(transport_config, RouterConfig::default())
        .map_err(|err| link_stack_error("loopback setup failed", err))?;

    let route = Route::new(args.destination, args.function);
    let packets: Vec<RoutablePacket> = (0..args.count)
        .map(|seq| RoutablePacket::new(route, format!("{}-{seq}", args.data).into_bytes()))
        .collect();
    for packet in &packets {
        packet
            .validate(a.router().config().mtu)
            .map_err(|err| router_error("invalid packet", err))?;
    }

    let producer = {
        let router = a.router_handle();
        thread::spawn(move || {
            for packet in packets {
                router.submit_outbound(packet)?;
            }
            Ok::<(), seriallink::router::RouterError>(())
        })
    };

    // Every packet crosses a -> b, then b sends it straight back.
    for _ in 0..args.count {
        let packet = b
            .router()
            .receive_for(mailbox)
            .map_err(|err| router_error("receive failed", err))?;
        print_packet(&packet, "b", format);
        b.router()
            .submit_outbound(packet)
            .map_err(|err| router_error("reply failed", err))?;

        let echoed = a
            .router()
            .receive_for(mailbox)
            .map_err(|err| router_error("receive failed", err))?;
        print_packet(&echoed, "a", format);
    }

    producer
        .join()
        .map_err(|_| CliError::new(crate::exit::INTERNAL, "producer thread panicked"))?
        .map_err(|err| router_error("submit failed", err))?;

    if args.stats {
        print_stats("link_a", &a.link_stats(), format);
        print_stats("link_b", &b.link_stats(), format);
        print_stats("router_b", &b.router_stats(), format);
        print_stats("bridge_b", &b.bridge_stats(), format);
    }

    a.close();
    b.close();
    Ok(SUCCESS)
}
