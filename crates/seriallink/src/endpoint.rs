use seriallink_flow::{LinkStats, SerialTransport, TransportConfig};
use seriallink_router::{PacketRouter, RouterConfig, RouterHandle, RouterStats};
use seriallink_transport::{SerialConfig, SerialDevice, SerialStream};
use tracing::info;

use crate::bridge::{Bridge, BridgeStats};
use crate::error::Result;

/// One side of a serial link: transport, router and the bridge between them.
///
/// Functional consumers talk to [`Endpoint::router`]; the line is driven by
/// the transport tasks.
pub struct Endpoint {
    transport: SerialTransport,
    router: PacketRouter,
    bridge: Bridge,
}

impl Endpoint {
    /// Run an endpoint over an already-open stream.
    ///
    /// The router's packet limit follows the transport MTU.
    pub fn over_stream(
        stream: SerialStream,
        transport_config: TransportConfig,
        router_config: RouterConfig,
    ) -> Result<Self> {
        let router_config = RouterConfig {
            mtu: transport_config.mtu,
            ..router_config
        };
        let line = stream.kind();
        let mtu = router_config.mtu;
        let transport = SerialTransport::over_stream(stream, transport_config)?;
        let router = PacketRouter::new(router_config)?;
        let bridge = Bridge::start(&transport, &router)?;
        info!(line, mtu, "endpoint started");
        Ok(Self {
            transport,
            router,
            bridge,
        })
    }

    /// Open a serial device and run an endpoint over it.
    pub fn open(
        serial: &SerialConfig,
        transport_config: TransportConfig,
        router_config: RouterConfig,
    ) -> Result<Self> {
        let stream = SerialDevice::open(serial)?;
        info!(path = %serial.path.display(), baud_rate = serial.baud_rate, "serial device opened");
        Self::over_stream(stream, transport_config, router_config)
    }

    /// Two endpoints joined by an in-process simulated line.
    #[cfg(unix)]
    pub fn simulated_pair(
        transport_config: TransportConfig,
        router_config: RouterConfig,
    ) -> Result<(Self, Self)> {
        let (left, right) = SerialStream::pair()?;
        let a = Self::over_stream(left, transport_config.clone(), router_config.clone())?;
        let b = Self::over_stream(right, transport_config, router_config)?;
        Ok((a, b))
    }

    pub fn router(&self) -> &PacketRouter {
        &self.router
    }

    /// Cloneable router access for consumer threads.
    pub fn router_handle(&self) -> RouterHandle {
        self.router.handle()
    }

    pub fn transport(&self) -> &SerialTransport {
        &self.transport
    }

    pub fn is_synchronized(&self) -> bool {
        self.transport.is_synchronized()
    }

    pub fn link_stats(&self) -> LinkStats {
        self.transport.stats()
    }

    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    pub fn bridge_stats(&self) -> BridgeStats {
        self.bridge.stats()
    }

    /// Stop the link and shut the line down.
    ///
    /// The peer of a simulated line observes end-of-stream. A UART peer sees
    /// the line go quiet; local tasks stop within one poll interval.
    pub fn close(&self) {
        self.transport.close();
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.transport.close();
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("transport", &self.transport)
            .field("router", &self.router)
            .field("bridge", &self.bridge)
            .finish()
    }
}
