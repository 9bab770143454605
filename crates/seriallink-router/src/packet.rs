//! Routable packets and function codes.
//!
//! A routable packet travels inside one transport data frame as
//! `[destination][function][payload...]`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use seriallink_frame::clamp_mtu;

use crate::error::{Result, RouterError};

/// Size of the route header preceding every packet payload.
pub const ROUTE_HEADER_SIZE: usize = 2;

/// Test harness traffic.
pub const FUNCTION_TEST: u8 = 0x0E;
/// Radio control traffic.
pub const FUNCTION_WIRELESS_CTRL: u8 = 0x04;
/// Application traffic.
pub const FUNCTION_APP: u8 = 0x05;
/// Power management traffic.
pub const FUNCTION_POWER_MANAGEMENT: u8 = 0x06;

/// Functional category of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Test,
    WirelessCtrl,
    PowerManagement,
    App,
    /// Any code without a known category.
    Unrouted(u8),
}

impl Function {
    pub fn from_code(code: u8) -> Self {
        match code {
            FUNCTION_TEST => Function::Test,
            FUNCTION_WIRELESS_CTRL => Function::WirelessCtrl,
            FUNCTION_POWER_MANAGEMENT => Function::PowerManagement,
            FUNCTION_APP => Function::App,
            other => Function::Unrouted(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Function::Test => FUNCTION_TEST,
            Function::WirelessCtrl => FUNCTION_WIRELESS_CTRL,
            Function::PowerManagement => FUNCTION_POWER_MANAGEMENT,
            Function::App => FUNCTION_APP,
            Function::Unrouted(code) => code,
        }
    }

    /// The mailbox this function is dispatched to, if any.
    pub fn mailbox(self) -> Option<Mailbox> {
        match self {
            Function::Test => Some(Mailbox::Test),
            Function::WirelessCtrl => Some(Mailbox::WirelessCtrl),
            Function::PowerManagement | Function::App | Function::Unrouted(_) => None,
        }
    }

    pub fn name(self) -> &'static str {
        function_name(self.code())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), self.code())
    }
}

/// Returns a human-readable name for a function code.
pub fn function_name(code: u8) -> &'static str {
    match code {
        FUNCTION_TEST => "TEST",
        FUNCTION_WIRELESS_CTRL => "WIRELESS_CTRL",
        FUNCTION_POWER_MANAGEMENT => "POWER_MANAGEMENT",
        FUNCTION_APP => "APP",
        _ => "UNROUTED",
    }
}

/// Per-function queues that receive dispatched packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mailbox {
    Test,
    WirelessCtrl,
}

impl Mailbox {
    pub const ALL: [Mailbox; 2] = [Mailbox::Test, Mailbox::WirelessCtrl];

    pub fn function(self) -> Function {
        match self {
            Mailbox::Test => Function::Test,
            Mailbox::WirelessCtrl => Function::WirelessCtrl,
        }
    }

    pub fn name(self) -> &'static str {
        self.function().name()
    }
}

/// Where a packet is going and what kind of traffic it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    /// Opaque target code.
    pub destination: u8,
    pub function: Function,
}

impl Route {
    pub fn new(destination: u8, function: Function) -> Self {
        Self {
            destination,
            function,
        }
    }
}

/// Largest packet payload that fits a transport frame of `mtu` bytes.
pub fn max_payload(mtu: usize) -> usize {
    clamp_mtu(mtu).saturating_sub(ROUTE_HEADER_SIZE)
}

/// A routed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutablePacket {
    pub route: Route,
    pub payload: Bytes,
}

impl RoutablePacket {
    pub fn new(route: Route, payload: impl Into<Bytes>) -> Self {
        Self {
            route,
            payload: payload.into(),
        }
    }

    /// Total size on the wire (route header plus payload).
    pub fn len(&self) -> usize {
        ROUTE_HEADER_SIZE + self.payload.len()
    }

    /// A packet always carries its route header.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Check the packet fits one transport frame of `mtu` bytes.
    pub fn validate(&self, mtu: usize) -> Result<()> {
        let max = max_payload(mtu);
        if self.payload.len() > max {
            return Err(RouterError::PayloadTooLarge {
                size: self.payload.len(),
                max,
            });
        }
        Ok(())
    }

    /// Encode as `[destination][function][payload...]`.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        buf.put_u8(self.route.destination);
        buf.put_u8(self.route.function.code());
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a transport payload. The packet payload shares `bytes`.
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        if bytes.len() < ROUTE_HEADER_SIZE {
            return Err(RouterError::MalformedPacket { len: bytes.len() });
        }
        let route = Route::new(bytes[0], Function::from_code(bytes[1]));
        Ok(Self {
            route,
            payload: bytes.slice(ROUTE_HEADER_SIZE..),
        })
    }
}
