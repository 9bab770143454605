use seriallink_frame::DEFAULT_MTU;

/// Default inbound (awaiting dispatch) queue depth.
pub const DEFAULT_INBOUND_CAPACITY: usize = 4;
/// Default outbound (awaiting the transport) queue depth.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 4;
/// Default depth of each per-function mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 2;

/// Queue capacities and packet limits for a [`PacketRouter`](crate::PacketRouter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Transport MTU that outbound packets must fit, route header included.
    pub mtu: usize,
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,
    /// Applies to the test mailbox.
    pub test_capacity: usize,
    /// Applies to the wireless-control mailbox.
    pub wireless_ctrl_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            test_capacity: DEFAULT_MAILBOX_CAPACITY,
            wireless_ctrl_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacities() {
        let cfg = RouterConfig::default();
        assert_eq!(cfg.mtu, 100);
        assert_eq!(cfg.inbound_capacity, 4);
        assert_eq!(cfg.outbound_capacity, 4);
        assert_eq!(cfg.test_capacity, 2);
        assert_eq!(cfg.wireless_ctrl_capacity, 2);
    }
}
