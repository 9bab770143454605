//! Sticky signal bits shared by one endpoint's transmit and receive tasks.

use std::fmt;
use std::ops::BitOr;

use parking_lot::{Condvar, Mutex};

/// A set of signal bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Signals(u8);

impl Signals {
    /// No bits.
    pub const NONE: Signals = Signals(0);
    /// The peer sent a sentinel: one data frame may be transmitted.
    pub const PEER_GRANTED: Signals = Signals(1 << 0);
    /// A data frame was accepted: the peer is owed a sentinel.
    pub const OWES_GRANT: Signals = Signals(1 << 1);
    /// A caller queued a packet for transmission.
    pub const OUTBOUND_QUEUED: Signals = Signals(1 << 2);
    /// The link is shutting down.
    pub const LINK_CLOSED: Signals = Signals(1 << 3);

    const NAMES: [(Signals, &'static str); 4] = [
        (Signals::PEER_GRANTED, "PEER_GRANTED"),
        (Signals::OWES_GRANT, "OWES_GRANT"),
        (Signals::OUTBOUND_QUEUED, "OUTBOUND_QUEUED"),
        (Signals::LINK_CLOSED, "LINK_CLOSED"),
    ];

    /// Raw bit value.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// All bits of `other` are set in `self`.
    pub const fn contains(self, other: Signals) -> bool {
        self.0 & other.0 == other.0
    }

    /// At least one bit of `other` is set in `self`.
    pub const fn intersects(self, other: Signals) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    const fn intersection(self, other: Signals) -> Signals {
        Signals(self.0 & other.0)
    }

    const fn difference(self, other: Signals) -> Signals {
        Signals(self.0 & !other.0)
    }
}

impl BitOr for Signals {
    type Output = Signals;

    fn bitor(self, rhs: Signals) -> Signals {
        Signals(self.0 | rhs.0)
    }
}

impl fmt::Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (bit, name) in Self::NAMES {
            if self.contains(bit) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// Event group: signal bits that stay set until a waiter consumes them.
///
/// Setting an already-set bit is idempotent, so a bit records "at least one
/// event happened", never how many.
#[derive(Default)]
pub struct EventGroup {
    bits: Mutex<Signals>,
    changed: Condvar,
}

impl EventGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bits and wake every waiter.
    pub fn set(&self, signals: Signals) {
        let mut bits = self.bits.lock();
        *bits = *bits | signals;
        self.changed.notify_all();
    }

    /// Current bits, without clearing anything.
    pub fn get(&self) -> Signals {
        *self.bits.lock()
    }

    /// Block until any bit in `mask` is set.
    ///
    /// Returns the bits of `mask` that were set and clears them.
    pub fn wait_any(&self, mask: Signals) -> Signals {
        let mut bits = self.bits.lock();
        while !bits.intersects(mask) {
            self.changed.wait(&mut bits);
        }
        let woke = bits.intersection(mask);
        *bits = bits.difference(mask);
        woke
    }
}

impl fmt::Debug for EventGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventGroup")
            .field("bits", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn set_is_sticky_and_idempotent() {
        let group = EventGroup::new();
        group.set(Signals::PEER_GRANTED);
        group.set(Signals::PEER_GRANTED);

        assert_eq!(group.get(), Signals::PEER_GRANTED);
        assert_eq!(group.get(), Signals::PEER_GRANTED, "get must not clear");
    }

    #[test]
    fn wait_any_clears_only_the_mask() {
        let group = EventGroup::new();
        group.set(Signals::PEER_GRANTED | Signals::OUTBOUND_QUEUED);

        let woke = group.wait_any(Signals::OWES_GRANT | Signals::OUTBOUND_QUEUED);
        assert_eq!(woke, Signals::OUTBOUND_QUEUED);
        assert_eq!(group.get(), Signals::PEER_GRANTED);
    }

    #[test]
    fn wait_any_reports_every_set_bit_in_mask() {
        let group = EventGroup::new();
        group.set(Signals::OWES_GRANT | Signals::PEER_GRANTED);

        let woke = group.wait_any(Signals::OWES_GRANT | Signals::PEER_GRANTED);
        assert!(woke.contains(Signals::OWES_GRANT));
        assert!(woke.contains(Signals::PEER_GRANTED));
        assert!(group.get().is_empty());
    }

    #[test]
    fn wait_any_blocks_until_set() {
        let group = Arc::new(EventGroup::new());

        let waiter = {
            let group = Arc::clone(&group);
            thread::spawn(move || group.wait_any(Signals::OWES_GRANT))
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        group.set(Signals::OUTBOUND_QUEUED);
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished(), "unrelated bit must not wake the waiter");

        group.set(Signals::OWES_GRANT);
        assert_eq!(waiter.join().unwrap(), Signals::OWES_GRANT);
        assert_eq!(group.get(), Signals::OUTBOUND_QUEUED);
    }

    #[test]
    fn debug_lists_bit_names() {
        let rendered = format!("{:?}", Signals::PEER_GRANTED | Signals::LINK_CLOSED);
        assert!(rendered.contains("PEER_GRANTED"));
        assert!(rendered.contains("LINK_CLOSED"));
        assert!(!rendered.contains("OWES_GRANT"));
    }
}
