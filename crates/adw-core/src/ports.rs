//! Deterministic Port Allocation
//!
//! Maps a run id to a `(ws_port, fe_port)` pair inside two parallel
//! windows (8500.. and 9200..). The base index is the run id decoded
//! as base-36 modulo the window width, so a given run lands on the
//! same slot every time its preferred slot is free. Collisions fall
//! back cyclically through the window; exhausting it caps concurrency.

use std::net::TcpListener;
use tracing::debug;

use crate::error::{Error, Result};

/// First WebSocket-consumer port
pub const WS_PORT_BASE: u16 = 8500;
/// First frontend port
pub const FE_PORT_BASE: u16 = 9200;
/// Default window width (and therefore the default concurrency cap)
pub const DEFAULT_WINDOW: u16 = 15;

/// An allocated port pair. Invariant: `ws - WS_PORT_BASE == fe - FE_PORT_BASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    /// Slot index inside the window
    pub index: u16,
    /// WebSocket-consumer port
    pub ws: u16,
    /// Frontend port
    pub fe: u16,
}

/// Allocator over a fixed-width pair of port windows
#[derive(Debug, Clone)]
pub struct PortAllocator {
    window: u16,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl PortAllocator {
    pub fn new(window: u16) -> Self {
        Self {
            window: window.max(1),
        }
    }

    /// Deterministic slot a run id prefers before any collision fallback.
    pub fn preferred_index(&self, run_id: &str) -> u16 {
        let key: String = run_id.chars().take(8).collect();
        let n = u64::from_str_radix(&key, 36).unwrap_or_else(|_| {
            // Non-base-36 ids still deserve a stable slot.
            key.bytes().fold(0u64, |acc, b| {
                acc.wrapping_mul(31).wrapping_add(u64::from(b))
            })
        });
        (n % u64::from(self.window)) as u16
    }

    /// Allocate a free port pair for a run.
    ///
    /// Probes both candidate ports with loopback binds; the probe
    /// sockets are released before returning, so downstream services
    /// treat "port unexpectedly busy" as a fatal phase error rather
    /// than asking the allocator to retry.
    pub fn allocate(&self, run_id: &str) -> Result<PortPair> {
        let i0 = self.preferred_index(run_id);

        for attempt in 0..self.window {
            let index = (i0 + attempt) % self.window;
            let ws = WS_PORT_BASE + index;
            let fe = FE_PORT_BASE + index;

            let ws_probe = match TcpListener::bind(("127.0.0.1", ws)) {
                Ok(l) => l,
                Err(_) => continue,
            };
            let fe_probe = match TcpListener::bind(("127.0.0.1", fe)) {
                Ok(l) => l,
                Err(_) => continue,
            };
            drop(ws_probe);
            drop(fe_probe);

            debug!(run_id = %run_id, index = index, ws = ws, fe = fe, "Allocated port pair");
            return Ok(PortPair { index, ws, fe });
        }

        Err(Error::NoPortsAvailable(run_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_index_matches_base36_decode() {
        let alloc = PortAllocator::default();
        let expected = (u64::from_str_radix("a1b2c3d4", 36).unwrap() % 15) as u16;
        assert_eq!(alloc.preferred_index("a1b2c3d4"), expected);
    }

    // The binding tests below pin their run ids to distinct slots
    // ("0000000X" decodes to X, so the slot is X mod window) to keep
    // parallel test threads off each other's ports.

    #[test]
    fn test_allocation_is_deterministic_when_free() {
        let alloc = PortAllocator::default();
        let a = alloc.allocate("0000000b").unwrap(); // slot 11
        let b = alloc.allocate("0000000b").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.index, 11);
    }

    #[test]
    fn test_pair_offsets_agree() {
        let alloc = PortAllocator::default();
        for id in ["a1b2c3d4", "00000000", "zzzzzzzz", "4kqxr9w2"] {
            let pair = alloc.allocate(id).unwrap();
            assert_eq!(pair.ws - WS_PORT_BASE, pair.fe - FE_PORT_BASE);
            assert!(pair.ws >= WS_PORT_BASE && pair.ws < WS_PORT_BASE + DEFAULT_WINDOW);
            assert!(pair.fe >= FE_PORT_BASE && pair.fe < FE_PORT_BASE + DEFAULT_WINDOW);
        }
    }

    #[test]
    fn test_collision_falls_back_to_next_slot() {
        let alloc = PortAllocator::default();
        let preferred = alloc.preferred_index("00000007");
        assert_eq!(preferred, 7);
        // Occupy the preferred ws slot so the allocator must move on.
        let _busy = TcpListener::bind(("127.0.0.1", WS_PORT_BASE + preferred)).unwrap();
        let pair = alloc.allocate("00000007").unwrap();
        assert_eq!(pair.index, 8);
    }

    #[test]
    fn test_window_exhaustion_reports_no_ports() {
        // Occupy the whole (narrowed) window so every fallback fails.
        struct Probe(#[allow(dead_code)] TcpListener);
        let alloc = PortAllocator::new(5);
        let _busy: Vec<Probe> = (0..5)
            .map(|i| Probe(TcpListener::bind(("127.0.0.1", WS_PORT_BASE + i)).unwrap()))
            .collect();
        match alloc.allocate("00000000") {
            Err(Error::NoPortsAvailable(id)) => assert_eq!(id, "00000000"),
            other => panic!("expected NoPortsAvailable, got {other:?}"),
        }
    }
}
