// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Radio port: the external collaborator that actually owns the PHY
// (spec.md §1 "out of scope", §6 "Radio port").
//
// Modeled as a trait plus a small bounded SPSC event queue, the same shape
// the teacher gives its transport-boundary collaborators (an externally
// supplied sink/source trait, `mem`/`circ` providing the bounded buffer
// underneath). The receive callback itself stays tiny by design (spec.md
// §5 "Radio receive callback"): filter by peer MAC, record RSSI, copy into
// the queue, return.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use log::warn;

use crate::sync::Waiter;

/// A 6-byte radio MAC address.
pub type MacAddr = [u8; 6];

pub const BROADCAST_MAC: MacAddr = [0xFF; 6];
pub const ZERO_MAC: MacAddr = [0; 6];

/// The external radio driver interface the engine consumes (spec.md §6).
pub trait RadioPort: Send + Sync {
    /// Send `bytes` to `peer`. Fire-and-forget; errors are logged by the
    /// caller, never retried by the port itself.
    fn send(&self, peer: &MacAddr, bytes: &[u8]) -> Result<(), crate::error::PortError>;

    /// Register `peer` with the underlying radio stack (e.g. ESP-NOW peer
    /// table) so unicast sends to it succeed.
    fn add_peer(&self, peer: &MacAddr) -> Result<(), crate::error::PortError>;

    /// Install the link's pre-shared key, if the underlying radio supports
    /// link-layer encryption. A no-op port may ignore this.
    fn set_pmk(&self, key: &[u8]);
}

/// One inbound datagram as handed from the radio callback to the engine.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub src: MacAddr,
    pub bytes: Vec<u8>,
    pub rssi_dbm: i32,
}

/// Bounded single-producer/single-consumer queue from the radio callback to
/// the engine tick loop (spec.md §5 "Event queue"). Overflow drops the
/// newest arrival and logs a warning rather than blocking the callback.
pub struct EventQueue {
    capacity: usize,
    items: Mutex<VecDeque<InboundEvent>>,
    not_empty: Waiter,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Waiter::new(),
        }
    }

    /// Called from the radio receive callback. Never blocks.
    pub fn push(&self, event: InboundEvent) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if items.len() >= self.capacity {
            warn!("radio event queue full ({} slots), dropping inbound datagram", self.capacity);
            return;
        }
        items.push_back(event);
        drop(items);
        self.not_empty.notify();
    }

    /// Called from the engine tick loop; blocks up to `timeout` for an event.
    pub fn pop(&self, timeout: Duration) -> Option<InboundEvent> {
        self.not_empty.wait_if(
            || self.items.lock().unwrap_or_else(|e| e.into_inner()).is_empty(),
            Some(timeout),
        );
        self.items.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }
}
