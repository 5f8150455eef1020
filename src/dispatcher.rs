// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Per-channel subscriber registry (spec.md §4.4, §4.6 "Event / subscription
// port").
//
// Grounded on the teacher's `service_registry`-style callback table (a map
// keyed by an id, holding boxed closures invoked on a matching event),
// narrowed here to the one key the spec needs: channel id.

use std::sync::Mutex;

use crate::channel::ChannelId;
use crate::config::N_CHANNELS;

/// A callback invoked when a complete block lands in a channel's rx queue.
/// The dispatcher does not pass the block itself — subscribers are expected
/// to call `RdtEngine::receive_block` themselves; this only tells them one is
/// ready (spec.md §4.4: "each receives a notification... when a new block
/// lands in `rx_queue`").
pub type Subscriber = Box<dyn Fn(ChannelId) + Send + Sync>;

#[derive(Default)]
struct Slot {
    subscribers: Vec<Subscriber>,
}

/// Registry of per-channel subscribers.
pub struct Dispatcher {
    slots: [Mutex<Slot>; N_CHANNELS],
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            slots: [Mutex::new(Slot::default()), Mutex::new(Slot::default()), Mutex::new(Slot::default()), Mutex::new(Slot::default())],
        }
    }

    pub fn subscribe(&self, channel: ChannelId, cb: Subscriber) {
        self.slots[channel as usize]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .subscribers
            .push(cb);
    }

    pub fn unsubscribe_all(&self, channel: ChannelId) {
        self.slots[channel as usize]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .subscribers
            .clear();
    }

    /// Notify every subscriber on `channel` that a block is ready.
    pub fn notify(&self, channel: ChannelId) {
        let slot = self.slots[channel as usize].lock().unwrap_or_else(|e| e.into_inner());
        for cb in slot.subscribers.iter() {
            cb(channel);
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn notifies_only_subscribed_channel() {
        let d = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h2 = hits.clone();
        d.subscribe(
            ChannelId::Files,
            Box::new(move |ch| {
                assert_eq!(ch, ChannelId::Files);
                h2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        d.notify(ChannelId::System);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        d.notify(ChannelId::Files);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_all_clears() {
        let d = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h2 = hits.clone();
        d.subscribe(ChannelId::System, Box::new(move |_| { h2.fetch_add(1, Ordering::SeqCst); }));
        d.unsubscribe_all(ChannelId::System);
        d.notify(ChannelId::System);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
