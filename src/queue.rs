// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Bounded FIFO of `Block`s shared between the engine and application tasks.
//
// Modeled on the teacher's channel/queue primitive (a bounded ring guarded by
// a `Waiter`, full pushes blocking/non-blocking by caller's choice, pops
// blocking with a timeout) — generalized from its fixed-slot shared-memory
// ring to a plain `VecDeque<Block>` guarded by `std::sync::Mutex` plus our
// `sync::Waiter`, since there is exactly one process on each side of the
// radio link rather than several processes sharing one ring.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::block::Block;
use crate::sync::Waiter;

/// A bounded, thread-safe FIFO of `Block`s (spec.md §4.3 rx/tx queues).
pub struct BoundedBlockQueue {
    capacity: usize,
    items: Mutex<VecDeque<Block>>,
    not_empty: Waiter,
    not_full: Waiter,
}

impl BoundedBlockQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Waiter::new(),
            not_full: Waiter::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Push without blocking. Returns the block back on overflow (spec.md
    /// §4.3: full queues drop the newest arrival and the caller decides what
    /// to log).
    pub fn try_push(&self, block: Block) -> Result<(), Block> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if items.len() >= self.capacity {
            return Err(block);
        }
        items.push_back(block);
        drop(items);
        self.not_empty.notify();
        Ok(())
    }

    /// Push, blocking up to `timeout` for room. Returns the block back if it
    /// never fit.
    pub fn push(&self, block: Block, timeout: Duration) -> Result<(), Block> {
        let fits = self.not_full.wait_if(|| self.is_full(), Some(timeout));
        if !fits {
            return Err(block);
        }
        self.try_push(block)
    }

    /// Pop without blocking.
    pub fn try_pop(&self) -> Option<Block> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let block = items.pop_front();
        drop(items);
        if block.is_some() {
            self.not_full.notify();
        }
        block
    }

    /// Pop, blocking up to `timeout` for an item.
    pub fn pop(&self, timeout: Duration) -> Option<Block> {
        self.not_empty.wait_if(|| self.is_empty(), Some(timeout));
        self.try_pop()
    }

    /// Discard every queued block (spec.md `clear_channel`).
    pub fn clear(&self) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.clear();
        drop(items);
        self.not_full.broadcast();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_roundtrip() {
        let q = BoundedBlockQueue::new(2);
        q.try_push(Block::from(b"a".as_slice())).unwrap();
        q.try_push(Block::from(b"b".as_slice())).unwrap();
        assert!(q.try_push(Block::from(b"c".as_slice())).is_err());
        assert_eq!(q.pop(Duration::from_millis(10)).unwrap().as_slice(), b"a");
        assert_eq!(q.pop(Duration::from_millis(10)).unwrap().as_slice(), b"b");
        assert!(q.pop(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let q = BoundedBlockQueue::new(4);
        q.try_push(Block::from(b"a".as_slice())).unwrap();
        q.clear();
        assert!(q.is_empty());
    }

    #[test]
    fn blocking_pop_wakes_on_push() {
        use std::sync::Arc;
        use std::thread;

        let q = Arc::new(BoundedBlockQueue::new(1));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop(Duration::from_secs(1)));
        thread::sleep(Duration::from_millis(20));
        q.try_push(Block::from(b"x".as_slice())).unwrap();
        let got = handle.join().unwrap();
        assert_eq!(got.unwrap().as_slice(), b"x");
    }
}
