// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Condition-variable + mutex wrapper used by the bounded queues and the
// single-in-flight client slots to sleep/wake threads with a timeout.
//
// This is the in-process analogue of the teacher's `Waiter` (a named,
// cross-process condition variable + mutex + quit flag built on
// `pthread_cond_t`). Nothing here is shared between OS processes — the two
// peers in this system are two separate instances of this crate talking over
// a radio link, not two processes sharing memory — so the named/shared-memory
// machinery is replaced with plain `std::sync::{Mutex, Condvar}`. The
// predicate-wait loop and quit-flag shape are kept as-is.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A condition variable + mutex + quit flag, guarding a predicate.
///
/// Mirrors `ipc::detail::waiter` from the teacher crate, minus the
/// named/shared-memory plumbing.
pub struct Waiter {
    cond: Condvar,
    lock: Mutex<()>,
    quit: AtomicBool,
}

impl Waiter {
    pub fn new() -> Self {
        Self {
            cond: Condvar::new(),
            lock: Mutex::new(()),
            quit: AtomicBool::new(false),
        }
    }

    /// Block until `pred` returns `false` or quit is signalled, or `timeout`
    /// elapses. Returns `false` on timeout, `true` otherwise (matches the
    /// teacher's `wait_if` return convention).
    pub fn wait_if<F>(&self, mut pred: F, timeout: Option<Duration>) -> bool
    where
        F: FnMut() -> bool,
    {
        let guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = guard;
        while !self.quit.load(Ordering::Relaxed) && pred() {
            match deadline {
                None => {
                    guard = self.cond.wait(guard).unwrap_or_else(|e| e.into_inner());
                }
                Some(dl) => {
                    let remaining = dl.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    let (g, res) = self
                        .cond
                        .wait_timeout(guard, remaining)
                        .unwrap_or_else(|e| e.into_inner());
                    guard = g;
                    if res.timed_out() && pred() {
                        return false;
                    }
                }
            }
        }
        true
    }

    pub fn notify(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.cond.notify_one();
    }

    pub fn broadcast(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.cond.notify_all();
    }

    /// Signal quit and wake every waiter; subsequent `wait_if` calls return
    /// immediately.
    pub fn quit_waiting(&self) {
        self.quit.store(true, Ordering::Release);
        self.broadcast();
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

/// A one-shot completion signal used by the single-in-flight client slots
/// (parameter service, file service): a requester calls `wait`, the response
/// handler calls `signal` exactly once per request.
pub struct CompletionSignal {
    waiter: Waiter,
    done: AtomicBool,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self {
            waiter: Waiter::new(),
            done: AtomicBool::new(false),
        }
    }

    /// Reset for reuse before issuing a new request.
    pub fn reset(&self) {
        self.done.store(false, Ordering::Release);
    }

    /// Mark complete and wake the waiter.
    pub fn signal(&self) {
        self.done.store(true, Ordering::Release);
        self.waiter.broadcast();
    }

    /// Wait up to `timeout` for `signal`. Returns `true` if signalled,
    /// `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.done.load(Ordering::Acquire) {
            return true;
        }
        self.waiter.wait_if(|| !self.done.load(Ordering::Acquire), Some(timeout));
        self.done.load(Ordering::Acquire)
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
