// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Link-quality counters (spec.md §3, "Link-quality counters (process-wide)").
//
// Modeled as a small set of atomics guarded by nothing but their own ordering
// (akin to the teacher's lock-free `circ::BroadcastConnHead` bitmask
// counters), since every field here is an independent running counter or
// timestamp with no cross-field invariant that needs a single lock.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::RSSI_TIMEOUT;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Process-wide link-quality counters.
pub struct LinkStats {
    rssi_dbm: AtomicI64,
    last_rssi_update_ts: AtomicU64,
    total_packets_sent: AtomicU64,
    total_packets_resent: AtomicU64,
}

impl LinkStats {
    pub fn new() -> Self {
        Self {
            rssi_dbm: AtomicI64::new(i64::MIN),
            last_rssi_update_ts: AtomicU64::new(0),
            total_packets_sent: AtomicU64::new(0),
            total_packets_resent: AtomicU64::new(0),
        }
    }

    pub fn record_rssi(&self, dbm: i32) {
        self.rssi_dbm.store(dbm as i64, Ordering::Relaxed);
        self.last_rssi_update_ts.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.total_packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resent(&self) {
        self.total_packets_resent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rssi_dbm(&self) -> Option<i32> {
        match self.rssi_dbm.load(Ordering::Relaxed) {
            v if v == i64::MIN => None,
            v => Some(v as i32),
        }
    }

    pub fn total_packets_sent(&self) -> u64 {
        self.total_packets_sent.load(Ordering::Relaxed)
    }

    pub fn total_packets_resent(&self) -> u64 {
        self.total_packets_resent.load(Ordering::Relaxed)
    }

    /// Fraction of transmitted packets that were resends, in `0.0..=1.0`.
    pub fn error_rate(&self) -> f64 {
        let sent = self.total_packets_sent.load(Ordering::Relaxed);
        let resent = self.total_packets_resent.load(Ordering::Relaxed);
        let total = sent + resent;
        if total == 0 {
            0.0
        } else {
            resent as f64 / total as f64
        }
    }

    /// `true` iff the last RSSI update was within `RSSI_TIMEOUT` (spec.md §3).
    pub fn is_connected(&self) -> bool {
        self.is_connected_at(RSSI_TIMEOUT)
    }

    fn is_connected_at(&self, timeout: Duration) -> bool {
        let last = self.last_rssi_update_ts.load(Ordering::Relaxed);
        if last == 0 {
            return false;
        }
        now_ms().saturating_sub(last) <= timeout.as_millis() as u64
    }

    /// Link quality bucketed into `0..=5` bars.
    ///
    /// Derived from `error_rate()` via a 5-bucket threshold table — the
    /// source firmware drives an on-device signal-bars indicator off the
    /// same RSSI/error-rate inputs; this is the Rust equivalent of that
    /// mapping (SPEC_FULL.md §10). Disconnected links always report 0.
    pub fn link_quality_score(&self) -> u8 {
        if !self.is_connected() {
            return 0;
        }
        let er = self.error_rate();
        if er <= 0.0 {
            5
        } else if er < 0.02 {
            4
        } else if er < 0.05 {
            3
        } else if er < 0.15 {
            2
        } else if er < 0.40 {
            1
        } else {
            0
        }
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}
