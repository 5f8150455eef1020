// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Pairing handshake on the SYSTEM channel (spec.md §4.5).
//
// A small background worker owning its own state behind one mutex, driven by
// periodic wakeups rather than raw callbacks, the way `service_registry`
// drives its dispatch loop, narrowed to the two-message mutual-ack protocol
// and partial-pairing rollback spec.md §4.5 calls for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::block::Block;
use crate::channel::ChannelId;
use crate::config::PAIRING_TIMEOUT;
use crate::engine::RdtEngine;
use crate::persistence::PersistencePort;
use crate::radio::{MacAddr, RadioPort, BROADCAST_MAC, ZERO_MAC};

const PAIRING_MAC: u8 = 1;
const PAIRING_DONE: u8 = 2;
const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_millis(1000);

/// Externally observable pairing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Idle,
    Pairing,
    Paired(MacAddr),
}

/// One fixed-shape pairing message (spec.md §4.5).
struct PairingMessage {
    message_type: u8,
    peer_addr: MacAddr,
}

impl PairingMessage {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8);
        out.push(self.message_type);
        out.extend_from_slice(&self.peer_addr);
        out.push(ChannelId::System as u8);
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 8 {
            return None;
        }
        let mut peer_addr = [0u8; 6];
        peer_addr.copy_from_slice(&bytes[1..7]);
        Some(Self { message_type: bytes[0], peer_addr })
    }
}

struct TempState {
    have_temp_peer: bool,
    temp_peer_mac: MacAddr,
    got_done_from_peer: bool,
}

impl TempState {
    fn fresh() -> Self {
        Self { have_temp_peer: false, temp_peer_mac: ZERO_MAC, got_done_from_peer: false }
    }
}

/// Drives the pairing handshake over the engine's SYSTEM channel.
pub struct PairingService {
    engine: Arc<RdtEngine>,
    radio: Arc<dyn RadioPort>,
    persistence: Arc<dyn PersistencePort>,
    local_mac: MacAddr,
    active: Arc<AtomicBool>,
    temp: Mutex<TempState>,
    worker: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
    broadcast_interval: Duration,
}

impl PairingService {
    pub fn new(
        engine: Arc<RdtEngine>,
        radio: Arc<dyn RadioPort>,
        persistence: Arc<dyn PersistencePort>,
        local_mac: MacAddr,
    ) -> Arc<Self> {
        Self::with_timing(engine, radio, persistence, local_mac, PAIRING_TIMEOUT, DEFAULT_BROADCAST_INTERVAL)
    }

    /// Same as [`PairingService::new`] but with the overall timeout and the
    /// broadcast period overridden — used by integration tests so a full
    /// handshake doesn't have to wait out the real 10-second budget.
    pub fn with_timing(
        engine: Arc<RdtEngine>,
        radio: Arc<dyn RadioPort>,
        persistence: Arc<dyn PersistencePort>,
        local_mac: MacAddr,
        timeout: Duration,
        broadcast_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            radio,
            persistence,
            local_mac,
            active: Arc::new(AtomicBool::new(false)),
            temp: Mutex::new(TempState::fresh()),
            worker: Mutex::new(None),
            timeout,
            broadcast_interval,
        })
    }

    pub fn status(&self) -> PairingState {
        if self.active.load(Ordering::Acquire) {
            return PairingState::Pairing;
        }
        let peer = self.persistence.get_paired_peer();
        if peer == ZERO_MAC {
            PairingState::Idle
        } else {
            PairingState::Paired(peer)
        }
    }

    /// Begin pairing (spec.md §4.5 "Begin pairing"). No-op if already
    /// pairing. Spawns the background task that broadcasts `PAIRING_MAC`
    /// and reacts to the peer's replies until it finalizes, reverts, or
    /// times out.
    pub fn begin_pairing(self: &Arc<Self>) {
        if self.active.swap(true, Ordering::AcqRel) {
            return;
        }
        self.persistence.set_paired_peer(ZERO_MAC);
        self.persistence.commit();
        *self.temp.lock().unwrap_or_else(|e| e.into_inner()) = TempState::fresh();
        self.engine.set_peer_mac(BROADCAST_MAC);

        let me = self.clone();
        let handle = std::thread::Builder::new()
            .name("rdt-pairing".into())
            .spawn(move || me.pairing_task())
            .expect("failed to spawn pairing thread");
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    fn pairing_task(self: Arc<Self>) {
        let deadline = Instant::now() + self.timeout;
        let mut last_broadcast = Instant::now() - self.broadcast_interval;

        while self.active.load(Ordering::Acquire) {
            if Instant::now() >= deadline {
                self.revert();
                return;
            }
            if last_broadcast.elapsed() >= self.broadcast_interval {
                self.broadcast_mac();
                last_broadcast = Instant::now();
            }
            let poll = self.broadcast_interval.min(Duration::from_millis(200));
            if let Some(block) = self.engine.receive_block(ChannelId::System, poll) {
                self.handle_message(block);
            }
            if self.temp.lock().unwrap_or_else(|e| e.into_inner()).got_done_from_peer {
                self.finalize();
                return;
            }
        }
    }

    fn broadcast_mac(&self) {
        let msg = PairingMessage { message_type: PAIRING_MAC, peer_addr: self.local_mac };
        let _ = self.engine.enqueue_block(ChannelId::System, Block::new(msg.encode()));
    }

    fn handle_message(&self, block: Block) {
        let Some(msg) = PairingMessage::decode(block.as_slice()) else {
            return;
        };
        if msg.peer_addr == ZERO_MAC {
            return;
        }
        match msg.message_type {
            PAIRING_MAC => {
                if self.remember_temp_peer(msg.peer_addr) {
                    let reply = PairingMessage { message_type: PAIRING_DONE, peer_addr: self.local_mac };
                    let _ = self.engine.enqueue_block(ChannelId::System, Block::new(reply.encode()));
                }
            }
            PAIRING_DONE => {
                if self.remember_temp_peer(msg.peer_addr) {
                    self.temp.lock().unwrap_or_else(|e| e.into_inner()).got_done_from_peer = true;
                }
            }
            _ => {}
        }
    }

    /// Store `mac` as the temporary peer if none is stored yet. Returns
    /// `false` (and logs) if a different peer was already stored (spec.md
    /// §4.5 "if a different peer already stored, log and ignore").
    fn remember_temp_peer(&self, mac: MacAddr) -> bool {
        let mut temp = self.temp.lock().unwrap_or_else(|e| e.into_inner());
        if !temp.have_temp_peer {
            temp.have_temp_peer = true;
            temp.temp_peer_mac = mac;
            true
        } else if temp.temp_peer_mac != mac {
            warn!("pairing: ignoring second candidate peer while one is already pending");
            false
        } else {
            true
        }
    }

    fn finalize(&self) {
        let mac = self.temp.lock().unwrap_or_else(|e| e.into_inner()).temp_peer_mac;
        self.persistence.set_paired_peer(mac);
        self.persistence.commit();
        let _ = self.radio.add_peer(&mac);
        self.engine.set_peer_mac(mac);
        self.active.store(false, Ordering::Release);
        info!("pairing finalized");
    }

    fn revert(&self) {
        self.persistence.set_paired_peer(ZERO_MAC);
        self.persistence.commit();
        self.engine.set_peer_mac(BROADCAST_MAC);
        *self.temp.lock().unwrap_or_else(|e| e.into_inner()) = TempState::fresh();
        self.active.store(false, Ordering::Release);
        warn!("pairing timed out, reverted to unpaired");
    }
}
