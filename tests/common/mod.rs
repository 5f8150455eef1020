// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Shared test harness: an in-process loopback `RadioPort` that wires two
// `RdtEngine`s together directly, with an injectable fault function so
// integration tests can exercise spec.md §8's loss/corruption scenarios
// without a real radio.
//
// Not every test binary that includes this module exercises every helper
// below (each `tests/*.rs` file pulls in `mod common;` as a whole); allow
// dead code here rather than split the harness into one file per caller.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use rdt_link::error::PortError;
use rdt_link::radio::{MacAddr, RadioPort};
use rdt_link::{RdtConfig, RdtEngine};

/// What a [`LoopbackRadio`] does with the `n`th packet it is asked to send.
#[allow(dead_code)]
pub enum FaultAction {
    Pass,
    Drop,
    Corrupt,
}

/// An in-process stand-in for the radio driver: `send` hands the datagram
/// straight to the peer engine's `on_radio_receive`, after consulting a
/// per-call fault function keyed by a monotonic send counter.
pub struct LoopbackRadio {
    local_mac: MacAddr,
    peer: Mutex<Option<Weak<RdtEngine>>>,
    sent: AtomicUsize,
    fault: Box<dyn Fn(usize, &[u8]) -> FaultAction + Send + Sync>,
}

impl LoopbackRadio {
    #[allow(dead_code)]
    pub fn new(local_mac: MacAddr) -> Arc<Self> {
        Self::with_fault(local_mac, |_, _| FaultAction::Pass)
    }

    pub fn with_fault(
        local_mac: MacAddr,
        fault: impl Fn(usize, &[u8]) -> FaultAction + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            local_mac,
            peer: Mutex::new(None),
            sent: AtomicUsize::new(0),
            fault: Box::new(fault),
        })
    }

    pub fn set_peer(&self, engine: &Arc<RdtEngine>) {
        *self.peer.lock().unwrap() = Some(Arc::downgrade(engine));
    }
}

impl RadioPort for LoopbackRadio {
    fn send(&self, _peer: &MacAddr, bytes: &[u8]) -> Result<(), PortError> {
        let n = self.sent.fetch_add(1, Ordering::Relaxed);
        let mut datagram = bytes.to_vec();
        match (self.fault)(n, &datagram) {
            FaultAction::Drop => return Ok(()),
            FaultAction::Corrupt => datagram[10] ^= 0x01,
            FaultAction::Pass => {}
        }
        if let Some(engine) = self.peer.lock().unwrap().as_ref().and_then(Weak::upgrade) {
            engine.on_radio_receive(self.local_mac, &datagram, -40);
        }
        Ok(())
    }

    fn add_peer(&self, _peer: &MacAddr) -> Result<(), PortError> {
        Ok(())
    }

    fn set_pmk(&self, _key: &[u8]) {}
}

pub const MAC_A: MacAddr = [1, 2, 3, 4, 5, 6];
pub const MAC_B: MacAddr = [6, 5, 4, 3, 2, 1];

/// Surfaces the crate's `log` output under `RUST_LOG=rdt_link=debug cargo
/// test -- --nocapture` without failing if a test binary calls it twice.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Wire two fresh engines to each other over loopback radios and pre-set
/// each other's MAC as the configured peer (bypassing the pairing handshake,
/// which has its own dedicated tests).
pub fn wire_pair(
    config_a: RdtConfig,
    config_b: RdtConfig,
    fault_a_to_b: impl Fn(usize, &[u8]) -> FaultAction + Send + Sync + 'static,
    fault_b_to_a: impl Fn(usize, &[u8]) -> FaultAction + Send + Sync + 'static,
) -> (Arc<RdtEngine>, Arc<RdtEngine>) {
    init_logging();
    let radio_a = LoopbackRadio::with_fault(MAC_A, fault_a_to_b);
    let radio_b = LoopbackRadio::with_fault(MAC_B, fault_b_to_a);
    let engine_a = RdtEngine::new(config_a, radio_a.clone());
    let engine_b = RdtEngine::new(config_b, radio_b.clone());
    radio_a.set_peer(&engine_b);
    radio_b.set_peer(&engine_a);
    engine_a.set_peer_mac(MAC_B);
    engine_b.set_peer_mac(MAC_A);
    (engine_a, engine_b)
}

/// Wire two unpaired engines (configured peer left at broadcast) for pairing
/// tests, which drive `set_peer_mac` themselves via `PairingService`.
pub fn wire_unpaired(
    config_a: RdtConfig,
    config_b: RdtConfig,
    fault_a_to_b: impl Fn(usize, &[u8]) -> FaultAction + Send + Sync + 'static,
    fault_b_to_a: impl Fn(usize, &[u8]) -> FaultAction + Send + Sync + 'static,
) -> (Arc<RdtEngine>, Arc<RdtEngine>) {
    init_logging();
    let radio_a = LoopbackRadio::with_fault(MAC_A, fault_a_to_b);
    let radio_b = LoopbackRadio::with_fault(MAC_B, fault_b_to_a);
    let engine_a = RdtEngine::new(config_a, radio_a.clone());
    let engine_b = RdtEngine::new(config_b, radio_b.clone());
    radio_a.set_peer(&engine_b);
    radio_b.set_peer(&engine_a);
    (engine_a, engine_b)
}

/// A fast `RdtConfig` for tests: short ACK timeout and tick period so
/// round-trip/retry tests don't have to wait out the production 100 ms
/// timeout or 50 ms tick.
pub fn fast_config() -> RdtConfig {
    let mut cfg = RdtConfig::default();
    cfg.ack_timeout = std::time::Duration::from_millis(40);
    cfg.engine_tick = std::time::Duration::from_millis(5);
    cfg
}
