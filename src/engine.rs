// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// RDT engine: owns every channel, drives the periodic tick, dispatches
// inbound datagrams (spec.md §4.4, §5).
//
// Built around a central-mutex-plus-background-thread shape: a single
// `Mutex<State>` guarding everything the worker thread and the public API
// touch, with a dedicated thread driving periodic work, narrowed to the one
// big lock spec.md §5 calls for ("All channel state mutation is serialized
// under a single RDT mutex").
// Bounded queues are deliberately kept outside that lock (they carry their
// own mutex/waiter) so a consumer blocked in `receive_block` never stalls
// the tick thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::block::Block;
use crate::channel::{Channel, ChannelId, ChannelMachines};
use crate::config::{RdtConfig, N_CHANNELS};
use crate::dispatcher::{Dispatcher, Subscriber};
use crate::packet::{decode_begin_size, decode_nack_payload, encode_nack_payload, Packet, ServiceCode};
use crate::radio::{EventQueue, InboundEvent, MacAddr, RadioPort, BROADCAST_MAC, ZERO_MAC};
use crate::stats::LinkStats;

struct EngineState {
    machines: [ChannelMachines; N_CHANNELS],
    peer_mac: MacAddr,
}

impl EngineState {
    fn machines_mut(&mut self, id: ChannelId) -> &mut ChannelMachines {
        &mut self.machines[id as usize]
    }
}

/// Owns all channel state, the event queue, and the background tick thread
/// (spec.md §5 "RDT engine task").
pub struct RdtEngine {
    config: RdtConfig,
    channels: [Channel; N_CHANNELS],
    state: Mutex<EngineState>,
    radio: Arc<dyn RadioPort>,
    events: Arc<EventQueue>,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<LinkStats>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RdtEngine {
    pub fn new(config: RdtConfig, radio: Arc<dyn RadioPort>) -> Arc<Self> {
        let channels = [
            Channel::new(ChannelId::System, config.limits(ChannelId::System)),
            Channel::new(ChannelId::Sensors, config.limits(ChannelId::Sensors)),
            Channel::new(ChannelId::Params, config.limits(ChannelId::Params)),
            Channel::new(ChannelId::Files, config.limits(ChannelId::Files)),
        ];
        let engine = Arc::new(Self {
            events: Arc::new(EventQueue::new(config.event_queue_depth)),
            channels,
            state: Mutex::new(EngineState {
                machines: Default::default(),
                peer_mac: BROADCAST_MAC,
            }),
            radio,
            dispatcher: Arc::new(Dispatcher::new()),
            stats: Arc::new(LinkStats::new()),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            config,
        });
        engine.spawn_tick_thread();
        engine
    }

    fn spawn_tick_thread(self: &Arc<Self>) {
        self.running.store(true, Ordering::Release);
        let me = self.clone();
        let handle = std::thread::Builder::new()
            .name("rdt-engine".into())
            .spawn(move || me.tick_loop())
            .expect("failed to spawn rdt-engine thread");
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn subscribe(&self, channel: ChannelId, cb: Subscriber) {
        self.dispatcher.subscribe(channel, cb);
    }

    fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id as usize]
    }

    /// Current configured peer MAC (broadcast before pairing).
    pub fn peer_mac(&self) -> MacAddr {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).peer_mac
    }

    pub fn set_peer_mac(&self, mac: MacAddr) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).peer_mac = mac;
    }

    /// Enqueue `block` for transmission on `channel` (spec.md §4.4). Returns
    /// the block back on backpressure (tx queue full).
    pub fn enqueue_block(&self, channel: ChannelId, block: Block) -> Result<(), Block> {
        self.channel(channel).tx_queue.try_push(block)
    }

    /// Dequeue a completed received block, waiting up to `timeout`.
    pub fn receive_block(&self, channel: ChannelId, timeout: Duration) -> Option<Block> {
        self.channel(channel).rx_queue.pop(timeout)
    }

    /// Drop all queued and in-flight state on `channel` (spec.md §4.4
    /// "Clearing a channel queue").
    pub fn clear_channel(&self, channel: ChannelId) {
        self.channel(channel).clear_queues();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.machines_mut(channel).clear();
    }

    /// Entry point for the radio receive callback (spec.md §5 item 1): do
    /// the minimum possible work and hand off to the event queue.
    pub fn on_radio_receive(&self, src: MacAddr, bytes: &[u8], rssi_dbm: i32) {
        self.stats.record_rssi(rssi_dbm);
        self.events.push(InboundEvent { src, bytes: bytes.to_vec(), rssi_dbm });
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }

    fn tick_loop(self: Arc<Self>) {
        while self.running.load(Ordering::Acquire) {
            if let Some(event) = self.events.pop(self.config.engine_tick) {
                self.handle_inbound(event);
            }
            self.tick_send_machines();
        }
    }

    fn handle_inbound(&self, event: InboundEvent) {
        let peer = self.state.lock().unwrap_or_else(|e| e.into_inner()).peer_mac;
        // Peer filter (spec.md §3 invariant, §8 property 4): packets from any
        // source other than the configured peer are silently dropped. Before
        // pairing the configured peer is the broadcast address, which
        // matches everyone so pairing traffic is accepted from anybody.
        if peer != BROADCAST_MAC && event.src != peer {
            trace!("dropping inbound datagram from unconfigured peer");
            return;
        }
        let Some(packet) = Packet::decode(&event.bytes) else {
            trace!("dropping inbound datagram: CRC or length mismatch");
            return;
        };
        let Some(channel_id) = ChannelId::from_wire(packet.channel) else {
            trace!("dropping inbound datagram: unknown channel {}", packet.channel);
            return;
        };
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match packet.service_code {
            ServiceCode::Begin => self.handle_begin(&mut state, channel_id, &packet),
            ServiceCode::Data => self.handle_data(&mut state, channel_id, &packet),
            ServiceCode::End => self.handle_end(&mut state, channel_id, &packet),
            ServiceCode::Ask => self.handle_ask(&mut state, channel_id),
            ServiceCode::Nack => self.handle_nack(&mut state, channel_id, &packet),
        }
    }

    fn handle_begin(&self, state: &mut EngineState, channel_id: ChannelId, packet: &Packet) {
        let max_block_size = self.channel(channel_id).limits.max_block_size;
        let size = decode_begin_size(&packet.payload);
        state.machines_mut(channel_id).reassembler.begin(size, max_block_size);
    }

    /// A DATA packet can be the one that fills the last gap in a reassembly
    /// that already saw its END (spec.md S2: NACK names a single missing
    /// DATA seq, the sender retransmits just that packet). `handle_end` is
    /// not the only place completion can happen, so this re-checks
    /// `is_complete` the same way `handle_end` does instead of waiting for
    /// the sender's sender-side ACK-timeout restart to eventually re-deliver
    /// the whole block.
    fn handle_data(&self, state: &mut EngineState, channel_id: ChannelId, packet: &Packet) {
        let peer = state.peer_mac;
        let machines = state.machines_mut(channel_id);
        machines.reassembler.accept_data(packet.seq_num, &packet.payload);
        if machines.reassembler.is_complete() {
            self.complete_reassembly(machines, channel_id, peer);
        }
    }

    fn handle_end(&self, state: &mut EngineState, channel_id: ChannelId, packet: &Packet) {
        let peer = state.peer_mac;
        let machines = state.machines_mut(channel_id);
        // spec.md §4.2 "END handling": an END whose seq_num isn't the one
        // valid end-of-block value is dropped outright — no NACK, no state
        // change, not even a reassembly-in-progress timestamp bump.
        if !machines.reassembler.is_valid_end_seq(packet.seq_num) {
            trace!("dropping END with unexpected seq_num on channel {:?}", channel_id);
            return;
        }
        machines.reassembler.mark_end_received(packet.seq_num);
        if machines.reassembler.is_complete() {
            self.complete_reassembly(machines, channel_id, peer);
        } else {
            let missing = machines.reassembler.missing_seqs();
            let nack_payload = encode_nack_payload(&missing);
            let mut nack = Packet::new(channel_id as u8, 0, ServiceCode::Nack);
            nack.payload = nack_payload;
            self.send_raw(peer, nack);
        }
    }

    /// Emit the cumulative ASK and hand the reassembled block to the rx
    /// queue (spec.md §4.2 "END handling... Else emit ASK..."). Shared by
    /// `handle_end` (the common case: END arrives last) and `handle_data`
    /// (a NACK-triggered retransmit fills the final gap after END already
    /// arrived).
    fn complete_reassembly(&self, machines: &mut ChannelMachines, channel_id: ChannelId, peer: MacAddr) {
        self.send_raw(peer, Packet::new(channel_id as u8, 0, ServiceCode::Ask));
        let block = machines.reassembler.take_and_reset();
        let ch = self.channel(channel_id);
        if ch.rx_queue.try_push(block).is_err() {
            warn!("rx queue full on channel {:?}, dropping reassembled block", channel_id);
        } else {
            self.dispatcher.notify(channel_id);
        }
    }

    fn handle_ask(&self, state: &mut EngineState, channel_id: ChannelId) {
        state.machines_mut(channel_id).send_machine.reset();
    }

    fn handle_nack(&self, state: &mut EngineState, channel_id: ChannelId, packet: &Packet) {
        let peer = state.peer_mac;
        let missing = decode_nack_payload(&packet.payload);
        let machines = state.machines_mut(channel_id);
        if !machines.send_machine.is_sending() {
            return;
        }
        for seq in missing {
            let pkt = Self::build_data_packet(&machines.send_machine, channel_id, seq);
            self.send_resend(peer, pkt);
        }
    }

    fn build_data_packet(sm: &crate::channel::SendMachine, channel_id: ChannelId, seq: u16) -> Packet {
        match sm.service_code_for(seq) {
            ServiceCode::Begin => Packet::with_payload(
                channel_id as u8,
                0,
                ServiceCode::Begin,
                &crate::packet::begin_payload(sm.block_len() as u32),
            ),
            ServiceCode::End => Packet::new(channel_id as u8, seq, ServiceCode::End),
            _ => Packet::with_payload(channel_id as u8, seq, ServiceCode::Data, &sm.data_payload(seq)),
        }
    }

    fn tick_send_machines(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let peer = state.peer_mac;
        for id in ChannelId::ALL {
            self.tick_one_send_machine(&mut state, id, peer);
        }
    }

    fn tick_one_send_machine(&self, state: &mut EngineState, channel_id: ChannelId, peer: MacAddr) {
        let ch = self.channel(channel_id);
        let machines = state.machines_mut(channel_id);

        if !machines.send_machine.is_sending() {
            if let Some(block) = ch.tx_queue.try_pop() {
                machines.send_machine.begin(block.into_vec());
                let pkt = Self::build_data_packet(&machines.send_machine, channel_id, 0);
                self.send_raw(peer, pkt);
                machines.send_machine.mark_sent(0);
            }
            return;
        }

        if let Some(last) = machines.send_machine.last_send_time() {
            if last.elapsed() > self.config.ack_timeout {
                self.handle_send_timeout(machines, channel_id, peer);
                return;
            }
        }

        while machines.send_machine.has_more_to_send() {
            let seq = machines.send_machine.next_seq();
            let pkt = Self::build_data_packet(&machines.send_machine, channel_id, seq);
            self.send_raw(peer, pkt);
            machines.send_machine.mark_sent(seq);
        }
    }

    /// ACK_TIMEOUT elapsed with no ASK/NACK (spec.md §4.3 "Timeout"):
    /// increment `retry_count`; abandon the block at `MAX_RETRY`, otherwise
    /// restart it from BEGIN.
    fn handle_send_timeout(&self, machines: &mut ChannelMachines, channel_id: ChannelId, peer: MacAddr) {
        machines.send_machine.record_retry();
        if machines.send_machine.retry_count() >= self.config.max_retry {
            debug!("channel {:?} abandoning block after {} retries", channel_id, self.config.max_retry);
            machines.send_machine.reset();
            return;
        }
        machines.send_machine.restart();
        let pkt = Self::build_data_packet(&machines.send_machine, channel_id, 0);
        self.send_resend(peer, pkt);
        machines.send_machine.mark_sent(0);
    }

    /// Send a packet for the first time (spec.md §4.3 "every transmitted...
    /// packet increments `total_packets_sent`").
    fn send_raw(&self, peer: MacAddr, packet: Packet) {
        let bytes = packet.encode();
        if self.radio.send(&peer, &bytes).is_ok() {
            self.stats.record_sent();
        }
    }

    /// Send a retransmission (NACK-triggered or timeout-restart BEGIN):
    /// counts only against `total_packets_resent`, never also against
    /// `total_packets_sent` (spec.md §4.3 "respectively" — the two counters
    /// are exclusive per packet).
    fn send_resend(&self, peer: MacAddr, packet: Packet) {
        let bytes = packet.encode();
        if self.radio.send(&peer, &bytes).is_ok() {
            self.stats.record_resent();
        }
    }
}

impl Drop for RdtEngine {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }
}

/// `MacAddr` constant re-export for callers that only need "no peer yet".
pub const NO_PEER: MacAddr = ZERO_MAC;
