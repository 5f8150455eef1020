// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Logical channel state: queues plus the per-direction reassembly and send
// state machines (spec.md §4).
//
// Structurally this plays the role the teacher's `proto::typed_channel` plays
// for a single named shared-memory channel — a fixed identity plus bounded
// queues — generalized here to also own the block-level reassembly/send
// state that RDT needs and the teacher's IPC channels don't, since IPC
// delivers whole messages already.

use std::time::Instant;

use crate::block::Block;
use crate::config::{ChannelLimits, PAYLOAD_SIZE};
use crate::packet::{total_packets, ServiceCode};
use crate::queue::BoundedBlockQueue;

/// The four fixed logical channels (spec.md §2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ChannelId {
    System = 0,
    Sensors = 1,
    Params = 2,
    Files = 3,
}

impl ChannelId {
    pub const ALL: [ChannelId; 4] = [
        ChannelId::System,
        ChannelId::Sensors,
        ChannelId::Params,
        ChannelId::Files,
    ];

    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(ChannelId::System),
            1 => Some(ChannelId::Sensors),
            2 => Some(ChannelId::Params),
            3 => Some(ChannelId::Files),
            _ => None,
        }
    }
}

/// Receive-side reassembly state for one channel (spec.md §4.1).
#[derive(Debug)]
pub struct Reassembler {
    receiving: bool,
    total_size: usize,
    total_packets: u16,
    rx_buffer: Vec<u8>,
    received: Vec<bool>,
    packets_received: u16,
    last_packet_time: Option<Instant>,
}

impl Reassembler {
    fn new() -> Self {
        Self {
            receiving: false,
            total_size: 0,
            total_packets: 0,
            rx_buffer: Vec::new(),
            received: Vec::new(),
            packets_received: 0,
            last_packet_time: None,
        }
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving
    }

    pub fn last_packet_time(&self) -> Option<Instant> {
        self.last_packet_time
    }

    /// Whether `seq_num` is the one valid END sequence for the reassembly
    /// currently in progress (spec.md §4.2 "Must have `seq_num ==
    /// total_packets - 1`; else drop"). `false` while idle.
    pub fn is_valid_end_seq(&self, seq_num: u16) -> bool {
        self.receiving && self.total_packets > 0 && seq_num == self.total_packets - 1
    }

    /// Start a new reassembly after a BEGIN packet. `size` of zero means "use
    /// `max_block_size`" (spec.md §4.2 BEGIN semantics).
    pub fn begin(&mut self, size: u32, max_block_size: usize) {
        let size = if size == 0 { max_block_size as u32 } else { size };
        self.total_size = size as usize;
        self.total_packets = total_packets(self.total_size);
        self.rx_buffer = vec![0u8; self.total_size];
        self.received = vec![false; self.total_packets as usize];
        self.received[0] = true;
        self.packets_received = 1;
        self.receiving = true;
        self.last_packet_time = Some(Instant::now());
    }

    /// Record a DATA packet's payload at `seq_num` (1-indexed data packets;
    /// BEGIN is implicitly seq 0, END is `total_packets - 1`). Per spec.md
    /// §4.2, `last_packet_time` only advances on an accepted packet — an
    /// out-of-range or duplicate DATA is dropped without touching it.
    pub fn accept_data(&mut self, seq_num: u16, payload: &[u8; PAYLOAD_SIZE]) {
        if !self.receiving {
            return;
        }
        let idx = seq_num as usize;
        if idx >= self.received.len() || self.received[idx] {
            return;
        }
        let offset = (idx - 1) * PAYLOAD_SIZE;
        let remaining = self.total_size.saturating_sub(offset);
        let n = remaining.min(PAYLOAD_SIZE);
        self.rx_buffer[offset..offset + n].copy_from_slice(&payload[..n]);
        self.received[idx] = true;
        self.packets_received += 1;
        self.last_packet_time = Some(Instant::now());
    }

    /// Record an END packet. Per spec.md §4.2, an END's `seq_num` must equal
    /// `total_packets - 1`; any other value is dropped (not just ignored for
    /// bitmap purposes — it never touches `last_packet_time` either, so a
    /// misnumbered END can't mask a stalled transfer from the NACK/timeout
    /// path).
    pub fn mark_end_received(&mut self, seq_num: u16) {
        if !self.receiving || self.total_packets == 0 || seq_num != self.total_packets - 1 {
            return;
        }
        let idx = seq_num as usize;
        if !self.received[idx] {
            self.received[idx] = true;
            self.packets_received += 1;
        }
        self.last_packet_time = Some(Instant::now());
    }

    pub fn is_complete(&self) -> bool {
        self.receiving && self.packets_received == self.total_packets
    }

    /// List of missing data-packet sequence numbers, 1-indexed, excluding
    /// BEGIN (seq 0). Used to build a NACK.
    pub fn missing_seqs(&self) -> Vec<u16> {
        self.received
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, got)| !**got)
            .map(|(i, _)| i as u16)
            .collect()
    }

    /// Consume the reassembled block and return to idle.
    pub fn take_and_reset(&mut self) -> Block {
        let data = std::mem::take(&mut self.rx_buffer);
        self.reset();
        Block::new(data)
    }

    pub fn reset(&mut self) {
        *self = Reassembler::new();
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Transmit-side send state for one channel (spec.md §4.1).
#[derive(Debug)]
pub struct SendMachine {
    sending: bool,
    tx_buffer: Vec<u8>,
    total_packets: u16,
    next_seq_to_send: u16,
    retry_count: u32,
    last_send_time: Option<Instant>,
}

impl SendMachine {
    fn new() -> Self {
        Self {
            sending: false,
            tx_buffer: Vec::new(),
            total_packets: 0,
            next_seq_to_send: 0,
            retry_count: 0,
            last_send_time: None,
        }
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_send_time(&self) -> Option<Instant> {
        self.last_send_time
    }

    /// Load a new block to transmit.
    pub fn begin(&mut self, data: Vec<u8>) {
        self.total_packets = total_packets(data.len());
        self.tx_buffer = data;
        self.next_seq_to_send = 0;
        self.retry_count = 0;
        self.sending = true;
        self.last_send_time = None;
    }

    pub fn block_len(&self) -> usize {
        self.tx_buffer.len()
    }

    pub fn total_packets(&self) -> u16 {
        self.total_packets
    }

    /// Payload bytes for data packet `seq` (1-indexed).
    pub fn data_payload(&self, seq: u16) -> [u8; PAYLOAD_SIZE] {
        let mut payload = [0u8; PAYLOAD_SIZE];
        let offset = (seq as usize - 1) * PAYLOAD_SIZE;
        let remaining = self.tx_buffer.len().saturating_sub(offset);
        let n = remaining.min(PAYLOAD_SIZE);
        payload[..n].copy_from_slice(&self.tx_buffer[offset..offset + n]);
        payload
    }

    pub fn service_code_for(&self, seq: u16) -> ServiceCode {
        if seq == 0 {
            ServiceCode::Begin
        } else if seq == self.total_packets - 1 {
            ServiceCode::End
        } else {
            ServiceCode::Data
        }
    }

    pub fn mark_sent(&mut self, seq: u16) {
        self.next_seq_to_send = self.next_seq_to_send.max(seq + 1);
        self.last_send_time = Some(Instant::now());
    }

    pub fn has_more_to_send(&self) -> bool {
        self.next_seq_to_send < self.total_packets
    }

    pub fn next_seq(&self) -> u16 {
        self.next_seq_to_send
    }

    pub fn record_retry(&mut self) {
        self.retry_count += 1;
    }

    /// Restart the current block from BEGIN after an ACK timeout (spec.md
    /// §4.3): re-emit BEGIN, keep `retry_count` and the buffer itself
    /// untouched.
    pub fn restart(&mut self) {
        self.next_seq_to_send = 0;
        self.last_send_time = None;
    }

    pub fn reset(&mut self) {
        *self = SendMachine::new();
    }
}

impl Default for SendMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// A single logical channel's bounded queues. Each queue is internally
/// synchronized (`queue::BoundedBlockQueue` owns its own mutex and waiter),
/// so these live outside the engine's single "RDT mutex" — a consumer
/// blocking in `receive_block` must not stall the tick thread's state-machine
/// work (spec.md §5).
pub struct Channel {
    pub id: ChannelId,
    pub limits: ChannelLimits,
    pub rx_queue: BoundedBlockQueue,
    pub tx_queue: BoundedBlockQueue,
}

impl Channel {
    pub fn new(id: ChannelId, limits: ChannelLimits) -> Self {
        Self {
            id,
            limits,
            rx_queue: BoundedBlockQueue::new(limits.rx_queue_len),
            tx_queue: BoundedBlockQueue::new(limits.tx_queue_len),
        }
    }

    pub fn clear_queues(&self) {
        self.rx_queue.clear();
        self.tx_queue.clear();
    }
}

/// Per-channel reassembly and send state, mutated under the engine's single
/// RDT mutex (spec.md §5 "All channel state mutation is serialized under a
/// single RDT mutex").
#[derive(Default)]
pub struct ChannelMachines {
    pub reassembler: Reassembler,
    pub send_machine: SendMachine,
}

impl ChannelMachines {
    pub fn clear(&mut self) {
        self.reassembler.reset();
        self.send_machine.reset();
    }
}
