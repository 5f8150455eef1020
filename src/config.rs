// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Typed home for the constants spec.md §6 exports. No CLI, no config files,
// no environment variables read anything here — this struct exists so the
// tunables are one value instead of scattered literals, same role the
// firmware's config.h constants play for the C code it backs.

use std::time::Duration;

use crate::channel::ChannelId;

/// Logical channel ids, fixed at compile time (`N_CHANNELS = 4`).
pub const N_CHANNELS: usize = 4;

/// Payload bytes carried by a single DATA/BEGIN packet.
pub const PAYLOAD_SIZE: usize = 192;

/// Total wire size of one packet, including the reserved tail (§3 of
/// SPEC_FULL.md — the named fields only sum to 200 bytes but the protocol
/// pads every frame to the underlying radio's 250-byte MTU).
pub const PACKET_SIZE: usize = 250;

/// Engine-side retry/timeout constants (spec.md §6).
pub const ACK_TIMEOUT: Duration = Duration::from_millis(100);
pub const MAX_RETRY: u32 = 5;
pub const PARAM_DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);
pub const PAIRING_TIMEOUT: Duration = Duration::from_secs(10);
pub const RSSI_TIMEOUT: Duration = Duration::from_millis(3000);

/// Engine tick period — spec.md §5 requires this to be short enough to meet
/// `ACK_TIMEOUT` with some jitter; 50 ms matches the event-queue receive
/// timeout the engine task uses.
pub const ENGINE_TICK: Duration = Duration::from_millis(50);

/// Minimum depth of the radio → engine event queue (spec.md §5).
pub const MIN_EVENT_QUEUE_DEPTH: usize = 30;

/// Per-channel bounds: rx/tx queue depth and maximum block size.
#[derive(Debug, Clone, Copy)]
pub struct ChannelLimits {
    pub rx_queue_len: usize,
    pub tx_queue_len: usize,
    pub max_block_size: usize,
}

/// Tunables for one `RdtEngine` instance. `Default` reproduces the values the
/// original firmware passes to `Rdt_ChannelInit` for each channel.
#[derive(Debug, Clone, Copy)]
pub struct RdtConfig {
    pub channels: [ChannelLimits; N_CHANNELS],
    pub ack_timeout: Duration,
    pub max_retry: u32,
    pub engine_tick: Duration,
    pub param_timeout: Duration,
    pub pairing_timeout: Duration,
    pub rssi_timeout: Duration,
    pub event_queue_depth: usize,
}

impl Default for RdtConfig {
    fn default() -> Self {
        let mut channels = [ChannelLimits {
            rx_queue_len: 5,
            tx_queue_len: 5,
            max_block_size: 512,
        }; N_CHANNELS];
        // Sensors channel carries higher-rate telemetry in the source
        // firmware and is given a deeper receive queue.
        channels[ChannelId::Sensors as usize].rx_queue_len = 16;
        channels[ChannelId::Sensors as usize].tx_queue_len = 16;

        Self {
            channels,
            ack_timeout: ACK_TIMEOUT,
            max_retry: MAX_RETRY,
            engine_tick: ENGINE_TICK,
            param_timeout: PARAM_DEFAULT_TIMEOUT,
            pairing_timeout: PAIRING_TIMEOUT,
            rssi_timeout: RSSI_TIMEOUT,
            event_queue_depth: MIN_EVENT_QUEUE_DEPTH,
        }
    }
}

impl RdtConfig {
    pub fn limits(&self, ch: ChannelId) -> ChannelLimits {
        self.channels[ch as usize]
    }
}
