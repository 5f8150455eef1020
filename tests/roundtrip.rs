// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// End-to-end RDT scenarios from spec.md §8 (S1-S3, properties 1 and 5):
// loss-free round trip, single-packet loss recovery via NACK, and full-block
// loss recovered by timeout-driven retransmit within the retry budget.

mod common;

use std::sync::Mutex;
use std::time::Duration;

use common::{fast_config, wire_pair, FaultAction};
use rdt_link::packet::{Packet, ServiceCode};
use rdt_link::{Block, ChannelId};

fn block_600() -> Vec<u8> {
    (0..600u32).map(|i| (i % 256) as u8).collect()
}

/// Drops the first occurrence of a DATA packet carrying `target_seq`, then
/// passes everything else through untouched.
fn drop_data_seq_once(target_seq: u16) -> impl Fn(usize, &[u8]) -> FaultAction {
    let dropped = Mutex::new(false);
    move |_n, bytes| {
        if let Some(pkt) = Packet::decode(bytes) {
            if pkt.service_code == ServiceCode::Data && pkt.seq_num == target_seq {
                let mut dropped = dropped.lock().unwrap();
                if !*dropped {
                    *dropped = true;
                    return FaultAction::Drop;
                }
            }
        }
        FaultAction::Pass
    }
}

#[test]
fn s1_happy_path_round_trip() {
    let (a, b) = wire_pair(fast_config(), fast_config(), |_, _| FaultAction::Pass, |_, _| FaultAction::Pass);

    let payload = block_600();
    a.enqueue_block(ChannelId::Params, Block::from(payload.as_slice())).unwrap();

    let received = b
        .receive_block(ChannelId::Params, Duration::from_secs(2))
        .expect("block should arrive with no packet loss");
    assert_eq!(received.as_slice(), payload.as_slice());

    // The sender's block is freed on ASK; a second block on the same channel
    // must also go through cleanly.
    let payload2 = vec![7u8; 50];
    a.enqueue_block(ChannelId::Params, Block::from(payload2.as_slice())).unwrap();
    let received2 = b.receive_block(ChannelId::Params, Duration::from_secs(2)).unwrap();
    assert_eq!(received2.as_slice(), payload2.as_slice());
}

#[test]
fn s2_single_data_loss_recovered_by_nack() {
    // Drop the first DATA packet carrying seq=2 on the way from A to B; B's
    // END handler should NACK it and A should retransmit just that packet.
    let (a, b) = wire_pair(fast_config(), fast_config(), drop_data_seq_once(2), |_, _| FaultAction::Pass);

    let payload = block_600();
    let started = std::time::Instant::now();
    a.enqueue_block(ChannelId::Params, Block::from(payload.as_slice())).unwrap();

    let received = b
        .receive_block(ChannelId::Params, Duration::from_secs(2))
        .expect("block should still arrive after one NACK round");
    assert_eq!(received.as_slice(), payload.as_slice());

    // spec.md S2: "Sender retransmits only seq=2. ASK follows. Total
    // retransmits = 1" — the NACK-triggered retransmit of the single missing
    // DATA packet must complete the block on its own, well inside even one
    // ACK_TIMEOUT window, without falling back to a full-block restart.
    assert!(started.elapsed() < fast_config().ack_timeout);
    assert_eq!(a.stats().total_packets_resent(), 1);
}

#[test]
fn s3_full_block_loss_recovered_within_retry_budget() {
    // Drop everything for the first two attempts (BEGIN..END is 6 packets
    // for a 600-byte block with no data making it through, so no NACK fires
    // and the sender relies purely on the ACK timeout to restart). Let the
    // third attempt through untouched.
    let (a, b) = wire_pair(
        fast_config(),
        fast_config(),
        |n, _| if n < 12 { FaultAction::Drop } else { FaultAction::Pass },
        |_, _| FaultAction::Pass,
    );

    let payload = block_600();
    let started = std::time::Instant::now();
    a.enqueue_block(ChannelId::Params, Block::from(payload.as_slice())).unwrap();

    // Retry budget is MAX_RETRY (5) full-block attempts at ack_timeout each;
    // the block must arrive well inside that bound since only 2 attempts are
    // actually lost.
    let received = b
        .receive_block(ChannelId::Params, Duration::from_secs(2))
        .expect("block should arrive on the third attempt");
    assert_eq!(received.as_slice(), payload.as_slice());
    assert!(started.elapsed() < Duration::from_millis(5 * 40 * 2));
}

#[test]
fn retry_exhaustion_abandons_block_and_frees_the_channel() {
    // Total loss in one direction: the block can never be delivered and must
    // be abandoned after MAX_RETRY attempts, after which the channel accepts
    // and can deliver a fresh block (spec.md §8 property 5).
    let (a, b) = wire_pair(fast_config(), fast_config(), |_, _| FaultAction::Drop, |_, _| FaultAction::Pass);

    a.enqueue_block(ChannelId::Files, Block::from(b"lost forever".as_slice())).unwrap();
    assert!(b.receive_block(ChannelId::Files, Duration::from_millis(500)).is_none());

    // Give the send machine time to exhaust its retry budget and return to
    // Idle (5 attempts * 40ms ack_timeout, with margin).
    std::thread::sleep(Duration::from_millis(400));

    let (a2, b2) = wire_pair(fast_config(), fast_config(), |_, _| FaultAction::Pass, |_, _| FaultAction::Pass);
    a2.enqueue_block(ChannelId::Files, Block::from(b"fresh block".as_slice())).unwrap();
    let received = b2.receive_block(ChannelId::Files, Duration::from_secs(2)).unwrap();
    assert_eq!(received.as_slice(), b"fresh block");

    // The original (lost) pair's channel is independently free too: enqueue
    // again on `a` and confirm it doesn't error as "still sending".
    assert!(a.enqueue_block(ChannelId::Files, Block::from(b"retry".as_slice())).is_ok());
}
