use bytes::Bytes;

use super::*;
use crate::header::Header;
use crate::packet::Packet;

fn packet(seq: u16, ts: u32, marker: bool) -> Packet {
    Packet {
        header: Header {
            sequence_number: seq,
            timestamp: ts,
            marker,
            payload_type: 96,
            ..Default::default()
        },
        payload: Bytes::from(vec![seq as u8]),
    }
}

#[test]
fn test_in_order_marker_cut() {
    let mut ring = JitterRing::new(16);
    assert!(ring.push(packet(10, 100, false)).is_empty());
    assert!(ring.push(packet(11, 100, false)).is_empty());
    let groups = ring.push(packet(12, 100, true));
    assert_eq!(groups.len(), 1);
    let seqs: Vec<u16> = groups[0]
        .iter()
        .map(|p| p.header.sequence_number)
        .collect();
    assert_eq!(seqs, vec![10, 11, 12]);
}

#[test]
fn test_reorder_within_window() {
    let mut ring = JitterRing::new(16);
    assert!(ring.push(packet(2, 100, true)).is_empty());
    assert!(ring.push(packet(0, 100, false)).is_empty());
    // The missing packet 1 arrives last; the group releases in order.
    let groups = ring.push(packet(1, 100, false));
    assert_eq!(groups.len(), 1);
    let seqs: Vec<u16> = groups[0]
        .iter()
        .map(|p| p.header.sequence_number)
        .collect();
    assert_eq!(seqs, vec![0, 1, 2]);
}

#[test]
fn test_audio_single_packet_groups() {
    let mut ring = JitterRing::new(16);
    for seq in 0..5u16 {
        let groups = ring.push(packet(seq, seq as u32 * 960, true));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[0][0].header.sequence_number, seq);
    }
}

#[test]
fn test_two_groups_release_together() {
    let mut ring = JitterRing::new(16);
    assert!(ring.push(packet(1, 200, true)).is_empty());
    // Packet 0 completes the first group AND unblocks the second.
    let groups = ring.push(packet(0, 100, true));
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0][0].header.sequence_number, 0);
    assert_eq!(groups[1][0].header.sequence_number, 1);
}

#[test]
fn test_gap_skipped_after_max_late() {
    let mut ring = JitterRing::new(4);
    assert!(ring.push(packet(0, 100, false)).is_empty());
    // Packet 1 is lost. Subsequent groups stall until the window closes.
    assert!(ring.push(packet(2, 200, true)).is_empty());
    assert!(ring.push(packet(3, 300, true)).is_empty());
    assert!(ring.push(packet(4, 400, true)).is_empty());
    assert!(ring.push(packet(5, 500, true)).is_empty());
    // Crossing max_late forces the head past the gap; the complete
    // later groups flush out, the stalled prefix is gone.
    let groups = ring.push(packet(6, 600, true));
    assert!(!groups.is_empty());
    for group in &groups {
        for p in group {
            assert!(
                p.header.sequence_number >= 2,
                "packets before the gap must not be released"
            );
        }
    }
    assert!(ring.dropped_packets() > 0);
}

#[test]
fn test_sequence_wraparound() {
    let mut ring = JitterRing::new(16);
    assert!(ring.push(packet(0xFFFE, 100, false)).is_empty());
    assert!(ring.push(packet(0xFFFF, 100, false)).is_empty());
    let groups = ring.push(packet(0x0000, 100, true));
    assert_eq!(groups.len(), 1);
    let seqs: Vec<u16> = groups[0]
        .iter()
        .map(|p| p.header.sequence_number)
        .collect();
    assert_eq!(seqs, vec![0xFFFE, 0xFFFF, 0x0000]);
}

#[test]
fn test_duplicate_packet_ignored() {
    let mut ring = JitterRing::new(16);
    assert!(ring.push(packet(5, 100, false)).is_empty());
    assert!(ring.push(packet(5, 100, false)).is_empty());
    let groups = ring.push(packet(6, 100, true));
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
}

#[test]
fn test_too_old_packet_dropped() {
    let mut ring = JitterRing::new(8);
    let groups = ring.push(packet(100, 1, true));
    assert_eq!(groups.len(), 1);
    // Sequence 90 precedes the released head; it is counted and dropped.
    assert!(ring.push(packet(90, 1, true)).is_empty());
    assert_eq!(ring.dropped_packets(), 1);
}
