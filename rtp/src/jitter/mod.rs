#[cfg(test)]
mod jitter_test;

use log::trace;

use crate::packet::Packet;
use crate::sequence::seq_newer;

/// Default reorder window in packets.
pub const DEFAULT_MAX_LATE: u16 = 128;

const RING_SIZE: usize = 1024;

/// One access unit: its packets in sequence order, ending on a marker.
pub type PacketGroup = Vec<Packet>;

/// A per-SSRC ring that reorders packets by sequence number and releases
/// complete access units on marker boundaries.
///
/// When the gap between the newest sequence seen and the release head
/// exceeds `max_late`, the head advances over the gap and the partial
/// access unit is dropped.
pub struct JitterRing {
    buffer: Vec<Option<Packet>>,
    head: u16,
    newest: u16,
    started: bool,
    max_late: u16,
    dropped_packets: u64,
}

impl std::fmt::Debug for JitterRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitterRing")
            .field("head", &self.head)
            .field("newest", &self.newest)
            .field("started", &self.started)
            .field("max_late", &self.max_late)
            .field("dropped_packets", &self.dropped_packets)
            .finish()
    }
}

impl JitterRing {
    pub fn new(max_late: u16) -> Self {
        Self {
            buffer: (0..RING_SIZE).map(|_| None).collect(),
            head: 0,
            newest: 0,
            started: false,
            max_late: max_late.min(RING_SIZE as u16 / 2),
            dropped_packets: 0,
        }
    }

    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets
    }

    fn slot(&self, seq: u16) -> usize {
        seq as usize % RING_SIZE
    }

    /// Insert a packet and pop every access unit that became complete.
    pub fn push(&mut self, packet: Packet) -> Vec<PacketGroup> {
        let seq = packet.header.sequence_number;
        if !self.started {
            self.started = true;
            self.head = seq;
            self.newest = seq;
        }

        // Packets older than the head are too late to matter.
        if seq != self.head && !seq_newer(seq, self.head) {
            self.dropped_packets += 1;
            return Vec::new();
        }
        if seq_newer(seq, self.newest) {
            self.newest = seq;
        }
        let slot = self.slot(seq);
        self.buffer[slot] = Some(packet);

        self.drain()
    }

    fn drain(&mut self) -> Vec<PacketGroup> {
        let mut groups = Vec::new();
        loop {
            if let Some(end) = self.scan_group() {
                let mut group = Vec::with_capacity(end.wrapping_sub(self.head) as usize + 1);
                let mut seq = self.head;
                loop {
                    let slot = self.slot(seq);
                    group.push(self.buffer[slot].take().expect("scanned slot is filled"));
                    if seq == end {
                        break;
                    }
                    seq = seq.wrapping_add(1);
                }
                self.head = end.wrapping_add(1);
                groups.push(group);
                continue;
            }

            // No complete group at the head; skip the gap once the head
            // has fallen too far behind. The newer-than check keeps a
            // head that already passed `newest` from wrapping the
            // distance.
            if seq_newer(self.newest, self.head)
                && self.newest.wrapping_sub(self.head) > self.max_late
            {
                let slot = self.slot(self.head);
                if self.buffer[slot].take().is_some() {
                    self.dropped_packets += 1;
                }
                trace!("jitter ring drops seq {}", self.head);
                self.head = self.head.wrapping_add(1);
                continue;
            }
            break;
        }
        groups
    }

    /// Find the marker packet closing the group at the head, if every
    /// packet up to it is present.
    fn scan_group(&self) -> Option<u16> {
        let mut seq = self.head;
        loop {
            let packet = self.buffer[self.slot(seq)].as_ref()?;
            if packet.header.sequence_number != seq {
                // Stale entry from a previous lap.
                return None;
            }
            if packet.header.marker {
                return Some(seq);
            }
            if seq == self.newest {
                return None;
            }
            seq = seq.wrapping_add(1);
        }
    }
}
