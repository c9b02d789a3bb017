//! Header extensions the bridges emit.

use bytes::{BufMut, Bytes, BytesMut};

/// URI negotiated for transport-wide congestion control.
pub const TRANSPORT_CC_URI: &str =
    "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";

/// Transport-wide congestion control: a single 16-bit sequence number
/// shared by every packet a sender emits, regardless of SSRC.
///
/// ```text
///  0                   1
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       transport-wide seq      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransportCcExtension {
    pub transport_sequence: u16,
}

impl TransportCcExtension {
    pub fn new(transport_sequence: u16) -> Self {
        Self { transport_sequence }
    }

    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2);
        buf.put_u16(self.transport_sequence);
        buf.freeze()
    }

    pub fn unmarshal(raw: &[u8]) -> Option<Self> {
        if raw.len() < 2 {
            return None;
        }
        Some(Self {
            transport_sequence: u16::from_be_bytes([raw[0], raw[1]]),
        })
    }
}

/// A sender-global counter for the transport-wide sequence.
#[derive(Debug, Default)]
pub struct TransportCcCounter {
    next: u16,
}

impl TransportCcCounter {
    pub fn next_sequence(&mut self) -> u16 {
        let v = self.next;
        self.next = self.next.wrapping_add(1);
        v
    }
}
