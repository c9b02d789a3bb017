#[cfg(test)]
mod packet_test;

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::header::Header;

/// One RTP packet: header plus opaque payload.
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTP pt={} seq={} ts={} ssrc={:#x} marker={} len={}",
            self.header.payload_type,
            self.header.sequence_number,
            self.header.timestamp,
            self.header.ssrc,
            self.header.marker,
            self.payload.len()
        )
    }
}

impl Packet {
    pub fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        let header = Header::unmarshal(buf)?;
        let payload_len = buf.remaining();
        let payload = buf.copy_to_bytes(payload_len);
        Ok(Self { header, payload })
    }

    pub fn marshal_size(&self) -> usize {
        self.header.marshal_size() + self.payload.len()
    }

    pub fn marshal_to<B: BufMut>(&self, buf: &mut B) {
        self.header.marshal_to(buf);
        buf.put_slice(&self.payload);
    }

    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.marshal_to(&mut buf);
        buf.freeze()
    }
}
