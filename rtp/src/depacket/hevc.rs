use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::payload::hevc::{
    nalu_type, AP_NALU_TYPE, FU_END_BITMASK, FU_NALU_TYPE, FU_START_BITMASK, NALU_HEADER_SIZE,
};

/// H.265 depacketizer: splits aggregation packets, reassembles FUs,
/// passes single NALUs through. PACI is not handled.
#[derive(Debug, Default, Clone)]
pub struct HevcDepacketizer {
    fu_buffer: Option<BytesMut>,
}

impl HevcDepacketizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl super::Depacketizer for HevcDepacketizer {
    fn push(&mut self, payload: &Bytes) -> Result<Vec<Bytes>> {
        if payload.len() < NALU_HEADER_SIZE {
            return Err(Error::ErrShortPacket);
        }

        match nalu_type(payload) {
            AP_NALU_TYPE => {
                let mut nalus = Vec::new();
                let mut offset = NALU_HEADER_SIZE;
                while offset < payload.len() {
                    if payload.len() < offset + 2 {
                        return Err(Error::ErrShortPacket);
                    }
                    let size = ((payload[offset] as usize) << 8) | payload[offset + 1] as usize;
                    offset += 2;
                    if payload.len() < offset + size {
                        return Err(Error::StapSizeLargerThanBuffer(
                            size,
                            payload.len() - offset,
                        ));
                    }
                    nalus.push(payload.slice(offset..offset + size));
                    offset += size;
                }
                Ok(nalus)
            }
            FU_NALU_TYPE => {
                if payload.len() <= NALU_HEADER_SIZE + 1 {
                    return Err(Error::ErrShortPacket);
                }
                let fu_header = payload[2];
                let ty = fu_header & 0x3F;

                if fu_header & FU_START_BITMASK != 0 {
                    // Rebuild the 2-byte NALU header: original layer/tid
                    // with the type from the FU header.
                    let mut buf = BytesMut::new();
                    buf.put_u8((payload[0] & 0x81) | (ty << 1));
                    buf.put_u8(payload[1]);
                    self.fu_buffer = Some(buf);
                }
                if let Some(buffer) = &mut self.fu_buffer {
                    buffer.put_slice(&payload[NALU_HEADER_SIZE + 1..]);
                } else {
                    return Ok(vec![]);
                }

                if fu_header & FU_END_BITMASK != 0 {
                    let nalu = self.fu_buffer.take().unwrap().freeze();
                    return Ok(vec![nalu]);
                }
                Ok(vec![])
            }
            50 => Err(Error::NaluTypeIsNotHandled(50)),
            _ => {
                self.fu_buffer = None;
                Ok(vec![payload.clone()])
            }
        }
    }
}
