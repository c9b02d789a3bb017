use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::payload::avc::{
    FUA_HEADER_SIZE, FUA_NALU_TYPE, FU_END_BITMASK, FU_START_BITMASK, NALU_REF_IDC_BITMASK,
    NALU_TYPE_BITMASK, STAPA_HEADER_SIZE, STAPA_NALU_LENGTH_SIZE, STAPA_NALU_TYPE,
};

/// H.264 depacketizer: splits STAP-A, reassembles FU-A, passes single
/// NALUs through.
#[derive(Debug, Default, Clone)]
pub struct AvcDepacketizer {
    fua_buffer: Option<BytesMut>,
}

impl AvcDepacketizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl super::Depacketizer for AvcDepacketizer {
    fn push(&mut self, payload: &Bytes) -> Result<Vec<Bytes>> {
        if payload.is_empty() {
            return Err(Error::ErrShortPacket);
        }
        let b0 = payload[0];
        let nalu_type = b0 & NALU_TYPE_BITMASK;

        match nalu_type {
            1..=23 => {
                self.fua_buffer = None;
                Ok(vec![payload.clone()])
            }
            STAPA_NALU_TYPE => {
                let mut nalus = Vec::new();
                let mut offset = STAPA_HEADER_SIZE;
                while offset < payload.len() {
                    if payload.len() < offset + STAPA_NALU_LENGTH_SIZE {
                        return Err(Error::ErrShortPacket);
                    }
                    let size = ((payload[offset] as usize) << 8) | payload[offset + 1] as usize;
                    offset += STAPA_NALU_LENGTH_SIZE;
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
            FUA_NALU_TYPE => {
                if payload.len() <= FUA_HEADER_SIZE {
                    return Err(Error::ErrShortPacket);
                }
                let fu_header = payload[1];

                if fu_header & FU_START_BITMASK != 0 {
                    // Rebuild the original NALU header from the indicator
                    // NRI and the FU type bits.
                    let mut buf = BytesMut::new();
                    buf.put_u8((b0 & NALU_REF_IDC_BITMASK) | (fu_header & NALU_TYPE_BITMASK));
                    self.fua_buffer = Some(buf);
                }
                if let Some(buffer) = &mut self.fua_buffer {
                    buffer.put_slice(&payload[FUA_HEADER_SIZE..]);
                } else {
                    // Fragment without a start; drop until the next start.
                    return Ok(vec![]);
                }

                if fu_header & FU_END_BITMASK != 0 {
                    let nalu = self.fua_buffer.take().unwrap().freeze();
                    return Ok(vec![nalu]);
                }
                Ok(vec![])
            }
            _ => Err(Error::NaluTypeIsNotHandled(nalu_type)),
        }
    }
}
