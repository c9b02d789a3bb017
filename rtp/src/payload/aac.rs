use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

use super::Payloader;

/// AU-headers-length in bits for one 16-bit AU header.
const AU_HEADERS_LENGTH_BITS: u16 = 16;
/// Each AU header: 13-bit size, 3-bit delta index.
const AU_SIZE_MAX: usize = (1 << 13) - 1;

/// RFC 3640 "AAC-hbr" audio payloader.
///
/// Every access unit becomes exactly one RTP packet carrying the two-byte
/// AU-headers-length field, one AU header, then the raw AAC frame; the
/// caller sets the marker on it.
#[derive(Debug, Default, Clone)]
pub struct AacHbrPayloader;

impl AacHbrPayloader {
    pub fn new() -> Self {
        Self
    }
}

impl Payloader for AacHbrPayloader {
    fn payload(&mut self, _mtu: usize, frames: &[Bytes]) -> Result<Vec<Bytes>> {
        let mut payloads = Vec::with_capacity(frames.len());
        for frame in frames {
            if frame.is_empty() {
                continue;
            }
            if frame.len() > AU_SIZE_MAX {
                return Err(Error::AacFrameTooLarge(frame.len()));
            }

            let mut buf = BytesMut::with_capacity(4 + frame.len());
            buf.put_u16(AU_HEADERS_LENGTH_BITS);
            // 13-bit size, 3-bit AU index of zero.
            buf.put_u16((frame.len() as u16) << 3);
            buf.put_slice(frame);
            payloads.push(buf.freeze());
        }
        Ok(payloads)
    }
}
