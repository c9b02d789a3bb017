//! AnnexB ↔ length-prefixed NALU conversion.
//!
//! RTMP/FLV carries NALUs with 4-byte big-endian length prefixes (AVCC
//! style); elementary streams out of MPEG-TS use AnnexB start codes. Both
//! directions preserve NALU order and bytes exactly.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Locate the next AnnexB start code (00 00 01 with any number of leading
/// zeros >= 2) at or after `start`. Returns (offset, start_code_len), or
/// (-1, -1) when no more start codes exist.
pub fn next_start_code(data: &[u8], start: usize) -> (isize, isize) {
    let mut zero_count = 0usize;
    for (i, &b) in data[start..].iter().enumerate() {
        if b == 0 {
            zero_count += 1;
            continue;
        }
        if b == 1 && zero_count >= 2 {
            return ((start + i - zero_count) as isize, zero_count as isize + 1);
        }
        zero_count = 0;
    }
    (-1, -1)
}

/// Split an AnnexB elementary stream into raw NALUs (start codes stripped).
pub fn split_annexb(data: &Bytes) -> Vec<Bytes> {
    let mut nalus = Vec::new();
    let (mut ind_start, mut ind_len) = next_start_code(data, 0);
    if ind_start == -1 {
        if !data.is_empty() {
            nalus.push(data.clone());
        }
        return nalus;
    }
    while ind_start != -1 {
        let nalu_start = (ind_start + ind_len) as usize;
        let (next_start, next_len) = next_start_code(data, nalu_start);
        let nalu = if next_start == -1 {
            data.slice(nalu_start..)
        } else {
            data.slice(nalu_start..next_start as usize)
        };
        if !nalu.is_empty() {
            nalus.push(nalu);
        }
        ind_start = next_start;
        ind_len = next_len;
    }
    nalus
}

/// Split a length-prefixed (4-byte big-endian) NALU sequence.
pub fn split_length_prefixed(data: &Bytes) -> Result<Vec<Bytes>> {
    let mut nalus = Vec::new();
    let mut buf = data.clone();
    while buf.has_remaining() {
        if buf.remaining() < 4 {
            return Err(Error::ErrShortBuffer);
        }
        let len = buf.get_u32() as usize;
        if len == 0 {
            return Err(Error::EmptyNalu);
        }
        if len > buf.remaining() {
            return Err(Error::NaluLengthOverrun(len, buf.remaining()));
        }
        nalus.push(buf.copy_to_bytes(len));
    }
    Ok(nalus)
}

/// Join raw NALUs with 4-byte big-endian length prefixes.
pub fn join_length_prefixed(nalus: &[Bytes]) -> Bytes {
    let total: usize = nalus.iter().map(|n| 4 + n.len()).sum();
    let mut buf = BytesMut::with_capacity(total);
    for nalu in nalus {
        buf.put_u32(nalu.len() as u32);
        buf.put_slice(nalu);
    }
    buf.freeze()
}

/// Join raw NALUs with 4-byte AnnexB start codes.
pub fn join_annexb(nalus: &[Bytes]) -> Bytes {
    let total: usize = nalus.iter().map(|n| 4 + n.len()).sum();
    let mut buf = BytesMut::with_capacity(total);
    for nalu in nalus {
        buf.put_slice(&[0, 0, 0, 1]);
        buf.put_slice(nalu);
    }
    buf.freeze()
}

/// Convert an AnnexB elementary stream to AVCC length-prefixed framing.
pub fn annexb_to_length_prefixed(data: &Bytes) -> Bytes {
    join_length_prefixed(&split_annexb(data))
}

/// Convert an AVCC length-prefixed sequence to AnnexB framing.
pub fn length_prefixed_to_annexb(data: &Bytes) -> Result<Bytes> {
    Ok(join_annexb(&split_length_prefixed(data)?))
}
