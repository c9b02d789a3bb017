#[cfg(test)]
mod chunk_test;

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::warn;

use crate::error::{Error, Result};
use crate::message::{MessageHeader, RtmpMessage, EXTENDED_TIMESTAMP};

/// Message header sizes indexed by fmt.
const MH_SIZES: [usize; 4] = [11, 7, 3, 0];

/// Largest possible chunk header: 3-byte basic + 11-byte fmt=0 message
/// header + 4-byte extended timestamp.
pub const MAX_FMT0_HEADER_SIZE: usize = 3 + 11 + 4;

/// Staging budget for chunk headers in one scatter-gather batch. Once less
/// than a full fmt=0 header fits, the encoder seals the batch so slices
/// handed to the writer stay valid.
const HEADER_CACHE_MAX: usize = 16 * 1024;

/// Per-chunk-stream decode state.
#[derive(Debug)]
struct ChunkStream {
    cid: u32,
    header: MessageHeader,
    has_extended_timestamp: bool,
    extended_timestamp: u32,
    /// Reassembly buffer for the in-progress message.
    partial: Option<BytesMut>,
    /// Chunks accepted on this stream; a fresh stream requires fmt=0.
    msg_count: u64,
}

impl ChunkStream {
    fn new(cid: u32) -> Self {
        Self {
            cid,
            header: MessageHeader::default(),
            has_extended_timestamp: false,
            extended_timestamp: 0,
            partial: None,
            msg_count: 0,
        }
    }
}

/// Sans-I/O chunk stream decoder.
///
/// Feed raw connection bytes into a [`BytesMut`] and call
/// [`ChunkDecoder::poll_message`]; it consumes as many complete chunks as
/// are buffered and returns the next fully reassembled message, or `None`
/// when more bytes are needed. Partial chunks are never consumed.
#[derive(Debug)]
pub struct ChunkDecoder {
    in_chunk_size: u32,
    streams: HashMap<u32, ChunkStream>,
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            in_chunk_size: crate::message::DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
        }
    }

    pub fn in_chunk_size(&self) -> u32 {
        self.in_chunk_size
    }

    pub fn set_in_chunk_size(&mut self, size: u32) {
        self.in_chunk_size = size;
    }

    pub fn poll_message(&mut self, buf: &mut BytesMut) -> Result<Option<RtmpMessage>> {
        loop {
            match self.parse_chunk(buf)? {
                ChunkProgress::NeedMore => return Ok(None),
                ChunkProgress::MessageReady(msg) => return Ok(Some(msg)),
                ChunkProgress::ChunkConsumed => continue,
            }
        }
    }

    /// Parse exactly one chunk if the buffer holds it entirely.
    fn parse_chunk(&mut self, buf: &mut BytesMut) -> Result<ChunkProgress> {
        if buf.is_empty() {
            return Ok(ChunkProgress::NeedMore);
        }

        // Basic header: fmt in the two high bits, cid in the low six with
        // 2- and 3-byte escape forms for ids 64 and up.
        let b0 = buf[0];
        let fmt = (b0 >> 6) & 0x03;
        let cid0 = (b0 & 0x3F) as u32;
        let (cid, basic_len) = match cid0 {
            0 => {
                if buf.len() < 2 {
                    return Ok(ChunkProgress::NeedMore);
                }
                (64 + buf[1] as u32, 2)
            }
            1 => {
                if buf.len() < 3 {
                    return Ok(ChunkProgress::NeedMore);
                }
                (64 + buf[1] as u32 + buf[2] as u32 * 256, 3)
            }
            literal => (literal, 1),
        };

        let in_chunk_size = self.in_chunk_size as usize;
        let chunk = self
            .streams
            .entry(cid)
            .or_insert_with(|| ChunkStream::new(cid));

        let is_first_chunk_of_msg = chunk.partial.is_none();

        // A fresh chunk stream must start with fmt=0; librtmp pings with
        // fmt=1 on a fresh stream, accept those with a warning.
        if chunk.msg_count == 0 && fmt != 0 {
            if fmt == 1 {
                warn!("fresh chunk stream cid={cid} starts with fmt=1");
            } else {
                return Err(Error::ChunkStart { fmt, cid });
            }
        }
        // A partial message must not be restarted by fmt=0.
        if !is_first_chunk_of_msg && fmt == 0 {
            return Err(Error::ChunkRestart(cid));
        }

        let mh_size = MH_SIZES[fmt as usize];
        if buf.len() < basic_len + mh_size {
            return Ok(ChunkProgress::NeedMore);
        }

        // Stage the header fields without consuming; the chunk commits
        // only once its payload slice is fully buffered.
        let mut header = chunk.header;
        let mut has_extended = chunk.has_extended_timestamp;
        let mut pos = basic_len;

        if fmt <= 2 {
            let field = read_u24(&buf[pos..]);
            pos += 3;
            has_extended = field >= EXTENDED_TIMESTAMP;
            header.timestamp_delta = field;

            if fmt <= 1 {
                let payload_length = read_u24(&buf[pos..]);
                pos += 3;
                if !is_first_chunk_of_msg && header.payload_length != payload_length {
                    return Err(Error::PayloadLengthChanged {
                        cached: header.payload_length,
                        got: payload_length,
                    });
                }
                header.payload_length = payload_length;
                header.message_type = buf[pos];
                pos += 1;

                if fmt == 0 {
                    header.stream_id = u32::from_le_bytes([
                        buf[pos],
                        buf[pos + 1],
                        buf[pos + 2],
                        buf[pos + 3],
                    ]);
                    pos += 4;
                }
            }
        }

        let mut extended_timestamp = chunk.extended_timestamp;
        if has_extended {
            if buf.len() < pos + 4 {
                return Ok(ChunkProgress::NeedMore);
            }
            let mut field =
                u32::from_be_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
            // Some peers use the full 32 bits here.
            field &= 0x7FFF_FFFF;

            // librtmp omits the extended timestamp on continuation chunks.
            // When the field disagrees with the cached value on a
            // non-first chunk, the four bytes were payload: leave them.
            if !is_first_chunk_of_msg && extended_timestamp > 0 && extended_timestamp != field {
                // rewind: the field was absent
            } else {
                extended_timestamp = field;
                pos += 4;
            }
        }

        let timestamp_value = if has_extended {
            extended_timestamp
        } else {
            header.timestamp_delta
        };
        if fmt == 0 {
            header.timestamp = timestamp_value;
        } else if is_first_chunk_of_msg {
            header.timestamp = header.timestamp.wrapping_add(timestamp_value);
        }
        header.timestamp &= 0x7FFF_FFFF;

        // Payload slice for this chunk.
        let already = chunk.partial.as_ref().map(|p| p.len()).unwrap_or(0);
        let payload_size = (header.payload_length as usize - already).min(in_chunk_size);
        if buf.len() < pos + payload_size {
            return Ok(ChunkProgress::NeedMore);
        }

        // Commit.
        buf.advance(pos);
        chunk.header = header;
        chunk.has_extended_timestamp = has_extended;
        chunk.extended_timestamp = extended_timestamp;
        chunk.msg_count += 1;

        let partial = chunk
            .partial
            .get_or_insert_with(|| BytesMut::with_capacity(header.payload_length as usize));
        partial.extend_from_slice(&buf[..payload_size]);
        buf.advance(payload_size);

        if partial.len() == header.payload_length as usize {
            let payload = chunk.partial.take().unwrap().freeze();
            return Ok(ChunkProgress::MessageReady(RtmpMessage { header, payload }));
        }
        Ok(ChunkProgress::ChunkConsumed)
    }
}

enum ChunkProgress {
    NeedMore,
    ChunkConsumed,
    MessageReady(RtmpMessage),
}

/// One scatter-gather batch: alternating header and payload slices, ready
/// for a vectored socket write.
pub type WriteBatch = Vec<Bytes>;

/// Chunk stream encoder.
///
/// Messages are split on `out_chunk_size` boundaries: the first chunk of a
/// message carries a fmt=0 header, continuations carry fmt=3. Headers are
/// staged in a contiguous cache per batch; when less than one maximum
/// fmt=0 header remains free, the current batch is sealed and a new one
/// started, so header slices already handed out are never invalidated.
#[derive(Debug)]
pub struct ChunkEncoder {
    out_chunk_size: u32,
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self {
            out_chunk_size: crate::message::DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn out_chunk_size(&self) -> u32 {
        self.out_chunk_size
    }

    pub fn set_out_chunk_size(&mut self, size: u32) {
        self.out_chunk_size = size;
    }

    /// Encode messages into write batches.
    pub fn encode(&self, msgs: &[RtmpMessage]) -> Vec<WriteBatch> {
        let mut batches = Vec::new();
        let mut batch: WriteBatch = Vec::new();
        let mut cache = BytesMut::with_capacity(HEADER_CACHE_MAX);
        let mut cache_used = 0usize;

        for msg in msgs {
            if msg.payload.is_empty() {
                continue;
            }
            let cid = msg.preferred_cid();
            let mut offset = 0usize;
            let total = msg.payload.len();

            while offset < total {
                let is_first = offset == 0;
                write_chunk_header(&mut cache, &msg.header, cid, is_first);
                let header = cache.split().freeze();
                cache_used += header.len();
                batch.push(header);

                let payload_size = (total - offset).min(self.out_chunk_size as usize);
                batch.push(msg.payload.slice(offset..offset + payload_size));
                offset += payload_size;

                if HEADER_CACHE_MAX - cache_used < MAX_FMT0_HEADER_SIZE {
                    batches.push(std::mem::take(&mut batch));
                    cache = BytesMut::with_capacity(HEADER_CACHE_MAX);
                    cache_used = 0;
                }
            }
        }

        if !batch.is_empty() {
            batches.push(batch);
        }
        batches
    }
}

/// Serialize one chunk header: fmt=0 for the first chunk of a message,
/// fmt=3 for continuations. Timestamps at or above the 24-bit sentinel
/// switch to the extended field on every chunk of the message.
pub fn write_chunk_header<B: BufMut>(
    buf: &mut B,
    header: &MessageHeader,
    cid: u32,
    is_first: bool,
) {
    let fmt: u8 = if is_first { 0 } else { 3 };
    write_basic_header(buf, fmt, cid);

    let extended = header.timestamp >= EXTENDED_TIMESTAMP;
    if is_first {
        if extended {
            put_u24(buf, EXTENDED_TIMESTAMP);
        } else {
            put_u24(buf, header.timestamp);
        }
        put_u24(buf, header.payload_length);
        buf.put_u8(header.message_type);
        buf.put_u32_le(header.stream_id);
    }
    // Adobe products expect the extended timestamp repeated on fmt=3
    // chunks of the same message.
    if extended {
        buf.put_u32(header.timestamp);
    }
}

fn write_basic_header<B: BufMut>(buf: &mut B, fmt: u8, cid: u32) {
    if cid < 64 {
        buf.put_u8((fmt << 6) | cid as u8);
    } else if cid < 64 + 256 {
        buf.put_u8(fmt << 6);
        buf.put_u8((cid - 64) as u8);
    } else {
        buf.put_u8((fmt << 6) | 1);
        buf.put_u8(((cid - 64) & 0xFF) as u8);
        buf.put_u8(((cid - 64) >> 8) as u8);
    }
}

fn read_u24(buf: &[u8]) -> u32 {
    ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | buf[2] as u32
}

fn put_u24<B: BufMut>(buf: &mut B, v: u32) {
    buf.put_u8((v >> 16) as u8);
    buf.put_u8((v >> 8) as u8);
    buf.put_u8(v as u8);
}
