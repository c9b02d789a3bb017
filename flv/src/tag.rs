use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::packet::{
    is_video_sequence_header, MediaKind, MediaPacket, VideoCodecId, EX_PACKET_TYPE_CODED_FRAMES,
    VIDEO_EX_HEADER_MASK,
};

pub const TAG_HEADER_SIZE: usize = 11;
pub const PREV_TAG_SIZE: usize = 4;

/// FLV file header: "FLV", version 1, audio+video flags, header size 9.
pub const FILE_HEADER: [u8; 9] = [b'F', b'L', b'V', 0x01, 0x05, 0x00, 0x00, 0x00, 0x09];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TagType {
    Audio = 8,
    Video = 9,
    Script = 18,
}

impl TagType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            8 => Ok(TagType::Audio),
            9 => Ok(TagType::Video),
            18 => Ok(TagType::Script),
            other => Err(Error::InvalidTagType(other)),
        }
    }
}

impl From<MediaKind> for TagType {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => TagType::Audio,
            MediaKind::Video => TagType::Video,
            MediaKind::Script => TagType::Script,
        }
    }
}

/// One FLV tag on the wire:
/// `[tag_type(1)][data_size(3)][timestamp(3)][timestamp_ext(1)][stream_id(3)]`
/// followed by the payload and a 4-byte previous-tag-size trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlvTag {
    pub tag_type: TagType,
    pub timestamp: u32,
    pub payload: Bytes,
}

impl FlvTag {
    pub fn new(tag_type: TagType, timestamp: u32, payload: Bytes) -> Self {
        Self {
            tag_type,
            timestamp,
            payload,
        }
    }

    pub fn from_packet(packet: &MediaPacket) -> Self {
        Self {
            tag_type: packet.kind.into(),
            timestamp: packet.timestamp as u32,
            payload: packet.payload.clone(),
        }
    }

    pub fn into_packet(self, stream_id: u32) -> MediaPacket {
        let kind = match self.tag_type {
            TagType::Audio => MediaKind::Audio,
            TagType::Video => MediaKind::Video,
            TagType::Script => MediaKind::Script,
        };
        MediaPacket::wrap(kind, self.timestamp as i64, stream_id, self.payload)
    }

    /// Size of the framed tag including the previous-tag-size trailer.
    pub fn frame_size(&self) -> usize {
        TAG_HEADER_SIZE + self.payload.len() + PREV_TAG_SIZE
    }

    /// Frame the tag, trailer included.
    pub fn write<B: BufMut>(&self, buf: &mut B) {
        let data_size = self.payload.len() as u32;
        buf.put_u8(self.tag_type as u8);
        put_u24(buf, data_size);
        // Lower 24 bits, then the extension byte for bits 24..31.
        put_u24(buf, self.timestamp & 0x00FF_FFFF);
        buf.put_u8((self.timestamp >> 24) as u8);
        put_u24(buf, 0); // stream id, always zero in files
        buf.put_slice(&self.payload);
        buf.put_u32(TAG_HEADER_SIZE as u32 + data_size);
    }

    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.frame_size());
        self.write(&mut buf);
        buf.freeze()
    }

    /// Deframe one tag, validating the previous-tag-size trailer.
    pub fn read<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < TAG_HEADER_SIZE {
            return Err(Error::ErrShortBuffer);
        }
        let tag_type = TagType::from_u8(buf.get_u8())?;
        let data_size = get_u24(buf);
        let ts_low = get_u24(buf);
        let ts_ext = buf.get_u8() as u32;
        let _stream_id = get_u24(buf);
        if buf.remaining() < data_size as usize + PREV_TAG_SIZE {
            return Err(Error::ErrShortBuffer);
        }
        let payload = buf.copy_to_bytes(data_size as usize);
        let prev_size = buf.get_u32();
        let expect = TAG_HEADER_SIZE as u32 + data_size;
        if prev_size != expect {
            return Err(Error::PreviousTagSizeMismatch {
                got: prev_size,
                expect,
            });
        }
        Ok(Self {
            tag_type,
            timestamp: (ts_ext << 24) | ts_low,
            payload,
        })
    }
}

/// Build the 5-byte legacy AVC/HEVC video tag prefix:
/// `[frame_type<<4 | codec][packet_type][composition_time:3]`.
pub fn video_tag_prefix(frame_type: u8, codec: u8, packet_type: u8, cts: i32) -> [u8; 5] {
    let cts = cts as u32;
    [
        (frame_type << 4) | (codec & 0x0F),
        packet_type,
        (cts >> 16) as u8,
        (cts >> 8) as u8,
        cts as u8,
    ]
}

/// Build the enhanced-RTMP 5-byte video prefix: ex-header byte then fourCC.
pub fn video_ex_tag_prefix(frame_type: u8, packet_type: u8, fourcc: [u8; 4]) -> [u8; 5] {
    [
        0x80 | (frame_type << 4) | (packet_type & 0x0F),
        fourcc[0],
        fourcc[1],
        fourcc[2],
        fourcc[3],
    ]
}

/// Build the 1-byte FLV audio header for AAC at 44.1 kHz stereo 16-bit plus
/// the AAC packet type byte.
pub fn aac_tag_prefix(is_sequence_header: bool) -> [u8; 2] {
    // 0xAF: AAC, 44 kHz flag, 16-bit samples, stereo.
    [0xAF, u8::from(!is_sequence_header)]
}

/// The decoded body of an FLV video tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTagBody {
    pub codec: Option<VideoCodecId>,
    pub frame_type: u8,
    pub is_sequence_header: bool,
    /// Composition time offset in milliseconds.
    pub cts: i32,
    /// The codec payload: a config record for sequence headers,
    /// length-prefixed NALUs otherwise.
    pub data: Bytes,
}

/// Strip the legacy or enhanced-RTMP video prefix off a tag payload.
pub fn parse_video_tag(payload: &Bytes) -> Result<VideoTagBody> {
    if payload.len() < 5 {
        return Err(Error::ErrShortBuffer);
    }
    let b0 = payload[0];
    let frame_type = (b0 >> 4) & 0x07;
    let is_sequence_header = is_video_sequence_header(payload);

    if b0 & VIDEO_EX_HEADER_MASK != 0 {
        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(&payload[1..5]);
        let codec = match &fourcc {
            b"hvc1" => Some(VideoCodecId::Hevc),
            _ => None,
        };
        let packet_type = b0 & 0x0F;
        if packet_type == EX_PACKET_TYPE_CODED_FRAMES {
            if payload.len() < 8 {
                return Err(Error::ErrShortBuffer);
            }
            let mut cts_buf = payload.slice(5..8);
            return Ok(VideoTagBody {
                codec,
                frame_type,
                is_sequence_header,
                cts: get_u24(&mut cts_buf) as i32,
                data: payload.slice(8..),
            });
        }
        return Ok(VideoTagBody {
            codec,
            frame_type,
            is_sequence_header,
            cts: 0,
            data: payload.slice(5..),
        });
    }

    let mut cts_buf = payload.slice(2..5);
    Ok(VideoTagBody {
        codec: VideoCodecId::from_byte(b0),
        frame_type,
        is_sequence_header,
        cts: get_u24(&mut cts_buf) as i32,
        data: payload.slice(5..),
    })
}

pub fn put_u24<B: BufMut>(buf: &mut B, v: u32) {
    buf.put_u8((v >> 16) as u8);
    buf.put_u8((v >> 8) as u8);
    buf.put_u8(v as u8);
}

pub fn get_u24<B: Buf>(buf: &mut B) -> u32 {
    let mut v = (buf.get_u8() as u32) << 16;
    v |= (buf.get_u8() as u32) << 8;
    v | buf.get_u8() as u32
}
