use std::fmt;

use bytes::Bytes;

/// RTMP message type ids carried by media packets.
pub const MSG_TYPE_AUDIO: u8 = 8;
pub const MSG_TYPE_VIDEO: u8 = 9;
pub const MSG_TYPE_SCRIPT_AMF3: u8 = 15;
pub const MSG_TYPE_SCRIPT_AMF0: u8 = 18;

/// Enhanced-RTMP ex-header flag in the first video byte.
pub const VIDEO_EX_HEADER_MASK: u8 = 0x80;
/// Enhanced-RTMP packet type: sequence start (codec config).
pub const EX_PACKET_TYPE_SEQUENCE_START: u8 = 0;
/// Enhanced-RTMP packet type: coded frames with composition time.
pub const EX_PACKET_TYPE_CODED_FRAMES: u8 = 1;
/// Enhanced-RTMP packet type: coded frames without composition time.
pub const EX_PACKET_TYPE_CODED_FRAMES_X: u8 = 3;

pub const FOURCC_HVC1: [u8; 4] = *b"hvc1";
pub const FOURCC_AV01: [u8; 4] = *b"av01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Script,
}

impl MediaKind {
    pub fn from_message_type(message_type: u8) -> Option<Self> {
        match message_type {
            MSG_TYPE_AUDIO => Some(MediaKind::Audio),
            MSG_TYPE_VIDEO => Some(MediaKind::Video),
            MSG_TYPE_SCRIPT_AMF0 | MSG_TYPE_SCRIPT_AMF3 => Some(MediaKind::Script),
            _ => None,
        }
    }

    pub fn message_type(&self) -> u8 {
        match self {
            MediaKind::Audio => MSG_TYPE_AUDIO,
            MediaKind::Video => MSG_TYPE_VIDEO,
            MediaKind::Script => MSG_TYPE_SCRIPT_AMF0,
        }
    }
}

/// FLV audio codec ids (first payload byte, high nibble).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AudioCodecId {
    Mp3 = 2,
    Aac = 10,
    Opus = 13,
}

impl AudioCodecId {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b >> 4 {
            2 => Some(AudioCodecId::Mp3),
            10 => Some(AudioCodecId::Aac),
            13 => Some(AudioCodecId::Opus),
            _ => None,
        }
    }
}

/// FLV video codec ids (first payload byte, low nibble).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VideoCodecId {
    Avc = 7,
    Hevc = 12,
}

impl VideoCodecId {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            7 => Some(VideoCodecId::Avc),
            12 => Some(VideoCodecId::Hevc),
            _ => None,
        }
    }
}

/// A logical media frame flowing between the protocol engine, sources, and
/// bridges.
///
/// Cloning a packet is cheap: the payload is a refcounted [`Bytes`] region
/// and receivers must never mutate it.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub timestamp: i64,
    pub kind: MediaKind,
    pub stream_id: u32,
    pub payload: Bytes,
}

impl MediaPacket {
    /// Wrap raw bytes, transferring ownership into the shared payload.
    pub fn wrap(kind: MediaKind, timestamp: i64, stream_id: u32, payload: Bytes) -> Self {
        Self {
            timestamp,
            kind,
            stream_id,
            payload,
        }
    }

    pub fn is_audio(&self) -> bool {
        self.kind == MediaKind::Audio
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    pub fn is_script(&self) -> bool {
        self.kind == MediaKind::Script
    }

    /// Whether this is a codec configuration frame: SPS/PPS/VPS for video,
    /// AudioSpecificConfig for AAC.
    pub fn is_sequence_header(&self) -> bool {
        match self.kind {
            MediaKind::Video => is_video_sequence_header(&self.payload),
            MediaKind::Audio => is_audio_sequence_header(&self.payload),
            MediaKind::Script => false,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        self.is_video() && is_video_keyframe(&self.payload)
    }

    pub fn video_codec(&self) -> Option<VideoCodecId> {
        if !self.is_video() || self.payload.is_empty() {
            return None;
        }
        let b0 = self.payload[0];
        if b0 & VIDEO_EX_HEADER_MASK != 0 {
            // Enhanced-RTMP: fourCC follows the first byte.
            if self.payload.len() < 5 {
                return None;
            }
            let mut fourcc = [0u8; 4];
            fourcc.copy_from_slice(&self.payload[1..5]);
            match &fourcc {
                b"hvc1" => Some(VideoCodecId::Hevc),
                _ => None,
            }
        } else {
            VideoCodecId::from_byte(b0)
        }
    }

    pub fn audio_codec(&self) -> Option<AudioCodecId> {
        if !self.is_audio() || self.payload.is_empty() {
            return None;
        }
        AudioCodecId::from_byte(self.payload[0])
    }
}

impl fmt::Debug for MediaPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaPacket")
            .field("kind", &self.kind)
            .field("timestamp", &self.timestamp)
            .field("stream_id", &self.stream_id)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Video sequence-header test on an FLV video payload.
///
/// Legacy tags: codec nibble is AVC or HEVC and the AVC packet type byte is
/// zero. Enhanced-RTMP tags: the ex-header flag is set and the packet type
/// nibble is SequenceStart.
pub fn is_video_sequence_header(payload: &[u8]) -> bool {
    if payload.len() < 2 {
        return false;
    }
    let b0 = payload[0];
    if b0 & VIDEO_EX_HEADER_MASK != 0 {
        return b0 & 0x0F == EX_PACKET_TYPE_SEQUENCE_START;
    }
    matches!(VideoCodecId::from_byte(b0), Some(_)) && payload[1] == 0
}

/// AAC sequence-header test on an FLV audio payload.
pub fn is_audio_sequence_header(payload: &[u8]) -> bool {
    if payload.len() < 2 {
        return false;
    }
    AudioCodecId::from_byte(payload[0]) == Some(AudioCodecId::Aac) && payload[1] == 0
}

pub fn is_video_keyframe(payload: &[u8]) -> bool {
    if payload.is_empty() {
        return false;
    }
    (payload[0] >> 4) & 0x07 == 1
}
