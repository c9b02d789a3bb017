use bytes::Bytes;
use flv::packet::{MediaKind, MediaPacket};

/// RTMP message type ids.
pub mod msg_type {
    pub const SET_CHUNK_SIZE: u8 = 1;
    pub const ABORT: u8 = 2;
    pub const ACKNOWLEDGEMENT: u8 = 3;
    pub const USER_CONTROL: u8 = 4;
    pub const WINDOW_ACK_SIZE: u8 = 5;
    pub const SET_PEER_BANDWIDTH: u8 = 6;
    pub const AUDIO: u8 = 8;
    pub const VIDEO: u8 = 9;
    pub const AMF3_DATA: u8 = 15;
    pub const AMF3_SHARED_OBJECT: u8 = 16;
    pub const AMF3_COMMAND: u8 = 17;
    pub const AMF0_DATA: u8 = 18;
    pub const AMF0_SHARED_OBJECT: u8 = 19;
    pub const AMF0_COMMAND: u8 = 20;
    pub const AGGREGATE: u8 = 22;
}

/// Well-known chunk stream ids for outgoing messages.
pub mod cid {
    /// Protocol control messages (chunk size, ack, user control).
    pub const PROTOCOL_CONTROL: u32 = 2;
    /// Connection-level AMF commands (connect, createStream).
    pub const OVER_CONNECTION: u32 = 3;
    /// Connection-level AMF commands second channel.
    pub const OVER_CONNECTION2: u32 = 4;
    /// Stream-level AMF commands and data (onStatus, metadata).
    pub const OVER_STREAM: u32 = 5;
    pub const VIDEO: u32 = 6;
    pub const AUDIO: u32 = 7;
}

/// The three-bit timestamp sentinel that switches a chunk to the 4-byte
/// extended timestamp field.
pub const EXTENDED_TIMESTAMP: u32 = 0x00FF_FFFF;

pub const MIN_CHUNK_SIZE: u32 = 128;
pub const MAX_CHUNK_SIZE: u32 = 65536;
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// A decoded RTMP message header.
///
/// `timestamp` is the absolute 31-bit millisecond clock after delta
/// accumulation and extended-timestamp resolution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub timestamp_delta: u32,
    pub payload_length: u32,
    pub message_type: u8,
    pub stream_id: u32,
    pub timestamp: u32,
}

impl MessageHeader {
    pub fn is_audio(&self) -> bool {
        self.message_type == msg_type::AUDIO
    }

    pub fn is_video(&self) -> bool {
        self.message_type == msg_type::VIDEO
    }

    pub fn is_amf0_command(&self) -> bool {
        self.message_type == msg_type::AMF0_COMMAND
    }

    pub fn is_amf3_command(&self) -> bool {
        self.message_type == msg_type::AMF3_COMMAND
    }

    pub fn is_amf0_data(&self) -> bool {
        self.message_type == msg_type::AMF0_DATA
    }

    pub fn is_amf3_data(&self) -> bool {
        self.message_type == msg_type::AMF3_DATA
    }

    pub fn is_command(&self) -> bool {
        self.is_amf0_command() || self.is_amf3_command()
    }

    pub fn is_media(&self) -> bool {
        self.is_audio() || self.is_video() || self.is_amf0_data() || self.is_amf3_data()
    }

    pub fn is_set_chunk_size(&self) -> bool {
        self.message_type == msg_type::SET_CHUNK_SIZE
    }

    pub fn is_acknowledgement(&self) -> bool {
        self.message_type == msg_type::ACKNOWLEDGEMENT
    }

    pub fn is_window_ack_size(&self) -> bool {
        self.message_type == msg_type::WINDOW_ACK_SIZE
    }

    pub fn is_user_control(&self) -> bool {
        self.message_type == msg_type::USER_CONTROL
    }

    pub fn is_set_peer_bandwidth(&self) -> bool {
        self.message_type == msg_type::SET_PEER_BANDWIDTH
    }
}

/// A complete logical RTMP message: header plus reassembled payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpMessage {
    pub header: MessageHeader,
    pub payload: Bytes,
}

impl RtmpMessage {
    pub fn new(message_type: u8, timestamp: u32, stream_id: u32, payload: Bytes) -> Self {
        Self {
            header: MessageHeader {
                timestamp_delta: 0,
                payload_length: payload.len() as u32,
                message_type,
                stream_id,
                timestamp: timestamp & 0x7FFF_FFFF,
            },
            payload,
        }
    }

    /// The preferred outgoing chunk stream for this message type.
    pub fn preferred_cid(&self) -> u32 {
        match self.header.message_type {
            msg_type::AUDIO => cid::AUDIO,
            msg_type::VIDEO => cid::VIDEO,
            msg_type::AMF0_DATA | msg_type::AMF3_DATA => cid::OVER_CONNECTION2,
            msg_type::AMF0_COMMAND | msg_type::AMF3_COMMAND => {
                if self.header.stream_id > 0 {
                    cid::OVER_STREAM
                } else {
                    cid::OVER_CONNECTION
                }
            }
            _ => cid::PROTOCOL_CONTROL,
        }
    }

    /// Convert a media-typed message into the shared media packet model.
    pub fn into_media_packet(self) -> Option<MediaPacket> {
        let kind = MediaKind::from_message_type(self.header.message_type)?;
        Some(MediaPacket::wrap(
            kind,
            self.header.timestamp as i64,
            self.header.stream_id,
            self.payload,
        ))
    }

    pub fn from_media_packet(packet: &MediaPacket) -> Self {
        Self::new(
            packet.kind.message_type(),
            packet.timestamp as u32,
            packet.stream_id,
            packet.payload.clone(),
        )
    }
}
