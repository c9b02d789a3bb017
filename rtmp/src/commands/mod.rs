#[cfg(test)]
mod commands_test;

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::warn;

use amf::value::{self, Amf0Object, Amf0Value};

use crate::error::{Error, Result};
use crate::message::{msg_type, MessageHeader, RtmpMessage};

pub const COMMAND_CONNECT: &str = "connect";
pub const COMMAND_CREATE_STREAM: &str = "createStream";
pub const COMMAND_CLOSE_STREAM: &str = "closeStream";
pub const COMMAND_PLAY: &str = "play";
pub const COMMAND_PAUSE: &str = "pause";
pub const COMMAND_ON_BW_DONE: &str = "onBWDone";
pub const COMMAND_ON_STATUS: &str = "onStatus";
pub const COMMAND_RESULT: &str = "_result";
pub const COMMAND_ERROR: &str = "_error";
pub const COMMAND_RELEASE_STREAM: &str = "releaseStream";
pub const COMMAND_FC_PUBLISH: &str = "FCPublish";
pub const COMMAND_UNPUBLISH: &str = "FCUnpublish";
pub const COMMAND_PUBLISH: &str = "publish";
pub const COMMAND_ON_FC_PUBLISH: &str = "onFCPublish";
pub const COMMAND_ON_FC_UNPUBLISH: &str = "onFCUnpublish";

pub const DATA_SET_DATAFRAME: &str = "@setDataFrame";
pub const DATA_ON_METADATA: &str = "onMetaData";
pub const DATA_SAMPLE_ACCESS: &str = "|RtmpSampleAccess";

pub const STATUS_LEVEL: &str = "level";
pub const STATUS_CODE: &str = "code";
pub const STATUS_DESCRIPTION: &str = "description";
pub const STATUS_DETAILS: &str = "details";
pub const STATUS_CLIENT_ID: &str = "clientId";

pub const STATUS_LEVEL_STATUS: &str = "status";
pub const STATUS_LEVEL_ERROR: &str = "error";

pub const STATUS_CODE_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
pub const STATUS_CODE_CONNECT_REJECTED: &str = "NetConnection.Connect.Rejected";
pub const STATUS_CODE_STREAM_RESET: &str = "NetStream.Play.Reset";
pub const STATUS_CODE_STREAM_START: &str = "NetStream.Play.Start";
pub const STATUS_CODE_STREAM_PAUSE: &str = "NetStream.Pause.Notify";
pub const STATUS_CODE_STREAM_UNPAUSE: &str = "NetStream.Unpause.Notify";
pub const STATUS_CODE_PUBLISH_START: &str = "NetStream.Publish.Start";
pub const STATUS_CODE_PUBLISH_DENIED: &str = "NetStream.Publish.Denied";
pub const STATUS_CODE_UNPUBLISH_SUCCESS: &str = "NetStream.Unpublish.Success";

/// The client id reported in onStatus replies.
pub const SIG_CLIENT_ID: &str = "ASAICiss";

/// User control message event types.
pub mod event {
    pub const STREAM_BEGIN: u16 = 0;
    pub const STREAM_EOF: u16 = 1;
    pub const STREAM_DRY: u16 = 2;
    pub const SET_BUFFER_LENGTH: u16 = 3;
    pub const STREAM_IS_RECORDED: u16 = 4;
    pub const PING_REQUEST: u16 = 6;
    pub const PING_RESPONSE: u16 = 7;
}

/// Outstanding requests awaiting a `_result`/`_error`, keyed by the f64
/// transaction id bits.
#[derive(Debug, Default)]
pub struct RequestNames {
    names: HashMap<u64, String>,
}

impl RequestNames {
    pub fn record(&mut self, transaction_id: f64, command_name: &str) {
        self.names
            .insert(transaction_id.to_bits(), command_name.to_owned());
    }

    pub fn take(&mut self, transaction_id: f64) -> Option<String> {
        self.names.remove(&transaction_id.to_bits())
    }
}

/// A decoded protocol or command packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    ConnectApp(ConnectAppPacket),
    ConnectAppRes(ConnectAppResPacket),
    CreateStream(CreateStreamPacket),
    CreateStreamRes(CreateStreamResPacket),
    Play(PlayPacket),
    Pause(PausePacket),
    Publish(PublishPacket),
    FmleStart(FmleStartPacket),
    FmleStartRes(FmleStartResPacket),
    CloseStream(CloseStreamPacket),
    Call(CallPacket),
    OnStatus(OnStatusPacket),
    OnMetaData(OnMetaDataPacket),
    SetChunkSize(SetChunkSizePacket),
    WindowAckSize(SetWindowAckSizePacket),
    Acknowledgement(AcknowledgementPacket),
    SetPeerBandwidth(SetPeerBandwidthPacket),
    UserControl(UserControlPacket),
    /// Recognized but deliberately dropped payloads.
    Ignored,
}

/// Decode a complete message into a typed packet.
///
/// `requests` maps outstanding transaction ids to the command that opened
/// them, selecting the concrete `_result` packet shape.
pub fn decode_packet(
    header: &MessageHeader,
    payload: &Bytes,
    requests: &mut RequestNames,
) -> Result<Packet> {
    if header.is_command() || header.is_amf0_data() || header.is_amf3_data() {
        // FFmpeg emits a stray 4-byte timecode on the command channel.
        if payload.len() == 4 && payload[0] == 0x00 {
            warn!("ignore FFmpeg timecode payload");
            return Ok(Packet::Ignored);
        }

        let mut buf = payload.clone();
        // AMF3 command payloads carry a leading format byte to skip.
        if (header.is_amf3_command() || header.is_amf3_data()) && buf.has_remaining() {
            buf.advance(1);
        }
        let command = value::read_string(&mut buf)?;

        if command == COMMAND_RESULT || command == COMMAND_ERROR {
            let transaction_id = value::read_number(&mut buf)?;
            let request_name = requests
                .take(transaction_id)
                .ok_or(Error::NoRequest(transaction_id))?;
            let is_error = command == COMMAND_ERROR;
            return match request_name.as_str() {
                COMMAND_CONNECT => Ok(Packet::ConnectAppRes(ConnectAppResPacket::decode(
                    transaction_id,
                    is_error,
                    &mut buf,
                )?)),
                COMMAND_CREATE_STREAM => Ok(Packet::CreateStreamRes(
                    CreateStreamResPacket::decode(transaction_id, &mut buf)?,
                )),
                COMMAND_RELEASE_STREAM | COMMAND_FC_PUBLISH | COMMAND_UNPUBLISH => Ok(
                    Packet::FmleStartRes(FmleStartResPacket::new(transaction_id)),
                ),
                other => {
                    // A response to a generic call carries nothing the
                    // protocol layer needs.
                    log::trace!("drop response for call {other}, tid={transaction_id}");
                    Ok(Packet::Ignored)
                }
            };
        }

        return match &command[..] {
            COMMAND_CONNECT => Ok(Packet::ConnectApp(ConnectAppPacket::decode(&mut buf)?)),
            COMMAND_CREATE_STREAM => {
                Ok(Packet::CreateStream(CreateStreamPacket::decode(&mut buf)?))
            }
            COMMAND_PLAY => Ok(Packet::Play(PlayPacket::decode(&mut buf)?)),
            COMMAND_PAUSE => Ok(Packet::Pause(PausePacket::decode(&mut buf)?)),
            COMMAND_PUBLISH => Ok(Packet::Publish(PublishPacket::decode(&mut buf)?)),
            COMMAND_RELEASE_STREAM | COMMAND_FC_PUBLISH | COMMAND_UNPUBLISH => Ok(
                Packet::FmleStart(FmleStartPacket::decode(command.clone(), &mut buf)?),
            ),
            COMMAND_CLOSE_STREAM => Ok(Packet::CloseStream(CloseStreamPacket::decode(&mut buf)?)),
            DATA_SET_DATAFRAME | DATA_ON_METADATA => Ok(Packet::OnMetaData(
                OnMetaDataPacket::decode(command.clone(), &mut buf)?,
            )),
            _ if header.is_command() => Ok(Packet::Call(CallPacket::decode(
                command.clone(),
                &mut buf,
            )?)),
            _ => Ok(Packet::Ignored),
        };
    }

    if header.is_user_control() {
        return Ok(Packet::UserControl(UserControlPacket::decode(
            &mut payload.clone(),
        )?));
    }
    if header.is_window_ack_size() {
        return Ok(Packet::WindowAckSize(SetWindowAckSizePacket::decode(
            &mut payload.clone(),
        )?));
    }
    if header.is_acknowledgement() {
        return Ok(Packet::Acknowledgement(AcknowledgementPacket::decode(
            &mut payload.clone(),
        )?));
    }
    if header.is_set_chunk_size() {
        return Ok(Packet::SetChunkSize(SetChunkSizePacket::decode(
            &mut payload.clone(),
        )?));
    }
    if !header.is_set_peer_bandwidth() {
        log::trace!("drop unknown message, type={}", header.message_type);
    }
    Ok(Packet::Ignored)
}

/// Serialization half of a typed packet.
pub trait Encode {
    const MESSAGE_TYPE: u8 = msg_type::AMF0_COMMAND;

    fn encode_payload(&self) -> Bytes;

    /// The request command name to remember for `_result` pairing, if this
    /// packet opens a transaction.
    fn request_name(&self) -> Option<(f64, &str)> {
        None
    }

    fn to_message(&self, stream_id: u32) -> RtmpMessage {
        RtmpMessage::new(Self::MESSAGE_TYPE, 0, stream_id, self.encode_payload())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectAppPacket {
    pub transaction_id: f64,
    pub command_object: Amf0Object,
    pub args: Option<Amf0Object>,
}

impl ConnectAppPacket {
    pub fn new(command_object: Amf0Object) -> Self {
        Self {
            transaction_id: 1.0,
            command_object,
            args: None,
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let transaction_id = value::read_number(buf)?;
        // Some encoders reuse other transaction ids; tolerate them.
        if transaction_id != 1.0 {
            warn!("connect with transaction id {transaction_id}, expect 1.0");
        }
        let command_object = Amf0Value::read(buf)?.as_object()?.clone();
        let mut args = None;
        if buf.has_remaining() {
            // The optional trailing args are sometimes a stray literal;
            // only an object is kept.
            let extra = Amf0Value::read(buf)?;
            if let Amf0Value::Object(o) = extra {
                args = Some(o);
            }
        }
        Ok(Self {
            transaction_id,
            command_object,
            args,
        })
    }

    pub fn tc_url(&self) -> Result<&str> {
        self.command_object
            .get("tcUrl")
            .and_then(|v| v.as_str().ok())
            .ok_or(Error::ConnectMissingTcUrl)
    }
}

impl Encode for ConnectAppPacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, COMMAND_CONNECT);
        value::write_number(&mut buf, self.transaction_id);
        Amf0Value::Object(self.command_object.clone()).write(&mut buf);
        if let Some(args) = &self.args {
            Amf0Value::Object(args.clone()).write(&mut buf);
        }
        buf.freeze()
    }

    fn request_name(&self) -> Option<(f64, &str)> {
        Some((self.transaction_id, COMMAND_CONNECT))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectAppResPacket {
    pub transaction_id: f64,
    pub is_error: bool,
    pub props: Amf0Object,
    pub info: Amf0Object,
}

impl ConnectAppResPacket {
    pub fn new() -> Self {
        Self {
            transaction_id: 1.0,
            is_error: false,
            props: Amf0Object::new(),
            info: Amf0Object::new(),
        }
    }

    fn decode<B: Buf>(transaction_id: f64, is_error: bool, buf: &mut B) -> Result<Self> {
        let props = Amf0Value::read(buf)?.as_object()?.clone();
        let info = Amf0Value::read(buf)?.as_object()?.clone();
        Ok(Self {
            transaction_id,
            is_error,
            props,
            info,
        })
    }
}

impl Default for ConnectAppResPacket {
    fn default() -> Self {
        Self::new()
    }
}

impl Encode for ConnectAppResPacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, COMMAND_RESULT);
        value::write_number(&mut buf, self.transaction_id);
        Amf0Value::Object(self.props.clone()).write(&mut buf);
        Amf0Value::Object(self.info.clone()).write(&mut buf);
        buf.freeze()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateStreamPacket {
    pub transaction_id: f64,
}

impl CreateStreamPacket {
    pub fn new(transaction_id: f64) -> Self {
        Self { transaction_id }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let transaction_id = value::read_number(buf)?;
        value::read_null(buf)?;
        Ok(Self { transaction_id })
    }
}

impl Encode for CreateStreamPacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, COMMAND_CREATE_STREAM);
        value::write_number(&mut buf, self.transaction_id);
        value::write_null(&mut buf);
        buf.freeze()
    }

    fn request_name(&self) -> Option<(f64, &str)> {
        Some((self.transaction_id, COMMAND_CREATE_STREAM))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateStreamResPacket {
    pub transaction_id: f64,
    pub stream_id: f64,
}

impl CreateStreamResPacket {
    pub fn new(transaction_id: f64, stream_id: f64) -> Self {
        Self {
            transaction_id,
            stream_id,
        }
    }

    fn decode<B: Buf>(transaction_id: f64, buf: &mut B) -> Result<Self> {
        value::read_null(buf)?;
        let stream_id = value::read_number(buf)?;
        Ok(Self {
            transaction_id,
            stream_id,
        })
    }
}

impl Encode for CreateStreamResPacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, COMMAND_RESULT);
        value::write_number(&mut buf, self.transaction_id);
        value::write_null(&mut buf);
        value::write_number(&mut buf, self.stream_id);
        buf.freeze()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayPacket {
    pub transaction_id: f64,
    pub stream_name: String,
    pub start: f64,
    pub duration: f64,
    pub reset: bool,
}

impl PlayPacket {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            transaction_id: 0.0,
            stream_name: stream_name.into(),
            start: -2.0,
            duration: -1.0,
            reset: true,
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let transaction_id = value::read_number(buf)?;
        value::read_null(buf)?;
        let stream_name = value::read_string(buf)?;

        let mut start = -2.0;
        let mut duration = -1.0;
        let mut reset = true;
        if buf.has_remaining() {
            start = value::read_number(buf)?;
        }
        if buf.has_remaining() {
            duration = value::read_number(buf)?;
        }
        if buf.has_remaining() {
            // Flash sends a boolean; some encoders send a number.
            reset = match Amf0Value::read(buf)? {
                Amf0Value::Boolean(b) => b,
                Amf0Value::Number(n) => n != 0.0,
                _ => return Err(Error::Amf(amf::Error::WrongType("boolean or number"))),
            };
        }
        Ok(Self {
            transaction_id,
            stream_name,
            start,
            duration,
            reset,
        })
    }
}

impl Encode for PlayPacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, COMMAND_PLAY);
        value::write_number(&mut buf, self.transaction_id);
        value::write_null(&mut buf);
        value::write_string(&mut buf, &self.stream_name);
        value::write_number(&mut buf, self.start);
        value::write_number(&mut buf, self.duration);
        value::write_boolean(&mut buf, self.reset);
        buf.freeze()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PausePacket {
    pub transaction_id: f64,
    pub is_pause: bool,
    pub time_ms: f64,
}

impl PausePacket {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let transaction_id = value::read_number(buf)?;
        value::read_null(buf)?;
        let is_pause = value::read_boolean(buf)?;
        let time_ms = value::read_number(buf)?;
        Ok(Self {
            transaction_id,
            is_pause,
            time_ms,
        })
    }
}

impl Encode for PausePacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, COMMAND_PAUSE);
        value::write_number(&mut buf, self.transaction_id);
        value::write_null(&mut buf);
        value::write_boolean(&mut buf, self.is_pause);
        value::write_number(&mut buf, self.time_ms);
        buf.freeze()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishPacket {
    pub transaction_id: f64,
    pub stream_name: String,
    pub publish_type: String,
}

impl PublishPacket {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            transaction_id: 0.0,
            stream_name: stream_name.into(),
            publish_type: "live".to_owned(),
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let transaction_id = value::read_number(buf)?;
        value::read_null(buf)?;
        let stream_name = value::read_string(buf)?;
        let publish_type = if buf.has_remaining() {
            value::read_string(buf)?
        } else {
            "live".to_owned()
        };
        Ok(Self {
            transaction_id,
            stream_name,
            publish_type,
        })
    }
}

impl Encode for PublishPacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, COMMAND_PUBLISH);
        value::write_number(&mut buf, self.transaction_id);
        value::write_null(&mut buf);
        value::write_string(&mut buf, &self.stream_name);
        value::write_string(&mut buf, &self.publish_type);
        buf.freeze()
    }
}

/// The FMLE start commands: releaseStream, FCPublish, FCUnpublish.
#[derive(Debug, Clone, PartialEq)]
pub struct FmleStartPacket {
    pub command_name: String,
    pub transaction_id: f64,
    pub stream_name: String,
}

impl FmleStartPacket {
    pub fn new(
        command_name: impl Into<String>,
        transaction_id: f64,
        stream_name: impl Into<String>,
    ) -> Self {
        Self {
            command_name: command_name.into(),
            transaction_id,
            stream_name: stream_name.into(),
        }
    }

    fn decode<B: Buf>(command_name: String, buf: &mut B) -> Result<Self> {
        let transaction_id = value::read_number(buf)?;
        value::read_null(buf)?;
        let stream_name = value::read_string(buf)?;
        Ok(Self {
            command_name,
            transaction_id,
            stream_name,
        })
    }
}

impl Encode for FmleStartPacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, &self.command_name);
        value::write_number(&mut buf, self.transaction_id);
        value::write_null(&mut buf);
        value::write_string(&mut buf, &self.stream_name);
        buf.freeze()
    }

    fn request_name(&self) -> Option<(f64, &str)> {
        Some((self.transaction_id, &self.command_name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FmleStartResPacket {
    pub transaction_id: f64,
}

impl FmleStartResPacket {
    pub fn new(transaction_id: f64) -> Self {
        Self { transaction_id }
    }
}

impl Encode for FmleStartResPacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, COMMAND_RESULT);
        value::write_number(&mut buf, self.transaction_id);
        value::write_null(&mut buf);
        value::write_undefined(&mut buf);
        buf.freeze()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloseStreamPacket {
    pub transaction_id: f64,
}

impl CloseStreamPacket {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let transaction_id = value::read_number(buf)?;
        value::read_null(buf)?;
        Ok(Self { transaction_id })
    }
}

/// A generic command, decoded when no specific packet matches.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPacket {
    pub command_name: String,
    pub transaction_id: f64,
    pub command_object: Amf0Value,
    pub arguments: Option<Amf0Value>,
}

impl CallPacket {
    fn decode<B: Buf>(command_name: String, buf: &mut B) -> Result<Self> {
        let transaction_id = value::read_number(buf)?;
        let command_object = if buf.has_remaining() {
            Amf0Value::read(buf)?
        } else {
            Amf0Value::Null
        };
        let arguments = if buf.has_remaining() {
            Some(Amf0Value::read(buf)?)
        } else {
            None
        };
        Ok(Self {
            command_name,
            transaction_id,
            command_object,
            arguments,
        })
    }
}

impl Encode for CallPacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, &self.command_name);
        value::write_number(&mut buf, self.transaction_id);
        self.command_object.write(&mut buf);
        if let Some(args) = &self.arguments {
            args.write(&mut buf);
        }
        buf.freeze()
    }

    fn request_name(&self) -> Option<(f64, &str)> {
        if self.transaction_id != 0.0 {
            Some((self.transaction_id, &self.command_name))
        } else {
            None
        }
    }
}

/// The `_result` to a generic call, with null object and response.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResPacket {
    pub transaction_id: f64,
    pub command_object: Amf0Value,
    pub response: Amf0Value,
}

impl CallResPacket {
    pub fn null(transaction_id: f64) -> Self {
        Self {
            transaction_id,
            command_object: Amf0Value::Null,
            response: Amf0Value::Null,
        }
    }
}

impl Encode for CallResPacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, COMMAND_RESULT);
        value::write_number(&mut buf, self.transaction_id);
        self.command_object.write(&mut buf);
        self.response.write(&mut buf);
        buf.freeze()
    }
}

/// onStatus and its onFCPublish/onFCUnpublish variants: command name,
/// transaction id zero, null, then the data object.
#[derive(Debug, Clone, PartialEq)]
pub struct OnStatusPacket {
    pub command_name: String,
    pub data: Amf0Object,
}

impl OnStatusPacket {
    pub fn new() -> Self {
        Self {
            command_name: COMMAND_ON_STATUS.to_owned(),
            data: Amf0Object::new(),
        }
    }

    pub fn with_name(command_name: &str) -> Self {
        Self {
            command_name: command_name.to_owned(),
            data: Amf0Object::new(),
        }
    }

    pub fn status(level: &str, code: &str, description: &str) -> Self {
        let mut pkt = Self::new();
        pkt.set(STATUS_LEVEL, Amf0Value::String(level.to_owned()));
        pkt.set(STATUS_CODE, Amf0Value::String(code.to_owned()));
        pkt.set(STATUS_DESCRIPTION, Amf0Value::String(description.to_owned()));
        pkt
    }

    pub fn set(&mut self, key: &str, v: Amf0Value) {
        self.data.set(key, v);
    }
}

impl Default for OnStatusPacket {
    fn default() -> Self {
        Self::new()
    }
}

impl Encode for OnStatusPacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, &self.command_name);
        value::write_number(&mut buf, 0.0);
        value::write_null(&mut buf);
        Amf0Value::Object(self.data.clone()).write(&mut buf);
        buf.freeze()
    }
}

/// onBWDone, sent after the connect response with null args.
#[derive(Debug, Clone, PartialEq)]
pub struct OnBwDonePacket;

impl Encode for OnBwDonePacket {
    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, COMMAND_ON_BW_DONE);
        value::write_number(&mut buf, 0.0);
        value::write_null(&mut buf);
        buf.freeze()
    }
}

/// The |RtmpSampleAccess data message.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleAccessPacket {
    pub audio_sample_access: bool,
    pub video_sample_access: bool,
}

impl Encode for SampleAccessPacket {
    const MESSAGE_TYPE: u8 = msg_type::AMF0_DATA;

    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, DATA_SAMPLE_ACCESS);
        value::write_boolean(&mut buf, self.audio_sample_access);
        value::write_boolean(&mut buf, self.video_sample_access);
        buf.freeze()
    }
}

/// onMetaData script data, possibly wrapped in @setDataFrame.
#[derive(Debug, Clone, PartialEq)]
pub struct OnMetaDataPacket {
    pub metadata: Amf0Object,
}

impl OnMetaDataPacket {
    pub fn new(metadata: Amf0Object) -> Self {
        Self { metadata }
    }

    fn decode<B: Buf>(name: String, buf: &mut B) -> Result<Self> {
        // @setDataFrame wraps the real onMetaData name.
        if name == DATA_SET_DATAFRAME {
            let _inner = value::read_string(buf)?;
        }
        let metadata = match Amf0Value::read(buf)? {
            Amf0Value::Object(o) => o,
            Amf0Value::EcmaArray(o) => o,
            _ => Amf0Object::new(),
        };
        Ok(Self { metadata })
    }
}

impl Encode for OnMetaDataPacket {
    const MESSAGE_TYPE: u8 = msg_type::AMF0_DATA;

    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        value::write_string(&mut buf, DATA_ON_METADATA);
        Amf0Value::EcmaArray(self.metadata.clone()).write(&mut buf);
        buf.freeze()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetChunkSizePacket {
    pub chunk_size: u32,
}

impl SetChunkSizePacket {
    pub fn new(chunk_size: u32) -> Self {
        Self { chunk_size }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::Amf(amf::Error::ErrShortBuffer));
        }
        Ok(Self {
            chunk_size: buf.get_u32(),
        })
    }
}

impl Encode for SetChunkSizePacket {
    const MESSAGE_TYPE: u8 = msg_type::SET_CHUNK_SIZE;

    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u32(self.chunk_size);
        buf.freeze()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetWindowAckSizePacket {
    pub window_size: u32,
}

impl SetWindowAckSizePacket {
    pub fn new(window_size: u32) -> Self {
        Self { window_size }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::Amf(amf::Error::ErrShortBuffer));
        }
        Ok(Self {
            window_size: buf.get_u32(),
        })
    }
}

impl Encode for SetWindowAckSizePacket {
    const MESSAGE_TYPE: u8 = msg_type::WINDOW_ACK_SIZE;

    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u32(self.window_size);
        buf.freeze()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknowledgementPacket {
    pub sequence_number: u32,
}

impl AcknowledgementPacket {
    pub fn new(sequence_number: u32) -> Self {
        Self { sequence_number }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::Amf(amf::Error::ErrShortBuffer));
        }
        Ok(Self {
            sequence_number: buf.get_u32(),
        })
    }
}

impl Encode for AcknowledgementPacket {
    const MESSAGE_TYPE: u8 = msg_type::ACKNOWLEDGEMENT;

    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u32(self.sequence_number);
        buf.freeze()
    }
}

/// Peer bandwidth limit types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BandwidthLimit {
    Hard = 0,
    Soft = 1,
    Dynamic = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetPeerBandwidthPacket {
    pub bandwidth: u32,
    pub limit_type: BandwidthLimit,
}

impl SetPeerBandwidthPacket {
    pub fn new(bandwidth: u32, limit_type: BandwidthLimit) -> Self {
        Self {
            bandwidth,
            limit_type,
        }
    }
}

impl Encode for SetPeerBandwidthPacket {
    const MESSAGE_TYPE: u8 = msg_type::SET_PEER_BANDWIDTH;

    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(5);
        buf.put_u32(self.bandwidth);
        buf.put_u8(self.limit_type as u8);
        buf.freeze()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserControlPacket {
    pub event_type: u16,
    pub event_data: u32,
    /// Only present for SetBufferLength: the buffer length in ms.
    pub extra_data: u32,
}

impl UserControlPacket {
    pub fn new(event_type: u16, event_data: u32) -> Self {
        Self {
            event_type,
            event_data,
            extra_data: 0,
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 6 {
            return Err(Error::Amf(amf::Error::ErrShortBuffer));
        }
        let event_type = buf.get_u16();
        let event_data = buf.get_u32();
        let mut extra_data = 0;
        if event_type == event::SET_BUFFER_LENGTH {
            if buf.remaining() < 4 {
                return Err(Error::Amf(amf::Error::ErrShortBuffer));
            }
            extra_data = buf.get_u32();
        }
        Ok(Self {
            event_type,
            event_data,
            extra_data,
        })
    }
}

impl Encode for UserControlPacket {
    const MESSAGE_TYPE: u8 = msg_type::USER_CONTROL;

    fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(10);
        buf.put_u16(self.event_type);
        buf.put_u32(self.event_data);
        if self.event_type == event::SET_BUFFER_LENGTH {
            buf.put_u32(self.extra_data);
        }
        buf.freeze()
    }
}
