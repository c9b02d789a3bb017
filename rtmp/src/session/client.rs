use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite};

use amf::value::{Amf0Object, Amf0Value};

use crate::commands::*;
use crate::error::Result;
use crate::handshake::{client_handshake, HandshakeBytes, SimpleHandshake};
use crate::message::RtmpMessage;
use crate::protocol::Protocol;
use crate::request::Request;

use super::DEFAULT_STREAM_ID;

/// Server identity extracted from the connect `_result`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ServerInfo {
    pub ip: Option<String>,
    pub sig: String,
    pub version: String,
    pub pid: u32,
}

/// The client side of an RTMP connection, used by edge pulls, origin
/// pushes, and the integration tests.
pub struct ClientSession<S> {
    protocol: Protocol<S>,
    hs_bytes: HandshakeBytes,
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: S) -> Self {
        Self {
            protocol: Protocol::new(io),
            hs_bytes: HandshakeBytes::new(),
        }
    }

    pub fn protocol_mut(&mut self) -> &mut Protocol<S> {
        &mut self.protocol
    }

    /// Digest handshake; servers that answer unsigned are accepted.
    pub async fn handshake(&mut self) -> Result<()> {
        client_handshake(&mut self.hs_bytes, self.protocol.io_mut()).await?;
        self.hs_bytes.dispose();
        Ok(())
    }

    /// Plain handshake for peers that reject the digest scheme.
    pub async fn simple_handshake(&mut self) -> Result<()> {
        SimpleHandshake
            .handshake_with_server(&mut self.hs_bytes, self.protocol.io_mut())
            .await?;
        self.hs_bytes.dispose();
        Ok(())
    }

    /// Send connect and wait for the `_result`, extracting server info.
    pub async fn connect_app(&mut self, req: &Request) -> Result<ServerInfo> {
        let mut object = Amf0Object::new();
        object.set("app", Amf0Value::String(req.app.clone()));
        object.set("flashVer", Amf0Value::String("WIN 15,0,0,239".to_owned()));
        object.set(
            "swfUrl",
            Amf0Value::String(req.swf_url.clone()),
        );
        object.set("tcUrl", Amf0Value::String(req.tc_url.clone()));
        object.set("fpad", Amf0Value::Boolean(false));
        object.set("capabilities", Amf0Value::Number(239.0));
        object.set("audioCodecs", Amf0Value::Number(3575.0));
        object.set("videoCodecs", Amf0Value::Number(252.0));
        object.set("videoFunction", Amf0Value::Number(1.0));
        object.set("pageUrl", Amf0Value::String(req.page_url.clone()));
        object.set("objectEncoding", Amf0Value::Number(0.0));
        let pkt = ConnectAppPacket::new(object);
        self.protocol.send_packet(&pkt, 0).await?;

        let (_, res) = self
            .expect(|p| match p {
                Packet::ConnectAppRes(pkt) => Some(pkt),
                _ => None,
            })
            .await?;

        let mut server_info = ServerInfo::default();
        if let Some(data) = res.info.get("data").and_then(|v| v.as_object().ok()) {
            if let Some(Amf0Value::String(ip)) = data.get("srs_server_ip") {
                server_info.ip = Some(ip.clone());
            }
            if let Some(Amf0Value::String(sig)) = data.get("srs_server") {
                server_info.sig = sig.clone();
            }
            if let Some(Amf0Value::String(version)) = data.get("srs_version") {
                server_info.version = version.clone();
            }
            if let Some(Amf0Value::Number(pid)) = data.get("srs_pid") {
                server_info.pid = *pid as u32;
            }
        }
        info!(
            "connected, server={} version={}",
            server_info.sig, server_info.version
        );
        Ok(server_info)
    }

    /// createStream; the result carries the server-chosen stream id.
    pub async fn create_stream(&mut self) -> Result<u32> {
        let pkt = CreateStreamPacket::new(2.0);
        self.protocol.send_packet(&pkt, 0).await?;

        let (_, res) = self
            .expect(|p| match p {
                Packet::CreateStreamRes(pkt) => Some(pkt),
                _ => None,
            })
            .await?;
        let stream_id = if res.stream_id > 0.0 {
            res.stream_id as u32
        } else {
            DEFAULT_STREAM_ID
        };
        Ok(stream_id)
    }

    /// Start playing: play command plus a generous buffer length.
    pub async fn play(&mut self, stream: &str, stream_id: u32, chunk_size: u32) -> Result<()> {
        let pkt = PlayPacket::new(stream);
        self.protocol.send_packet(&pkt, stream_id).await?;

        let buffer = UserControlPacket {
            event_type: event::SET_BUFFER_LENGTH,
            event_data: stream_id,
            extra_data: 1000,
        };
        self.protocol.send_packet(&buffer, 0).await?;

        if chunk_size > 0 {
            self.protocol.send_set_chunk_size(chunk_size).await?;
        }
        Ok(())
    }

    /// Flash-style publish on an existing stream.
    pub async fn publish(&mut self, stream: &str, stream_id: u32, chunk_size: u32) -> Result<()> {
        if chunk_size > 0 {
            self.protocol.send_set_chunk_size(chunk_size).await?;
        }
        let pkt = PublishPacket::new(stream);
        self.protocol.send_packet(&pkt, stream_id).await?;
        Ok(())
    }

    /// The FMLE publish sequence: releaseStream, FCPublish, createStream,
    /// publish, waiting for each `_result`.
    pub async fn fmle_publish(&mut self, stream: &str) -> Result<u32> {
        let release = FmleStartPacket::new(COMMAND_RELEASE_STREAM, 2.0, stream);
        self.protocol.send_packet(&release, 0).await?;
        self.expect(|p| match p {
            Packet::FmleStartRes(pkt) => Some(pkt),
            _ => None,
        })
        .await?;

        let fc_publish = FmleStartPacket::new(COMMAND_FC_PUBLISH, 3.0, stream);
        self.protocol.send_packet(&fc_publish, 0).await?;
        self.expect(|p| match p {
            Packet::FmleStartRes(pkt) => Some(pkt),
            _ => None,
        })
        .await?;

        let create = CreateStreamPacket::new(4.0);
        self.protocol.send_packet(&create, 0).await?;
        let (_, res) = self
            .expect(|p| match p {
                Packet::CreateStreamRes(pkt) => Some(pkt),
                _ => None,
            })
            .await?;
        let stream_id = res.stream_id as u32;

        let publish = PublishPacket::new(stream);
        self.protocol.send_packet(&publish, stream_id).await?;
        // The server answers onFCPublish(NetStream.Publish.Start), which
        // decodes as a generic call.
        self.expect(|p| match p {
            Packet::Call(_) => Some(()),
            _ => None,
        })
        .await?;

        debug!("fmle publish started, stream_id={stream_id}");
        Ok(stream_id)
    }

    /// Stop an FMLE publish.
    pub async fn fmle_unpublish(&mut self, stream: &str) -> Result<()> {
        let pkt = FmleStartPacket::new(COMMAND_UNPUBLISH, 5.0, stream);
        self.protocol.send_packet(&pkt, 0).await?;
        // Response is best-effort; the peer may already be tearing down.
        let _ = self
            .expect(|p| match p {
                Packet::FmleStartRes(pkt) => Some(pkt),
                _ => None,
            })
            .await;
        Ok(())
    }

    pub async fn recv_message(&mut self) -> Result<RtmpMessage> {
        self.protocol.recv_message().await
    }

    pub async fn send_message(&mut self, msg: RtmpMessage) -> Result<()> {
        self.protocol.send_message(msg).await
    }

    pub fn decode_packet(&mut self, msg: &RtmpMessage) -> Result<Packet> {
        self.protocol.decode_packet(msg)
    }

    pub async fn send_packet<P: Encode>(&mut self, packet: &P, stream_id: u32) -> Result<()> {
        self.protocol.send_packet(packet, stream_id).await
    }

    async fn expect<T>(
        &mut self,
        select: impl Fn(Packet) -> Option<T>,
    ) -> Result<(RtmpMessage, T)> {
        loop {
            let msg = self.protocol.recv_message().await?;
            let h = &msg.header;
            if !h.is_command() && !h.is_amf0_data() && !h.is_amf3_data() {
                continue;
            }
            let pkt = self.protocol.decode_packet(&msg)?;
            if let Some(found) = select(pkt) {
                return Ok((msg, found));
            }
        }
    }
}
