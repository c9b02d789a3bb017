use std::net::Ipv4Addr;
use std::time::Duration;

use log::{debug, info, trace};
use tokio::io::{AsyncRead, AsyncWrite};

use amf::value::{Amf0Object, Amf0Value};

use crate::commands::*;
use crate::error::{Error, Result};
use crate::handshake::{server_handshake, HandshakeBytes};
use crate::message::RtmpMessage;
use crate::protocol::Protocol;
use crate::request::{Request, RtmpConnType};

use super::{DEFAULT_STREAM_ID, REDIRECT_TIMEOUT, SIG_FMS_VERSION, SIG_SERVER, SIG_VERSION};

/// The server side of one RTMP connection.
///
/// Drives the lifecycle: handshake, connect, identify, then the play or
/// publish start sequence. Media then flows through
/// [`ServerSession::recv_message`] and [`ServerSession::send_message`].
pub struct ServerSession<S> {
    protocol: Protocol<S>,
    hs_bytes: HandshakeBytes,
}

impl<S> ServerSession<S>
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

    /// Client address carried by the proxy preamble, when one was read.
    pub fn proxy_real_ip(&self) -> Option<Ipv4Addr> {
        self.hs_bytes.proxy_real_ip
    }

    /// Complex handshake with simple fallback; buffers are disposed after
    /// completion.
    pub async fn handshake(&mut self) -> Result<()> {
        server_handshake(&mut self.hs_bytes, self.protocol.io_mut()).await?;
        self.hs_bytes.dispose();
        Ok(())
    }

    /// Wait for `connect` and parse its tcUrl into a request.
    pub async fn connect_app(&mut self) -> Result<Request> {
        let (_, pkt) = self
            .expect(|p| match p {
                Packet::ConnectApp(pkt) => Some(pkt),
                _ => None,
            })
            .await?;

        let tc_url = pkt.tc_url()?.to_owned();
        let mut req = Request::parse_tc_url(&tc_url)?;
        if let Some(Amf0Value::String(page_url)) = pkt.command_object.get("pageUrl") {
            req.page_url = page_url.clone();
        }
        if let Some(Amf0Value::String(swf_url)) = pkt.command_object.get("swfUrl") {
            req.swf_url = swf_url.clone();
        }
        if let Some(Amf0Value::Number(encoding)) = pkt.command_object.get("objectEncoding") {
            req.object_encoding = *encoding;
        }
        req.args = pkt.args;
        req.strip();

        info!(
            "connect app, tcUrl={}, vhost={}, app={}",
            req.tc_url, req.vhost, req.app
        );
        Ok(req)
    }

    pub async fn set_window_ack_size(&mut self, ack_size: u32) -> Result<()> {
        self.protocol.send_window_ack_size(ack_size).await
    }

    /// Window for acks we emit to the peer.
    pub fn set_in_window_ack_size(&mut self, ack_size: u32) {
        self.protocol.set_in_window_ack_size(ack_size);
    }

    pub async fn set_peer_bandwidth(&mut self, bandwidth: u32, limit: BandwidthLimit) -> Result<()> {
        self.protocol
            .send_packet(&SetPeerBandwidthPacket::new(bandwidth, limit), 0)
            .await
    }

    pub async fn set_chunk_size(&mut self, chunk_size: u32) -> Result<()> {
        self.protocol.send_set_chunk_size(chunk_size).await
    }

    /// The `_result` for connect, including the server identity array.
    pub async fn response_connect_app(
        &mut self,
        req: &Request,
        server_ip: Option<&str>,
    ) -> Result<()> {
        let mut pkt = ConnectAppResPacket::new();
        pkt.props
            .set("fmsVer", Amf0Value::String(format!("FMS/{SIG_FMS_VERSION}")));
        pkt.props.set("capabilities", Amf0Value::Number(127.0));
        pkt.props.set("mode", Amf0Value::Number(1.0));

        pkt.info.set(
            STATUS_LEVEL,
            Amf0Value::String(STATUS_LEVEL_STATUS.to_owned()),
        );
        pkt.info.set(
            STATUS_CODE,
            Amf0Value::String(STATUS_CODE_CONNECT_SUCCESS.to_owned()),
        );
        pkt.info.set(
            STATUS_DESCRIPTION,
            Amf0Value::String("Connection succeeded".to_owned()),
        );
        pkt.info
            .set("objectEncoding", Amf0Value::Number(req.object_encoding));

        let mut data = Amf0Object::new();
        data.set("version", Amf0Value::String(SIG_FMS_VERSION.to_owned()));
        data.set("srs_server", Amf0Value::String(SIG_SERVER.to_owned()));
        data.set("srs_version", Amf0Value::String(SIG_VERSION.to_owned()));
        if let Some(ip) = server_ip {
            data.set("srs_server_ip", Amf0Value::String(ip.to_owned()));
        }
        data.set("srs_pid", Amf0Value::Number(std::process::id() as f64));
        data.set("srs_id", Amf0Value::Number(0.0));
        pkt.info.set("data", Amf0Value::EcmaArray(data));

        self.protocol.send_packet(&pkt, 0).await
    }

    /// Reject the connection with NetConnection.Connect.Rejected.
    pub async fn response_connect_reject(&mut self, description: &str) -> Result<()> {
        let pkt = OnStatusPacket::status(
            STATUS_LEVEL_ERROR,
            STATUS_CODE_CONNECT_REJECTED,
            description,
        );
        self.protocol.send_packet(&pkt, 0).await
    }

    pub async fn on_bw_done(&mut self) -> Result<()> {
        self.protocol.send_packet(&OnBwDonePacket, 0).await
    }

    /// RTMP 302: reject with the redirect target, then wait briefly for
    /// any reply which marks the redirect accepted.
    pub async fn redirect(&mut self, url: &str) -> Result<bool> {
        let mut ex = Amf0Object::new();
        ex.set("code", Amf0Value::Number(302.0));
        // redirect carries the tcUrl, redirect2 the full RTMP URL.
        let tc_url = url.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(url);
        ex.set("redirect", Amf0Value::String(tc_url.to_owned()));
        ex.set("redirect2", Amf0Value::String(url.to_owned()));

        let mut pkt = OnStatusPacket::status(
            STATUS_LEVEL_ERROR,
            STATUS_CODE_CONNECT_REJECTED,
            "RTMP 302 Redirect",
        );
        pkt.set("ex", Amf0Value::Object(ex));
        self.protocol.send_packet(&pkt, 0).await?;

        // The client acknowledges with any call message, or we move on.
        self.protocol.set_recv_timeout(Some(REDIRECT_TIMEOUT));
        let accepted = self
            .expect(|p| match p {
                Packet::Call(pkt) => Some(pkt),
                _ => None,
            })
            .await
            .is_ok();
        self.protocol.set_recv_timeout(None);
        Ok(accepted)
    }

    /// The identify loop: control messages are skipped silently until the
    /// client reveals whether it plays or publishes.
    pub async fn identify_client(
        &mut self,
        stream_id: u32,
    ) -> Result<(RtmpConnType, String, Duration)> {
        loop {
            let msg = self.protocol.recv_message().await?;
            let h = &msg.header;
            if h.is_acknowledgement()
                || h.is_set_chunk_size()
                || h.is_window_ack_size()
                || h.is_user_control()
            {
                continue;
            }
            if !h.is_command() {
                trace!("identify ignore message type={:#x}", h.message_type);
                continue;
            }

            match self.protocol.decode_packet(&msg)? {
                Packet::CreateStream(pkt) => {
                    return self.identify_create_stream(pkt, stream_id, 3).await;
                }
                Packet::FmleStart(pkt) => {
                    return self.identify_fmle_publish(pkt).await;
                }
                Packet::Play(pkt) => return Ok(Self::identify_play(pkt)),
                Packet::Call(pkt) => {
                    // Haivision probes with _checkbw; answer null and keep
                    // identifying.
                    let res = CallResPacket::null(pkt.transaction_id);
                    self.protocol.send_packet(&res, 0).await?;
                    continue;
                }
                _ => trace!("identify ignore AMF command"),
            }
        }
    }

    async fn identify_create_stream(
        &mut self,
        pkt: CreateStreamPacket,
        stream_id: u32,
        depth: u32,
    ) -> Result<(RtmpConnType, String, Duration)> {
        if depth == 0 {
            return Err(Error::CreateStreamDepth);
        }
        let res = CreateStreamResPacket::new(pkt.transaction_id, stream_id as f64);
        self.protocol.send_packet(&res, 0).await?;

        loop {
            let msg = self.protocol.recv_message().await?;
            let h = &msg.header;
            if h.is_acknowledgement()
                || h.is_set_chunk_size()
                || h.is_window_ack_size()
                || h.is_user_control()
            {
                continue;
            }
            if !h.is_command() {
                trace!("identify ignore message type={:#x}", h.message_type);
                continue;
            }

            match self.protocol.decode_packet(&msg)? {
                Packet::Play(pkt) => return Ok(Self::identify_play(pkt)),
                Packet::Publish(pkt) => {
                    // Flash publishes inside createStream.
                    return Ok((RtmpConnType::FlashPublish, pkt.stream_name, Duration::ZERO));
                }
                Packet::CreateStream(pkt) => {
                    return Box::pin(self.identify_create_stream(pkt, stream_id, depth - 1))
                        .await;
                }
                Packet::FmleStart(pkt) => {
                    // Haivision: FCPublish inside createStream.
                    let res = FmleStartResPacket::new(pkt.transaction_id);
                    self.protocol.send_packet(&res, 0).await?;
                    return Ok((
                        RtmpConnType::HaivisionPublish,
                        pkt.stream_name,
                        Duration::ZERO,
                    ));
                }
                _ => trace!("identify ignore AMF command"),
            }
        }
    }

    async fn identify_fmle_publish(
        &mut self,
        pkt: FmleStartPacket,
    ) -> Result<(RtmpConnType, String, Duration)> {
        let res = FmleStartResPacket::new(pkt.transaction_id);
        self.protocol.send_packet(&res, 0).await?;
        Ok((RtmpConnType::FmlePublish, pkt.stream_name, Duration::ZERO))
    }

    fn identify_play(pkt: PlayPacket) -> (RtmpConnType, String, Duration) {
        let duration = if pkt.duration >= 0.0 {
            Duration::from_millis(pkt.duration as u64)
        } else {
            Duration::ZERO
        };
        (RtmpConnType::Play, pkt.stream_name, duration)
    }

    /// The play start sequence: StreamBegin, Play.Reset, Play.Start, and
    /// sample access.
    pub async fn start_play(&mut self, stream_id: u32) -> Result<()> {
        let begin = UserControlPacket::new(event::STREAM_BEGIN, stream_id);
        self.protocol.send_packet(&begin, 0).await?;

        let mut reset = OnStatusPacket::status(
            STATUS_LEVEL_STATUS,
            STATUS_CODE_STREAM_RESET,
            "Playing and resetting stream.",
        );
        reset.set(STATUS_DETAILS, Amf0Value::String("stream".to_owned()));
        reset.set(
            STATUS_CLIENT_ID,
            Amf0Value::String(SIG_CLIENT_ID.to_owned()),
        );
        self.protocol.send_packet(&reset, stream_id).await?;

        let mut start = OnStatusPacket::status(
            STATUS_LEVEL_STATUS,
            STATUS_CODE_STREAM_START,
            "Started playing stream.",
        );
        start.set(STATUS_DETAILS, Amf0Value::String("stream".to_owned()));
        start.set(
            STATUS_CLIENT_ID,
            Amf0Value::String(SIG_CLIENT_ID.to_owned()),
        );
        self.protocol.send_packet(&start, stream_id).await?;

        let access = SampleAccessPacket {
            audio_sample_access: true,
            video_sample_access: true,
        };
        self.protocol.send_packet(&access, stream_id).await?;

        debug!("play started, stream_id={stream_id}");
        Ok(())
    }

    /// Pause or unpause a playing client.
    pub async fn on_play_client_pause(&mut self, stream_id: u32, is_pause: bool) -> Result<()> {
        if is_pause {
            let pkt = OnStatusPacket::status(
                STATUS_LEVEL_STATUS,
                STATUS_CODE_STREAM_PAUSE,
                "Paused stream.",
            );
            self.protocol.send_packet(&pkt, stream_id).await?;
            let eof = UserControlPacket::new(event::STREAM_EOF, stream_id);
            self.protocol.send_packet(&eof, 0).await?;
        } else {
            let pkt = OnStatusPacket::status(
                STATUS_LEVEL_STATUS,
                STATUS_CODE_STREAM_UNPAUSE,
                "Unpaused stream.",
            );
            self.protocol.send_packet(&pkt, stream_id).await?;
            let begin = UserControlPacket::new(event::STREAM_BEGIN, stream_id);
            self.protocol.send_packet(&begin, 0).await?;
        }
        Ok(())
    }

    /// The FMLE publish handshake: FCPublish and createStream get their
    /// `_result`s, then publish is answered with onFCPublish.
    pub async fn start_fmle_publish(&mut self, stream_id: u32) -> Result<()> {
        let (_, fc_publish) = self
            .expect(|p| match p {
                Packet::FmleStart(pkt) => Some(pkt),
                _ => None,
            })
            .await?;
        let res = FmleStartResPacket::new(fc_publish.transaction_id);
        self.protocol.send_packet(&res, 0).await?;

        let (_, create_stream) = self
            .expect(|p| match p {
                Packet::CreateStream(pkt) => Some(pkt),
                _ => None,
            })
            .await?;
        let res = CreateStreamResPacket::new(create_stream.transaction_id, stream_id as f64);
        self.protocol.send_packet(&res, 0).await?;

        self.expect(|p| match p {
            Packet::Publish(pkt) => Some(pkt),
            _ => None,
        })
        .await?;

        let mut pkt = OnStatusPacket::with_name(COMMAND_ON_FC_PUBLISH);
        pkt.set(
            STATUS_CODE,
            Amf0Value::String(STATUS_CODE_PUBLISH_START.to_owned()),
        );
        pkt.set(
            STATUS_DESCRIPTION,
            Amf0Value::String("Started publishing stream.".to_owned()),
        );
        self.protocol.send_packet(&pkt, stream_id).await?;
        Ok(())
    }

    /// Haivision skips the FMLE triplet: only publish arrives.
    pub async fn start_haivision_publish(&mut self, stream_id: u32) -> Result<()> {
        self.expect(|p| match p {
            Packet::Publish(pkt) => Some(pkt),
            _ => None,
        })
        .await?;

        let mut pkt = OnStatusPacket::with_name(COMMAND_ON_FC_PUBLISH);
        pkt.set(
            STATUS_CODE,
            Amf0Value::String(STATUS_CODE_PUBLISH_START.to_owned()),
        );
        pkt.set(
            STATUS_DESCRIPTION,
            Amf0Value::String("Started publishing stream.".to_owned()),
        );
        self.protocol.send_packet(&pkt, stream_id).await?;
        Ok(())
    }

    /// Announce publishing is live: onStatus(NetStream.Publish.Start).
    pub async fn start_publishing(&mut self, stream_id: u32) -> Result<()> {
        let mut pkt = OnStatusPacket::status(
            STATUS_LEVEL_STATUS,
            STATUS_CODE_PUBLISH_START,
            "Started publishing stream.",
        );
        pkt.set(
            STATUS_CLIENT_ID,
            Amf0Value::String(SIG_CLIENT_ID.to_owned()),
        );
        self.protocol.send_packet(&pkt, stream_id).await
    }

    /// The FMLE unpublish triplet of responses.
    pub async fn fmle_unpublish(&mut self, stream_id: u32, unpublish_tid: f64) -> Result<()> {
        let mut pkt = OnStatusPacket::with_name(COMMAND_ON_FC_UNPUBLISH);
        pkt.set(
            STATUS_CODE,
            Amf0Value::String(STATUS_CODE_UNPUBLISH_SUCCESS.to_owned()),
        );
        pkt.set(
            STATUS_DESCRIPTION,
            Amf0Value::String("Stop publishing stream.".to_owned()),
        );
        self.protocol.send_packet(&pkt, stream_id).await?;

        let res = FmleStartResPacket::new(unpublish_tid);
        self.protocol.send_packet(&res, stream_id).await?;

        let mut pkt = OnStatusPacket::status(
            STATUS_LEVEL_STATUS,
            STATUS_CODE_UNPUBLISH_SUCCESS,
            "Stream is now unpublished",
        );
        pkt.set(
            STATUS_CLIENT_ID,
            Amf0Value::String(SIG_CLIENT_ID.to_owned()),
        );
        self.protocol.send_packet(&pkt, stream_id).await
    }

    /// Reject a publish attempt and report why.
    pub async fn response_publish_denied(&mut self, stream_id: u32, description: &str) -> Result<()> {
        let pkt = OnStatusPacket::status(
            STATUS_LEVEL_ERROR,
            STATUS_CODE_PUBLISH_DENIED,
            description,
        );
        self.protocol.send_packet(&pkt, stream_id).await
    }

    pub async fn recv_message(&mut self) -> Result<RtmpMessage> {
        self.protocol.recv_message().await
    }

    pub async fn send_message(&mut self, msg: RtmpMessage) -> Result<()> {
        self.protocol.send_message(msg).await
    }

    pub async fn send_messages(&mut self, msgs: &[RtmpMessage]) -> Result<()> {
        self.protocol.send_messages(msgs).await
    }

    pub fn decode_packet(&mut self, msg: &RtmpMessage) -> Result<Packet> {
        self.protocol.decode_packet(msg)
    }

    pub async fn send_packet<P: Encode>(&mut self, packet: &P, stream_id: u32) -> Result<()> {
        self.protocol.send_packet(packet, stream_id).await
    }

    pub fn default_stream_id(&self) -> u32 {
        DEFAULT_STREAM_ID
    }

    /// Receive until a command decodes into the wanted packet; other
    /// messages are dropped like the identify loop drops them.
    pub(crate) async fn expect<T>(
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
