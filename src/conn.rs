//! The RTMP connection driver: glues a server session to the source
//! registry, the consumer fan-out, the bridges, and the HTTP hooks.
//!
//! The socket itself comes from outside; anything that reads or writes
//! is generic over the connection stream.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use flv::packet::MediaPacket;
use rtmp::commands::{Packet, COMMAND_UNPUBLISH};
use rtmp::message::RtmpMessage;
use rtmp::request::{Request, RtmpConnType};
use rtmp::session::ServerSession;

use crate::bridge::CompositeBridge;
use crate::config::Config;
use crate::error::Result;
use crate::hook::{HookClient, StreamContext};
use crate::source::{next_context_id, Consumer, MediaItem, Source, SourceKind, SourceRegistry};

/// How long a play loop sleeps on an empty queue before polling again.
const PLAY_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Serve one accepted RTMP connection to completion.
pub struct RtmpConn<S> {
    session: ServerSession<S>,
    registry: Arc<SourceRegistry>,
    config: Arc<Config>,
    hooks: HookClient,
    client_id: u64,
    peer_ip: String,
}

impl<S> RtmpConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        io: S,
        registry: Arc<SourceRegistry>,
        config: Arc<Config>,
        hooks: HookClient,
        peer_ip: String,
    ) -> Self {
        Self {
            session: ServerSession::new(io),
            registry,
            config,
            hooks,
            client_id: next_context_id(),
            peer_ip,
        }
    }

    /// Run the connection lifecycle. Errors unwind through here so the
    /// caller only logs them; publish/play registration is always
    /// released on the way out.
    pub async fn serve(mut self) -> Result<()> {
        self.session.handshake().await?;
        if let Some(real_ip) = self.session.proxy_real_ip() {
            debug!("proxy preamble: client really at {real_ip}");
            self.peer_ip = real_ip.to_string();
        }

        let mut req = self.session.connect_app().await?;
        let ctx = self.context(&req);

        if let Err(e) = self
            .hooks
            .on_connect(&self.config.hooks.on_connect, &ctx, &req.tc_url, &req.page_url)
            .await
        {
            warn!("connect rejected by hook: {e}");
            let _ = self.session.response_connect_reject("hook rejected").await;
            return Err(e);
        }

        self.session
            .set_window_ack_size(self.config.rtmp.in_ack_size)
            .await?;
        self.session
            .set_in_window_ack_size(self.config.rtmp.in_ack_size);
        self.session
            .set_peer_bandwidth(
                self.config.rtmp.peer_bandwidth,
                self.config.rtmp.peer_bandwidth_limit(),
            )
            .await?;
        self.session
            .set_chunk_size(self.config.rtmp.chunk_size)
            .await?;
        self.session.response_connect_app(&req, None).await?;
        self.session.on_bw_done().await?;

        let stream_id = self.session.default_stream_id();
        let (conn_type, stream_name, _duration) =
            self.session.identify_client(stream_id).await?;
        req.set_stream(&stream_name);
        let ctx = self.context(&req);
        info!(
            "client {} identified as {conn_type:?} for {}",
            self.client_id,
            req.stream_url()
        );

        let result = match conn_type {
            RtmpConnType::Play => self.serve_play(&req, &ctx, stream_id).await,
            RtmpConnType::FmlePublish => {
                self.session.start_fmle_publish(stream_id).await?;
                self.serve_publish(&req, &ctx, stream_id).await
            }
            RtmpConnType::FlashPublish => {
                self.session.start_publishing(stream_id).await?;
                self.serve_publish(&req, &ctx, stream_id).await
            }
            RtmpConnType::HaivisionPublish => {
                self.session.start_haivision_publish(stream_id).await?;
                self.serve_publish(&req, &ctx, stream_id).await
            }
            RtmpConnType::Unknown => Ok(()),
        };

        let _ = self
            .hooks
            .on_close(&self.config.hooks.on_close, &ctx, 0, 0)
            .await;
        result
    }

    fn context(&self, req: &Request) -> StreamContext {
        StreamContext {
            client_id: self.client_id,
            ip: self.peer_ip.clone(),
            vhost: req.vhost.clone(),
            app: req.app.clone(),
            stream: req.stream.clone(),
            param: req.param.clone(),
        }
    }

    async fn serve_publish(
        &mut self,
        req: &Request,
        ctx: &StreamContext,
        stream_id: u32,
    ) -> Result<()> {
        if let Err(e) = self
            .hooks
            .on_publish(&self.config.hooks.on_publish, ctx)
            .await
        {
            warn!("publish rejected by hook: {e}");
            let _ = self
                .session
                .response_publish_denied(stream_id, "hook rejected")
                .await;
            return Err(e);
        }

        let url = req.stream_url();
        let (source, _) = self.registry.fetch_or_create(SourceKind::Rtmp, &url);
        if let Err(e) = source.on_publish(self.client_id) {
            let _ = self
                .session
                .response_publish_denied(stream_id, "stream busy")
                .await;
            return Err(e);
        }

        // Bridge RTMP into RTC when configured for the vhost.
        if self.config.rtc.enabled && self.config.rtc.rtc_from_rtmp {
            let (rtc_source, _) = self.registry.fetch_or_create(SourceKind::Rtc, &url);
            let mut bridge = CompositeBridge::new();
            bridge.enable_rtc(rtc_source);
            bridge.on_publish(self.client_id);
            source.set_bridge(bridge);
        }

        let result = self.publish_loop(&source).await;

        source.on_unpublish();
        let _ = self
            .hooks
            .on_unpublish(&self.config.hooks.on_unpublish, ctx)
            .await;
        result
    }

    async fn publish_loop(&mut self, source: &Arc<Source>) -> Result<()> {
        loop {
            let msg = match self.session.recv_message().await {
                Ok(msg) => msg,
                Err(rtmp::Error::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            if msg.header.is_media() {
                let is_command_shaped = msg.header.is_amf0_data() || msg.header.is_amf3_data();
                if is_command_shaped {
                    // Metadata travels on the data channel; everything
                    // else there is dropped after inspection.
                    match self.session.decode_packet(&msg) {
                        Ok(Packet::OnMetaData(_)) => {}
                        Ok(_) => continue,
                        Err(e) => {
                            debug!("ignore undecodable data message: {e}");
                            continue;
                        }
                    }
                }
                if let Some(packet) = msg.into_media_packet() {
                    source.on_frame(packet);
                }
                continue;
            }

            match self.session.decode_packet(&msg) {
                Ok(Packet::FmleStart(pkt)) if pkt.command_name == COMMAND_UNPUBLISH => {
                    self.session
                        .fmle_unpublish(msg.header.stream_id, pkt.transaction_id)
                        .await?;
                    return Ok(());
                }
                Ok(Packet::CloseStream(_)) => return Ok(()),
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => debug!("ignore command error: {e}"),
            }
        }
    }

    async fn serve_play(
        &mut self,
        req: &Request,
        ctx: &StreamContext,
        stream_id: u32,
    ) -> Result<()> {
        if let Err(e) = self.hooks.on_play(&self.config.hooks.on_play, ctx).await {
            warn!("play rejected by hook: {e}");
            let _ = self.session.response_connect_reject("hook rejected").await;
            return Err(e);
        }

        let url = req.stream_url();
        let (source, _) = self.registry.fetch_or_create(SourceKind::Rtmp, &url);
        let consumer = source.create_consumer();

        self.session.start_play(stream_id).await?;
        let result = self.play_loop(consumer, stream_id).await;

        let _ = self.hooks.on_stop(&self.config.hooks.on_stop, ctx).await;
        result
    }

    async fn play_loop(&mut self, mut consumer: Consumer, stream_id: u32) -> Result<()> {
        loop {
            tokio::select! {
                msg = self.session.recv_message() => {
                    let msg = match msg {
                        Ok(msg) => msg,
                        Err(rtmp::Error::ConnectionClosed) => return Ok(()),
                        Err(rtmp::Error::Timeout) => continue,
                        Err(e) => return Err(e.into()),
                    };
                    match self.session.decode_packet(&msg) {
                        Ok(Packet::Pause(pkt)) => {
                            self.session
                                .on_play_client_pause(stream_id, pkt.is_pause)
                                .await?;
                        }
                        Ok(Packet::CloseStream(_)) => return Ok(()),
                        Ok(_) => {}
                        Err(e) if e.is_fatal() => return Err(e.into()),
                        Err(e) => debug!("ignore command error: {e}"),
                    }
                }
                _ = consumer.wait(0, PLAY_WAIT_TIMEOUT) => {
                    if consumer.is_closed() {
                        return Ok(());
                    }
                    let mut msgs: Vec<RtmpMessage> = Vec::new();
                    while let Some(item) = consumer.dump_packet() {
                        if let MediaItem::Packet(packet) = item {
                            msgs.push(media_to_message(&packet, stream_id));
                        }
                    }
                    if !msgs.is_empty() {
                        self.session.send_messages(&msgs).await?;
                    }
                }
            }
        }
    }
}

fn media_to_message(packet: &MediaPacket, stream_id: u32) -> RtmpMessage {
    let mut msg = RtmpMessage::from_media_packet(packet);
    msg.header.stream_id = stream_id;
    msg
}

/// Convenience entry: build and serve a connection, logging the outcome.
pub async fn serve_rtmp<S>(
    io: S,
    registry: Arc<SourceRegistry>,
    config: Arc<Config>,
    hooks: HookClient,
    peer_ip: String,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn = RtmpConn::new(io, registry, config, hooks, peer_ip);
    if let Err(e) = conn.serve().await {
        error!("rtmp connection failed: {e}");
    }
}
