//! The bridge fabric: per-source conversion pipelines feeding other
//! sources.
//!
//! A source owns at most one [`CompositeBridge`]; the bridge holds one
//! optional target per destination protocol and the builder that
//! repackages frames for it. Builders run in enable order for every
//! frame, and a builder refusing a frame drops that frame only.

pub mod frame;
pub mod rtc;


use std::sync::Arc;

use bytes::Bytes;
use log::warn;

use flv::packet::MediaPacket;

use crate::source::Source;

pub use frame::{FlvFrameBuilder, RtcAudioCodec};
pub use rtc::RtpBuilder;

struct RtpTarget {
    source: Arc<Source>,
    builder: RtpBuilder,
}

struct FrameTarget {
    source: Arc<Source>,
    builder: FlvFrameBuilder,
}

/// The composite of every enabled bridge target for one source.
pub struct CompositeBridge {
    /// RTMP/SRT → RTC: FLV frames to RTP packets.
    rtc: Option<RtpTarget>,
    /// RTMP/SRT → RTSP: same packetization, separate target and state.
    rtsp: Option<RtpTarget>,
    /// RTC → RTMP: RTP packets back to FLV frames.
    rtmp_from_rtp: Option<FrameTarget>,
    /// SRT → RTMP: demuxed FLV frames forwarded unchanged.
    rtmp: Option<Arc<Source>>,
    /// SRT ingest: TS datagrams to FLV frames.
    ts_demuxer: Option<mpegts::TsDemuxer>,

    publishing: bool,
}

impl std::fmt::Debug for CompositeBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeBridge")
            .field("rtc", &self.rtc.is_some())
            .field("rtsp", &self.rtsp.is_some())
            .field("rtmp", &self.rtmp.is_some())
            .field("rtmp_from_rtp", &self.rtmp_from_rtp.is_some())
            .finish()
    }
}

impl Default for CompositeBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeBridge {
    pub fn new() -> Self {
        Self {
            rtc: None,
            rtsp: None,
            rtmp_from_rtp: None,
            rtmp: None,
            ts_demuxer: None,
            publishing: false,
        }
    }

    /// Enable the RTC target, allocating its RTP builder.
    pub fn enable_rtc(&mut self, source: Arc<Source>) -> &mut Self {
        self.rtc = Some(RtpTarget {
            source,
            builder: RtpBuilder::new(),
        });
        self
    }

    pub fn enable_rtsp(&mut self, source: Arc<Source>) -> &mut Self {
        self.rtsp = Some(RtpTarget {
            source,
            builder: RtpBuilder::new(),
        });
        self
    }

    /// Enable the direct RTMP target used by SRT sources.
    pub fn enable_rtmp(&mut self, source: Arc<Source>) -> &mut Self {
        self.rtmp = Some(source);
        self.ts_demuxer = Some(mpegts::TsDemuxer::new());
        self
    }

    /// Enable the RTMP target of an RTC source, allocating the frame
    /// builder.
    pub fn enable_rtmp_from_rtp(
        &mut self,
        source: Arc<Source>,
        builder: FlvFrameBuilder,
    ) -> &mut Self {
        self.rtmp_from_rtp = Some(FrameTarget { source, builder });
        self
    }

    /// Access the RTC target's builder, e.g. to negotiate TWCC.
    pub fn rtc_builder_mut(&mut self) -> Option<&mut RtpBuilder> {
        self.rtc.as_mut().map(|t| &mut t.builder)
    }

    pub fn empty(&self) -> bool {
        self.rtc.is_none()
            && self.rtsp.is_none()
            && self.rtmp.is_none()
            && self.rtmp_from_rtp.is_none()
    }

    /// Cascade publish to every target source; idempotent.
    pub fn on_publish(&mut self, publisher_id: u64) {
        if self.publishing {
            return;
        }
        self.publishing = true;
        for source in self.target_sources() {
            if let Err(e) = source.on_publish(publisher_id) {
                warn!("bridge target {} refused publish: {e}", source.url());
            }
        }
    }

    /// Cascade unpublish and empty the bridge; idempotent.
    pub fn on_unpublish(&mut self) {
        if !self.publishing {
            return;
        }
        self.publishing = false;
        for source in self.target_sources() {
            source.on_unpublish();
        }
        self.rtc = None;
        self.rtsp = None;
        self.rtmp = None;
        self.rtmp_from_rtp = None;
        self.ts_demuxer = None;
    }

    fn target_sources(&self) -> Vec<Arc<Source>> {
        let mut sources = Vec::new();
        if let Some(t) = &self.rtc {
            sources.push(t.source.clone());
        }
        if let Some(t) = &self.rtsp {
            sources.push(t.source.clone());
        }
        if let Some(s) = &self.rtmp {
            sources.push(s.clone());
        }
        if let Some(t) = &self.rtmp_from_rtp {
            sources.push(t.source.clone());
        }
        sources
    }

    /// Fan one FLV frame out through every builder. A failing builder
    /// loses this frame only; the others still run.
    pub fn on_frame(&mut self, packet: &MediaPacket) {
        if let Some(target) = &mut self.rtc {
            match target.builder.on_frame(packet) {
                Ok(packets) => {
                    for p in packets {
                        target.source.on_rtp(p);
                    }
                }
                Err(e) => warn!("rtc builder refused a frame: {e}"),
            }
        }
        if let Some(target) = &mut self.rtsp {
            match target.builder.on_frame(packet) {
                Ok(packets) => {
                    for p in packets {
                        target.source.on_rtp(p);
                    }
                }
                Err(e) => warn!("rtsp builder refused a frame: {e}"),
            }
        }
        if let Some(source) = &self.rtmp {
            source.on_frame(packet.clone());
        }
    }

    /// Feed an RTC-side RTP packet; synthesized frames forward to the
    /// RTMP target. Payload type tells the tracks apart.
    pub fn on_rtp(&mut self, packet: &rtp::Packet) {
        let Some(target) = &mut self.rtmp_from_rtp else {
            return;
        };
        let result = if packet.header.payload_type == rtc::AUDIO_PAYLOAD_TYPE {
            target.builder.on_audio_rtp(packet.clone())
        } else {
            target.builder.on_video_rtp(packet.clone())
        };
        match result {
            Ok(frames) => {
                for frame in frames {
                    target.source.on_frame(frame);
                }
            }
            Err(e) => warn!("frame builder refused a packet: {e}"),
        }
    }

    /// Feed an SRT datagram of TS packets; demuxed frames re-enter
    /// [`CompositeBridge::on_frame`].
    pub fn on_packet(&mut self, data: &Bytes) {
        let Some(demuxer) = &mut self.ts_demuxer else {
            return;
        };
        let mut frames = Vec::new();
        for chunk in data.chunks(mpegts::ts::TS_PACKET_SIZE) {
            match demuxer.push(chunk) {
                Ok(out) => frames.extend(out),
                Err(e) => {
                    warn!("ts demuxer refused a packet: {e}");
                }
            }
        }
        for frame in frames {
            self.on_frame(&frame);
        }
    }
}
