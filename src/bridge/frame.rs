use bytes::{BufMut, Bytes, BytesMut};
use log::warn;

use flv::packet::{MediaKind, MediaPacket, VideoCodecId};
use flv::tag::{aac_tag_prefix, video_ex_tag_prefix, video_tag_prefix};

use rtp::depacket::{
    AacDepacketizer, AvcDepacketizer, Depacketizer, HevcDepacketizer, OpusDepacketizer,
};
use rtp::jitter::{JitterRing, PacketGroup, DEFAULT_MAX_LATE};
use rtp::payload::hevc::is_irap;
use rtp::{Packet, VIDEO_CLOCK_RATE};

use crate::error::Result;

/// The audio codec negotiated for an RTC track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcAudioCodec {
    /// Packaged as Opus-in-FLV; players that require AAC go through an
    /// offline transcoder.
    Opus,
    Aac,
}

/// Rebuilds FLV frames from RTP tracks.
///
/// Each track runs a jitter ring that reorders by sequence number and
/// cuts access units on marker boundaries; the depacketizers then undo
/// aggregation and fragmentation before the FLV tag is synthesized.
pub struct FlvFrameBuilder {
    video_ring: JitterRing,
    audio_ring: JitterRing,

    video_codec: VideoCodecId,
    audio_codec: RtcAudioCodec,

    avc: AvcDepacketizer,
    hevc: HevcDepacketizer,
    aac: AacDepacketizer,
    opus: OpusDepacketizer,

    audio_sample_rate: u32,
}

impl std::fmt::Debug for FlvFrameBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlvFrameBuilder")
            .field("video_codec", &self.video_codec)
            .field("audio_codec", &self.audio_codec)
            .finish()
    }
}

impl Default for FlvFrameBuilder {
    fn default() -> Self {
        Self::new(VideoCodecId::Avc, RtcAudioCodec::Opus, 48000)
    }
}

impl FlvFrameBuilder {
    pub fn new(
        video_codec: VideoCodecId,
        audio_codec: RtcAudioCodec,
        audio_sample_rate: u32,
    ) -> Self {
        Self {
            video_ring: JitterRing::new(DEFAULT_MAX_LATE),
            audio_ring: JitterRing::new(DEFAULT_MAX_LATE),
            video_codec,
            audio_codec,
            avc: AvcDepacketizer::new(),
            hevc: HevcDepacketizer::new(),
            aac: AacDepacketizer::new(),
            opus: OpusDepacketizer::new(),
            audio_sample_rate,
        }
    }

    /// Feed one video-track packet; complete access units come back as
    /// FLV video tags.
    pub fn on_video_rtp(&mut self, packet: Packet) -> Result<Vec<MediaPacket>> {
        let groups = self.video_ring.push(packet);
        let mut out = Vec::new();
        for group in groups {
            if let Some(frame) = self.build_video_frame(&group)? {
                out.push(frame);
            }
        }
        Ok(out)
    }

    /// Feed one audio-track packet.
    pub fn on_audio_rtp(&mut self, packet: Packet) -> Result<Vec<MediaPacket>> {
        let groups = self.audio_ring.push(packet);
        let mut out = Vec::new();
        for group in groups {
            out.extend(self.build_audio_frames(&group)?);
        }
        Ok(out)
    }

    fn build_video_frame(&mut self, group: &PacketGroup) -> Result<Option<MediaPacket>> {
        let timestamp_ms = (group[0].header.timestamp / (VIDEO_CLOCK_RATE / 1000)) as i64;

        let mut nalus: Vec<Bytes> = Vec::new();
        for packet in group {
            let depacketized = match self.video_codec {
                VideoCodecId::Avc => self.avc.push(&packet.payload),
                VideoCodecId::Hevc => self.hevc.push(&packet.payload),
            };
            match depacketized {
                Ok(units) => nalus.extend(units),
                Err(e) => {
                    warn!("drop undecodable video payload: {e}");
                }
            }
        }
        nalus.retain(|n| !n.is_empty());
        if nalus.is_empty() {
            return Ok(None);
        }

        let keyframe = match self.video_codec {
            VideoCodecId::Avc => nalus
                .iter()
                .any(|n| matches!(n[0] & 0x1F, 5 | 7 | 8)),
            VideoCodecId::Hevc => nalus.iter().any(|n| {
                let ty = (n[0] >> 1) & 0x3F;
                matches!(ty, 32 | 33 | 34) || is_irap(ty)
            }),
        };
        let frame_type = if keyframe { 1 } else { 2 };

        let body_len: usize = nalus.iter().map(|n| 4 + n.len()).sum();
        let mut body = BytesMut::with_capacity(5 + body_len);
        match self.video_codec {
            VideoCodecId::Avc => {
                // AVC NALU packet, zero composition time.
                body.put_slice(&video_tag_prefix(frame_type, 7, 1, 0));
            }
            VideoCodecId::Hevc => {
                // Enhanced-RTMP CodedFramesX: no composition time field.
                body.put_slice(&video_ex_tag_prefix(
                    frame_type,
                    flv::packet::EX_PACKET_TYPE_CODED_FRAMES_X,
                    *b"hvc1",
                ));
            }
        }
        for nalu in &nalus {
            body.put_u32(nalu.len() as u32);
            body.put_slice(nalu);
        }

        Ok(Some(MediaPacket::wrap(
            MediaKind::Video,
            timestamp_ms,
            0,
            body.freeze(),
        )))
    }

    fn build_audio_frames(&mut self, group: &PacketGroup) -> Result<Vec<MediaPacket>> {
        let timestamp_ms =
            (group[0].header.timestamp as u64 * 1000 / self.audio_sample_rate as u64) as i64;

        let mut out = Vec::new();
        for packet in group {
            let frames = match self.audio_codec {
                RtcAudioCodec::Aac => self.aac.push(&packet.payload),
                RtcAudioCodec::Opus => self.opus.push(&packet.payload),
            };
            let frames = match frames {
                Ok(frames) => frames,
                Err(e) => {
                    warn!("drop undecodable audio payload: {e}");
                    continue;
                }
            };
            for raw in frames {
                let mut body = BytesMut::with_capacity(2 + raw.len());
                match self.audio_codec {
                    RtcAudioCodec::Aac => body.put_slice(&aac_tag_prefix(false)),
                    // Opus-in-FLV: codec id 13 with the stereo/16-bit
                    // flags in the low nibble.
                    RtcAudioCodec::Opus => body.put_slice(&[0xDF, 0x01]),
                }
                body.put_slice(&raw);
                out.push(MediaPacket::wrap(
                    MediaKind::Audio,
                    timestamp_ms,
                    0,
                    body.freeze(),
                ));
            }
        }
        Ok(out)
    }
}
