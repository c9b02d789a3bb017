use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::warn;
use rand::Rng;

use flv::annexb::split_length_prefixed;
use flv::codec::{AvcDecoderConfig, HevcDecoderConfig};
use flv::packet::{AudioCodecId, MediaPacket, VideoCodecId};
use flv::tag::parse_video_tag;

use rtp::extension::{TransportCcCounter, TransportCcExtension};
use rtp::payload::{AacHbrPayloader, AvcPayloader, HevcPayloader, Payloader};
use rtp::{Header, Packet, Sequencer, VIDEO_CLOCK_RATE};

use crate::error::Result;

/// Payload budget per RTP packet, header excluded.
pub const RTP_MTU: usize = 1200;

pub const VIDEO_PAYLOAD_TYPE: u8 = 102;
pub const AUDIO_PAYLOAD_TYPE: u8 = 111;

const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Builds RTP packets from FLV-framed media for the RTC and RTSP
/// bridge targets.
///
/// Video converts the 1 kHz FLV clock to 90 kHz; audio uses the sample
/// rate negotiated from the AAC config. The final packet of every access
/// unit carries the marker bit.
pub struct RtpBuilder {
    avc: AvcPayloader,
    hevc: HevcPayloader,
    aac: AacHbrPayloader,
    video_codec: VideoCodecId,

    video_ssrc: u32,
    audio_ssrc: u32,
    video_sequencer: Sequencer,
    audio_sequencer: Sequencer,
    audio_sample_rate: u32,

    /// Transport-wide CC, shared across every builder of one sender.
    twcc: Option<(u8, Arc<Mutex<TransportCcCounter>>)>,
}

impl std::fmt::Debug for RtpBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpBuilder")
            .field("video_ssrc", &self.video_ssrc)
            .field("audio_ssrc", &self.audio_ssrc)
            .finish()
    }
}

impl Default for RtpBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RtpBuilder {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            avc: AvcPayloader::new(),
            hevc: HevcPayloader::new(),
            aac: AacHbrPayloader::new(),
            video_codec: VideoCodecId::Avc,
            video_ssrc: rng.gen(),
            audio_ssrc: rng.gen(),
            video_sequencer: Sequencer::new(),
            audio_sequencer: Sequencer::new(),
            audio_sample_rate: 48000,
            twcc: None,
        }
    }

    pub fn video_ssrc(&self) -> u32 {
        self.video_ssrc
    }

    pub fn audio_ssrc(&self) -> u32 {
        self.audio_ssrc
    }

    /// Enable the transport-wide congestion control extension under the
    /// negotiated extension id, sharing the sender-global counter.
    pub fn enable_twcc(&mut self, id: u8, counter: Arc<Mutex<TransportCcCounter>>) {
        self.twcc = Some((id, counter));
    }

    /// Convert one FLV frame into RTP packets. Sequence headers update
    /// codec state and yield nothing; their parameter sets ride in front
    /// of the next access unit.
    pub fn on_frame(&mut self, packet: &MediaPacket) -> Result<Vec<Packet>> {
        if packet.is_video() {
            self.on_video(packet)
        } else if packet.is_audio() {
            self.on_audio(packet)
        } else {
            Ok(Vec::new())
        }
    }

    fn on_video(&mut self, packet: &MediaPacket) -> Result<Vec<Packet>> {
        let body = parse_video_tag(&packet.payload)?;

        if body.is_sequence_header {
            match body.codec {
                Some(VideoCodecId::Avc) => {
                    self.video_codec = VideoCodecId::Avc;
                    self.avc.set_config(AvcDecoderConfig::parse(&body.data)?);
                }
                Some(VideoCodecId::Hevc) => {
                    self.video_codec = VideoCodecId::Hevc;
                    self.hevc.set_config(HevcDecoderConfig::parse(&body.data)?);
                }
                None => warn!("video sequence header with unknown codec"),
            }
            return Ok(Vec::new());
        }

        let nalus = split_length_prefixed(&body.data)?;
        let payloads = match self.video_codec {
            VideoCodecId::Avc => self.avc.payload(RTP_MTU, &nalus)?,
            VideoCodecId::Hevc => self.hevc.payload(RTP_MTU, &nalus)?,
        };

        let timestamp = (packet.timestamp as u32).wrapping_mul(VIDEO_CLOCK_RATE / 1000);
        let count = payloads.len();
        let mut packets = Vec::with_capacity(count);
        for (i, payload) in payloads.into_iter().enumerate() {
            let mut header = Header {
                marker: i == count - 1,
                payload_type: VIDEO_PAYLOAD_TYPE,
                sequence_number: self.video_sequencer.next_sequence_number(),
                timestamp,
                ssrc: self.video_ssrc,
                ..Default::default()
            };
            self.apply_twcc(&mut header);
            packets.push(Packet { header, payload });
        }
        Ok(packets)
    }

    fn on_audio(&mut self, packet: &MediaPacket) -> Result<Vec<Packet>> {
        let payload = &packet.payload;
        if payload.len() < 2 {
            return Ok(Vec::new());
        }

        match packet.audio_codec() {
            Some(AudioCodecId::Aac) => {
                if packet.is_sequence_header() {
                    // AudioSpecificConfig: object type then the sample
                    // rate index spanning the byte boundary.
                    if payload.len() >= 4 {
                        let index = ((payload[2] & 0x07) << 1) | (payload[3] >> 7);
                        if let Some(rate) = AAC_SAMPLE_RATES.get(index as usize) {
                            self.audio_sample_rate = *rate;
                        }
                    }
                    return Ok(Vec::new());
                }
                let raw = payload.slice(2..);
                let payloads = self.aac.payload(RTP_MTU, &[raw])?;
                Ok(self.audio_packets(packet.timestamp, payloads))
            }
            Some(AudioCodecId::Opus) => {
                let raw = payload.slice(2..);
                Ok(self.audio_packets(packet.timestamp, vec![raw]))
            }
            _ => Ok(Vec::new()),
        }
    }

    fn audio_packets(&mut self, timestamp_ms: i64, payloads: Vec<Bytes>) -> Vec<Packet> {
        let timestamp =
            (timestamp_ms as u64 * self.audio_sample_rate as u64 / 1000) as u32;
        let mut packets = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let mut header = Header {
                // One packet per audio frame, each closing its unit.
                marker: true,
                payload_type: AUDIO_PAYLOAD_TYPE,
                sequence_number: self.audio_sequencer.next_sequence_number(),
                timestamp,
                ssrc: self.audio_ssrc,
                ..Default::default()
            };
            self.apply_twcc(&mut header);
            packets.push(Packet { header, payload });
        }
        packets
    }

    fn apply_twcc(&mut self, header: &mut Header) {
        if let Some((id, counter)) = &self.twcc {
            let sequence = counter.lock().unwrap().next_sequence();
            let ext = TransportCcExtension::new(sequence);
            if let Err(e) = header.set_extension(*id, ext.marshal()) {
                warn!("twcc extension rejected: {e}");
            }
        }
    }
}
