#[cfg(test)]
mod mux_test;

use std::collections::HashMap;

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use bytes::{BufMut, Bytes, BytesMut};
use log::warn;

use flv::annexb::split_length_prefixed;
use flv::codec::{AvcDecoderConfig, HevcDecoderConfig};
use flv::packet::{AudioCodecId, MediaPacket, VideoCodecId};
use flv::tag::parse_video_tag;

use crate::adts::write_adts_header;
use crate::error::{Error, Result};
use crate::pes::write_pes;
use crate::psi::{Pat, Pmt, PmtStream};
use crate::ts::*;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

/// FLV → TS muxer accumulating one segment.
///
/// PAT and PMT are reserved at the start of every segment; frames append
/// as PES-in-TS with PCR on video. [`TsMuxer::take_segment`] hands out
/// the finished segment, optionally AES-128-CBC encrypted for HLS.
#[derive(Debug, Default)]
pub struct TsMuxer {
    segment: BytesMut,
    continuity: HashMap<u16, u8>,
    psi_written: bool,

    video_codec: Option<VideoCodecId>,
    avc_config: Option<AvcDecoderConfig>,
    hevc_config: Option<HevcDecoderConfig>,
    asc: Option<[u8; 2]>,
}

impl TsMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segment_len(&self) -> usize {
        self.segment.len()
    }

    /// Write one FLV-framed media packet into the current segment.
    /// Sequence headers update the cached codec configuration and emit
    /// nothing.
    pub fn write_frame(&mut self, packet: &MediaPacket) -> Result<()> {
        if packet.is_sequence_header() {
            return self.on_sequence_header(packet);
        }
        if packet.is_video() {
            return self.write_video(packet);
        }
        if packet.is_audio() {
            return self.write_audio(packet);
        }
        // Script data has no TS mapping.
        Ok(())
    }

    /// Hand out the finished segment and reset for the next one.
    pub fn take_segment(&mut self) -> Bytes {
        self.psi_written = false;
        self.continuity.clear();
        self.segment.split().freeze()
    }

    /// Finish the segment with HLS AES-128-CBC encryption and PKCS#7
    /// padding.
    pub fn take_segment_encrypted(&mut self, key: &[u8; 16], iv: &[u8; 16]) -> Bytes {
        let plain = self.take_segment();
        let cipher = Aes128CbcEnc::new(key.into(), iv.into());
        Bytes::from(cipher.encrypt_padded_vec_mut::<Pkcs7>(&plain))
    }

    fn on_sequence_header(&mut self, packet: &MediaPacket) -> Result<()> {
        if packet.is_video() {
            match packet.video_codec() {
                Some(VideoCodecId::Avc) => {
                    let body = packet.payload.slice(5..);
                    self.avc_config = Some(AvcDecoderConfig::parse(&body)?);
                    self.video_codec = Some(VideoCodecId::Avc);
                }
                Some(VideoCodecId::Hevc) => {
                    let body = packet.payload.slice(5..);
                    self.hevc_config = Some(HevcDecoderConfig::parse(&body)?);
                    self.video_codec = Some(VideoCodecId::Hevc);
                }
                None => warn!("video sequence header with unknown codec"),
            }
        } else if packet.is_audio() && packet.payload.len() >= 4 {
            self.asc = Some([packet.payload[2], packet.payload[3]]);
        }
        Ok(())
    }

    /// PAT and PMT occupy the first two packets of each segment.
    fn ensure_psi(&mut self) {
        if self.psi_written {
            return;
        }
        self.psi_written = true;

        let mut streams = Vec::new();
        let stream_type = match self.video_codec {
            Some(VideoCodecId::Hevc) => STREAM_TYPE_H265,
            _ => STREAM_TYPE_H264,
        };
        streams.push(PmtStream {
            stream_type,
            pid: PID_VIDEO,
        });
        streams.push(PmtStream {
            stream_type: STREAM_TYPE_AAC,
            pid: PID_AUDIO,
        });

        let pat = Pat { pmt_pid: PID_PMT };
        let mut section = BytesMut::new();
        section.put_u8(0); // pointer field
        section.put_slice(&pat.write());
        self.write_psi_packet(PID_PAT, &section);

        let pmt = Pmt {
            pcr_pid: PID_VIDEO,
            streams,
        };
        let mut section = BytesMut::new();
        section.put_u8(0);
        section.put_slice(&pmt.write());
        self.write_psi_packet(PID_PMT, &section);
    }

    fn write_video(&mut self, packet: &MediaPacket) -> Result<()> {
        let body = parse_video_tag(&packet.payload)?;
        let cts_ms = body.cts as i64;

        let nalus = split_length_prefixed(&body.data)?;
        if nalus.is_empty() {
            return Ok(());
        }
        let keyframe = packet.is_keyframe();

        // AnnexB elementary stream: AUD, parameter sets before keyframes,
        // then the frame NALUs.
        let mut es = BytesMut::new();
        match self.video_codec.unwrap_or(VideoCodecId::Avc) {
            VideoCodecId::Avc => {
                es.put_slice(&[0, 0, 0, 1, 0x09, 0xF0]);
                if keyframe {
                    if let Some(config) = &self.avc_config {
                        for nalu in config.sps.iter().chain(config.pps.iter()) {
                            es.put_slice(&[0, 0, 0, 1]);
                            es.put_slice(nalu);
                        }
                    }
                }
            }
            VideoCodecId::Hevc => {
                es.put_slice(&[0, 0, 0, 1, 0x46, 0x01, 0x50]);
                if keyframe {
                    if let Some(config) = &self.hevc_config {
                        for nalu in config
                            .vps
                            .iter()
                            .chain(config.sps.iter())
                            .chain(config.pps.iter())
                        {
                            es.put_slice(&[0, 0, 0, 1]);
                            es.put_slice(nalu);
                        }
                    }
                }
            }
        }
        for nalu in &nalus {
            es.put_slice(&[0, 0, 0, 1]);
            es.put_slice(nalu);
        }

        let dts = packet.timestamp as u64 * 90;
        let pts = (packet.timestamp + cts_ms) as u64 * 90;
        let pes = write_pes(STREAM_ID_VIDEO, pts, Some(dts), &es);

        self.ensure_psi();
        let pcr = keyframe.then_some(dts);
        self.packetize(PID_VIDEO, &pes, pcr);
        Ok(())
    }

    fn write_audio(&mut self, packet: &MediaPacket) -> Result<()> {
        let payload = &packet.payload;
        if payload.len() < 2 {
            return Err(Error::ShortBuffer("FLV audio tag"));
        }
        let es: Bytes = match packet.audio_codec() {
            Some(AudioCodecId::Aac) => {
                let raw = payload.slice(2..);
                let Some(asc) = self.asc else {
                    warn!("drop AAC frame before the sequence header");
                    return Ok(());
                };
                let mut es = BytesMut::with_capacity(7 + raw.len());
                es.put_slice(&write_adts_header(&asc, raw.len()));
                es.put_slice(&raw);
                es.freeze()
            }
            Some(AudioCodecId::Mp3) => payload.slice(1..),
            _ => {
                return Err(Error::UnsupportedStreamType(payload[0] >> 4));
            }
        };

        let pts = packet.timestamp as u64 * 90;
        let pes = write_pes(STREAM_ID_AUDIO, pts, None, &es);

        self.ensure_psi();
        self.packetize(PID_AUDIO, &pes, None);
        Ok(())
    }

    fn next_cc(&mut self, pid: u16) -> u8 {
        let cc = self.continuity.entry(pid).or_insert(0);
        let v = *cc;
        *cc = (*cc + 1) & 0x0F;
        v
    }

    fn write_psi_packet(&mut self, pid: u16, section: &[u8]) {
        let cc = self.next_cc(pid);
        let mut pkt = Vec::with_capacity(TS_PACKET_SIZE);
        pkt.push(SYNC_BYTE);
        pkt.push(0x40 | ((pid >> 8) as u8 & 0x1F));
        pkt.push(pid as u8);
        pkt.push(0x10 | cc);
        pkt.extend_from_slice(section);
        pkt.resize(TS_PACKET_SIZE, 0xFF);
        self.segment.put_slice(&pkt);
    }

    /// Split one PES packet across 188-byte TS packets, PCR on the first
    /// when given, stuffing via the adaptation field on the last.
    fn packetize(&mut self, pid: u16, pes: &[u8], pcr: Option<u64>) {
        let mut offset = 0;
        let mut first = true;
        while first || offset < pes.len() {
            let cc = self.next_cc(pid);
            let remaining = pes.len() - offset;

            let mut af: Vec<u8> = Vec::new();
            let mut has_af = false;
            if first {
                if let Some(pcr) = pcr {
                    has_af = true;
                    af.push(0x50); // random access + PCR flag
                    push_pcr(&mut af, pcr);
                }
            }

            let mut capacity = 184 - if has_af { 1 + af.len() } else { 0 };
            if remaining < capacity {
                let deficit = capacity - remaining;
                if has_af {
                    af.extend(std::iter::repeat(0xFF).take(deficit));
                } else {
                    has_af = true;
                    // One stuffing byte is the bare length field; more
                    // adds the flags byte then 0xFF filler.
                    if deficit >= 2 {
                        af.push(0x00);
                        af.extend(std::iter::repeat(0xFF).take(deficit - 2));
                    }
                }
                capacity = remaining;
            }

            let mut pkt = Vec::with_capacity(TS_PACKET_SIZE);
            pkt.push(SYNC_BYTE);
            pkt.push(if first { 0x40 } else { 0x00 } | ((pid >> 8) as u8 & 0x1F));
            pkt.push(pid as u8);
            pkt.push(if has_af { 0x30 } else { 0x10 } | cc);
            if has_af {
                pkt.push(af.len() as u8);
                pkt.extend_from_slice(&af);
            }
            pkt.extend_from_slice(&pes[offset..offset + capacity]);
            debug_assert_eq!(pkt.len(), TS_PACKET_SIZE);
            self.segment.put_slice(&pkt);

            offset += capacity;
            first = false;
        }
    }
}

fn push_pcr(buf: &mut Vec<u8>, ticks: u64) {
    let base = ticks & 0x1_FFFF_FFFF;
    buf.push((base >> 25) as u8);
    buf.push((base >> 17) as u8);
    buf.push((base >> 9) as u8);
    buf.push((base >> 1) as u8);
    buf.push((((base & 1) as u8) << 7) | 0x7E);
    buf.push(0x00);
}
