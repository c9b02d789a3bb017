
use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};
use log::{trace, warn};

use flv::annexb::split_annexb;
use flv::codec::{AvcDecoderConfig, HevcDecoderConfig};
use flv::packet::{MediaKind, MediaPacket};
use flv::tag::{aac_tag_prefix, put_u24, video_ex_tag_prefix, video_tag_prefix};

use crate::adts::AdtsHeader;
use crate::error::{Error, Result};
use crate::pes::PesHeader;
use crate::psi::{Pat, Pmt};
use crate::ts::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EsKind {
    Avc,
    Hevc,
    Aac,
    Mp3,
}

impl EsKind {
    fn from_stream_type(stream_type: u8) -> Option<Self> {
        match stream_type {
            STREAM_TYPE_H264 => Some(EsKind::Avc),
            STREAM_TYPE_H265 => Some(EsKind::Hevc),
            STREAM_TYPE_AAC => Some(EsKind::Aac),
            STREAM_TYPE_MP3 | 0x04 => Some(EsKind::Mp3),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct PesAssembler {
    buffer: BytesMut,
}

/// TS → FLV demuxer.
///
/// Feed 188-byte transport packets; completed PES units flow through the
/// elementary demuxers which emit FLV-framed [`MediaPacket`]s, including
/// synthesized sequence headers whenever the parameter sets or the
/// AudioSpecificConfig change.
#[derive(Debug, Default)]
pub struct TsDemuxer {
    pmt_pid: Option<u16>,
    streams: HashMap<u16, EsKind>,
    assemblers: HashMap<u16, PesAssembler>,

    avc_config: AvcDecoderConfig,
    hevc_config: HevcDecoderConfig,
    video_config_sent: bool,
    asc: Option<[u8; 2]>,
}

impl TsDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one 188-byte TS packet, returning any media frames that
    /// completed.
    pub fn push(&mut self, packet: &[u8]) -> Result<Vec<MediaPacket>> {
        if packet.len() != TS_PACKET_SIZE {
            return Err(Error::InvalidPacketSize(packet.len()));
        }
        if packet[0] != SYNC_BYTE {
            return Err(Error::SyncByteMissing(packet[0]));
        }

        let pusi = packet[1] & 0x40 != 0;
        let pid = (((packet[1] & 0x1F) as u16) << 8) | packet[2] as u16;
        let adaptation_control = (packet[3] >> 4) & 0x03;

        let mut offset = 4;
        if adaptation_control & 0x02 != 0 {
            let adaptation_length = packet[4] as usize;
            offset += 1 + adaptation_length;
            if offset > TS_PACKET_SIZE {
                return Err(Error::ShortBuffer("adaptation field"));
            }
        }
        if adaptation_control & 0x01 == 0 || offset >= TS_PACKET_SIZE {
            return Ok(Vec::new());
        }
        let payload = &packet[offset..];

        if pid == PID_PAT {
            let section = skip_pointer(payload)?;
            let pat = Pat::parse(section)?;
            self.pmt_pid = Some(pat.pmt_pid);
            return Ok(Vec::new());
        }
        if Some(pid) == self.pmt_pid {
            let section = skip_pointer(payload)?;
            let pmt = Pmt::parse(section)?;
            for stream in &pmt.streams {
                match EsKind::from_stream_type(stream.stream_type) {
                    Some(kind) => {
                        self.streams.insert(stream.pid, kind);
                    }
                    None => warn!(
                        "ignore stream pid={} with unsupported type {:#04x}",
                        stream.pid, stream.stream_type
                    ),
                }
            }
            return Ok(Vec::new());
        }

        let Some(&kind) = self.streams.get(&pid) else {
            trace!("drop TS packet for unknown pid {pid}");
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        if pusi {
            // A new PES unit begins: the previous one is complete.
            if let Some(assembler) = self.assemblers.get_mut(&pid) {
                if !assembler.buffer.is_empty() {
                    let pes = assembler.buffer.split().freeze();
                    self.on_pes(kind, &pes, &mut out)?;
                }
            }
        }
        self.assemblers
            .entry(pid)
            .or_default()
            .buffer
            .put_slice(payload);
        Ok(out)
    }

    /// Flush buffered PES units at end of stream.
    pub fn flush(&mut self) -> Result<Vec<MediaPacket>> {
        let mut out = Vec::new();
        let pids: Vec<u16> = self.assemblers.keys().copied().collect();
        for pid in pids {
            let Some(&kind) = self.streams.get(&pid) else {
                continue;
            };
            let assembler = self.assemblers.get_mut(&pid).unwrap();
            if !assembler.buffer.is_empty() {
                let pes = assembler.buffer.split().freeze();
                self.on_pes(kind, &pes, &mut out)?;
            }
        }
        Ok(out)
    }

    fn on_pes(&mut self, kind: EsKind, pes: &Bytes, out: &mut Vec<MediaPacket>) -> Result<()> {
        let header = PesHeader::parse(pes)?;
        let payload = pes.slice(header.payload_offset..);
        let dts_ms = (header.dts_or_pts() / 90) as i64;
        let cts_ms = header
            .pts
            .zip(header.dts)
            .map(|(pts, dts)| (pts.saturating_sub(dts)) / 90)
            .unwrap_or(0) as i32;

        match kind {
            EsKind::Avc => self.on_avc(payload, dts_ms, cts_ms, out),
            EsKind::Hevc => self.on_hevc(payload, dts_ms, cts_ms, out),
            EsKind::Aac => self.on_aac(payload, dts_ms, out),
            EsKind::Mp3 => {
                let mut body = BytesMut::with_capacity(1 + payload.len());
                // MP3, 44 kHz, 16-bit, stereo.
                body.put_u8(0x2F);
                body.put_slice(&payload);
                out.push(MediaPacket::wrap(
                    MediaKind::Audio,
                    dts_ms,
                    0,
                    body.freeze(),
                ));
                Ok(())
            }
        }
    }

    fn on_avc(
        &mut self,
        payload: Bytes,
        dts_ms: i64,
        cts_ms: i32,
        out: &mut Vec<MediaPacket>,
    ) -> Result<()> {
        let mut frame_nalus = Vec::new();
        let mut config_changed = false;
        let mut keyframe = false;

        for nalu in split_annexb(&payload) {
            match nalu[0] & 0x1F {
                7 => {
                    if self.avc_config.sps.first() != Some(&nalu) {
                        self.avc_config.sps = vec![nalu];
                        config_changed = true;
                    }
                }
                8 => {
                    if self.avc_config.pps.first() != Some(&nalu) {
                        self.avc_config.pps = vec![nalu];
                        config_changed = true;
                    }
                }
                9 => {} // access unit delimiter
                5 => {
                    keyframe = true;
                    frame_nalus.push(nalu);
                }
                _ => frame_nalus.push(nalu),
            }
        }

        if (config_changed || !self.video_config_sent)
            && !self.avc_config.sps.is_empty()
            && !self.avc_config.pps.is_empty()
        {
            let avcc = self.avc_config.write();
            let mut body = BytesMut::with_capacity(5 + avcc.len());
            body.put_slice(&video_tag_prefix(1, 7, 0, 0));
            body.put_slice(&avcc);
            out.push(MediaPacket::wrap(
                MediaKind::Video,
                dts_ms,
                0,
                body.freeze(),
            ));
            self.video_config_sent = true;
        }

        if frame_nalus.is_empty() {
            return Ok(());
        }
        let frame_type = if keyframe { 1 } else { 2 };
        let mut body = BytesMut::new();
        body.put_slice(&video_tag_prefix(frame_type, 7, 1, cts_ms));
        for nalu in &frame_nalus {
            body.put_u32(nalu.len() as u32);
            body.put_slice(nalu);
        }
        out.push(MediaPacket::wrap(
            MediaKind::Video,
            dts_ms,
            0,
            body.freeze(),
        ));
        Ok(())
    }

    fn on_hevc(
        &mut self,
        payload: Bytes,
        dts_ms: i64,
        cts_ms: i32,
        out: &mut Vec<MediaPacket>,
    ) -> Result<()> {
        let mut frame_nalus = Vec::new();
        let mut config_changed = false;
        let mut keyframe = false;

        for nalu in split_annexb(&payload) {
            if nalu.len() < 2 {
                continue;
            }
            let nalu_type = (nalu[0] >> 1) & 0x3F;
            match nalu_type {
                32 => {
                    if self.hevc_config.vps.first() != Some(&nalu) {
                        self.hevc_config.vps = vec![nalu];
                        config_changed = true;
                    }
                }
                33 => {
                    if self.hevc_config.sps.first() != Some(&nalu) {
                        self.hevc_config.sps = vec![nalu];
                        config_changed = true;
                    }
                }
                34 => {
                    if self.hevc_config.pps.first() != Some(&nalu) {
                        self.hevc_config.pps = vec![nalu];
                        config_changed = true;
                    }
                }
                35 => {} // access unit delimiter
                16..=23 => {
                    keyframe = true;
                    frame_nalus.push(nalu);
                }
                _ => frame_nalus.push(nalu),
            }
        }

        if (config_changed || !self.video_config_sent)
            && !self.hevc_config.sps.is_empty()
            && !self.hevc_config.pps.is_empty()
        {
            let hvcc = self.hevc_config.write();
            let mut body = BytesMut::with_capacity(5 + hvcc.len());
            body.put_slice(&video_ex_tag_prefix(1, 0, *b"hvc1"));
            body.put_slice(&hvcc);
            out.push(MediaPacket::wrap(
                MediaKind::Video,
                dts_ms,
                0,
                body.freeze(),
            ));
            self.video_config_sent = true;
        }

        if frame_nalus.is_empty() {
            return Ok(());
        }
        let frame_type = if keyframe { 1 } else { 2 };
        let mut body = BytesMut::new();
        // Enhanced-RTMP CodedFrames carries a composition time.
        body.put_slice(&video_ex_tag_prefix(frame_type, 1, *b"hvc1"));
        put_u24(&mut body, cts_ms as u32);
        for nalu in &frame_nalus {
            body.put_u32(nalu.len() as u32);
            body.put_slice(nalu);
        }
        out.push(MediaPacket::wrap(
            MediaKind::Video,
            dts_ms,
            0,
            body.freeze(),
        ));
        Ok(())
    }

    fn on_aac(&mut self, payload: Bytes, dts_ms: i64, out: &mut Vec<MediaPacket>) -> Result<()> {
        let mut offset = 0;
        while offset + 7 <= payload.len() {
            let header = AdtsHeader::parse(&payload[offset..])?;
            let frame_end = offset + header.frame_length;
            if frame_end > payload.len() {
                warn!("truncated ADTS frame, drop the tail");
                break;
            }

            let asc = header.audio_specific_config();
            if self.asc != Some(asc) {
                self.asc = Some(asc);
                let mut body = BytesMut::with_capacity(4);
                body.put_slice(&aac_tag_prefix(true));
                body.put_slice(&asc);
                out.push(MediaPacket::wrap(
                    MediaKind::Audio,
                    dts_ms,
                    0,
                    body.freeze(),
                ));
            }

            let raw = payload.slice(offset + header.header_length..frame_end);
            let mut body = BytesMut::with_capacity(2 + raw.len());
            body.put_slice(&aac_tag_prefix(false));
            body.put_slice(&raw);
            out.push(MediaPacket::wrap(
                MediaKind::Audio,
                dts_ms,
                0,
                body.freeze(),
            ));
            offset = frame_end;
        }
        Ok(())
    }
}

fn skip_pointer(payload: &[u8]) -> Result<&[u8]> {
    if payload.is_empty() {
        return Err(Error::ShortBuffer("PSI pointer field"));
    }
    let pointer = payload[0] as usize;
    if payload.len() < 1 + pointer {
        return Err(Error::ShortBuffer("PSI pointer field"));
    }
    Ok(&payload[1 + pointer..])
}
