use bytes::{BufMut, Bytes, BytesMut};

use flv::codec::AvcDecoderConfig;
use flv::packet::{MediaKind, MediaPacket};

use super::*;
use crate::demux::TsDemuxer;
use crate::ts::TS_PACKET_SIZE;

fn sps() -> Bytes {
    Bytes::from_static(&[0x67, 0x64, 0x00, 0x28, 0xAC, 0xB2])
}

fn pps() -> Bytes {
    Bytes::from_static(&[0x68, 0xEE, 0x3C, 0xB0])
}

fn avc_sequence_header() -> MediaPacket {
    let config = AvcDecoderConfig {
        sps: vec![sps()],
        pps: vec![pps()],
    };
    let mut body = BytesMut::new();
    body.put_slice(&[0x17, 0x00, 0x00, 0x00, 0x00]);
    body.put_slice(&config.write());
    MediaPacket::wrap(MediaKind::Video, 0, 1, body.freeze())
}

fn avc_keyframe(ts: i64, idr_len: usize) -> MediaPacket {
    let mut idr = vec![0x65u8];
    idr.extend((1..idr_len).map(|i| (i % 251) as u8));
    let mut body = BytesMut::new();
    body.put_slice(&[0x17, 0x01, 0x00, 0x00, 0x00]);
    body.put_u32(idr.len() as u32);
    body.put_slice(&idr);
    MediaPacket::wrap(MediaKind::Video, ts, 1, body.freeze())
}

fn aac_sequence_header() -> MediaPacket {
    MediaPacket::wrap(
        MediaKind::Audio,
        0,
        1,
        Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]),
    )
}

fn aac_frame(ts: i64) -> MediaPacket {
    MediaPacket::wrap(
        MediaKind::Audio,
        ts,
        1,
        Bytes::from_static(&[0xAF, 0x01, 0xAA, 0xBB, 0xCC, 0xDD]),
    )
}

fn demux_segment(segment: &Bytes) -> Vec<MediaPacket> {
    assert_eq!(segment.len() % TS_PACKET_SIZE, 0, "whole packets only");
    let mut demuxer = TsDemuxer::new();
    let mut out = Vec::new();
    for chunk in segment.chunks(TS_PACKET_SIZE) {
        out.extend(demuxer.push(chunk).unwrap());
    }
    out.extend(demuxer.flush().unwrap());
    out
}

#[test]
fn test_segment_starts_with_pat_pmt() {
    let mut muxer = TsMuxer::new();
    muxer.write_frame(&avc_sequence_header()).unwrap();
    muxer.write_frame(&avc_keyframe(0, 64)).unwrap();
    let segment = muxer.take_segment();

    assert!(segment.len() >= 3 * TS_PACKET_SIZE);
    // PAT on PID 0 with PUSI.
    assert_eq!(segment[0], 0x47);
    assert_eq!(segment[1] & 0x40, 0x40);
    assert_eq!(((segment[1] as u16 & 0x1F) << 8) | segment[2] as u16, 0);
    // PMT next.
    let pmt_pid = ((segment[TS_PACKET_SIZE + 1] as u16 & 0x1F) << 8)
        | segment[TS_PACKET_SIZE + 2] as u16;
    assert_eq!(pmt_pid, crate::ts::PID_PMT);
}

#[test]
fn test_video_round_trip_through_demuxer() {
    let mut muxer = TsMuxer::new();
    muxer.write_frame(&avc_sequence_header()).unwrap();
    muxer.write_frame(&avc_keyframe(40, 800)).unwrap();
    let segment = muxer.take_segment();

    let frames = demux_segment(&segment);
    // The demuxer re-synthesizes the sequence header, then the frame.
    assert_eq!(frames.len(), 2);
    assert!(frames[0].is_sequence_header());
    let config = AvcDecoderConfig::parse(&frames[0].payload.slice(5..)).unwrap();
    assert_eq!(config.sps, vec![sps()]);
    assert_eq!(config.pps, vec![pps()]);

    let frame = &frames[1];
    assert!(frame.is_video());
    assert!(frame.is_keyframe());
    assert_eq!(frame.timestamp, 40);
    // The IDR NALU survives byte-exact, length-prefixed.
    let nalus = flv::annexb::split_length_prefixed(&frame.payload.slice(5..)).unwrap();
    assert_eq!(nalus.len(), 1);
    assert_eq!(nalus[0][0] & 0x1F, 5);
    assert_eq!(nalus[0].len(), 800);
}

#[test]
fn test_audio_round_trip_through_demuxer() {
    let mut muxer = TsMuxer::new();
    muxer.write_frame(&aac_sequence_header()).unwrap();
    muxer.write_frame(&aac_frame(23)).unwrap();
    muxer.write_frame(&aac_frame(46)).unwrap();
    let segment = muxer.take_segment();

    let frames = demux_segment(&segment);
    assert_eq!(frames.len(), 3);
    assert!(frames[0].is_sequence_header());
    assert_eq!(&frames[0].payload[..], &[0xAF, 0x00, 0x12, 0x10]);
    assert_eq!(&frames[1].payload[..], &[0xAF, 0x01, 0xAA, 0xBB, 0xCC, 0xDD]);
    assert_eq!(frames[1].timestamp, 23);
    assert_eq!(frames[2].timestamp, 46);
}

#[test]
fn test_aac_frame_without_config_dropped() {
    let mut muxer = TsMuxer::new();
    muxer.write_frame(&aac_frame(0)).unwrap();
    assert_eq!(muxer.segment_len(), 0);
}

#[test]
fn test_segment_reset_rewrites_psi() {
    let mut muxer = TsMuxer::new();
    muxer.write_frame(&avc_sequence_header()).unwrap();
    muxer.write_frame(&avc_keyframe(0, 64)).unwrap();
    let first = muxer.take_segment();
    assert!(!first.is_empty());

    muxer.write_frame(&avc_keyframe(40, 64)).unwrap();
    let second = muxer.take_segment();
    // The new segment leads with PAT again.
    assert_eq!(((second[1] as u16 & 0x1F) << 8) | second[2] as u16, 0);
}

#[test]
fn test_encrypted_segment() {
    let mut muxer = TsMuxer::new();
    muxer.write_frame(&aac_sequence_header()).unwrap();
    muxer.write_frame(&aac_frame(0)).unwrap();

    let key = [0x11u8; 16];
    let iv = [0x22u8; 16];
    let encrypted = muxer.take_segment_encrypted(&key, &iv);

    // PKCS#7 pads to a whole AES block and the sync byte is gone.
    assert_eq!(encrypted.len() % 16, 0);
    assert_ne!(encrypted[0], 0x47);

    // Decrypting restores a parseable segment.
    type Dec = cbc::Decryptor<aes::Aes128>;
    use aes::cipher::BlockDecryptMut;
    let plain = Dec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<aes::cipher::block_padding::Pkcs7>(&encrypted)
        .unwrap();
    assert_eq!(plain[0], 0x47);
    assert_eq!(plain.len() % TS_PACKET_SIZE, 0);
}
