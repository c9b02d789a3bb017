use bytes::Bytes;

use crate::packet::*;

fn video(payload: &'static [u8]) -> MediaPacket {
    MediaPacket::wrap(MediaKind::Video, 0, 1, Bytes::from_static(payload))
}

fn audio(payload: &'static [u8]) -> MediaPacket {
    MediaPacket::wrap(MediaKind::Audio, 0, 1, Bytes::from_static(payload))
}

#[test]
fn test_copy_shares_payload() {
    let raw = Bytes::from(vec![0x17, 0x01, 0, 0, 0, 0xAA]);
    let ptr = raw.as_ptr();
    let packet = MediaPacket::wrap(MediaKind::Video, 40, 1, raw);
    let copy = packet.clone();
    assert_eq!(copy.payload.as_ptr(), ptr, "clone must not copy payload bytes");
    assert_eq!(copy, packet);
}

#[test]
fn test_avc_sequence_header() {
    // frame_type=1 (key), codec=7 (AVC), packet_type=0.
    assert!(video(&[0x17, 0x00, 0, 0, 0]).is_sequence_header());
    // packet_type=1 is a NALU frame.
    assert!(!video(&[0x17, 0x01, 0, 0, 0]).is_sequence_header());
    // codec=2 (H.263) never has a sequence header.
    assert!(!video(&[0x12, 0x00]).is_sequence_header());
}

#[test]
fn test_hevc_sequence_header() {
    assert!(video(&[0x1C, 0x00, 0, 0, 0]).is_sequence_header());
    assert!(!video(&[0x1C, 0x01, 0, 0, 0]).is_sequence_header());
}

#[test]
fn test_enhanced_rtmp_sequence_header() {
    // Ex-header, frame_type=1, packet_type=SequenceStart, fourCC hvc1.
    assert!(video(&[0x90, b'h', b'v', b'c', b'1']).is_sequence_header());
    // CodedFramesX is not a sequence header.
    assert!(!video(&[0x93, b'h', b'v', b'c', b'1']).is_sequence_header());
    assert_eq!(
        video(&[0x93, b'h', b'v', b'c', b'1']).video_codec(),
        Some(VideoCodecId::Hevc)
    );
}

#[test]
fn test_aac_sequence_header() {
    assert!(audio(&[0xAF, 0x00, 0x12, 0x10]).is_sequence_header());
    assert!(!audio(&[0xAF, 0x01, 0xAA]).is_sequence_header());
    // MP3 has no sequence header concept.
    assert!(!audio(&[0x2F, 0x00]).is_sequence_header());
}

#[test]
fn test_keyframe_detection() {
    assert!(video(&[0x17, 0x01, 0, 0, 0]).is_keyframe());
    assert!(!video(&[0x27, 0x01, 0, 0, 0]).is_keyframe());
    // Ex-header keyframe: 0x80 | (1 << 4) | packet_type.
    assert!(video(&[0x91, b'h', b'v', b'c', b'1']).is_keyframe());
}

#[test]
fn test_codecs() {
    assert_eq!(video(&[0x17, 0x01]).video_codec(), Some(VideoCodecId::Avc));
    assert_eq!(video(&[0x1C, 0x01]).video_codec(), Some(VideoCodecId::Hevc));
    assert_eq!(audio(&[0xAF, 0x01]).audio_codec(), Some(AudioCodecId::Aac));
    assert_eq!(audio(&[0xDF, 0x01]).audio_codec(), Some(AudioCodecId::Opus));
}

#[test]
fn test_short_payloads_never_classify() {
    assert!(!video(&[]).is_sequence_header());
    assert!(!video(&[0x17]).is_sequence_header());
    assert!(!audio(&[0xAF]).is_sequence_header());
}
