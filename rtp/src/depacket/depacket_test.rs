use bytes::Bytes;

use super::*;
use crate::payload::{AacHbrPayloader, AvcPayloader, HevcPayloader, Payloader};

fn idr(len: usize) -> Bytes {
    let mut nalu = vec![0x65u8];
    nalu.extend((1..len).map(|i| (i % 251) as u8));
    Bytes::from(nalu)
}

#[test]
fn test_avc_single_nalu_passthrough() {
    let mut depacketizer = AvcDepacketizer::new();
    let nalu = idr(40);
    let got = depacketizer.push(&nalu).unwrap();
    assert_eq!(got, vec![nalu]);
}

#[test]
fn test_avc_stap_a_split() {
    let sps = Bytes::from_static(&[0x67, 0x42, 0x00]);
    let pps = Bytes::from_static(&[0x68, 0xCE]);
    let mut stap = vec![0x78u8]; // STAP-A, NRI 3
    stap.extend((sps.len() as u16).to_be_bytes());
    stap.extend_from_slice(&sps);
    stap.extend((pps.len() as u16).to_be_bytes());
    stap.extend_from_slice(&pps);

    let mut depacketizer = AvcDepacketizer::new();
    let got = depacketizer.push(&Bytes::from(stap)).unwrap();
    assert_eq!(got, vec![sps, pps]);
}

#[test]
fn test_avc_fua_payloader_depacketizer_identity() {
    // Fragment a large IDR and feed the fragments back; the reassembled
    // NALU must match byte for byte.
    let frame = idr(700);
    let mut payloader = AvcPayloader::new();
    let payloads = payloader.payload(100, &[frame.clone()]).unwrap();
    assert!(payloads.len() > 1);

    let mut depacketizer = AvcDepacketizer::new();
    let mut out = Vec::new();
    for p in &payloads {
        out.extend(depacketizer.push(p).unwrap());
    }
    assert_eq!(out, vec![frame]);
}

#[test]
fn test_avc_fua_without_start_dropped() {
    // A middle fragment arriving with no start seen yet yields nothing.
    let fragment = Bytes::from_static(&[0x7C, 0x05, 0xAA, 0xBB]);
    let mut depacketizer = AvcDepacketizer::new();
    assert!(depacketizer.push(&fragment).unwrap().is_empty());
}

#[test]
fn test_avc_stap_a_truncated_length() {
    let stap = Bytes::from_static(&[0x78, 0x00, 0x09, 0x67]);
    let mut depacketizer = AvcDepacketizer::new();
    assert!(depacketizer.push(&stap).is_err());
}

#[test]
fn test_hevc_payloader_depacketizer_identity() {
    let mut nalu = vec![0x26u8, 0x01];
    nalu.extend((2..600).map(|i| (i % 251) as u8));
    let frame = Bytes::from(nalu);

    let mut payloader = HevcPayloader::new();
    let payloads = payloader.payload(128, &[frame.clone()]).unwrap();
    assert!(payloads.len() > 1);

    let mut depacketizer = HevcDepacketizer::new();
    let mut out = Vec::new();
    for p in &payloads {
        out.extend(depacketizer.push(p).unwrap());
    }
    assert_eq!(out, vec![frame]);
}

#[test]
fn test_hevc_aggregation_split() {
    let vps = Bytes::from_static(&[0x40, 0x01, 0x0C]);
    let sps = Bytes::from_static(&[0x42, 0x01, 0x01]);
    let mut ap = vec![0x60u8, 0x01]; // type 48
    for nalu in [&vps, &sps] {
        ap.extend((nalu.len() as u16).to_be_bytes());
        ap.extend_from_slice(nalu);
    }
    let mut depacketizer = HevcDepacketizer::new();
    let got = depacketizer.push(&Bytes::from(ap)).unwrap();
    assert_eq!(got, vec![vps, sps]);
}

#[test]
fn test_aac_payloader_depacketizer_identity() {
    let frame = Bytes::from(vec![0x11u8; 320]);
    let mut payloader = AacHbrPayloader::new();
    let payloads = payloader.payload(1200, &[frame.clone()]).unwrap();
    assert_eq!(payloads.len(), 1);

    let mut depacketizer = AacDepacketizer::new();
    let got = depacketizer.push(&payloads[0]).unwrap();
    assert_eq!(got, vec![frame]);
}

#[test]
fn test_opus_passthrough() {
    let frame = Bytes::from_static(&[0xF8, 0x01, 0x02]);
    let mut depacketizer = OpusDepacketizer::new();
    assert_eq!(depacketizer.push(&frame).unwrap(), vec![frame]);
}
