use bytes::Bytes;

use super::avc::*;
use super::{AvcDecoderConfig, AvcPayloader, Payloader};

fn sps() -> Bytes {
    Bytes::from_static(&[0x67, 0x42, 0x00, 0x1E, 0xAB])
}

fn pps() -> Bytes {
    Bytes::from_static(&[0x68, 0xCE, 0x3C, 0x80])
}

fn config() -> AvcDecoderConfig {
    AvcDecoderConfig {
        sps: vec![sps()],
        pps: vec![pps()],
    }
}

fn idr(len: usize) -> Bytes {
    let mut nalu = vec![0x65u8];
    nalu.extend((1..len).map(|i| (i % 251) as u8));
    Bytes::from(nalu)
}

#[test]
fn test_config_change_emits_stap_a() {
    let mut payloader = AvcPayloader::new();
    payloader.set_config(config());

    let frame = idr(100);
    let payloads = payloader.payload(1200, &[frame.clone()]).unwrap();
    assert_eq!(payloads.len(), 2);

    // STAP-A: type 24 with length-prefixed SPS and PPS.
    let stap = &payloads[0];
    assert_eq!(stap[0] & NALU_TYPE_BITMASK, STAPA_NALU_TYPE);
    // NRI from the strictest aggregated NALU (SPS has NRI 3).
    assert_eq!(stap[0] & NALU_REF_IDC_BITMASK, 0x60);
    let sps_len = ((stap[1] as usize) << 8) | stap[2] as usize;
    assert_eq!(&stap[3..3 + sps_len], &sps()[..]);
    let pps_off = 3 + sps_len;
    let pps_len = ((stap[pps_off] as usize) << 8) | stap[pps_off + 1] as usize;
    assert_eq!(&stap[pps_off + 2..pps_off + 2 + pps_len], &pps()[..]);

    // The IDR fits the MTU: single NALU packet, header in place.
    assert_eq!(payloads[1], frame);

    // No further STAP-A until the config changes again.
    let payloads = payloader.payload(1200, &[idr(50)]).unwrap();
    assert_eq!(payloads.len(), 1);

    payloader.set_config(config());
    let payloads = payloader.payload(1200, &[idr(50)]).unwrap();
    assert_eq!(payloads.len(), 1, "same config must not rearm the STAP-A");
}

#[test]
fn test_fua_fragmentation_round_trip() {
    let mut payloader = AvcPayloader::new();
    let mtu = 100;
    let frame = idr(450);
    let payloads = payloader.payload(mtu, &[frame.clone()]).unwrap();
    assert!(payloads.len() > 1);

    for (i, p) in payloads.iter().enumerate() {
        assert!(p.len() <= mtu);
        assert_eq!(p[0] & NALU_TYPE_BITMASK, FUA_NALU_TYPE);
        assert_eq!(p[0] & NALU_REF_IDC_BITMASK, frame[0] & NALU_REF_IDC_BITMASK);
        let fu_header = p[1];
        assert_eq!(fu_header & NALU_TYPE_BITMASK, 0x05);
        if i == 0 {
            assert_ne!(fu_header & FU_START_BITMASK, 0);
            assert_eq!(fu_header & FU_END_BITMASK, 0);
        } else if i == payloads.len() - 1 {
            assert_eq!(fu_header & FU_START_BITMASK, 0);
            assert_ne!(fu_header & FU_END_BITMASK, 0);
        } else {
            assert_eq!(fu_header & FU_START_BITMASK, 0);
            assert_eq!(fu_header & FU_END_BITMASK, 0);
        }
    }

    // Concatenating the fragment payloads rebuilds the NALU body.
    let mut rebuilt = vec![frame[0]];
    for p in &payloads {
        rebuilt.extend_from_slice(&p[FUA_HEADER_SIZE..]);
    }
    assert_eq!(&rebuilt[..], &frame[..]);
}

#[test]
fn test_inband_parameter_sets_are_absorbed() {
    let mut payloader = AvcPayloader::new();
    let payloads = payloader
        .payload(1200, &[sps(), pps(), idr(60)])
        .unwrap();
    // SPS and PPS cache; only the IDR is emitted.
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0][0] & NALU_TYPE_BITMASK, 0x05);
    assert_eq!(payloader.config().sps, vec![sps()]);
    assert_eq!(payloader.config().pps, vec![pps()]);
}

#[test]
fn test_aud_and_filler_dropped() {
    let mut payloader = AvcPayloader::new();
    let aud = Bytes::from_static(&[0x09, 0xF0]);
    let filler = Bytes::from_static(&[0x0C, 0x00, 0x00]);
    let payloads = payloader.payload(1200, &[aud, filler]).unwrap();
    assert!(payloads.is_empty());
}

#[test]
fn test_avcc_parse() {
    // avcC: version, profile, compat, level, lengthSize, 1 SPS, 1 PPS.
    let mut raw = vec![0x01, 0x42, 0x00, 0x1E, 0xFF, 0xE1];
    raw.extend((sps().len() as u16).to_be_bytes());
    raw.extend_from_slice(&sps());
    raw.push(0x01);
    raw.extend((pps().len() as u16).to_be_bytes());
    raw.extend_from_slice(&pps());

    let config = AvcDecoderConfig::parse(&Bytes::from(raw)).unwrap();
    assert_eq!(config.sps, vec![sps()]);
    assert_eq!(config.pps, vec![pps()]);
}

#[test]
fn test_truncated_avcc() {
    let raw = Bytes::from_static(&[0x01, 0x42, 0x00]);
    assert!(AvcDecoderConfig::parse(&raw).is_err());
}
