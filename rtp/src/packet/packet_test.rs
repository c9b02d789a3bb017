use bytes::Bytes;

use super::*;
use crate::extension::TransportCcExtension;
use crate::header::EXTENSION_PROFILE_ONE_BYTE;

#[test]
fn test_packet_round_trip() {
    let packet = Packet {
        header: Header {
            marker: true,
            payload_type: 96,
            sequence_number: 27023,
            timestamp: 3653407706,
            ssrc: 476325762,
            ..Default::default()
        },
        payload: Bytes::from_static(&[0x98, 0x36, 0xBE, 0x89]),
    };
    let mut raw = packet.marshal();
    assert_eq!(raw.len(), packet.marshal_size());
    let decoded = Packet::unmarshal(&mut raw).unwrap();
    assert_eq!(decoded, packet);
}

#[test]
fn test_header_wire_layout() {
    let header = Header {
        marker: true,
        payload_type: 111,
        sequence_number: 0x1234,
        timestamp: 0xAABBCCDD,
        ssrc: 0x11223344,
        ..Default::default()
    };
    let raw = header.marshal();
    assert_eq!(raw.len(), 12);
    assert_eq!(raw[0], 0x80); // v=2, no padding/extension/csrc
    assert_eq!(raw[1], 0x80 | 111);
    assert_eq!(&raw[2..4], &[0x12, 0x34]);
    assert_eq!(&raw[4..8], &[0xAA, 0xBB, 0xCC, 0xDD]);
    assert_eq!(&raw[8..12], &[0x11, 0x22, 0x33, 0x44]);
}

#[test]
fn test_one_byte_extension_round_trip() {
    let mut header = Header {
        payload_type: 96,
        sequence_number: 1,
        ..Default::default()
    };
    let twcc = TransportCcExtension::new(0x0102);
    header.set_extension(3, twcc.marshal()).unwrap();

    let packet = Packet {
        header,
        payload: Bytes::from_static(&[0x01]),
    };
    let mut raw = packet.marshal();
    let decoded = Packet::unmarshal(&mut raw).unwrap();
    assert!(decoded.header.extension);
    assert_eq!(decoded.header.extension_profile, EXTENSION_PROFILE_ONE_BYTE);
    let got = decoded.header.get_extension(3).unwrap();
    assert_eq!(TransportCcExtension::unmarshal(got), Some(twcc));
    assert_eq!(&decoded.payload[..], &[0x01]);
}

#[test]
fn test_extension_id_range() {
    let mut header = Header::default();
    assert!(header.set_extension(0, Bytes::from_static(&[1])).is_err());
    assert!(header.set_extension(15, Bytes::from_static(&[1])).is_err());
    assert!(header
        .set_extension(1, Bytes::from_static(&[0u8; 17][..]))
        .is_err());
    assert!(header.set_extension(14, Bytes::from_static(&[1])).is_ok());
}

#[test]
fn test_short_packet() {
    let mut raw = Bytes::from_static(&[0x80, 0x60, 0x00]);
    assert!(Packet::unmarshal(&mut raw).is_err());
}

#[test]
fn test_csrc_round_trip() {
    let packet = Packet {
        header: Header {
            csrc: vec![0x11111111, 0x22222222],
            ..Default::default()
        },
        payload: Bytes::from_static(&[0xFF]),
    };
    let mut raw = packet.marshal();
    assert_eq!(raw[0] & 0x0F, 2);
    let decoded = Packet::unmarshal(&mut raw).unwrap();
    assert_eq!(decoded.header.csrc, vec![0x11111111, 0x22222222]);
}
