use bytes::{Buf, Bytes, BytesMut};

use amf::value::{self, Amf0Object, Amf0Value};

use super::*;
use crate::message::msg_type;

fn header_of(message_type: u8, payload: &Bytes) -> MessageHeader {
    MessageHeader {
        timestamp_delta: 0,
        payload_length: payload.len() as u32,
        message_type,
        stream_id: 0,
        timestamp: 0,
    }
}

fn decode(message_type: u8, payload: Bytes, requests: &mut RequestNames) -> Packet {
    let header = header_of(message_type, &payload);
    decode_packet(&header, &payload, requests).unwrap()
}

#[test]
fn test_connect_round_trip() {
    let mut object = Amf0Object::new();
    object.set("app", Amf0Value::String("live".into()));
    object.set("tcUrl", Amf0Value::String("rtmp://host/live".into()));
    object.set("objectEncoding", Amf0Value::Number(0.0));
    let pkt = ConnectAppPacket::new(object);

    let payload = pkt.encode_payload();
    let mut requests = RequestNames::default();
    match decode(msg_type::AMF0_COMMAND, payload, &mut requests) {
        Packet::ConnectApp(got) => {
            assert_eq!(got.transaction_id, 1.0);
            assert_eq!(got.tc_url().unwrap(), "rtmp://host/live");
            assert!(got.args.is_none());
        }
        other => panic!("unexpected packet {other:?}"),
    }
}

#[test]
fn test_connect_non_object_args_dropped() {
    let mut buf = BytesMut::new();
    value::write_string(&mut buf, COMMAND_CONNECT);
    value::write_number(&mut buf, 1.0);
    let mut object = Amf0Object::new();
    object.set("tcUrl", Amf0Value::String("rtmp://h/app".into()));
    Amf0Value::Object(object).write(&mut buf);
    // A stray literal where the args object belongs.
    value::write_string(&mut buf, "oops");

    let mut requests = RequestNames::default();
    match decode(msg_type::AMF0_COMMAND, buf.freeze(), &mut requests) {
        Packet::ConnectApp(got) => assert!(got.args.is_none()),
        other => panic!("unexpected packet {other:?}"),
    }
}

#[test]
fn test_result_requires_pending_request() {
    let res = CreateStreamResPacket::new(2.0, 1.0);
    let payload = res.encode_payload();

    // Without a recorded request the response is a protocol error.
    let mut requests = RequestNames::default();
    let header = header_of(msg_type::AMF0_COMMAND, &payload);
    assert!(matches!(
        decode_packet(&header, &payload, &mut requests),
        Err(Error::NoRequest(_))
    ));

    // With the transaction recorded it decodes as createStream response.
    requests.record(2.0, COMMAND_CREATE_STREAM);
    match decode_packet(&header, &payload, &mut requests).unwrap() {
        Packet::CreateStreamRes(got) => {
            assert_eq!(got.transaction_id, 2.0);
            assert_eq!(got.stream_id, 1.0);
        }
        other => panic!("unexpected packet {other:?}"),
    }
}

#[test]
fn test_transaction_pairing_selects_packet_class() {
    let mut requests = RequestNames::default();
    requests.record(3.0, COMMAND_RELEASE_STREAM);
    let res = FmleStartResPacket::new(3.0);
    let payload = res.encode_payload();
    match decode(msg_type::AMF0_COMMAND, payload, &mut requests) {
        Packet::FmleStartRes(got) => assert_eq!(got.transaction_id, 3.0),
        other => panic!("unexpected packet {other:?}"),
    }
}

#[test]
fn test_play_defaults() {
    let mut buf = BytesMut::new();
    value::write_string(&mut buf, COMMAND_PLAY);
    value::write_number(&mut buf, 4.0);
    value::write_null(&mut buf);
    value::write_string(&mut buf, "livestream");

    let mut requests = RequestNames::default();
    match decode(msg_type::AMF0_COMMAND, buf.freeze(), &mut requests) {
        Packet::Play(got) => {
            assert_eq!(got.stream_name, "livestream");
            assert_eq!(got.start, -2.0);
            assert_eq!(got.duration, -1.0);
            assert!(got.reset);
        }
        other => panic!("unexpected packet {other:?}"),
    }
}

#[test]
fn test_play_reset_accepts_number() {
    let mut buf = BytesMut::new();
    value::write_string(&mut buf, COMMAND_PLAY);
    value::write_number(&mut buf, 4.0);
    value::write_null(&mut buf);
    value::write_string(&mut buf, "s");
    value::write_number(&mut buf, 0.0);
    value::write_number(&mut buf, -1.0);
    value::write_number(&mut buf, 1.0); // reset as number

    let mut requests = RequestNames::default();
    match decode(msg_type::AMF0_COMMAND, buf.freeze(), &mut requests) {
        Packet::Play(got) => {
            assert_eq!(got.start, 0.0);
            assert!(got.reset);
        }
        other => panic!("unexpected packet {other:?}"),
    }
}

#[test]
fn test_publish_round_trip() {
    let pkt = PublishPacket::new("secret-key");
    let mut requests = RequestNames::default();
    match decode(msg_type::AMF0_COMMAND, pkt.encode_payload(), &mut requests) {
        Packet::Publish(got) => {
            assert_eq!(got.stream_name, "secret-key");
            assert_eq!(got.publish_type, "live");
        }
        other => panic!("unexpected packet {other:?}"),
    }
}

#[test]
fn test_fmle_start_round_trip() {
    for name in [COMMAND_RELEASE_STREAM, COMMAND_FC_PUBLISH, COMMAND_UNPUBLISH] {
        let pkt = FmleStartPacket::new(name, 5.0, "s");
        let mut requests = RequestNames::default();
        match decode(msg_type::AMF0_COMMAND, pkt.encode_payload(), &mut requests) {
            Packet::FmleStart(got) => {
                assert_eq!(got.command_name, name);
                assert_eq!(got.stream_name, "s");
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }
}

#[test]
fn test_unknown_command_decodes_as_call() {
    let mut buf = BytesMut::new();
    value::write_string(&mut buf, "_checkbw");
    value::write_number(&mut buf, 6.0);
    value::write_null(&mut buf);

    let mut requests = RequestNames::default();
    match decode(msg_type::AMF0_COMMAND, buf.freeze(), &mut requests) {
        Packet::Call(got) => {
            assert_eq!(got.command_name, "_checkbw");
            assert_eq!(got.transaction_id, 6.0);
        }
        other => panic!("unexpected packet {other:?}"),
    }
}

#[test]
fn test_ffmpeg_timecode_is_ignored() {
    let payload = Bytes::from_static(&[0x00, 0x01, 0x02, 0x03]);
    let mut requests = RequestNames::default();
    assert_eq!(
        decode(msg_type::AMF0_COMMAND, payload, &mut requests),
        Packet::Ignored
    );
}

#[test]
fn test_amf3_command_skips_format_byte() {
    let inner = CreateStreamPacket::new(2.0);
    let mut buf = BytesMut::new();
    buf.put_u8(0x00); // AMF3 leading byte
    buf.extend_from_slice(&inner.encode_payload());
    let payload = buf.freeze();

    let mut requests = RequestNames::default();
    match decode(msg_type::AMF3_COMMAND, payload, &mut requests) {
        Packet::CreateStream(got) => assert_eq!(got.transaction_id, 2.0),
        other => panic!("unexpected packet {other:?}"),
    }
}

#[test]
fn test_metadata_set_dataframe_unwrap() {
    let mut metadata = Amf0Object::new();
    metadata.set("width", Amf0Value::Number(1920.0));
    let mut buf = BytesMut::new();
    value::write_string(&mut buf, DATA_SET_DATAFRAME);
    value::write_string(&mut buf, DATA_ON_METADATA);
    Amf0Value::EcmaArray(metadata.clone()).write(&mut buf);

    let mut requests = RequestNames::default();
    match decode(msg_type::AMF0_DATA, buf.freeze(), &mut requests) {
        Packet::OnMetaData(got) => {
            assert_eq!(got.metadata.get("width"), Some(&Amf0Value::Number(1920.0)));
        }
        other => panic!("unexpected packet {other:?}"),
    }
}

#[test]
fn test_user_control_set_buffer_length() {
    let pkt = UserControlPacket {
        event_type: event::SET_BUFFER_LENGTH,
        event_data: 1,
        extra_data: 3000,
    };
    let payload = pkt.encode_payload();
    assert_eq!(payload.len(), 10);

    let mut requests = RequestNames::default();
    match decode(msg_type::USER_CONTROL, payload, &mut requests) {
        Packet::UserControl(got) => {
            assert_eq!(got.event_type, event::SET_BUFFER_LENGTH);
            assert_eq!(got.extra_data, 3000);
        }
        other => panic!("unexpected packet {other:?}"),
    }
}

#[test]
fn test_protocol_control_round_trips() {
    let mut requests = RequestNames::default();

    let pkt = SetChunkSizePacket::new(60000);
    match decode(msg_type::SET_CHUNK_SIZE, pkt.encode_payload(), &mut requests) {
        Packet::SetChunkSize(got) => assert_eq!(got.chunk_size, 60000),
        other => panic!("unexpected packet {other:?}"),
    }

    let pkt = SetWindowAckSizePacket::new(2_500_000);
    match decode(msg_type::WINDOW_ACK_SIZE, pkt.encode_payload(), &mut requests) {
        Packet::WindowAckSize(got) => assert_eq!(got.window_size, 2_500_000),
        other => panic!("unexpected packet {other:?}"),
    }

    let pkt = AcknowledgementPacket::new(1234);
    match decode(
        msg_type::ACKNOWLEDGEMENT,
        pkt.encode_payload(),
        &mut requests,
    ) {
        Packet::Acknowledgement(got) => assert_eq!(got.sequence_number, 1234),
        other => panic!("unexpected packet {other:?}"),
    }
}

#[test]
fn test_set_peer_bandwidth_payload() {
    let pkt = SetPeerBandwidthPacket::new(2_500_000, BandwidthLimit::Dynamic);
    let payload = pkt.encode_payload();
    assert_eq!(payload.len(), 5);
    assert_eq!(payload[4], 2);
    let mut buf = payload.clone();
    assert_eq!(buf.get_u32(), 2_500_000);
}

#[test]
fn test_on_status_encode() {
    let pkt = OnStatusPacket::status(
        STATUS_LEVEL_STATUS,
        STATUS_CODE_STREAM_START,
        "Started playing stream.",
    );
    let mut payload = pkt.encode_payload();
    assert_eq!(value::read_string(&mut payload).unwrap(), COMMAND_ON_STATUS);
    assert_eq!(value::read_number(&mut payload).unwrap(), 0.0);
    value::read_null(&mut payload).unwrap();
    let data = Amf0Value::read(&mut payload).unwrap();
    let data = data.as_object().unwrap();
    assert_eq!(
        data.get(STATUS_CODE),
        Some(&Amf0Value::String(STATUS_CODE_STREAM_START.into()))
    );
}
