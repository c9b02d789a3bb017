use bytes::Bytes;
use tokio::io::DuplexStream;

use crate::commands::{BandwidthLimit, Packet};
use crate::message::{msg_type, RtmpMessage};
use crate::request::{Request, RtmpConnType};

use super::*;

const WINDOW: u32 = 2_500_000;
const CHUNK: u32 = 60_000;

/// Drive the server half of a connection up to identify.
async fn serve_until_identify(
    io: DuplexStream,
) -> (ServerSession<DuplexStream>, Request, RtmpConnType, String) {
    let mut session = ServerSession::new(io);
    session.handshake().await.unwrap();
    let mut req = session.connect_app().await.unwrap();

    session.set_window_ack_size(WINDOW).await.unwrap();
    session
        .set_peer_bandwidth(WINDOW, BandwidthLimit::Dynamic)
        .await
        .unwrap();
    session.set_chunk_size(CHUNK).await.unwrap();
    session.response_connect_app(&req, None).await.unwrap();

    let (conn_type, stream_name, _duration) = session.identify_client(1).await.unwrap();
    req.set_stream(&stream_name);
    (session, req, conn_type, stream_name)
}

#[tokio::test]
async fn test_connect_and_fmle_publish() {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);

    let server = tokio::spawn(async move {
        let (mut session, req, conn_type, _stream) = serve_until_identify(server_io).await;
        assert_eq!(conn_type, RtmpConnType::FmlePublish);
        assert_eq!(req.app, "live");
        assert_eq!(req.stream, "s");
        session.start_fmle_publish(1).await.unwrap();
        (session, req)
    });

    let mut client = ClientSession::new(client_io);
    client.handshake().await.unwrap();
    let req = Request::parse_tc_url("rtmp://127.0.0.1/live").unwrap();
    let info = client.connect_app(&req).await.unwrap();
    assert_eq!(info.sig, SIG_SERVER);

    let stream_id = client.fmle_publish("s").await.unwrap();
    assert_eq!(stream_id, 1);

    let (mut session, _req) = server.await.unwrap();

    // Publish a frame and see it arrive unchanged.
    let payload = Bytes::from_static(&[0x17, 0x01, 0, 0, 0, 0xAB, 0xCD]);
    let msg = RtmpMessage::new(msg_type::VIDEO, 80, stream_id, payload.clone());
    client.send_message(msg).await.unwrap();

    let got = session.recv_message().await.unwrap();
    assert_eq!(got.header.message_type, msg_type::VIDEO);
    assert_eq!(got.header.timestamp, 80);
    assert_eq!(got.payload, payload);
}

#[tokio::test]
async fn test_connect_and_play() {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);

    let server = tokio::spawn(async move {
        let (mut session, _req, conn_type, stream) = serve_until_identify(server_io).await;
        assert_eq!(conn_type, RtmpConnType::Play);
        assert_eq!(stream, "movie");
        session.start_play(1).await.unwrap();
        session
    });

    let mut client = ClientSession::new(client_io);
    client.handshake().await.unwrap();
    let req = Request::parse_tc_url("rtmp://127.0.0.1/vod").unwrap();
    client.connect_app(&req).await.unwrap();
    let stream_id = client.create_stream().await.unwrap();
    assert_eq!(stream_id, 1);
    client.play("movie", stream_id, 0).await.unwrap();

    let mut session = server.await.unwrap();

    // The play start sequence arrived: StreamBegin, two onStatus, then
    // sample access. Collect codes from the client's perspective.
    let mut saw_stream_begin = false;
    let mut status_codes = Vec::new();
    for _ in 0..4 {
        let msg = client.recv_message().await.unwrap();
        match client.decode_packet(&msg).unwrap() {
            Packet::UserControl(pkt) => {
                assert_eq!(pkt.event_type, crate::commands::event::STREAM_BEGIN);
                saw_stream_begin = true;
            }
            Packet::Call(pkt) => {
                if let Some(amf::Amf0Value::Object(data)) =
                    pkt.arguments
                {
                    if let Some(amf::Amf0Value::String(code)) =
                        data.get(crate::commands::STATUS_CODE)
                    {
                        status_codes.push(code.clone());
                    }
                }
            }
            Packet::Ignored => {}
            other => panic!("unexpected packet {other:?}"),
        }
    }
    assert!(saw_stream_begin);
    assert_eq!(
        status_codes,
        vec![
            crate::commands::STATUS_CODE_STREAM_RESET.to_owned(),
            crate::commands::STATUS_CODE_STREAM_START.to_owned(),
        ]
    );

    // Server relays a frame to the player.
    let payload = Bytes::from_static(&[0xAF, 0x01, 0x11, 0x22]);
    let msg = RtmpMessage::new(msg_type::AUDIO, 40, stream_id, payload.clone());
    session.send_message(msg).await.unwrap();
    let got = client.recv_message().await.unwrap();
    assert_eq!(got.payload, payload);
}

#[tokio::test]
async fn test_flash_publish_inside_create_stream() {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);

    let server = tokio::spawn(async move {
        let (_session, _req, conn_type, stream) = serve_until_identify(server_io).await;
        (conn_type, stream)
    });

    let mut client = ClientSession::new(client_io);
    client.handshake().await.unwrap();
    let req = Request::parse_tc_url("rtmp://127.0.0.1/live").unwrap();
    client.connect_app(&req).await.unwrap();
    let stream_id = client.create_stream().await.unwrap();
    client.publish("cam0", stream_id, 0).await.unwrap();

    let (conn_type, stream) = server.await.unwrap();
    assert_eq!(conn_type, RtmpConnType::FlashPublish);
    assert_eq!(stream, "cam0");
}

#[tokio::test]
async fn test_checkbw_probe_is_answered_during_identify() {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);

    let server = tokio::spawn(async move {
        let (_session, _req, conn_type, stream) = serve_until_identify(server_io).await;
        (conn_type, stream)
    });

    let mut client = ClientSession::new(client_io);
    client.handshake().await.unwrap();
    let req = Request::parse_tc_url("rtmp://127.0.0.1/live").unwrap();
    client.connect_app(&req).await.unwrap();

    // A Haivision-style probe before identification.
    let probe = crate::commands::CallPacket {
        command_name: "_checkbw".to_owned(),
        transaction_id: 7.0,
        command_object: amf::Amf0Value::Null,
        arguments: None,
    };
    client.send_packet(&probe, 0).await.unwrap();

    // Then a regular play; the server must have answered the probe and
    // still identified correctly.
    let stream_id = client.create_stream().await.unwrap();
    client.play("movie", stream_id, 0).await.unwrap();

    let (conn_type, stream) = server.await.unwrap();
    assert_eq!(conn_type, RtmpConnType::Play);
    assert_eq!(stream, "movie");
}
