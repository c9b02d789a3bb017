use bytes::{BufMut, Bytes, BytesMut};

use super::*;
use crate::message::{msg_type, RtmpMessage};

fn decode_all(decoder: &mut ChunkDecoder, batches: &[WriteBatch]) -> Vec<RtmpMessage> {
    let mut wire = BytesMut::new();
    for batch in batches {
        for slice in batch {
            wire.extend_from_slice(slice);
        }
    }
    let mut out = Vec::new();
    while let Some(msg) = decoder.poll_message(&mut wire).unwrap() {
        out.push(msg);
    }
    assert!(wire.is_empty(), "decoder must consume the full encoding");
    out
}

fn round_trip(msgs: &[RtmpMessage], out_chunk: u32, in_chunk: u32) -> Vec<RtmpMessage> {
    let mut encoder = ChunkEncoder::new();
    encoder.set_out_chunk_size(out_chunk);
    let mut decoder = ChunkDecoder::new();
    decoder.set_in_chunk_size(in_chunk);
    decode_all(&mut decoder, &encoder.encode(msgs))
}

fn media_msg(message_type: u8, timestamp: u32, payload_len: usize) -> RtmpMessage {
    let payload: Vec<u8> = (0..payload_len).map(|i| (i % 251) as u8).collect();
    RtmpMessage::new(message_type, timestamp, 1, Bytes::from(payload))
}

#[test]
fn test_single_chunk_round_trip() {
    let msg = media_msg(msg_type::VIDEO, 40, 100);
    let got = round_trip(std::slice::from_ref(&msg), 128, 128);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].payload, msg.payload);
    assert_eq!(got[0].header.timestamp, 40);
    assert_eq!(got[0].header.message_type, msg_type::VIDEO);
    assert_eq!(got[0].header.stream_id, 1);
}

#[test]
fn test_chunk_size_exactly_payload_length() {
    // A single chunk: one fmt=0 header then the whole payload.
    let msg = media_msg(msg_type::AUDIO, 7, 128);
    let encoder = ChunkEncoder::new();
    let batches = encoder.encode(std::slice::from_ref(&msg));
    let total: usize = batches.iter().map(|b| b.len()).sum();
    assert_eq!(total, 2, "header slice + payload slice");
}

#[test]
fn test_message_split_across_chunk_boundaries() {
    // 300 bytes at chunk size 128: fmt=0 + 128, fmt=3 + 128, fmt=3 + 44.
    let msg = media_msg(msg_type::AMF0_DATA, 12345, 300);
    let encoder = ChunkEncoder::new();
    let batches = encoder.encode(std::slice::from_ref(&msg));
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.len(), 6);
    assert_eq!(batch[0][0] >> 6, 0, "first chunk fmt=0");
    assert_eq!(batch[1].len(), 128);
    assert_eq!(batch[2][0] >> 6, 3, "continuation fmt=3");
    assert_eq!(batch[3].len(), 128);
    assert_eq!(batch[4][0] >> 6, 3);
    assert_eq!(batch[5].len(), 44);

    let mut decoder = ChunkDecoder::new();
    let got = decode_all(&mut decoder, &batches);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].payload.len(), 300);
    assert_eq!(got[0].header.timestamp, 12345);
    assert_eq!(got[0].payload, msg.payload);
}

#[test]
fn test_round_trip_across_chunk_sizes() {
    for chunk_size in [128u32, 129, 300, 4096, 60000] {
        let msgs = vec![
            media_msg(msg_type::VIDEO, 0, 1),
            media_msg(msg_type::VIDEO, 40, 4096),
            media_msg(msg_type::AUDIO, 23, 300),
            media_msg(msg_type::VIDEO, 80, 60001),
        ];
        let got = round_trip(&msgs, chunk_size, chunk_size);
        assert_eq!(got.len(), msgs.len(), "chunk_size={chunk_size}");
        for (g, m) in got.iter().zip(&msgs) {
            assert_eq!(g.payload, m.payload, "chunk_size={chunk_size}");
            assert_eq!(g.header.timestamp, m.header.timestamp);
        }
    }
}

#[test]
fn test_extended_timestamp_round_trip() {
    // 0x01000000 needs the 4-byte field; the 24-bit field pins 0xFFFFFF.
    let msg = media_msg(msg_type::VIDEO, 0x0100_0000, 200);
    let encoder = ChunkEncoder::new();
    let batches = encoder.encode(std::slice::from_ref(&msg));
    let header = &batches[0][0];
    assert_eq!(&header[1..4], &[0xFF, 0xFF, 0xFF]);
    assert_eq!(&header[12..16], &[0x01, 0x00, 0x00, 0x00]);

    let mut decoder = ChunkDecoder::new();
    let got = decode_all(&mut decoder, &batches);
    assert_eq!(got[0].header.timestamp, 0x0100_0000);
    assert_eq!(got[0].payload, msg.payload);
}

#[test]
fn test_extended_timestamp_threshold() {
    // 0x00FFFFFE stays in the 24-bit field.
    let msg = media_msg(msg_type::VIDEO, 0x00FF_FFFE, 10);
    let encoder = ChunkEncoder::new();
    let batches = encoder.encode(std::slice::from_ref(&msg));
    let header = &batches[0][0];
    assert_eq!(header.len(), 12, "no extended timestamp field");
    assert_eq!(&header[1..4], &[0xFF, 0xFF, 0xFE]);

    // 0x00FFFFFF itself must use the extended field.
    let msg = media_msg(msg_type::VIDEO, 0x00FF_FFFF, 10);
    let batches = encoder.encode(std::slice::from_ref(&msg));
    assert_eq!(batches[0][0].len(), 16);

    let mut decoder = ChunkDecoder::new();
    let got = decode_all(&mut decoder, &batches);
    assert_eq!(got[0].header.timestamp, 0x00FF_FFFF);
}

#[test]
fn test_timestamp_is_31_bit() {
    let msg = media_msg(msg_type::VIDEO, 0xFFFF_FFFF, 10);
    let got = round_trip(std::slice::from_ref(&msg), 128, 128);
    assert_eq!(got[0].header.timestamp, 0x7FFF_FFFF);
}

#[test]
fn test_fmt3_reuses_timestamp_delta() {
    // Hand-built wire: fmt=0 then a bare fmt=3 starting a new message on
    // the same cid, which inherits the previous delta as per FMLE.
    let mut wire = BytesMut::new();
    wire.put_u8(0x04); // fmt=0 cid=4
    wire.put_slice(&[0x00, 0x00, 0x1A]); // timestamp=26
    wire.put_slice(&[0x00, 0x00, 0x02]); // length=2
    wire.put_u8(msg_type::AUDIO);
    wire.put_u32_le(1);
    wire.put_slice(&[0xAA, 0xBB]);
    wire.put_u8(0xC4); // fmt=3 cid=4, fresh message
    wire.put_slice(&[0xCC, 0xDD]);

    let mut decoder = ChunkDecoder::new();
    let first = decoder.poll_message(&mut wire).unwrap().unwrap();
    assert_eq!(first.header.timestamp, 26);
    let second = decoder.poll_message(&mut wire).unwrap().unwrap();
    assert_eq!(second.header.timestamp, 52, "fmt=3 accumulates the delta");
    assert_eq!(&second.payload[..], &[0xCC, 0xDD]);
}

#[test]
fn test_fresh_stream_fmt2_is_error() {
    let mut wire = BytesMut::new();
    wire.put_u8(0x84); // fmt=2 cid=4 on a fresh stream
    wire.put_slice(&[0x00, 0x00, 0x1A]);
    let mut decoder = ChunkDecoder::new();
    assert!(matches!(
        decoder.poll_message(&mut wire),
        Err(Error::ChunkStart { fmt: 2, cid: 4 })
    ));
}

#[test]
fn test_fresh_stream_fmt1_warns_and_continues() {
    // librtmp sends a fresh stream with fmt=1.
    let mut wire = BytesMut::new();
    wire.put_u8(0x42); // fmt=1 cid=2
    wire.put_slice(&[0x00, 0x00, 0x00]); // delta=0
    wire.put_slice(&[0x00, 0x00, 0x06]); // length=6
    wire.put_u8(msg_type::USER_CONTROL);
    wire.put_slice(&[0x00, 0x06, 0x00, 0x00, 0x0D, 0x0F]);

    let mut decoder = ChunkDecoder::new();
    let msg = decoder.poll_message(&mut wire).unwrap().unwrap();
    assert_eq!(msg.header.message_type, msg_type::USER_CONTROL);
    assert_eq!(msg.payload.len(), 6);
}

#[test]
fn test_fmt0_on_partial_message_is_error() {
    let mut wire = BytesMut::new();
    // length=200 but only 128 bytes arrive in the first chunk.
    wire.put_u8(0x04);
    wire.put_slice(&[0x00, 0x00, 0x00]);
    wire.put_slice(&[0x00, 0x00, 200]);
    wire.put_u8(msg_type::VIDEO);
    wire.put_u32_le(1);
    wire.put_slice(&vec![0u8; 128]);
    // Then a fmt=0 restart on the same cid.
    wire.put_u8(0x04);
    wire.put_slice(&[0x00, 0x00, 0x00]);
    wire.put_slice(&[0x00, 0x00, 200]);
    wire.put_u8(msg_type::VIDEO);
    wire.put_u32_le(1);

    let mut decoder = ChunkDecoder::new();
    assert!(matches!(
        decoder.poll_message(&mut wire),
        Err(Error::ChunkRestart(4))
    ));
}

#[test]
fn test_payload_length_change_mid_message_is_error() {
    let mut wire = BytesMut::new();
    wire.put_u8(0x04);
    wire.put_slice(&[0x00, 0x00, 0x00]);
    wire.put_slice(&[0x00, 0x00, 200]);
    wire.put_u8(msg_type::VIDEO);
    wire.put_u32_le(1);
    wire.put_slice(&vec![0u8; 128]);
    // fmt=1 continuation announcing a different length.
    wire.put_u8(0x44);
    wire.put_slice(&[0x00, 0x00, 0x00]);
    wire.put_slice(&[0x00, 0x00, 150]);
    wire.put_u8(msg_type::VIDEO);

    let mut decoder = ChunkDecoder::new();
    assert!(matches!(
        decoder.poll_message(&mut wire),
        Err(Error::PayloadLengthChanged {
            cached: 200,
            got: 150
        })
    ));
}

#[test]
fn test_basic_header_cid_ranges() {
    // cid 2..63: 1 byte. 64..319: 2 bytes. 320..65599: 3 bytes.
    let mut buf = BytesMut::new();
    write_chunk_header(&mut buf, &MessageHeader::default(), 5, false);
    assert_eq!(&buf[..], &[0xC5]);

    let mut buf = BytesMut::new();
    write_chunk_header(&mut buf, &MessageHeader::default(), 64, false);
    assert_eq!(&buf[..], &[0xC0, 0x00]);

    let mut buf = BytesMut::new();
    write_chunk_header(&mut buf, &MessageHeader::default(), 319, false);
    assert_eq!(&buf[..], &[0xC0, 0xFF]);

    let mut buf = BytesMut::new();
    write_chunk_header(&mut buf, &MessageHeader::default(), 320, false);
    assert_eq!(&buf[..], &[0xC1, 0x00, 0x01]);

    let mut buf = BytesMut::new();
    write_chunk_header(&mut buf, &MessageHeader::default(), 65599, false);
    assert_eq!(&buf[..], &[0xC1, 0xFF, 0xFF]);
}

#[test]
fn test_decode_2_and_3_byte_basic_headers() {
    for cid in [64u32, 319, 320, 65599] {
        let mut wire = BytesMut::new();
        write_basic_header(&mut wire, 0, cid);
        wire.put_slice(&[0x00, 0x00, 0x05]); // ts
        wire.put_slice(&[0x00, 0x00, 0x01]); // len
        wire.put_u8(msg_type::AUDIO);
        wire.put_u32_le(1);
        wire.put_u8(0x99);

        let mut decoder = ChunkDecoder::new();
        let msg = decoder.poll_message(&mut wire).unwrap().unwrap();
        assert_eq!(&msg.payload[..], &[0x99], "cid={cid}");
    }
}

#[test]
fn test_interleaved_chunk_streams() {
    // Two messages interleaved chunk by chunk on different cids.
    let a = media_msg(msg_type::VIDEO, 100, 256);
    let b = media_msg(msg_type::AUDIO, 101, 256);
    let encoder = ChunkEncoder::new();
    let ba = encoder.encode(std::slice::from_ref(&a));
    let bb = encoder.encode(std::slice::from_ref(&b));
    // Each encodes as header,payload,header,payload.
    let mut wire = BytesMut::new();
    for i in (0..4).step_by(2) {
        wire.extend_from_slice(&ba[0][i]);
        wire.extend_from_slice(&ba[0][i + 1]);
        wire.extend_from_slice(&bb[0][i]);
        wire.extend_from_slice(&bb[0][i + 1]);
    }

    let mut decoder = ChunkDecoder::new();
    let mut got = Vec::new();
    while let Some(msg) = decoder.poll_message(&mut wire).unwrap() {
        got.push(msg);
    }
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].payload, a.payload);
    assert_eq!(got[1].payload, b.payload);
}

#[test]
fn test_partial_input_never_consumes() {
    let msg = media_msg(msg_type::VIDEO, 42, 500);
    let encoder = ChunkEncoder::new();
    let batches = encoder.encode(std::slice::from_ref(&msg));
    let mut wire = Vec::new();
    for batch in &batches {
        for s in batch {
            wire.extend_from_slice(s);
        }
    }

    // Feed the wire one byte at a time; exactly one message must emerge.
    let mut decoder = ChunkDecoder::new();
    let mut buf = BytesMut::new();
    let mut got = Vec::new();
    for b in wire {
        buf.put_u8(b);
        while let Some(msg) = decoder.poll_message(&mut buf).unwrap() {
            got.push(msg);
        }
    }
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].payload, msg.payload);
    assert_eq!(got[0].header.timestamp, 42);
}

#[test]
fn test_librtmp_extended_timestamp_rewind() {
    // A message above the extended-timestamp threshold split in two
    // chunks, where the peer omits the extended timestamp on the fmt=3
    // continuation (librtmp). The first 4 payload bytes of the second
    // chunk must not be eaten as a timestamp.
    let payload: Vec<u8> = (0..200).map(|i| i as u8).collect();
    let mut wire = BytesMut::new();
    wire.put_u8(0x04); // fmt=0 cid=4
    wire.put_slice(&[0xFF, 0xFF, 0xFF]);
    wire.put_slice(&[0x00, 0x00, 200]);
    wire.put_u8(msg_type::VIDEO);
    wire.put_u32_le(1);
    wire.put_u32(0x0100_0000); // extended timestamp
    wire.put_slice(&payload[..128]);
    wire.put_u8(0xC4); // fmt=3, NO extended timestamp follows
    wire.put_slice(&payload[128..]);

    let mut decoder = ChunkDecoder::new();
    let msg = decoder.poll_message(&mut wire).unwrap().unwrap();
    assert_eq!(msg.header.timestamp, 0x0100_0000);
    assert_eq!(&msg.payload[..], &payload[..]);
}

#[test]
fn test_header_cache_flushes_into_multiple_batches() {
    // Enough tiny messages to exhaust the header staging area at least
    // once; every batch stays under the budget.
    let msgs: Vec<RtmpMessage> = (0..2000)
        .map(|i| media_msg(msg_type::AUDIO, i, 8))
        .collect();
    let encoder = ChunkEncoder::new();
    let batches = encoder.encode(&msgs);
    assert!(batches.len() > 1, "expected a cache flush");

    let mut decoder = ChunkDecoder::new();
    let got = decode_all(&mut decoder, &batches);
    assert_eq!(got.len(), msgs.len());
}
