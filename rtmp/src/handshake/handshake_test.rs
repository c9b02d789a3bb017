use std::net::Ipv4Addr;

use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::digest::*;
use super::*;
use crate::error::Error;

fn signed_c1(schema: Schema) -> Vec<u8> {
    let mut c1 = vec![0u8; C1S1_SIZE];
    rand::thread_rng().fill_bytes(&mut c1);
    sign_c1(&mut c1, schema);
    c1
}

#[test]
fn test_c1_digest_round_trip() {
    for schema in [Schema::Schema0, Schema::Schema1] {
        let c1 = signed_c1(schema);
        let (got_schema, _digest) = validate_c1(&c1).unwrap();
        assert_eq!(got_schema, schema);
    }
}

#[test]
fn test_random_c1_fails_validation() {
    let mut c1 = vec![0u8; C1S1_SIZE];
    rand::thread_rng().fill_bytes(&mut c1);
    // A random C1 with no digest: the simple-handshake sentinel.
    assert!(matches!(validate_c1(&c1), Err(Error::DigestMismatch)));
}

#[test]
fn test_tampered_digest_fails() {
    let mut c1 = signed_c1(Schema::Schema1);
    let pos = digest_position(&c1, Schema::Schema1);
    c1[pos] ^= 0xFF;
    assert!(validate_c1(&c1).is_err());
}

#[test]
fn test_digest_position_in_bounds() {
    // The 4 offset bytes select positions that must keep the 32-byte
    // digest inside the block for any offset value.
    for fill in [0x00u8, 0x7F, 0xFF] {
        let c1 = vec![fill; C1S1_SIZE];
        for schema in [Schema::Schema0, Schema::Schema1] {
            let pos = digest_position(&c1, schema);
            let block = match schema {
                Schema::Schema0 => 8 + BLOCK_SIZE,
                Schema::Schema1 => 8,
            };
            assert!(pos >= block + 4);
            assert!(pos + DIGEST_SIZE <= block + BLOCK_SIZE);
        }
    }
}

#[test]
fn test_s2_signature() {
    let c1 = signed_c1(Schema::Schema1);
    let (_, c1_digest) = validate_c1(&c1).unwrap();

    let mut s2 = vec![0u8; C1S1_SIZE];
    rand::thread_rng().fill_bytes(&mut s2);
    sign_s2(&mut s2, &c1_digest);

    let temp_key = hmac_sha256(&FMS_KEY, &c1_digest);
    let expect = hmac_sha256(&temp_key, &s2[..C1S1_SIZE - DIGEST_SIZE]);
    assert_eq!(&s2[C1S1_SIZE - DIGEST_SIZE..], &expect);
}

#[tokio::test]
async fn test_simple_handshake_end_to_end() {
    let (mut client, mut server) = tokio::io::duplex(8192);

    let server_task = tokio::spawn(async move {
        let mut hs = HandshakeBytes::new();
        server_handshake(&mut hs, &mut server).await.unwrap();
        hs
    });

    let mut hs = HandshakeBytes::new();
    SimpleHandshake
        .handshake_with_server(&mut hs, &mut client)
        .await
        .unwrap();

    let server_hs = server_task.await.unwrap();
    // S2 echoes C1 on the simple path.
    let c1 = &hs.c0c1.as_ref().unwrap()[1..];
    let s2 = &hs.s0s1s2.as_ref().unwrap()[1 + C1S1_SIZE..];
    assert_eq!(c1, s2);
    assert!(server_hs.proxy_real_ip.is_none());
}

#[tokio::test]
async fn test_complex_handshake_end_to_end() {
    let (mut client, mut server) = tokio::io::duplex(8192);

    let server_task = tokio::spawn(async move {
        let mut hs = HandshakeBytes::new();
        server_handshake(&mut hs, &mut server).await.unwrap();
    });

    let mut hs = HandshakeBytes::new();
    client_handshake(&mut hs, &mut client).await.unwrap();
    server_task.await.unwrap();

    // The server signed S1: the client can verify it.
    let s1 = &hs.s0s1s2.as_ref().unwrap()[1..1 + C1S1_SIZE];
    let verified = [Schema::Schema1, Schema::Schema0].iter().any(|&schema| {
        let pos = digest_position(s1, schema);
        compute_digest(s1, schema, &FMS_KEY[..36])[..] == s1[pos..pos + DIGEST_SIZE]
    });
    assert!(verified, "server S1 must carry a valid digest");
}

#[tokio::test]
async fn test_proxy_preamble() {
    let (mut client, mut server) = tokio::io::duplex(8192);

    // Preamble: 0xF3, length 4, the 4-byte client IP, then plain C0C1.
    let mut wire = vec![0xF3, 0x00, 0x04, 192, 168, 1, 77];
    let mut hs_client = HandshakeBytes::new();
    hs_client.create_c0c1();
    wire.extend_from_slice(hs_client.c0c1.as_ref().unwrap());
    tokio::spawn(async move {
        client.write_all(&wire).await.unwrap();
        // Swallow S0S1S2 and answer C2 so the server completes.
        let mut s0s1s2 = vec![0u8; S0S1S2_SIZE];
        client.read_exact(&mut s0s1s2).await.unwrap();
        client.write_all(&s0s1s2[1..1 + C1S1_SIZE]).await.unwrap();
    });

    let mut hs = HandshakeBytes::new();
    server_handshake(&mut hs, &mut server).await.unwrap();
    assert_eq!(hs.proxy_real_ip, Some(Ipv4Addr::new(192, 168, 1, 77)));
}

#[tokio::test]
async fn test_proxy_preamble_oversize_rejected() {
    let (mut client, mut server) = tokio::io::duplex(8192);

    let mut wire = vec![0xF3, 0x08, 0x00]; // 2048 > 1024
    wire.resize(C0C1_SIZE, 0);
    tokio::spawn(async move {
        let _ = client.write_all(&wire).await;
    });

    let mut hs = HandshakeBytes::new();
    assert!(matches!(
        hs.read_c0c1(&mut server).await,
        Err(Error::ProxyExceed(2048))
    ));
}
