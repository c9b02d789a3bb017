#[cfg(test)]
mod handshake_test;

pub mod digest;

use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

use self::digest::{sign_c1, sign_c2, sign_s1, sign_s2, validate_c1, Schema, C1S1_SIZE};

pub const C0C1_SIZE: usize = 1 + C1S1_SIZE;
pub const S0S1S2_SIZE: usize = 1 + C1S1_SIZE * 2;
pub const C2_SIZE: usize = C1S1_SIZE;

/// RTMP plain-text handshake version byte.
pub const RTMP_VERSION: u8 = 0x03;
/// Out-of-band proxy preamble marker.
pub const PROXY_PREAMBLE: u8 = 0xF3;

fn unix_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// The raw handshake exchanges, read lazily and disposed after the
/// handshake completes.
#[derive(Debug, Default)]
pub struct HandshakeBytes {
    pub c0c1: Option<Vec<u8>>,
    pub s0s1s2: Option<Vec<u8>>,
    pub c2: Option<Vec<u8>>,
    /// Client address carried by the proxy preamble, when present.
    pub proxy_real_ip: Option<Ipv4Addr>,
}

impl HandshakeBytes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispose(&mut self) {
        self.c0c1 = None;
        self.s0s1s2 = None;
        self.c2 = None;
    }

    /// Read C0C1, handling the proxy preamble: a 0xF3 marker, a 16-bit
    /// big-endian payload length (at most 1024), an optional 4-byte client
    /// IPv4, then the real C0C1 resumes.
    pub async fn read_c0c1<S>(&mut self, io: &mut S) -> Result<()>
    where
        S: AsyncRead + Unpin,
    {
        if self.c0c1.is_some() {
            return Ok(());
        }

        let mut buf = vec![0u8; C0C1_SIZE];
        io.read_exact(&mut buf).await?;

        if buf[0] == PROXY_PREAMBLE {
            let nn = u16::from_be_bytes([buf[1], buf[2]]);
            let consumed = 3 + nn as usize;
            if nn > 1024 {
                return Err(Error::ProxyExceed(nn));
            }

            if nn >= 4 {
                self.proxy_real_ip = Some(Ipv4Addr::new(buf[3], buf[4], buf[5], buf[6]));
            }

            buf.copy_within(consumed.., 0);
            io.read_exact(&mut buf[C0C1_SIZE - consumed..]).await?;
            debug!("proxy preamble consumed, real ip {:?}", self.proxy_real_ip);
        }

        self.c0c1 = Some(buf);
        Ok(())
    }

    pub async fn read_s0s1s2<S>(&mut self, io: &mut S) -> Result<()>
    where
        S: AsyncRead + Unpin,
    {
        if self.s0s1s2.is_some() {
            return Ok(());
        }
        let mut buf = vec![0u8; S0S1S2_SIZE];
        io.read_exact(&mut buf).await?;
        self.s0s1s2 = Some(buf);
        Ok(())
    }

    pub async fn read_c2<S>(&mut self, io: &mut S) -> Result<()>
    where
        S: AsyncRead + Unpin,
    {
        if self.c2.is_some() {
            return Ok(());
        }
        let mut buf = vec![0u8; C2_SIZE];
        io.read_exact(&mut buf).await?;
        self.c2 = Some(buf);
        Ok(())
    }

    /// Fill C0C1 with a plain-text client hello.
    pub fn create_c0c1(&mut self) {
        if self.c0c1.is_some() {
            return;
        }
        let mut buf = vec![0u8; C0C1_SIZE];
        rand::thread_rng().fill_bytes(&mut buf);
        buf[0] = RTMP_VERSION;
        buf[1..5].copy_from_slice(&unix_time().to_be_bytes());
        buf[5..9].copy_from_slice(&[0, 0, 0, 0]);
        self.c0c1 = Some(buf);
    }

    /// Fill S0S1S2; S2 echoes C1 when available.
    pub fn create_s0s1s2(&mut self) {
        if self.s0s1s2.is_some() {
            return;
        }
        let mut buf = vec![0u8; S0S1S2_SIZE];
        rand::thread_rng().fill_bytes(&mut buf);
        buf[0] = RTMP_VERSION;
        buf[1..5].copy_from_slice(&unix_time().to_be_bytes());
        if let Some(c0c1) = &self.c0c1 {
            // S1 time2 echoes the client time; S2 echoes C1 whole.
            buf[5..9].copy_from_slice(&c0c1[1..5]);
            buf[1 + C1S1_SIZE..].copy_from_slice(&c0c1[1..]);
        }
        self.s0s1s2 = Some(buf);
    }

    /// Fill C2; echoes S1 when available.
    pub fn create_c2(&mut self) {
        if self.c2.is_some() {
            return;
        }
        let mut buf = vec![0u8; C2_SIZE];
        rand::thread_rng().fill_bytes(&mut buf);
        buf[0..4].copy_from_slice(&unix_time().to_be_bytes());
        if let Some(s0s1s2) = &self.s0s1s2 {
            buf[4..8].copy_from_slice(&s0s1s2[1..5]);
        }
        self.c2 = Some(buf);
    }
}

/// The plain handshake: random bytes, S2 echoing C1.
#[derive(Debug, Default)]
pub struct SimpleHandshake;

impl SimpleHandshake {
    pub async fn handshake_with_client<S>(
        &self,
        hs_bytes: &mut HandshakeBytes,
        io: &mut S,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        hs_bytes.read_c0c1(io).await?;

        let c0c1 = hs_bytes.c0c1.as_ref().unwrap();
        if c0c1[0] != RTMP_VERSION {
            return Err(Error::HandshakeVersion(c0c1[0]));
        }

        hs_bytes.create_s0s1s2();
        io.write_all(hs_bytes.s0s1s2.as_ref().unwrap()).await?;
        io.flush().await?;

        hs_bytes.read_c2(io).await?;
        trace!("simple handshake done");
        Ok(())
    }

    pub async fn handshake_with_server<S>(
        &self,
        hs_bytes: &mut HandshakeBytes,
        io: &mut S,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        hs_bytes.create_c0c1();
        io.write_all(hs_bytes.c0c1.as_ref().unwrap()).await?;
        io.flush().await?;

        hs_bytes.read_s0s1s2(io).await?;
        let s0s1s2 = hs_bytes.s0s1s2.as_ref().unwrap();
        if s0s1s2[0] != RTMP_VERSION {
            return Err(Error::HandshakeVersion(s0s1s2[0]));
        }

        // C2 echoes S1 exactly.
        let mut c2 = vec![0u8; C2_SIZE];
        c2.copy_from_slice(&s0s1s2[1..1 + C1S1_SIZE]);
        hs_bytes.c2 = Some(c2);
        io.write_all(hs_bytes.c2.as_ref().unwrap()).await?;
        io.flush().await?;

        trace!("simple handshake with server done");
        Ok(())
    }
}

/// The digest handshake used by Flash and FMLE.
#[derive(Debug, Default)]
pub struct ComplexHandshake;

impl ComplexHandshake {
    /// Verify the client digest and answer with a signed S0S1S2. Fails
    /// with [`Error::DigestMismatch`] when C1 carries no valid digest, in
    /// which case the caller retries with [`SimpleHandshake`].
    pub async fn handshake_with_client<S>(
        &self,
        hs_bytes: &mut HandshakeBytes,
        io: &mut S,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        hs_bytes.read_c0c1(io).await?;

        let c0c1 = hs_bytes.c0c1.as_ref().unwrap();
        if c0c1[0] != RTMP_VERSION {
            return Err(Error::HandshakeVersion(c0c1[0]));
        }
        let (schema, c1_digest) = validate_c1(&c0c1[1..])?;
        trace!("complex handshake c1 verified, schema {schema:?}");

        let mut buf = vec![0u8; S0S1S2_SIZE];
        rand::thread_rng().fill_bytes(&mut buf);
        buf[0] = RTMP_VERSION;
        buf[1..5].copy_from_slice(&unix_time().to_be_bytes());
        buf[5..9].copy_from_slice(&[0x04, 0x05, 0x00, 0x01]);
        sign_s1(&mut buf[1..1 + C1S1_SIZE], schema);
        sign_s2(&mut buf[1 + C1S1_SIZE..], &c1_digest);
        hs_bytes.s0s1s2 = Some(buf);

        io.write_all(hs_bytes.s0s1s2.as_ref().unwrap()).await?;
        io.flush().await?;

        // C2 arrives; peers vary in how they fill it, accept as-is.
        hs_bytes.read_c2(io).await?;
        trace!("complex handshake done");
        Ok(())
    }

    /// Digest-signed client hello; the server's S0S1S2 is accepted
    /// without verification for interop.
    pub async fn handshake_with_server<S>(
        &self,
        hs_bytes: &mut HandshakeBytes,
        io: &mut S,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; C0C1_SIZE];
        rand::thread_rng().fill_bytes(&mut buf);
        buf[0] = RTMP_VERSION;
        buf[1..5].copy_from_slice(&unix_time().to_be_bytes());
        buf[5..9].copy_from_slice(&[0x80, 0x00, 0x07, 0x02]);
        sign_c1(&mut buf[1..], Schema::Schema1);
        hs_bytes.c0c1 = Some(buf);

        io.write_all(hs_bytes.c0c1.as_ref().unwrap()).await?;
        io.flush().await?;

        hs_bytes.read_s0s1s2(io).await?;
        let s0s1s2 = hs_bytes.s0s1s2.as_ref().unwrap();
        if s0s1s2[0] != RTMP_VERSION {
            return Err(Error::HandshakeVersion(s0s1s2[0]));
        }

        // C2 signs over the server's S1 digest.
        let s1 = &s0s1s2[1..1 + C1S1_SIZE];
        let s1_digest = match validate_s1(s1) {
            Some(d) => d,
            // Tolerate unsigned servers; echo S1 like the simple path.
            None => {
                let mut c2 = vec![0u8; C2_SIZE];
                c2.copy_from_slice(s1);
                hs_bytes.c2 = Some(c2);
                io.write_all(hs_bytes.c2.as_ref().unwrap()).await?;
                io.flush().await?;
                return Ok(());
            }
        };

        let mut c2 = vec![0u8; C2_SIZE];
        rand::thread_rng().fill_bytes(&mut c2);
        sign_c2(&mut c2, &s1_digest);
        hs_bytes.c2 = Some(c2);
        io.write_all(hs_bytes.c2.as_ref().unwrap()).await?;
        io.flush().await?;

        trace!("complex handshake with server done");
        Ok(())
    }
}

fn validate_s1(s1: &[u8]) -> Option<[u8; digest::DIGEST_SIZE]> {
    for schema in [Schema::Schema1, Schema::Schema0] {
        let pos = digest::digest_position(s1, schema);
        let expect = digest::compute_digest(s1, schema, &digest::FMS_KEY[..36]);
        if s1[pos..pos + digest::DIGEST_SIZE] == expect {
            return Some(expect);
        }
    }
    None
}

/// Run the server handshake: complex first, simple on digest mismatch.
pub async fn server_handshake<S>(hs_bytes: &mut HandshakeBytes, io: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match ComplexHandshake
        .handshake_with_client(hs_bytes, io)
        .await
    {
        Ok(()) => Ok(()),
        Err(Error::DigestMismatch) => {
            debug!("complex handshake failed, fall back to simple");
            SimpleHandshake.handshake_with_client(hs_bytes, io).await
        }
        Err(e) => Err(e),
    }
}

/// Run the client handshake: complex first, simple on failure.
pub async fn client_handshake<S>(hs_bytes: &mut HandshakeBytes, io: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ComplexHandshake.handshake_with_server(hs_bytes, io).await
}
