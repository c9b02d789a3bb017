//! The Adobe complex-handshake digest scheme.
//!
//! C1/S1 are 1536 bytes: time(4) + version(4) + two 764-byte blocks, a key
//! block and a digest block, in schema-dependent order. The digest block
//! embeds a 32-byte HMAC-SHA256 over the packet with the digest bytes
//! excised; the key block embeds a 128-byte key used by later crypto the
//! plain handshake never touches.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};

pub const C1S1_SIZE: usize = 1536;
pub const BLOCK_SIZE: usize = 764;
pub const DIGEST_SIZE: usize = 32;
pub const KEY_SIZE: usize = 128;

/// "Genuine Adobe Flash Player 001" plus the shared tail bytes.
pub const FP_KEY: [u8; 62] = [
    0x47, 0x65, 0x6E, 0x75, 0x69, 0x6E, 0x65, 0x20, 0x41, 0x64, 0x6F, 0x62, 0x65, 0x20, 0x46,
    0x6C, 0x61, 0x73, 0x68, 0x20, 0x50, 0x6C, 0x61, 0x79, 0x65, 0x72, 0x20, 0x30, 0x30, 0x31,
    0xF0, 0xEE, 0xC2, 0x4A, 0x80, 0x68, 0xBE, 0xE8, 0x2E, 0x00, 0xD0, 0xD1, 0x02, 0x9E, 0x7E,
    0x57, 0x6E, 0xEC, 0x5D, 0x2D, 0x29, 0x80, 0x6F, 0xAB, 0x93, 0xB8, 0xE6, 0x36, 0xCF, 0xEB,
    0x31, 0xAE,
];

/// "Genuine Adobe Flash Media Server 001" plus the shared tail bytes.
pub const FMS_KEY: [u8; 68] = [
    0x47, 0x65, 0x6E, 0x75, 0x69, 0x6E, 0x65, 0x20, 0x41, 0x64, 0x6F, 0x62, 0x65, 0x20, 0x46,
    0x6C, 0x61, 0x73, 0x68, 0x20, 0x4D, 0x65, 0x64, 0x69, 0x61, 0x20, 0x53, 0x65, 0x72, 0x76,
    0x65, 0x72, 0x20, 0x30, 0x30, 0x31, 0xF0, 0xEE, 0xC2, 0x4A, 0x80, 0x68, 0xBE, 0xE8, 0x2E,
    0x00, 0xD0, 0xD1, 0x02, 0x9E, 0x7E, 0x57, 0x6E, 0xEC, 0x5D, 0x2D, 0x29, 0x80, 0x6F, 0xAB,
    0x93, 0xB8, 0xE6, 0x36, 0xCF, 0xEB, 0x31, 0xAE,
];

/// The two layouts of the C1/S1 body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Key block first, digest block second.
    Schema0,
    /// Digest block first, key block second.
    Schema1,
}

impl Schema {
    /// Absolute offset of the digest block within C1/S1.
    fn digest_block_offset(&self) -> usize {
        match self {
            Schema::Schema0 => 8 + BLOCK_SIZE,
            Schema::Schema1 => 8,
        }
    }
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Absolute position of the 32 digest bytes for `schema` in `c1s1`.
pub fn digest_position(c1s1: &[u8], schema: Schema) -> usize {
    let block = schema.digest_block_offset();
    let offset_bytes = &c1s1[block..block + 4];
    let offset = offset_bytes.iter().map(|&b| b as usize).sum::<usize>()
        % (BLOCK_SIZE - DIGEST_SIZE - 4);
    block + 4 + offset
}

/// Compute the digest for `c1s1` as if its digest bytes were zeroed out.
pub fn compute_digest(c1s1: &[u8], schema: Schema, key: &[u8]) -> [u8; DIGEST_SIZE] {
    let pos = digest_position(c1s1, schema);
    let mut joined = Vec::with_capacity(C1S1_SIZE - DIGEST_SIZE);
    joined.extend_from_slice(&c1s1[..pos]);
    joined.extend_from_slice(&c1s1[pos + DIGEST_SIZE..]);
    hmac_sha256(key, &joined)
}

/// Validate a client C1, trying schema1 then schema0.
///
/// Returns the matching schema and the embedded digest, or
/// [`Error::DigestMismatch`] when neither layout verifies, which callers
/// treat as the fall-back-to-simple-handshake sentinel.
pub fn validate_c1(c1: &[u8]) -> Result<(Schema, [u8; DIGEST_SIZE])> {
    debug_assert_eq!(c1.len(), C1S1_SIZE);
    for schema in [Schema::Schema1, Schema::Schema0] {
        let pos = digest_position(c1, schema);
        let expect = compute_digest(c1, schema, &FP_KEY[..30]);
        if c1[pos..pos + DIGEST_SIZE] == expect {
            return Ok((schema, expect));
        }
    }
    Err(Error::DigestMismatch)
}

/// Stamp the server digest into an S1 body laid out per `schema`.
pub fn sign_s1(s1: &mut [u8], schema: Schema) {
    let pos = digest_position(s1, schema);
    let digest = compute_digest(s1, schema, &FMS_KEY[..36]);
    s1[pos..pos + DIGEST_SIZE].copy_from_slice(&digest);
}

/// Stamp the client digest into a C1 body laid out per `schema`.
pub fn sign_c1(c1: &mut [u8], schema: Schema) -> [u8; DIGEST_SIZE] {
    let pos = digest_position(c1, schema);
    let digest = compute_digest(c1, schema, &FP_KEY[..30]);
    c1[pos..pos + DIGEST_SIZE].copy_from_slice(&digest);
    digest
}

/// Build the S2 trailer: the last 32 bytes are an HMAC over the first 1504
/// keyed by a digest of the client's C1 digest.
pub fn sign_s2(s2: &mut [u8], c1_digest: &[u8; DIGEST_SIZE]) {
    let temp_key = hmac_sha256(&FMS_KEY, c1_digest);
    let digest = hmac_sha256(&temp_key, &s2[..C1S1_SIZE - DIGEST_SIZE]);
    s2[C1S1_SIZE - DIGEST_SIZE..].copy_from_slice(&digest);
}

/// Build the C2 trailer over the server's S1 digest.
pub fn sign_c2(c2: &mut [u8], s1_digest: &[u8; DIGEST_SIZE]) {
    let temp_key = hmac_sha256(&FP_KEY, s1_digest);
    let digest = hmac_sha256(&temp_key, &c2[..C1S1_SIZE - DIGEST_SIZE]);
    c2[C1S1_SIZE - DIGEST_SIZE..].copy_from_slice(&digest);
}
