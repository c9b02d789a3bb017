//! Depacketizers turning RTP payloads back into raw NALUs / AAC frames.

mod aac;
mod avc;
mod hevc;
mod opus;

#[cfg(test)]
mod depacket_test;

pub use aac::AacDepacketizer;
pub use avc::AvcDepacketizer;
pub use hevc::HevcDepacketizer;
pub use opus::OpusDepacketizer;

use bytes::Bytes;

use crate::error::Result;

/// One codec-specific depacketizer. `push` consumes a single RTP payload
/// and returns zero or more complete units: raw NALUs for video, raw
/// frames for audio. Fragmented units emit only once the final fragment
/// arrives.
pub trait Depacketizer {
    fn push(&mut self, payload: &Bytes) -> Result<Vec<Bytes>>;
}
