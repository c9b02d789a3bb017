//! Payloaders turning access units into RTP payloads.
//!
//! Video parameter sets arrive out-of-band from the FLV sequence header,
//! so payloaders take decoded NALU lists rather than AnnexB streams, and
//! aggregate the parameter sets into STAP packets when they change.

pub mod aac;
pub mod avc;
pub mod hevc;

#[cfg(test)]
mod avc_test;

pub use aac::AacHbrPayloader;
pub use avc::AvcPayloader;
pub use flv::codec::{AvcDecoderConfig, HevcDecoderConfig};
pub use hevc::HevcPayloader;

use bytes::Bytes;

use crate::error::Result;

/// One codec-specific payloader. The returned payload list covers exactly
/// one access unit; the caller sets the marker on the final payload.
pub trait Payloader {
    /// Payload one access unit given as raw NALUs (video) or one frame
    /// (audio, a single-element slice).
    fn payload(&mut self, mtu: usize, nalus: &[Bytes]) -> Result<Vec<Bytes>>;
}
