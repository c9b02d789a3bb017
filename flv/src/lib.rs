#![warn(rust_2018_idioms)]

//! The media frame model shared by every protocol in the sluice core.
//!
//! [`MediaPacket`] is the lingua franca between the RTMP engine, the source
//! fan-out, and the protocol bridges. Payloads are refcounted immutable
//! byte regions ([`bytes::Bytes`]): `wrap` transfers ownership of raw bytes
//! and `clone` bumps the refcount without copying payload data.

mod error;

pub mod annexb;
pub mod codec;
pub mod packet;
pub mod tag;

#[cfg(test)]
mod packet_test;

pub use error::{Error, Result};
pub use packet::{AudioCodecId, MediaKind, MediaPacket, VideoCodecId};
pub use tag::{FlvTag, TagType};
