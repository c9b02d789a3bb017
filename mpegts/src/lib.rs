#![warn(rust_2018_idioms)]

//! MPEG-TS carriage for SRT ingest and HLS segments: a demuxer turning
//! 188-byte transport packets into FLV-framed media packets, and a muxer
//! for the reverse direction with optional AES-128-CBC segment
//! encryption.

mod error;

pub mod adts;
pub mod demux;
pub mod mux;
pub mod pes;
pub mod psi;
pub mod ts;

pub use demux::TsDemuxer;
pub use error::{Error, Result};
pub use mux::TsMuxer;
