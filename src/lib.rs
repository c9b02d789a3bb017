#![warn(rust_2018_idioms)]

//! sluice — a real-time streaming core.
//!
//! The RTMP protocol engine lives in the `rtmp` crate; this crate is the
//! fabric around it: the content-addressed source registry, per-consumer
//! fan-out queues, the protocol bridges repackaging published media for
//! WebRTC/RTSP (RTP), SRT (MPEG-TS), and the HLS/DASH segment window,
//! plus the HTTP hook callbacks and the typed configuration surface the
//! core consumes.

mod error;

pub mod bridge;
pub mod config;
pub mod conn;
pub mod dash;
pub mod fragment;
pub mod hls;
pub mod hook;
pub mod source;

pub use config::Config;
pub use conn::{serve_rtmp, RtmpConn};
pub use error::{Error, Result};
pub use source::{Consumer, MediaItem, Source, SourceKind, SourceRegistry};
