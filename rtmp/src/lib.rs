#![warn(rust_2018_idioms)]

//! The RTMP protocol engine: chunk codec, message router, AMF command
//! dispatch, handshake, and the per-connection session state machines.
//!
//! The chunk codec is sans-I/O and byte-exact; [`protocol::Protocol`]
//! drives it over a tokio stream and layers the automatic responses
//! (acknowledgements, ping replies) on top. [`session::ServerSession`] and
//! [`session::ClientSession`] implement the connection lifecycle:
//! handshake, connect, identify, then play or publish.

mod error;

pub mod chunk;
pub mod commands;
pub mod handshake;
pub mod message;
pub mod protocol;
pub mod request;
pub mod session;

pub use error::{Error, Result};
pub use message::{MessageHeader, RtmpMessage};
pub use request::{Request, RtmpConnType};
