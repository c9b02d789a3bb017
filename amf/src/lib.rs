#![warn(rust_2018_idioms)]

//! AMF0 marker-typed serialization as used by RTMP command and data
//! messages.
//!
//! Values are read from any [`bytes::Buf`] and written into a
//! [`bytes::BufMut`]; sizes are computed without serializing so callers can
//! preallocate message payloads exactly.

mod error;
pub mod value;

#[cfg(test)]
mod value_test;

pub use error::{Error, Result};
pub use value::{Amf0Object, Amf0Value};
