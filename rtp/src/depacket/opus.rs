use bytes::Bytes;

use crate::error::{Error, Result};

/// Opus frames map one-to-one onto RTP payloads.
#[derive(Debug, Default, Clone)]
pub struct OpusDepacketizer;

impl OpusDepacketizer {
    pub fn new() -> Self {
        Self
    }
}

impl super::Depacketizer for OpusDepacketizer {
    fn push(&mut self, payload: &Bytes) -> Result<Vec<Bytes>> {
        if payload.is_empty() {
            return Err(Error::ErrShortPacket);
        }
        Ok(vec![payload.clone()])
    }
}
