use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

use super::{HevcDecoderConfig, Payloader};

/// RFC 7798 packet types.
pub const AP_NALU_TYPE: u8 = 48;
pub const FU_NALU_TYPE: u8 = 49;

pub const NALU_HEADER_SIZE: usize = 2;
pub const FU_HEADER_SIZE: usize = 3;

pub const VPS_NALU_TYPE: u8 = 32;
pub const SPS_NALU_TYPE: u8 = 33;
pub const PPS_NALU_TYPE: u8 = 34;

pub const FU_START_BITMASK: u8 = 0x80;
pub const FU_END_BITMASK: u8 = 0x40;

/// NALU type from the 2-byte H.265 NALU header.
pub fn nalu_type(nalu: &[u8]) -> u8 {
    (nalu[0] >> 1) & 0x3F
}

/// IRAP pictures span types 16..=23 (BLA/IDR/CRA).
pub fn is_irap(nalu_type: u8) -> bool {
    (16..=23).contains(&nalu_type)
}

/// H.265 payloader: an aggregation packet for VPS/SPS/PPS, single-NALU
/// when it fits, FU fragmentation otherwise.
#[derive(Debug, Default, Clone)]
pub struct HevcPayloader {
    config: HevcDecoderConfig,
    pending_config: bool,
}

impl HevcPayloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_config(&mut self, config: HevcDecoderConfig) {
        if self.config != config {
            self.config = config;
            self.pending_config = true;
        }
    }

    pub fn config(&self) -> &HevcDecoderConfig {
        &self.config
    }

    /// Aggregate VPS/SPS/PPS into one AP payload with a 2-byte payload
    /// header of type 48, layer and tid taken from the first NALU.
    fn aggregation_packet(&self, mtu: usize) -> Option<Bytes> {
        let nalus: Vec<&Bytes> = self
            .config
            .vps
            .iter()
            .chain(self.config.sps.iter())
            .chain(self.config.pps.iter())
            .collect();
        if nalus.is_empty() {
            return None;
        }
        let first = nalus[0];
        if first.len() < NALU_HEADER_SIZE {
            return None;
        }

        let size = NALU_HEADER_SIZE + nalus.iter().map(|n| 2 + n.len()).sum::<usize>();
        let mut buf = BytesMut::with_capacity(size);
        buf.put_u8((AP_NALU_TYPE << 1) | (first[0] & 0x81));
        buf.put_u8(first[1]);
        for nalu in nalus {
            buf.put_u16(nalu.len() as u16);
            buf.put_slice(nalu);
        }
        if buf.len() > mtu {
            return None;
        }
        Some(buf.freeze())
    }

    fn fragment(nalu: &Bytes, mtu: usize, payloads: &mut Vec<Bytes>) -> Result<()> {
        if mtu <= FU_HEADER_SIZE || nalu.len() < NALU_HEADER_SIZE {
            return Err(Error::MtuTooSmall(mtu));
        }
        let ty = nalu_type(nalu);
        let max_fragment = mtu - FU_HEADER_SIZE;

        // The 2-byte NALU header is replaced by the FU payload header and
        // the FU header carrying the original type.
        let data = &nalu[NALU_HEADER_SIZE..];
        let mut offset = 0;
        while offset < data.len() {
            let fragment = (data.len() - offset).min(max_fragment);
            let mut out = BytesMut::with_capacity(FU_HEADER_SIZE + fragment);
            out.put_u8((FU_NALU_TYPE << 1) | (nalu[0] & 0x81));
            out.put_u8(nalu[1]);

            let mut fu_header = ty;
            if offset == 0 {
                fu_header |= FU_START_BITMASK;
            } else if offset + fragment == data.len() {
                fu_header |= FU_END_BITMASK;
            }
            out.put_u8(fu_header);
            out.put_slice(&data[offset..offset + fragment]);
            payloads.push(out.freeze());
            offset += fragment;
        }
        Ok(())
    }
}

impl Payloader for HevcPayloader {
    fn payload(&mut self, mtu: usize, nalus: &[Bytes]) -> Result<Vec<Bytes>> {
        let mut payloads = Vec::new();
        if self.pending_config {
            if let Some(ap) = self.aggregation_packet(mtu) {
                payloads.push(ap);
            }
            self.pending_config = false;
        }

        for nalu in nalus {
            if nalu.len() < NALU_HEADER_SIZE {
                continue;
            }
            match nalu_type(nalu) {
                VPS_NALU_TYPE => {
                    self.config.vps = vec![nalu.clone()];
                    continue;
                }
                SPS_NALU_TYPE => {
                    self.config.sps = vec![nalu.clone()];
                    continue;
                }
                PPS_NALU_TYPE => {
                    self.config.pps = vec![nalu.clone()];
                    continue;
                }
                _ => {}
            }

            if nalu.len() <= mtu {
                payloads.push(nalu.clone());
            } else {
                Self::fragment(nalu, mtu, &mut payloads)?;
            }
        }
        Ok(payloads)
    }
}
