use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

use super::{AvcDecoderConfig, Payloader};

pub const STAPA_NALU_TYPE: u8 = 24;
pub const FUA_NALU_TYPE: u8 = 28;
pub const SPS_NALU_TYPE: u8 = 7;
pub const PPS_NALU_TYPE: u8 = 8;
pub const IDR_NALU_TYPE: u8 = 5;
pub const AUD_NALU_TYPE: u8 = 9;
pub const FILLER_NALU_TYPE: u8 = 12;

pub const FUA_HEADER_SIZE: usize = 2;
pub const STAPA_HEADER_SIZE: usize = 1;
pub const STAPA_NALU_LENGTH_SIZE: usize = 2;

pub const NALU_TYPE_BITMASK: u8 = 0x1F;
pub const NALU_REF_IDC_BITMASK: u8 = 0x60;
pub const FU_START_BITMASK: u8 = 0x80;
pub const FU_END_BITMASK: u8 = 0x40;

/// H.264 payloader: STAP-A for parameter sets, single-NALU when a NALU
/// fits the MTU, FU-A otherwise.
#[derive(Debug, Default, Clone)]
pub struct AvcPayloader {
    config: AvcDecoderConfig,
    /// Set when the parameter sets changed and the next access unit must
    /// be preceded by a STAP-A.
    pending_config: bool,
}

impl AvcPayloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt new parameter sets from a sequence header. A change arms a
    /// STAP-A in front of the next access unit.
    pub fn set_config(&mut self, config: AvcDecoderConfig) {
        if self.config != config {
            self.config = config;
            self.pending_config = true;
        }
    }

    pub fn config(&self) -> &AvcDecoderConfig {
        &self.config
    }

    /// Aggregate SPS and PPS into one STAP-A payload. The indicator takes
    /// the strictest NRI of the aggregated NALUs.
    fn stap_a(&self, mtu: usize) -> Option<Bytes> {
        let nalus: Vec<&Bytes> = self
            .config
            .sps
            .iter()
            .chain(self.config.pps.iter())
            .collect();
        if nalus.is_empty() {
            return None;
        }

        let size = STAPA_HEADER_SIZE
            + nalus
                .iter()
                .map(|n| STAPA_NALU_LENGTH_SIZE + n.len())
                .sum::<usize>();
        let mut buf = BytesMut::with_capacity(size);

        let nri = nalus
            .iter()
            .map(|n| n.first().copied().unwrap_or(0) & NALU_REF_IDC_BITMASK)
            .max()
            .unwrap_or(0);
        buf.put_u8(STAPA_NALU_TYPE | nri);
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
        if mtu <= FUA_HEADER_SIZE {
            return Err(Error::MtuTooSmall(mtu));
        }
        let nalu_type = nalu[0] & NALU_TYPE_BITMASK;
        let nalu_ref_idc = nalu[0] & NALU_REF_IDC_BITMASK;
        let max_fragment = mtu - FUA_HEADER_SIZE;

        // The NALU header byte is carried by the FU indicator and header,
        // not repeated in the fragments.
        let data = &nalu[1..];
        let mut offset = 0;
        while offset < data.len() {
            let fragment = (data.len() - offset).min(max_fragment);
            let mut out = BytesMut::with_capacity(FUA_HEADER_SIZE + fragment);
            out.put_u8(FUA_NALU_TYPE | nalu_ref_idc);

            let mut fu_header = nalu_type;
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

impl Payloader for AvcPayloader {
    fn payload(&mut self, mtu: usize, nalus: &[Bytes]) -> Result<Vec<Bytes>> {
        let mut payloads = Vec::new();
        if self.pending_config {
            if let Some(stap) = self.stap_a(mtu) {
                payloads.push(stap);
            }
            self.pending_config = false;
        }

        for nalu in nalus {
            if nalu.is_empty() {
                continue;
            }
            let nalu_type = nalu[0] & NALU_TYPE_BITMASK;
            if nalu_type == AUD_NALU_TYPE || nalu_type == FILLER_NALU_TYPE {
                continue;
            }
            // In-band parameter sets replace the cached ones.
            if nalu_type == SPS_NALU_TYPE {
                self.config.sps = vec![nalu.clone()];
                continue;
            }
            if nalu_type == PPS_NALU_TYPE {
                self.config.pps = vec![nalu.clone()];
                continue;
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
