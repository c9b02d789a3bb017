//! Codec configuration records carried by FLV sequence headers.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Parsed AVCDecoderConfigurationRecord: the SPS and PPS NALUs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfig {
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl AvcDecoderConfig {
    /// Parse an avcC box body as carried by the FLV sequence header.
    pub fn parse(raw: &Bytes) -> Result<Self> {
        let mut buf = raw.clone();
        // configurationVersion, profile, compatibility, level,
        // lengthSizeMinusOne.
        if buf.remaining() < 6 {
            return Err(Error::ErrShortBuffer);
        }
        buf.advance(5);

        let num_sps = (buf.get_u8() & 0x1F) as usize;
        let mut sps = Vec::with_capacity(num_sps);
        for _ in 0..num_sps {
            sps.push(read_nalu(&mut buf)?);
        }

        if !buf.has_remaining() {
            return Err(Error::ErrShortBuffer);
        }
        let num_pps = buf.get_u8() as usize;
        let mut pps = Vec::with_capacity(num_pps);
        for _ in 0..num_pps {
            pps.push(read_nalu(&mut buf)?);
        }

        Ok(Self { sps, pps })
    }

    /// Serialize an avcC record; profile and level come from the first
    /// SPS.
    pub fn write(&self) -> Bytes {
        let sps0 = self.sps.first();
        let (profile, compat, level) = match sps0 {
            Some(sps) if sps.len() >= 4 => (sps[1], sps[2], sps[3]),
            _ => (0x42, 0x00, 0x1E),
        };

        let size = 6
            + self.sps.iter().map(|n| 2 + n.len()).sum::<usize>()
            + 1
            + self.pps.iter().map(|n| 2 + n.len()).sum::<usize>();
        let mut buf = BytesMut::with_capacity(size);
        buf.put_u8(0x01);
        buf.put_u8(profile);
        buf.put_u8(compat);
        buf.put_u8(level);
        buf.put_u8(0xFF); // 4-byte NALU lengths
        buf.put_u8(0xE0 | self.sps.len() as u8);
        for sps in &self.sps {
            buf.put_u16(sps.len() as u16);
            buf.put_slice(sps);
        }
        buf.put_u8(self.pps.len() as u8);
        for pps in &self.pps {
            buf.put_u16(pps.len() as u16);
            buf.put_slice(pps);
        }
        buf.freeze()
    }
}

/// HEVC NALU types carried by the config record arrays.
pub const HEVC_NALU_VPS: u8 = 32;
pub const HEVC_NALU_SPS: u8 = 33;
pub const HEVC_NALU_PPS: u8 = 34;

/// Parsed HEVCDecoderConfigurationRecord: VPS, SPS, and PPS NALUs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HevcDecoderConfig {
    pub vps: Vec<Bytes>,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl HevcDecoderConfig {
    /// Parse an hvcC box body; arrays hold the parameter set NALUs.
    pub fn parse(raw: &Bytes) -> Result<Self> {
        let mut buf = raw.clone();
        // The fixed part of hvcC is 22 bytes before numOfArrays.
        if buf.remaining() < 23 {
            return Err(Error::ErrShortBuffer);
        }
        buf.advance(22);

        let num_arrays = buf.get_u8() as usize;
        let mut config = Self::default();
        for _ in 0..num_arrays {
            if buf.remaining() < 3 {
                return Err(Error::ErrShortBuffer);
            }
            let nalu_type = buf.get_u8() & 0x3F;
            let count = buf.get_u16() as usize;
            for _ in 0..count {
                let nalu = read_nalu(&mut buf)?;
                match nalu_type {
                    HEVC_NALU_VPS => config.vps.push(nalu),
                    HEVC_NALU_SPS => config.sps.push(nalu),
                    HEVC_NALU_PPS => config.pps.push(nalu),
                    _ => {}
                }
            }
        }
        Ok(config)
    }

    /// Serialize an hvcC record. The fixed profile/tier/level fields are
    /// written with conservative defaults since this layer does not
    /// dissect parameter-set bitstreams.
    pub fn write(&self) -> Bytes {
        let arrays = [
            (HEVC_NALU_VPS, &self.vps),
            (HEVC_NALU_SPS, &self.sps),
            (HEVC_NALU_PPS, &self.pps),
        ];
        let body: usize = arrays
            .iter()
            .map(|(_, set)| 3 + set.iter().map(|n| 2 + n.len()).sum::<usize>())
            .sum();
        let mut buf = BytesMut::with_capacity(23 + body);

        let mut fixed = [0u8; 22];
        fixed[0] = 0x01; // configurationVersion
        fixed[1] = 0x01; // general_profile_space/tier/idc: Main
        fixed[6] = 0x96; // general_constraint flags
        fixed[12] = 0x5A; // general_level_idc: 3.0
        fixed[13] = 0xF0; // min_spatial_segmentation
        fixed[15] = 0xFC; // parallelismType
        fixed[16] = 0xFC; // chroma_format_idc reserved bits
        fixed[17] = 0xF8;
        fixed[18] = 0xF8;
        fixed[21] = 0x03; // lengthSizeMinusOne = 3
        buf.put_slice(&fixed);

        buf.put_u8(arrays.len() as u8);
        for (nalu_type, set) in arrays {
            buf.put_u8(nalu_type);
            buf.put_u16(set.len() as u16);
            for nalu in set.iter() {
                buf.put_u16(nalu.len() as u16);
                buf.put_slice(nalu);
            }
        }
        buf.freeze()
    }
}

fn read_nalu<B: Buf>(buf: &mut B) -> Result<Bytes> {
    if buf.remaining() < 2 {
        return Err(Error::ErrShortBuffer);
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(Error::ErrShortBuffer);
    }
    Ok(buf.copy_to_bytes(len))
}

#[cfg(test)]
mod codec_test {
    use super::*;

    fn sps() -> Bytes {
        Bytes::from_static(&[0x67, 0x64, 0x00, 0x28, 0xAC])
    }

    fn pps() -> Bytes {
        Bytes::from_static(&[0x68, 0xEE, 0x3C, 0xB0])
    }

    #[test]
    fn test_avcc_round_trip() {
        let config = AvcDecoderConfig {
            sps: vec![sps()],
            pps: vec![pps()],
        };
        let raw = config.write();
        assert_eq!(raw[0], 0x01);
        assert_eq!(raw[1], 0x64); // profile from SPS
        let parsed = AvcDecoderConfig::parse(&raw).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_hvcc_round_trip() {
        let config = HevcDecoderConfig {
            vps: vec![Bytes::from_static(&[0x40, 0x01, 0x0C])],
            sps: vec![Bytes::from_static(&[0x42, 0x01, 0x01])],
            pps: vec![Bytes::from_static(&[0x44, 0x01, 0xC1])],
        };
        let raw = config.write();
        assert_eq!(raw[0], 0x01);
        let parsed = HevcDecoderConfig::parse(&raw).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_truncated_records() {
        assert!(AvcDecoderConfig::parse(&Bytes::from_static(&[0x01, 0x42])).is_err());
        assert!(HevcDecoderConfig::parse(&Bytes::from_static(&[0x01])).is_err());
    }
}
