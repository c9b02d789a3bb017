//! PES packet header parsing and serialization with 33-bit PTS/DTS.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

/// A parsed PES unit: the elementary payload plus its clocks in 90 kHz
/// ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    /// Offset of the elementary payload within the PES packet.
    pub payload_offset: usize,
}

impl PesHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 9 {
            return Err(Error::ShortBuffer("PES header"));
        }
        if data[0] != 0 || data[1] != 0 || data[2] != 1 {
            return Err(Error::PesStartCodeMissing);
        }
        let stream_id = data[3];
        let flags = data[7];
        let header_data_length = data[8] as usize;
        let payload_offset = 9 + header_data_length;
        if data.len() < payload_offset {
            return Err(Error::ShortBuffer("PES optional header"));
        }

        let mut pts = None;
        let mut dts = None;
        if flags & 0x80 != 0 {
            if data.len() < 14 || header_data_length < 5 {
                return Err(Error::ShortBuffer("PES timestamp"));
            }
            pts = Some(parse_timestamp(&data[9..14])?);
        }
        if flags & 0x40 != 0 {
            if data.len() < 19 || header_data_length < 10 {
                return Err(Error::ShortBuffer("PES timestamp"));
            }
            dts = Some(parse_timestamp(&data[14..19])?);
        }

        Ok(Self {
            stream_id,
            pts,
            dts,
            payload_offset,
        })
    }

    /// The decode clock: DTS when present, else PTS, else zero.
    pub fn dts_or_pts(&self) -> u64 {
        self.dts.or(self.pts).unwrap_or(0)
    }
}

fn parse_timestamp(raw: &[u8]) -> Result<u64> {
    if raw.len() < 5 {
        return Err(Error::ShortBuffer("PES timestamp"));
    }
    let ts = ((raw[0] as u64 >> 1) & 0x07) << 30
        | (raw[1] as u64) << 22
        | ((raw[2] as u64) >> 1) << 15
        | (raw[3] as u64) << 7
        | (raw[4] as u64) >> 1;
    Ok(ts)
}

fn put_timestamp(buf: &mut BytesMut, prefix: u8, ts: u64) {
    buf.put_u8(prefix | (((ts >> 30) as u8 & 0x07) << 1) | 0x01);
    buf.put_u8((ts >> 22) as u8);
    buf.put_u8((((ts >> 15) as u8) << 1) | 0x01);
    buf.put_u8((ts >> 7) as u8);
    buf.put_u8(((ts as u8) << 1) | 0x01);
}

/// Serialize a PES packet around an elementary payload.
///
/// A zero `pes_packet_length` is written for video payloads larger than
/// the 16-bit field allows.
pub fn write_pes(stream_id: u8, pts: u64, dts: Option<u64>, payload: &[u8]) -> BytesMut {
    let has_dts = dts.is_some() && dts != Some(pts);
    let header_data_length: usize = if has_dts { 10 } else { 5 };

    let mut buf = BytesMut::with_capacity(9 + header_data_length + payload.len());
    buf.put_slice(&[0x00, 0x00, 0x01, stream_id]);

    let pes_body_len = 3 + header_data_length + payload.len();
    if pes_body_len > u16::MAX as usize {
        buf.put_u16(0);
    } else {
        buf.put_u16(pes_body_len as u16);
    }

    buf.put_u8(0x80); // marker bits
    buf.put_u8(if has_dts { 0xC0 } else { 0x80 });
    buf.put_u8(header_data_length as u8);
    put_timestamp(&mut buf, if has_dts { 0x30 } else { 0x20 }, pts);
    if let Some(dts) = dts {
        if has_dts {
            put_timestamp(&mut buf, 0x10, dts);
        }
    }
    buf.put_slice(payload);
    buf
}

#[cfg(test)]
mod pes_test {
    use super::*;

    #[test]
    fn test_pes_round_trip_pts_only() {
        let payload = [0xAAu8, 0xBB, 0xCC];
        let raw = write_pes(0xC0, 90_000, None, &payload);
        let header = PesHeader::parse(&raw).unwrap();
        assert_eq!(header.stream_id, 0xC0);
        assert_eq!(header.pts, Some(90_000));
        assert_eq!(header.dts, None);
        assert_eq!(&raw[header.payload_offset..], &payload);
    }

    #[test]
    fn test_pes_round_trip_pts_dts() {
        let payload = [0x01u8; 32];
        let raw = write_pes(0xE0, 180_000, Some(90_000), &payload);
        let header = PesHeader::parse(&raw).unwrap();
        assert_eq!(header.pts, Some(180_000));
        assert_eq!(header.dts, Some(90_000));
        assert_eq!(header.dts_or_pts(), 90_000);
        assert_eq!(&raw[header.payload_offset..], &payload);
    }

    #[test]
    fn test_33_bit_timestamp() {
        let ts = 0x1_FFFF_FFFF; // full 33 bits
        let raw = write_pes(0xE0, ts, None, &[0x00]);
        let header = PesHeader::parse(&raw).unwrap();
        assert_eq!(header.pts, Some(ts));
    }

    #[test]
    fn test_missing_start_code() {
        assert_eq!(
            PesHeader::parse(&[0, 0, 2, 0xE0, 0, 0, 0x80, 0x00, 0]),
            Err(Error::PesStartCodeMissing)
        );
    }
}
