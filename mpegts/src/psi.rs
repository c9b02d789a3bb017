//! PAT and PMT sections.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::ts::crc32;

/// Program association: the single program's PMT PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pat {
    pub pmt_pid: u16,
}

impl Pat {
    /// Parse the first program entry of a PAT section (pointer field
    /// already consumed).
    pub fn parse(section: &[u8]) -> Result<Self> {
        // table_id .. last_section_number is 8 bytes, then 4-byte
        // program entries, then CRC.
        if section.len() < 8 + 4 + 4 {
            return Err(Error::ShortBuffer("PAT section"));
        }
        let entry = &section[8..];
        let pmt_pid = (((entry[2] & 0x1F) as u16) << 8) | entry[3] as u16;
        Ok(Self { pmt_pid })
    }

    /// Serialize the section, CRC included, without the pointer field.
    pub fn write(&self) -> BytesMut {
        let mut body = BytesMut::new();
        body.put_u8(0x00); // table_id
        body.put_u16(0xB00D); // syntax + length 13
        body.put_u16(0x0001); // transport_stream_id
        body.put_u8(0xC1); // version 0, current_next 1
        body.put_u8(0x00); // section_number
        body.put_u8(0x00); // last_section_number
        body.put_u16(0x0001); // program_number
        body.put_u16(0xE000 | self.pmt_pid);
        let crc = crc32(&body);
        body.put_u32(crc);
        body
    }
}

/// One elementary stream advertised by the PMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub pid: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pmt {
    pub pcr_pid: u16,
    pub streams: Vec<PmtStream>,
}

impl Pmt {
    pub fn parse(section: &[u8]) -> Result<Self> {
        if section.len() < 12 + 4 {
            return Err(Error::ShortBuffer("PMT section"));
        }
        let section_length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
        let end = (3 + section_length).min(section.len());
        let pcr_pid = (((section[8] & 0x1F) as u16) << 8) | section[9] as u16;
        let program_info_length =
            (((section[10] & 0x0F) as usize) << 8) | section[11] as usize;

        let mut streams = Vec::new();
        let mut offset = 12 + program_info_length;
        // Entries run until the 4-byte CRC.
        while offset + 5 <= end.saturating_sub(4) {
            let stream_type = section[offset];
            let pid =
                (((section[offset + 1] & 0x1F) as u16) << 8) | section[offset + 2] as u16;
            let es_info_length =
                (((section[offset + 3] & 0x0F) as usize) << 8) | section[offset + 4] as usize;
            streams.push(PmtStream { stream_type, pid });
            offset += 5 + es_info_length;
        }
        Ok(Self { pcr_pid, streams })
    }

    pub fn write(&self) -> BytesMut {
        let mut body = BytesMut::new();
        let section_length = 13 + self.streams.len() * 5;
        body.put_u8(0x02); // table_id
        body.put_u16(0xB000 | section_length as u16);
        body.put_u16(0x0001); // program_number
        body.put_u8(0xC1);
        body.put_u8(0x00);
        body.put_u8(0x00);
        body.put_u16(0xE000 | self.pcr_pid);
        body.put_u16(0xF000); // program_info_length 0
        for stream in &self.streams {
            body.put_u8(stream.stream_type);
            body.put_u16(0xE000 | stream.pid);
            body.put_u16(0xF000); // es_info_length 0
        }
        let crc = crc32(&body);
        body.put_u32(crc);
        body
    }
}
