use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

pub const HEADER_LENGTH: usize = 12;
pub const VERSION_SHIFT: u8 = 6;
pub const PADDING_SHIFT: u8 = 5;
pub const EXTENSION_SHIFT: u8 = 4;
pub const MARKER_SHIFT: u8 = 7;

/// RFC 8285 one-byte extension profile.
pub const EXTENSION_PROFILE_ONE_BYTE: u16 = 0xBEDE;

#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Extension {
    pub id: u8,
    pub payload: Bytes,
}

/// An RTP header with one-byte (RFC 8285) extension support.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Header {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension_profile: u16,
    pub extensions: Vec<Extension>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            version: 2,
            padding: false,
            extension: false,
            marker: false,
            payload_type: 0,
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0,
            csrc: Vec::new(),
            extension_profile: EXTENSION_PROFILE_ONE_BYTE,
            extensions: Vec::new(),
        }
    }
}

impl Header {
    pub fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < HEADER_LENGTH {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        let b0 = buf.get_u8();
        let version = b0 >> VERSION_SHIFT;
        let padding = (b0 >> PADDING_SHIFT) & 0x1 != 0;
        let extension = (b0 >> EXTENSION_SHIFT) & 0x1 != 0;
        let cc = (b0 & 0x0F) as usize;

        let b1 = buf.get_u8();
        let marker = b1 >> MARKER_SHIFT != 0;
        let payload_type = b1 & 0x7F;

        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        if buf.remaining() < cc * 4 {
            return Err(Error::ErrHeaderSizeInsufficient);
        }
        let mut csrc = Vec::with_capacity(cc);
        for _ in 0..cc {
            csrc.push(buf.get_u32());
        }

        let mut extension_profile = EXTENSION_PROFILE_ONE_BYTE;
        let mut extensions = Vec::new();
        if extension {
            if buf.remaining() < 4 {
                return Err(Error::ErrHeaderSizeInsufficient);
            }
            extension_profile = buf.get_u16();
            let extension_length = buf.get_u16() as usize * 4;
            if buf.remaining() < extension_length {
                return Err(Error::ErrHeaderSizeInsufficient);
            }
            let mut ext = buf.copy_to_bytes(extension_length);

            if extension_profile == EXTENSION_PROFILE_ONE_BYTE {
                while ext.has_remaining() {
                    let b = ext.get_u8();
                    if b == 0x00 {
                        // padding
                        continue;
                    }
                    let id = b >> 4;
                    let len = (b as usize & 0x0F) + 1;
                    if id == 0x0F {
                        break;
                    }
                    if ext.remaining() < len {
                        return Err(Error::ErrHeaderSizeInsufficient);
                    }
                    extensions.push(Extension {
                        id,
                        payload: ext.copy_to_bytes(len),
                    });
                }
            } else {
                // Unknown profile: keep the raw body under id 0.
                extensions.push(Extension { id: 0, payload: ext });
            }
        }

        Ok(Self {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_profile,
            extensions,
        })
    }

    pub fn marshal_size(&self) -> usize {
        let mut size = HEADER_LENGTH + self.csrc.len() * 4;
        if self.extension {
            size += 4 + self.extension_body_len();
        }
        size
    }

    fn extension_body_len(&self) -> usize {
        let raw: usize = match self.extension_profile {
            EXTENSION_PROFILE_ONE_BYTE => self
                .extensions
                .iter()
                .map(|e| 1 + e.payload.len())
                .sum(),
            _ => self.extensions.iter().map(|e| e.payload.len()).sum(),
        };
        // Pad to a 32-bit boundary.
        (raw + 3) / 4 * 4
    }

    pub fn marshal_to<B: BufMut>(&self, buf: &mut B) {
        let mut b0 = self.version << VERSION_SHIFT;
        if self.padding {
            b0 |= 1 << PADDING_SHIFT;
        }
        if self.extension {
            b0 |= 1 << EXTENSION_SHIFT;
        }
        b0 |= self.csrc.len() as u8;
        buf.put_u8(b0);

        let mut b1 = self.payload_type;
        if self.marker {
            b1 |= 1 << MARKER_SHIFT;
        }
        buf.put_u8(b1);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if self.extension {
            let body_len = self.extension_body_len();
            buf.put_u16(self.extension_profile);
            buf.put_u16((body_len / 4) as u16);
            let mut written = 0usize;
            match self.extension_profile {
                EXTENSION_PROFILE_ONE_BYTE => {
                    for ext in &self.extensions {
                        buf.put_u8((ext.id << 4) | (ext.payload.len() as u8 - 1));
                        buf.put_slice(&ext.payload);
                        written += 1 + ext.payload.len();
                    }
                }
                _ => {
                    for ext in &self.extensions {
                        buf.put_slice(&ext.payload);
                        written += ext.payload.len();
                    }
                }
            }
            while written < body_len {
                buf.put_u8(0);
                written += 1;
            }
        }
    }

    /// Attach a one-byte header extension, enabling the extension bit.
    pub fn set_extension(&mut self, id: u8, payload: Bytes) -> Result<()> {
        if !(1..=14).contains(&id) {
            return Err(Error::ErrOneByteHeaderIdRange);
        }
        if payload.is_empty() || payload.len() > 16 {
            return Err(Error::ErrOneByteHeaderSize);
        }
        self.extension = true;
        self.extension_profile = EXTENSION_PROFILE_ONE_BYTE;
        if let Some(ext) = self.extensions.iter_mut().find(|e| e.id == id) {
            ext.payload = payload;
        } else {
            self.extensions.push(Extension { id, payload });
        }
        Ok(())
    }

    pub fn get_extension(&self, id: u8) -> Option<&Bytes> {
        self.extensions
            .iter()
            .find(|e| e.id == id)
            .map(|e| &e.payload)
    }

    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.marshal_to(&mut buf);
        buf.freeze()
    }
}
