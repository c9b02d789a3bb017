use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

pub const MARKER_NUMBER: u8 = 0x00;
pub const MARKER_BOOLEAN: u8 = 0x01;
pub const MARKER_STRING: u8 = 0x02;
pub const MARKER_OBJECT: u8 = 0x03;
pub const MARKER_NULL: u8 = 0x05;
pub const MARKER_UNDEFINED: u8 = 0x06;
pub const MARKER_ECMA_ARRAY: u8 = 0x08;
pub const MARKER_OBJECT_END: u8 = 0x09;
pub const MARKER_STRICT_ARRAY: u8 = 0x0A;
pub const MARKER_DATE: u8 = 0x0B;
pub const MARKER_LONG_STRING: u8 = 0x0C;

/// An ordered set of named properties, shared by Object and EcmaArray.
///
/// AMF0 objects preserve insertion order on the wire, so this is a vector
/// of pairs rather than a map.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Amf0Object {
    properties: Vec<(String, Amf0Value)>,
}

impl Amf0Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Amf0Value) {
        let name = name.into();
        if let Some(slot) = self.properties.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.properties.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Amf0Value> {
        self.properties
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Amf0Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Size of the property list plus the object-end terminator, without
    /// the leading type marker.
    fn properties_size(&self) -> usize {
        let props: usize = self
            .properties
            .iter()
            .map(|(k, v)| 2 + k.len() + v.size())
            .sum();
        // Empty property name + object-end marker.
        props + 2 + 1
    }

    fn write_properties<B: BufMut>(&self, buf: &mut B) {
        for (name, value) in &self.properties {
            buf.put_u16(name.len() as u16);
            buf.put_slice(name.as_bytes());
            value.write(buf);
        }
        buf.put_u16(0);
        buf.put_u8(MARKER_OBJECT_END);
    }

    fn read_properties<B: Buf>(buf: &mut B) -> Result<Self> {
        let mut properties = Vec::new();
        loop {
            if buf.remaining() < 2 {
                return Err(Error::ErrShortBuffer);
            }
            let name_len = buf.get_u16() as usize;
            if buf.remaining() < name_len {
                return Err(Error::ErrShortBuffer);
            }
            let name = read_utf8(buf, name_len)?;
            if name.is_empty() {
                if !buf.has_remaining() {
                    return Err(Error::ErrShortBuffer);
                }
                let marker = buf.get_u8();
                if marker != MARKER_OBJECT_END {
                    return Err(Error::UnexpectedMarker {
                        expected: MARKER_OBJECT_END,
                        got: marker,
                    });
                }
                return Ok(Self { properties });
            }
            let value = Amf0Value::read(buf)?;
            properties.push((name, value));
        }
    }
}

impl FromIterator<(String, Amf0Value)> for Amf0Object {
    fn from_iter<T: IntoIterator<Item = (String, Amf0Value)>>(iter: T) -> Self {
        let mut object = Self::new();
        for (k, v) in iter {
            object.set(k, v);
        }
        object
    }
}

/// A typed AMF0 value.
#[derive(Debug, Clone, PartialEq)]
pub enum Amf0Value {
    Number(f64),
    Boolean(bool),
    String(String),
    Object(Amf0Object),
    Null,
    Undefined,
    EcmaArray(Amf0Object),
    StrictArray(Vec<Amf0Value>),
    /// Milliseconds since epoch plus a (reserved, always zero) timezone.
    Date(f64, i16),
}

impl Amf0Value {
    /// Serialized size in bytes, marker included.
    pub fn size(&self) -> usize {
        match self {
            Amf0Value::Number(_) => 1 + 8,
            Amf0Value::Boolean(_) => 1 + 1,
            Amf0Value::String(s) => {
                if s.len() > u16::MAX as usize {
                    1 + 4 + s.len()
                } else {
                    1 + 2 + s.len()
                }
            }
            Amf0Value::Object(o) => 1 + o.properties_size(),
            Amf0Value::Null | Amf0Value::Undefined => 1,
            Amf0Value::EcmaArray(o) => 1 + 4 + o.properties_size(),
            Amf0Value::StrictArray(items) => {
                1 + 4 + items.iter().map(|v| v.size()).sum::<usize>()
            }
            Amf0Value::Date(..) => 1 + 8 + 2,
        }
    }

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        match self {
            Amf0Value::Number(n) => {
                buf.put_u8(MARKER_NUMBER);
                buf.put_f64(*n);
            }
            Amf0Value::Boolean(b) => {
                buf.put_u8(MARKER_BOOLEAN);
                buf.put_u8(u8::from(*b));
            }
            Amf0Value::String(s) => {
                if s.len() > u16::MAX as usize {
                    buf.put_u8(MARKER_LONG_STRING);
                    buf.put_u32(s.len() as u32);
                } else {
                    buf.put_u8(MARKER_STRING);
                    buf.put_u16(s.len() as u16);
                }
                buf.put_slice(s.as_bytes());
            }
            Amf0Value::Object(o) => {
                buf.put_u8(MARKER_OBJECT);
                o.write_properties(buf);
            }
            Amf0Value::Null => buf.put_u8(MARKER_NULL),
            Amf0Value::Undefined => buf.put_u8(MARKER_UNDEFINED),
            Amf0Value::EcmaArray(o) => {
                buf.put_u8(MARKER_ECMA_ARRAY);
                buf.put_u32(o.len() as u32);
                o.write_properties(buf);
            }
            Amf0Value::StrictArray(items) => {
                buf.put_u8(MARKER_STRICT_ARRAY);
                buf.put_u32(items.len() as u32);
                for item in items {
                    item.write(buf);
                }
            }
            Amf0Value::Date(ms, tz) => {
                buf.put_u8(MARKER_DATE);
                buf.put_f64(*ms);
                buf.put_i16(*tz);
            }
        }
    }

    pub fn read<B: Buf>(buf: &mut B) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(Error::ErrShortBuffer);
        }
        let marker = buf.get_u8();
        Self::read_body(marker, buf)
    }

    fn read_body<B: Buf>(marker: u8, buf: &mut B) -> Result<Self> {
        match marker {
            MARKER_NUMBER => {
                if buf.remaining() < 8 {
                    return Err(Error::ErrShortBuffer);
                }
                Ok(Amf0Value::Number(buf.get_f64()))
            }
            MARKER_BOOLEAN => {
                if !buf.has_remaining() {
                    return Err(Error::ErrShortBuffer);
                }
                Ok(Amf0Value::Boolean(buf.get_u8() != 0))
            }
            MARKER_STRING => {
                if buf.remaining() < 2 {
                    return Err(Error::ErrShortBuffer);
                }
                let len = buf.get_u16() as usize;
                Ok(Amf0Value::String(read_utf8(buf, len)?))
            }
            MARKER_LONG_STRING => {
                if buf.remaining() < 4 {
                    return Err(Error::ErrShortBuffer);
                }
                let len = buf.get_u32() as usize;
                Ok(Amf0Value::String(read_utf8(buf, len)?))
            }
            MARKER_OBJECT => Ok(Amf0Value::Object(Amf0Object::read_properties(buf)?)),
            MARKER_NULL => Ok(Amf0Value::Null),
            MARKER_UNDEFINED => Ok(Amf0Value::Undefined),
            MARKER_ECMA_ARRAY => {
                if buf.remaining() < 4 {
                    return Err(Error::ErrShortBuffer);
                }
                // The count is advisory; the terminator is authoritative.
                let _count = buf.get_u32();
                Ok(Amf0Value::EcmaArray(Amf0Object::read_properties(buf)?))
            }
            MARKER_STRICT_ARRAY => {
                if buf.remaining() < 4 {
                    return Err(Error::ErrShortBuffer);
                }
                let count = buf.get_u32() as usize;
                let mut items = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    items.push(Amf0Value::read(buf)?);
                }
                Ok(Amf0Value::StrictArray(items))
            }
            MARKER_DATE => {
                if buf.remaining() < 10 {
                    return Err(Error::ErrShortBuffer);
                }
                let ms = buf.get_f64();
                let tz = buf.get_i16();
                Ok(Amf0Value::Date(ms, tz))
            }
            other => Err(Error::UnsupportedMarker(other)),
        }
    }

    pub fn as_number(&self) -> Result<f64> {
        match self {
            Amf0Value::Number(n) => Ok(*n),
            _ => Err(Error::WrongType("number")),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Amf0Value::Boolean(b) => Ok(*b),
            _ => Err(Error::WrongType("boolean")),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Amf0Value::String(s) => Ok(s),
            _ => Err(Error::WrongType("string")),
        }
    }

    pub fn as_object(&self) -> Result<&Amf0Object> {
        match self {
            Amf0Value::Object(o) => Ok(o),
            Amf0Value::EcmaArray(o) => Ok(o),
            _ => Err(Error::WrongType("object")),
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Amf0Value::Object(_) | Amf0Value::EcmaArray(_))
    }
}

/// Read a required string value, marker included.
pub fn read_string<B: Buf>(buf: &mut B) -> Result<String> {
    match Amf0Value::read(buf)? {
        Amf0Value::String(s) => Ok(s),
        _ => Err(Error::WrongType("string")),
    }
}

/// Read a required number value, marker included.
pub fn read_number<B: Buf>(buf: &mut B) -> Result<f64> {
    match Amf0Value::read(buf)? {
        Amf0Value::Number(n) => Ok(n),
        _ => Err(Error::WrongType("number")),
    }
}

/// Read a required boolean value, marker included.
pub fn read_boolean<B: Buf>(buf: &mut B) -> Result<bool> {
    match Amf0Value::read(buf)? {
        Amf0Value::Boolean(b) => Ok(b),
        _ => Err(Error::WrongType("boolean")),
    }
}

/// Read and discard a null marker.
pub fn read_null<B: Buf>(buf: &mut B) -> Result<()> {
    match Amf0Value::read(buf)? {
        Amf0Value::Null => Ok(()),
        _ => Err(Error::WrongType("null")),
    }
}

/// Read and discard an undefined marker.
pub fn read_undefined<B: Buf>(buf: &mut B) -> Result<()> {
    match Amf0Value::read(buf)? {
        Amf0Value::Undefined => Ok(()),
        _ => Err(Error::WrongType("undefined")),
    }
}

pub fn write_string<B: BufMut>(buf: &mut B, s: &str) {
    Amf0Value::String(s.to_owned()).write(buf);
}

pub fn write_number<B: BufMut>(buf: &mut B, n: f64) {
    Amf0Value::Number(n).write(buf);
}

pub fn write_boolean<B: BufMut>(buf: &mut B, b: bool) {
    Amf0Value::Boolean(b).write(buf);
}

pub fn write_null<B: BufMut>(buf: &mut B) {
    Amf0Value::Null.write(buf);
}

pub fn write_undefined<B: BufMut>(buf: &mut B) {
    Amf0Value::Undefined.write(buf);
}

/// Size helpers matching the writers above, marker included.
pub fn str_size(s: &str) -> usize {
    Amf0Value::String(s.to_owned()).size()
}

pub const NUMBER_SIZE: usize = 1 + 8;
pub const BOOLEAN_SIZE: usize = 1 + 1;
pub const NULL_SIZE: usize = 1;
pub const UNDEFINED_SIZE: usize = 1;

fn read_utf8<B: Buf>(buf: &mut B, len: usize) -> Result<String> {
    if buf.remaining() < len {
        return Err(Error::ErrShortBuffer);
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| Error::InvalidUtf8)
}
