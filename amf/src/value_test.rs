use bytes::{Buf, Bytes, BytesMut};

use crate::error::Error;
use crate::value::{self, Amf0Object, Amf0Value};

fn round_trip(value: &Amf0Value) -> Amf0Value {
    let mut buf = BytesMut::with_capacity(value.size());
    value.write(&mut buf);
    assert_eq!(buf.len(), value.size(), "size() must match encoding");
    let mut raw = buf.freeze();
    let decoded = Amf0Value::read(&mut raw).expect("decode");
    assert_eq!(raw.len(), 0, "decode must consume the encoding");
    decoded
}

#[test]
fn test_number_round_trip() {
    for n in [0.0, 1.0, -1.5, 12345.678, f64::MAX] {
        assert_eq!(round_trip(&Amf0Value::Number(n)), Amf0Value::Number(n));
    }
}

#[test]
fn test_number_wire_format() {
    let mut buf = BytesMut::new();
    Amf0Value::Number(1.0).write(&mut buf);
    assert_eq!(
        &buf[..],
        &[0x00, 0x3F, 0xF0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
    );
}

#[test]
fn test_string_wire_format() {
    let mut buf = BytesMut::new();
    Amf0Value::String("live".into()).write(&mut buf);
    assert_eq!(&buf[..], &[0x02, 0x00, 0x04, b'l', b'i', b'v', b'e']);
}

#[test]
fn test_boolean_and_null() {
    assert_eq!(
        round_trip(&Amf0Value::Boolean(true)),
        Amf0Value::Boolean(true)
    );
    assert_eq!(round_trip(&Amf0Value::Null), Amf0Value::Null);
    assert_eq!(round_trip(&Amf0Value::Undefined), Amf0Value::Undefined);
}

#[test]
fn test_object_round_trip_preserves_order() {
    let mut object = Amf0Object::new();
    object.set("app", Amf0Value::String("live".into()));
    object.set("tcUrl", Amf0Value::String("rtmp://host/live".into()));
    object.set("objectEncoding", Amf0Value::Number(0.0));

    let decoded = round_trip(&Amf0Value::Object(object.clone()));
    let decoded = decoded.as_object().unwrap();
    let keys: Vec<&str> = decoded.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["app", "tcUrl", "objectEncoding"]);
    assert_eq!(
        decoded.get("tcUrl"),
        Some(&Amf0Value::String("rtmp://host/live".into()))
    );
}

#[test]
fn test_object_terminator() {
    let mut buf = BytesMut::new();
    Amf0Value::Object(Amf0Object::new()).write(&mut buf);
    // Marker, empty name, object-end.
    assert_eq!(&buf[..], &[0x03, 0x00, 0x00, 0x09]);
}

#[test]
fn test_ecma_array_round_trip() {
    let mut object = Amf0Object::new();
    object.set("duration", Amf0Value::Number(0.0));
    object.set("encoder", Amf0Value::String("test".into()));
    let decoded = round_trip(&Amf0Value::EcmaArray(object.clone()));
    assert_eq!(decoded, Amf0Value::EcmaArray(object));
}

#[test]
fn test_ecma_array_count_is_advisory() {
    // Count says 9 but the terminator arrives after one property.
    let raw: &[u8] = &[
        0x08, 0x00, 0x00, 0x00, 0x09, // marker + count
        0x00, 0x01, b'a', 0x00, 0x3F, 0xF0, 0, 0, 0, 0, 0, 0, // a: 1.0
        0x00, 0x00, 0x09, // terminator
    ];
    let mut buf = Bytes::from_static(raw);
    let decoded = Amf0Value::read(&mut buf).unwrap();
    let object = decoded.as_object().unwrap();
    assert_eq!(object.len(), 1);
    assert_eq!(object.get("a"), Some(&Amf0Value::Number(1.0)));
}

#[test]
fn test_strict_array_round_trip() {
    let array = Amf0Value::StrictArray(vec![
        Amf0Value::Number(1.0),
        Amf0Value::String("x".into()),
        Amf0Value::Null,
    ]);
    assert_eq!(round_trip(&array), array);
}

#[test]
fn test_nested_object() {
    let mut inner = Amf0Object::new();
    inner.set("code", Amf0Value::String("NetStream.Play.Start".into()));
    let mut outer = Amf0Object::new();
    outer.set("info", Amf0Value::Object(inner));
    let value = Amf0Value::Object(outer);
    assert_eq!(round_trip(&value), value);
}

#[test]
fn test_truncated_input() {
    for value in [
        Amf0Value::Number(3.5),
        Amf0Value::String("truncate me".into()),
        Amf0Value::Object({
            let mut o = Amf0Object::new();
            o.set("k", Amf0Value::Number(9.0));
            o
        }),
    ] {
        let mut buf = BytesMut::new();
        value.write(&mut buf);
        for cut in 1..buf.len() {
            let mut partial = Bytes::copy_from_slice(&buf[..cut]);
            assert!(Amf0Value::read(&mut partial).is_err());
        }
    }
}

#[test]
fn test_unsupported_marker() {
    let mut buf = Bytes::from_static(&[0x0F, 0x00]);
    assert_eq!(
        Amf0Value::read(&mut buf),
        Err(Error::UnsupportedMarker(0x0F))
    );
}

#[test]
fn test_typed_readers() {
    let mut buf = BytesMut::new();
    value::write_string(&mut buf, "connect");
    value::write_number(&mut buf, 1.0);
    value::write_null(&mut buf);
    value::write_undefined(&mut buf);

    let mut raw = buf.freeze();
    assert_eq!(value::read_string(&mut raw).unwrap(), "connect");
    assert_eq!(value::read_number(&mut raw).unwrap(), 1.0);
    value::read_null(&mut raw).unwrap();
    value::read_undefined(&mut raw).unwrap();
    assert!(!raw.has_remaining());
}

#[test]
fn test_long_string() {
    let s = "x".repeat(70_000);
    let value = Amf0Value::String(s.clone());
    let mut buf = BytesMut::new();
    value.write(&mut buf);
    assert_eq!(buf[0], value::MARKER_LONG_STRING);
    let mut raw = buf.freeze();
    assert_eq!(Amf0Value::read(&mut raw).unwrap(), Amf0Value::String(s));
}
