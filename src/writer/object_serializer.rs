//! PDF object serialization.
//!
//! Serializes [`Object`]s to their byte representation. Output is compact and
//! deterministic: dictionary keys are written in sorted order so that the
//! same object always produces the same bytes.

use crate::object::{Dictionary, Object, ObjectRef};

/// Serializer for PDF objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectSerializer;

impl ObjectSerializer {
    /// Create a new object serializer.
    pub fn new() -> Self {
        Self
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (for debugging and tests).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).into_owned()
    }

    /// Append an object's serialization to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>, obj: &Object) {
        self.write_object(buf, obj);
    }

    /// Serialize an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(&self, obj_ref: ObjectRef, obj: &Object) -> Vec<u8> {
        let mut buf = format!("{} {} obj\n", obj_ref.id, obj_ref.gen).into_bytes();
        self.write_object(&mut buf, obj);
        buf.extend_from_slice(b"\nendobj\n");
        buf
    }

    fn write_object(&self, w: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => w.extend_from_slice(b"null"),
            Object::Boolean(b) => w.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => w.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => write_real(w, *r),
            Object::String(s) => write_string(w, s),
            Object::Name(n) => write_name(w, n),
            Object::Array(arr) => self.write_array(w, arr),
            Object::Dictionary(dict) => self.write_dictionary(w, dict),
            Object::Stream { dict, data } => self.write_stream(w, dict, data),
            Object::Reference(r) => w.extend_from_slice(r.to_string().as_bytes()),
        }
    }

    fn write_array(&self, w: &mut Vec<u8>, arr: &[Object]) {
        w.push(b'[');
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                w.push(b' ');
            }
            self.write_object(w, obj);
        }
        w.push(b']');
    }

    fn write_dictionary(&self, w: &mut Vec<u8>, dict: &Dictionary) {
        w.extend_from_slice(b"<<");

        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();

        for key in keys {
            if let Some(value) = dict.get(key) {
                write_name(w, key);
                w.push(b' ');
                self.write_object(w, value);
            }
        }
        w.extend_from_slice(b">>");
    }

    /// `/Length` always reflects the data actually written.
    fn write_stream(&self, w: &mut Vec<u8>, dict: &Dictionary, data: &[u8]) {
        let mut dict = dict.clone();
        dict.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary(w, &dict);
        w.extend_from_slice(b"\nstream\n");
        w.extend_from_slice(data);
        w.extend_from_slice(b"\nendstream");
    }
}

/// Write a real number in the shortest form that parses back to the same value.
fn write_real(w: &mut Vec<u8>, value: f64) {
    if value.is_finite() {
        w.extend_from_slice(value.to_string().as_bytes());
    } else {
        w.push(b'0');
    }
}

/// Literal string syntax for printable ASCII, hex syntax otherwise.
fn write_string(w: &mut Vec<u8>, data: &[u8]) {
    let is_printable = data
        .iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

    if is_printable {
        w.push(b'(');
        for &byte in data {
            match byte {
                b'(' => w.extend_from_slice(b"\\("),
                b')' => w.extend_from_slice(b"\\)"),
                b'\\' => w.extend_from_slice(b"\\\\"),
                b'\n' => w.extend_from_slice(b"\\n"),
                b'\r' => w.extend_from_slice(b"\\r"),
                b'\t' => w.extend_from_slice(b"\\t"),
                _ => w.push(byte),
            }
        }
        w.push(b')');
    } else {
        w.push(b'<');
        w.extend_from_slice(hex_upper(data).as_bytes());
        w.push(b'>');
    }
}

/// Names start with `/`; delimiters, whitespace and non-ASCII bytes become `#xx`.
///
/// Names hold one `char` per byte (see [`crate::lexer::decode_name_escapes`]).
/// Characters above U+00FF only come from names built in code and are
/// written as their UTF-8 bytes.
fn write_name(w: &mut Vec<u8>, name: &str) {
    w.push(b'/');
    for byte in name_bytes(name) {
        match byte {
            b'!'
            | b'"'
            | b'$'
            | b'&'
            | b'\''
            | b'*'..=b'.'
            | b'0'..=b'9'
            | b';'
            | b'='
            | b'?'
            | b'@'
            | b'A'..=b'Z'
            | b'^'..=b'z'
            | b'|'
            | b'~' => w.push(byte),
            _ => w.extend_from_slice(format!("#{:02X}", byte).as_bytes()),
        }
    }
}

/// Raw bytes of a name as stored in [`Object::Name`].
pub fn name_bytes(name: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(name.len());
    for c in name.chars() {
        match u8::try_from(c) {
            Ok(byte) => bytes.push(byte),
            Err(_) => bytes.extend_from_slice(c.encode_utf8(&mut [0u8; 4]).as_bytes()),
        }
    }
    bytes
}

/// Uppercase hex encoding.
pub fn hex_upper(data: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(data.len() * 2);
    for &b in data {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0F) as usize] as char);
    }
    out
}

/// Helper functions for building PDF objects.
impl ObjectSerializer {
    /// Create a Name object.
    pub fn name(s: &str) -> Object {
        Object::Name(s.to_string())
    }

    /// Create a text string: ASCII as-is, anything else as UTF-16BE with BOM.
    pub fn text_string(s: &str) -> Object {
        if s.is_ascii() {
            Object::String(s.as_bytes().to_vec())
        } else {
            let mut bytes = vec![0xFE, 0xFF];
            for unit in s.encode_utf16() {
                bytes.extend_from_slice(&unit.to_be_bytes());
            }
            Object::String(bytes)
        }
    }

    /// Create an Integer object.
    pub fn integer(i: i64) -> Object {
        Object::Integer(i)
    }

    /// Create a Dictionary object.
    pub fn dict(entries: Vec<(&str, Object)>) -> Object {
        Object::Dictionary(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    /// Create a Reference object.
    pub fn reference(obj_ref: ObjectRef) -> Object {
        Object::Reference(obj_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ser(obj: &Object) -> String {
        ObjectSerializer::new().serialize_to_string(obj)
    }

    #[test]
    fn test_serialize_scalars() {
        assert_eq!(ser(&Object::Null), "null");
        assert_eq!(ser(&Object::Boolean(true)), "true");
        assert_eq!(ser(&Object::Integer(-123)), "-123");
        assert_eq!(ser(&Object::Reference(ObjectRef::new(10, 0))), "10 0 R");
    }

    #[test]
    fn test_serialize_real() {
        assert_eq!(ser(&Object::Real(3.14258)), "3.14258");
        assert_eq!(ser(&Object::Real(1.0)), "1");
        assert_eq!(ser(&Object::Real(0.5)), "0.5");
        assert_eq!(ser(&Object::Real(f64::NAN)), "0");
    }

    #[test]
    fn test_serialize_string() {
        assert_eq!(ser(&Object::String(b"Hello".to_vec())), "(Hello)");
        assert_eq!(ser(&Object::String(b"Test (parens)".to_vec())), "(Test \\(parens\\))");
        assert_eq!(ser(&Object::String(vec![0x00, 0xFF, 0x80])), "<00FF80>");
    }

    #[test]
    fn test_text_string_utf16() {
        let obj = ObjectSerializer::text_string("Málaga");
        let bytes = obj.as_string().unwrap();
        assert_eq!(&bytes[..4], &[0xFE, 0xFF, 0x00, b'M']);
        assert_eq!(bytes.len(), 2 + 6 * 2);
        assert_eq!(ObjectSerializer::text_string("Madrid").as_string(), Some(&b"Madrid"[..]));
    }

    #[test]
    fn test_serialize_name_escapes() {
        assert_eq!(ser(&Object::Name("Adobe.PPKLite".to_string())), "/Adobe.PPKLite");
        assert_eq!(ser(&Object::Name("Name With Space".to_string())), "/Name#20With#20Space");
        assert_eq!(ser(&Object::Name("a/b(c)".to_string())), "/a#2Fb#28c#29");
    }

    #[test]
    fn test_names_and_reals_round_trip() {
        let input: &[u8] = b"<</Font <</F#E91 4 0 R/F#E81 5 0 R>>/MediaBox [0 0 595.27559 841.88976]>>";
        let (_, obj) = crate::parser::parse_object(input).unwrap();
        let out = ser(&obj);
        assert!(out.contains("/F#E91 4 0 R"));
        assert!(out.contains("/F#E81 5 0 R"));
        assert!(out.contains("[0 0 595.27559 841.88976]"));

        let (_, reparsed) = crate::parser::parse_object(out.as_bytes()).unwrap();
        assert_eq!(reparsed, obj);
    }

    #[test]
    fn test_serialize_dictionary_sorted() {
        let dict = ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Sig")),
            ("Filter", ObjectSerializer::name("Adobe.PPKLite")),
            ("F", ObjectSerializer::integer(132)),
        ]);
        assert_eq!(ser(&dict), "<</F 132/Filter /Adobe.PPKLite/Type /Sig>>");
    }

    #[test]
    fn test_serialize_stream_sets_length() {
        let mut dict = Dictionary::new();
        dict.insert("Length".to_string(), Object::Integer(999));
        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"stream data"),
        };
        let out = ser(&stream);
        assert!(out.starts_with("<</Length 11>>\nstream\nstream data\nendstream"));
    }

    #[test]
    fn test_serialize_indirect() {
        let bytes = ObjectSerializer::new().serialize_indirect(ObjectRef::new(7, 0), &Object::Integer(42));
        assert_eq!(bytes, b"7 0 obj\n42\nendobj\n");
    }

    #[test]
    fn test_output_reparses() {
        let dict = ObjectSerializer::dict(vec![
            ("Reason", ObjectSerializer::text_string("Firma (prueba) \\ ok")),
            ("Kids", Object::Array(vec![Object::Reference(ObjectRef::new(3, 0))])),
        ]);
        let bytes = ObjectSerializer::new().serialize(&dict);
        let (_, parsed) = crate::parser::parse_object(&bytes).unwrap();
        assert_eq!(parsed, dict);
    }

    #[test]
    fn test_hex_upper() {
        assert_eq!(hex_upper(&[0x00, 0xAB, 0x7F]), "00AB7F");
    }
}
