//! Object stream parsing (PDF 1.5+).
//!
//! An object stream (`/Type /ObjStm`) packs several objects into one
//! compressed stream. The decoded data starts with `/N` pairs of integers
//! (object number, offset relative to `/First`), followed by the objects:
//!
//! ```text
//! 1 0 2 29 3 58
//! << /Type /Catalog /Pages 2 0 R >> << /Type /Pages ... >> << /Type /Page ... >>
//! ```

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::Object;
use crate::parser::parse_object;
use std::collections::HashMap;

/// Parse an object stream and extract all objects keyed by object number.
pub fn parse_object_stream(stream_obj: &Object) -> Result<HashMap<u32, Object>> {
    let malformed = |what: String| Error::MalformedDocument(format!("object stream: {}", what));

    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        other => return Err(malformed(format!("expected a stream, found {}", other.type_name()))),
    };
    if let Some(type_name) = dict.get("Type").and_then(|t| t.as_name()) {
        if type_name != "ObjStm" {
            return Err(malformed(format!("expected /Type /ObjStm, got /{}", type_name)));
        }
    }

    let n = dict
        .get("N")
        .and_then(|o| o.as_integer())
        .filter(|n| (0..=1_000_000).contains(n))
        .ok_or_else(|| malformed("missing or invalid /N".to_string()))? as usize;
    let first = dict
        .get("First")
        .and_then(|o| o.as_integer())
        .filter(|f| *f >= 0)
        .ok_or_else(|| malformed("missing or invalid /First".to_string()))? as usize;

    let decoded = stream_obj.decode_stream_data()?;
    if decoded.len() < first {
        return Err(malformed(format!(
            "decoded data is {} bytes, /First is {}",
            decoded.len(),
            first
        )));
    }

    let mut header = &decoded[..first];
    let mut pairs = Vec::with_capacity(n);
    for _ in 0..n {
        let (rest, obj_num) = match token(header) {
            Ok((rest, Token::Integer(v))) if v >= 0 => (rest, v as u32),
            _ => return Err(malformed("bad object number in header".to_string())),
        };
        let (rest, offset) = match token(rest) {
            Ok((rest, Token::Integer(v))) if v >= 0 => (rest, v as usize),
            _ => return Err(malformed("bad offset in header".to_string())),
        };
        pairs.push((obj_num, offset));
        header = rest;
    }

    let body = &decoded[first..];
    let mut objects = HashMap::with_capacity(n);
    for (obj_num, offset) in pairs {
        let start = body.get(offset..).ok_or_else(|| {
            malformed(format!("object {} offset {} is past the end", obj_num, offset))
        })?;
        let (_, obj) = parse_object(start)
            .map_err(|_| malformed(format!("object {} could not be parsed", obj_num)))?;
        objects.insert(obj_num, obj);
    }

    Ok(objects)
}
