//! PDF object parser.
//!
//! Recursive descent over the lexer's tokens: read a token, decide how to
//! parse, and recurse for arrays and dictionaries. Indirect objects
//! (`N G obj ... endobj`) are parsed by [`parse_indirect_object`], which is
//! what the document model uses to load objects at xref offsets.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dictionary, Object, ObjectRef};
use nom::IResult;

/// Decode escape sequences in PDF literal strings (ISO 32000-1, 7.3.4.2).
///
/// ```
/// # use pdf_seal::parser::decode_literal_string_escapes;
/// let decoded = decode_literal_string_escapes(b"Section \\247 (a\\)");
/// assert_eq!(decoded, b"Section \xa7 (a)");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            result.push(raw[i]);
            i += 1;
            continue;
        }

        let escaped = raw[i + 1];
        i += 2;
        match escaped {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(0x08),
            b'f' => result.push(0x0C),
            b'(' | b')' | b'\\' => result.push(escaped),
            // Line continuation
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut octal = u32::from(escaped - b'0');
                let mut digits = 1;
                while digits < 3 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            octal = octal * 8 + u32::from(d - b'0');
                            i += 1;
                            digits += 1;
                        },
                        _ => break,
                    }
                }
                result.push((octal & 0xFF) as u8);
            },
            // Unknown escape: the backslash is dropped
            other => result.push(other),
        }
    }

    result
}

/// Decode hex string digits. Whitespace is ignored and an odd trailing digit
/// is padded with 0.
pub fn decode_hex(hex_bytes: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .filter_map(|&c| (c as char).to_digit(16).map(|d| d as u8))
        .collect();

    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

/// Deepest array/dictionary nesting accepted.
const MAX_NESTING_DEPTH: usize = 100;

fn tag_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// Parse a PDF object from input bytes.
///
/// ```
/// use pdf_seal::parser::parse_object;
///
/// let (_, obj) = parse_object(b"<< /Type /Page /Parent 2 0 R >>").unwrap();
/// assert!(obj.as_dict().is_some());
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    parse_nested(input, 0)
}

fn parse_nested(input: &[u8], depth: usize) -> IResult<&[u8], Object> {
    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),
        Token::Integer(i) => {
            // `obj gen R` lookahead
            if let Ok((after_gen, Token::Integer(gen))) = token(input) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if (0..=i64::from(u32::MAX)).contains(&i) && (0..=65535).contains(&gen) {
                        let obj_ref = ObjectRef::new(i as u32, gen as u16);
                        return Ok((after_r, Object::Reference(obj_ref)));
                    }
                }
            }
            Ok((input, Object::Integer(i)))
        },
        Token::Real(r) => Ok((input, Object::Real(r))),
        Token::LiteralString(raw) => Ok((input, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(hex) => Ok((input, Object::String(decode_hex(hex)))),
        Token::Name(name) => Ok((input, Object::Name(name))),
        Token::ArrayStart => parse_array(input, depth + 1),
        Token::DictStart => {
            let (remaining, dict) = parse_dictionary(input, depth + 1)?;

            if let Ok((stream_input, Token::StreamStart)) = token(remaining) {
                let (rest, data) = parse_stream_data(stream_input, &dict)?;
                return Ok((
                    rest,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::from(data),
                    },
                ));
            }

            Ok((remaining, Object::Dictionary(dict)))
        },
        _ => Err(tag_error(input)),
    }
}

/// Parse stream data after the `stream` keyword.
///
/// A direct /Length is trusted when `endstream` follows it; otherwise (indirect
/// or wrong length) the data runs up to the next `endstream` keyword.
fn parse_stream_data<'a>(input: &'a [u8], dict: &Dictionary) -> IResult<&'a [u8], Vec<u8>> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    if let Some(length) = dict.get("Length").and_then(|l| l.as_integer()) {
        let length = length.max(0) as usize;
        if length <= input.len() {
            if let Ok((rest, Token::StreamEnd)) = token(&input[length..]) {
                return Ok((rest, input[..length].to_vec()));
            }
        }
        log::debug!("Stream /Length {} does not reach endstream, scanning instead", length);
    }

    let keyword = b"endstream";
    let pos = input
        .windows(keyword.len())
        .position(|window| window == keyword)
        .ok_or_else(|| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Eof)))?;

    let mut data = &input[..pos];
    if data.ends_with(b"\r\n") {
        data = &data[..data.len() - 2];
    } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
        data = &data[..data.len() - 1];
    }

    Ok((&input[pos + keyword.len()..], data.to_vec()))
}

fn check_depth(input: &[u8], depth: usize) -> IResult<&[u8], ()> {
    if depth > MAX_NESTING_DEPTH {
        log::warn!("Object nesting exceeds {} levels", MAX_NESTING_DEPTH);
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    Ok((input, ()))
}

/// Parse the body of an array after `[`.
fn parse_array(input: &[u8], depth: usize) -> IResult<&[u8], Object> {
    check_depth(input, depth)?;
    let mut objects = Vec::new();
    let mut remaining = input;

    loop {
        if let Ok((rest, Token::ArrayEnd)) = token(remaining) {
            return Ok((rest, Object::Array(objects)));
        }
        let (rest, obj) = parse_nested(remaining, depth)?;
        objects.push(obj);
        remaining = rest;
    }
}

/// Parse the body of a dictionary after `<<`. Keys must be names.
fn parse_dictionary(input: &[u8], depth: usize) -> IResult<&[u8], Dictionary> {
    check_depth(input, depth)?;
    let mut dict = Dictionary::new();
    let mut remaining = input;

    loop {
        let (rest, tok) = token(remaining)?;
        match tok {
            Token::DictEnd => return Ok((rest, dict)),
            Token::Name(key) => {
                let (rest, value) = parse_nested(rest, depth)?;
                dict.insert(key, value);
                remaining = rest;
            },
            _ => return Err(tag_error(remaining)),
        }
    }
}

/// Parse an indirect object definition `N G obj <object> endobj`.
///
/// `offset` is only used to report where parsing failed.
pub fn parse_indirect_object(input: &[u8], offset: usize) -> Result<(ObjectRef, Object)> {
    let malformed = |what: &str| {
        Error::MalformedDocument(format!("{} in indirect object at byte {}", what, offset))
    };

    let (rest, id) = match token(input) {
        Ok((rest, Token::Integer(id))) if id >= 0 => (rest, id as u32),
        _ => return Err(malformed("missing object number")),
    };
    let (rest, gen) = match token(rest) {
        Ok((rest, Token::Integer(gen))) if (0..=65535).contains(&gen) => (rest, gen as u16),
        _ => return Err(malformed("missing generation number")),
    };
    let rest = match token(rest) {
        Ok((rest, Token::ObjStart)) => rest,
        _ => return Err(malformed("missing 'obj' keyword")),
    };
    let (_, object) = parse_object(rest).map_err(|_| malformed("unparseable object body"))?;

    Ok((ObjectRef::new(id, gen), object))
}
