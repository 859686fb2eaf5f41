//! Minimal DER writer for the CMS structures.
//!
//! Only definite-length encodings are produced. Object identifiers are passed
//! as their already-encoded content bytes.

use chrono::{DateTime, Datelike, Utc};

/// Universal and context tags used by the encoder.
pub mod tag {
    /// INTEGER
    pub const INTEGER: u8 = 0x02;
    /// OCTET STRING
    pub const OCTET_STRING: u8 = 0x04;
    /// NULL
    pub const NULL: u8 = 0x05;
    /// OBJECT IDENTIFIER
    pub const OID: u8 = 0x06;
    /// UTCTime
    pub const UTC_TIME: u8 = 0x17;
    /// GeneralizedTime
    pub const GENERALIZED_TIME: u8 = 0x18;
    /// SEQUENCE / SEQUENCE OF
    pub const SEQUENCE: u8 = 0x30;
    /// SET / SET OF
    pub const SET: u8 = 0x31;
    /// `[0]` constructed
    pub const CONTEXT_0: u8 = 0xA0;
    /// `[4]` constructed (directoryName in GeneralName)
    pub const CONTEXT_4: u8 = 0xA4;
}

/// DER length octets.
pub fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let mut out = Vec::with_capacity(1 + bytes.len() - skip);
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
    out
}

/// Tag, length, value.
pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let len = encode_length(content.len());
    let mut out = Vec::with_capacity(1 + len.len() + content.len());
    out.push(tag);
    out.extend_from_slice(&len);
    out.extend_from_slice(content);
    out
}

/// SEQUENCE of already-encoded elements, in order.
pub fn sequence(elements: &[&[u8]]) -> Vec<u8> {
    tlv(tag::SEQUENCE, &elements.concat())
}

/// SET OF with elements sorted by their encodings.
pub fn set_of(elements: Vec<Vec<u8>>) -> Vec<u8> {
    tlv(tag::SET, &set_of_content(elements))
}

/// Content octets of a SET OF, for callers that need it under another tag.
pub fn set_of_content(mut elements: Vec<Vec<u8>>) -> Vec<u8> {
    elements.sort();
    elements.concat()
}

/// Constructed context-specific wrapper, e.g. `[0]` IMPLICIT SET OF.
///
/// `content` is the inner encoding without its own tag and length.
pub fn context(tag: u8, content: &[u8]) -> Vec<u8> {
    tlv(tag, content)
}

/// Strip the tag and length of a DER element, returning its content.
pub fn content_of(der: &[u8]) -> Option<&[u8]> {
    let first_len = *der.get(1)?;
    let (header, len) = if first_len < 0x80 {
        (2, first_len as usize)
    } else {
        let n = (first_len & 0x7F) as usize;
        if n == 0 || n > std::mem::size_of::<usize>() {
            return None;
        }
        let len = der
            .get(2..2 + n)?
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        (2 + n, len)
    };
    der.get(header..header.checked_add(len)?)
}

/// INTEGER from a small non-negative value.
pub fn integer(value: u64) -> Vec<u8> {
    integer_from_unsigned(&value.to_be_bytes())
}

/// INTEGER from big-endian unsigned bytes, minimal and positive.
pub fn integer_from_unsigned(bytes: &[u8]) -> Vec<u8> {
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let trimmed = &bytes[skip..];
    let mut content = Vec::with_capacity(trimmed.len() + 1);
    if trimmed.first().map_or(true, |b| b & 0x80 != 0) {
        content.push(0);
    }
    content.extend_from_slice(trimmed);
    tlv(tag::INTEGER, &content)
}

/// OCTET STRING.
pub fn octet_string(data: &[u8]) -> Vec<u8> {
    tlv(tag::OCTET_STRING, data)
}

/// OBJECT IDENTIFIER from encoded content bytes.
pub fn oid(content: &[u8]) -> Vec<u8> {
    tlv(tag::OID, content)
}

/// NULL.
pub fn null() -> Vec<u8> {
    vec![tag::NULL, 0x00]
}

/// AlgorithmIdentifier with NULL parameters.
pub fn algorithm_identifier(oid_content: &[u8]) -> Vec<u8> {
    sequence(&[&oid(oid_content), &null()])
}

/// RFC 5280 Time: UTCTime for 1950..=2049, GeneralizedTime otherwise.
pub fn time(value: &DateTime<Utc>) -> Vec<u8> {
    let year = value.year();
    if (1950..=2049).contains(&year) {
        tlv(tag::UTC_TIME, value.format("%y%m%d%H%M%SZ").to_string().as_bytes())
    } else {
        tlv(tag::GENERALIZED_TIME, value.format("%Y%m%d%H%M%SZ").to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    /// Decode a length field, returning (length, octets consumed).
    fn decode_length(bytes: &[u8]) -> (usize, usize) {
        if bytes[0] < 0x80 {
            (bytes[0] as usize, 1)
        } else {
            let n = (bytes[0] & 0x7F) as usize;
            let len = bytes[1..=n].iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
            (len, 1 + n)
        }
    }

    #[test]
    fn test_length_forms() {
        assert_eq!(encode_length(0), vec![0x00]);
        assert_eq!(encode_length(127), vec![0x7F]);
        assert_eq!(encode_length(128), vec![0x81, 0x80]);
        assert_eq!(encode_length(256), vec![0x82, 0x01, 0x00]);
        assert_eq!(encode_length(70_000), vec![0x83, 0x01, 0x11, 0x70]);
    }

    #[test]
    fn test_integer_encoding() {
        assert_eq!(integer(0), vec![0x02, 0x01, 0x00]);
        assert_eq!(integer(1), vec![0x02, 0x01, 0x01]);
        assert_eq!(integer(127), vec![0x02, 0x01, 0x7F]);
        assert_eq!(integer(128), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(integer_from_unsigned(&[0x00, 0x00, 0x01, 0x00]), vec![0x02, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_null_and_algorithm_identifier() {
        let sha256 = [0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
        assert_eq!(
            algorithm_identifier(&sha256),
            vec![
                0x30, 0x0D, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05,
                0x00
            ]
        );
    }

    #[test]
    fn test_set_of_is_sorted() {
        let set = set_of(vec![vec![0x04, 0x01, 0x02], vec![0x02, 0x01, 0x05], vec![0x04, 0x01, 0x01]]);
        assert_eq!(set, vec![0x31, 0x09, 0x02, 0x01, 0x05, 0x04, 0x01, 0x01, 0x04, 0x01, 0x02]);
    }

    #[test]
    fn test_time_choice() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 13, 7, 9).unwrap();
        assert_eq!(time(&t), tlv(tag::UTC_TIME, b"240305130709Z"));
        let late = Utc.with_ymd_and_hms(2050, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(time(&late), tlv(tag::GENERALIZED_TIME, b"20500101000000Z"));
        let early = Utc.with_ymd_and_hms(1949, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(time(&early)[0], tag::GENERALIZED_TIME);
    }

    #[test]
    fn test_content_of() {
        let inner = vec![0xAB; 300];
        let wrapped = octet_string(&inner);
        assert_eq!(content_of(&wrapped), Some(&inner[..]));
        assert_eq!(content_of(&wrapped[..wrapped.len() - 1]), None);
        assert_eq!(content_of(&[0x30]), None);
    }

    proptest! {
        #[test]
        fn prop_length_round_trip(len in 0usize..(1 << 24)) {
            let encoded = encode_length(len);
            let (decoded, consumed) = decode_length(&encoded);
            prop_assert_eq!(decoded, len);
            prop_assert_eq!(consumed, encoded.len());
            // minimal: long form never has a leading zero octet
            if encoded.len() > 1 {
                prop_assert!(encoded[1] != 0);
                prop_assert!(len >= 0x80);
            }
        }

        #[test]
        fn prop_tlv_content_recoverable(data in proptest::collection::vec(any::<u8>(), 0..600)) {
            let encoded = tlv(tag::OCTET_STRING, &data);
            prop_assert_eq!(content_of(&encoded), Some(&data[..]));
        }

        #[test]
        fn prop_integer_is_positive_and_minimal(value in any::<u64>()) {
            let encoded = integer(value);
            let content = content_of(&encoded).unwrap();
            prop_assert!(content[0] & 0x80 == 0);
            if content.len() > 1 {
                prop_assert!(content[0] != 0 || content[1] & 0x80 != 0);
            }
        }
    }
}
