//! ByteRange calculation for PDF signatures.
//!
//! PDF digital signatures use a ByteRange array to specify which portions
//! of the document are covered by the signature. The signature itself is
//! stored in a placeholder that is excluded from the signed bytes.
//!
//! ## ByteRange Format
//!
//! The ByteRange is an array of four integers:
//! `[offset1, length1, offset2, length2]`
//!
//! Where:
//! - `offset1` = 0 (start of file)
//! - `length1` = byte offset where the signature value begins
//! - `offset2` = byte offset where the signature value ends
//! - `length2` = remaining bytes to end of file
//!
//! The signature value is a hex-encoded string within `<` and `>` delimiters.
//! The `/ByteRange` array is reserved with a fixed width so that it can be
//! patched after the final file length is known without moving any byte.

use crate::error::{Error, Result};

/// Digits reserved for each of the three variable ByteRange numbers.
const BYTE_RANGE_DIGITS: usize = 10;

/// `[o1 l1 o2 l2]` as written into the signature dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange(pub [usize; 4]);

impl ByteRange {
    /// Total number of signed bytes.
    pub fn signed_len(&self) -> usize {
        self.0[1] + self.0[3]
    }

    /// PDF array text, e.g. `[0 100 2150 300]`.
    pub fn to_pdf_array(&self) -> String {
        let [a, b, c, d] = self.0;
        format!("[{} {} {} {}]", a, b, c, d)
    }
}

/// Where the placeholder sits in a reserved document.
///
/// Computed for exactly one skeleton; never reuse it for other bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderLayout {
    /// `(offset, length)` of the bytes before the placeholder
    pub pre_range: (usize, usize),
    /// `(offset, length)` of the bytes after the placeholder
    pub post_range: (usize, usize),
    /// Offset of the placeholder's opening `<`
    pub placeholder_offset: usize,
    /// Reserved signature size in bytes, before hex encoding
    pub max_length: usize,
}

impl PlaceholderLayout {
    /// Size of the placeholder in the file: `2 * max_length + 2`.
    pub fn placeholder_len(&self) -> usize {
        self.max_length * 2 + 2
    }

    /// Length of the document the layout describes.
    pub fn file_len(&self) -> usize {
        self.post_range.0 + self.post_range.1
    }

    /// The ByteRange covering everything but the placeholder.
    pub fn byte_range(&self) -> ByteRange {
        ByteRange([self.pre_range.0, self.pre_range.1, self.post_range.0, self.post_range.1])
    }

    /// Check that the layout fits `data` and that the placeholder is where it says.
    pub fn check_against(&self, data: &[u8]) -> Result<()> {
        ByteRangeCalculator::validate_byte_range(&self.byte_range(), data.len())?;
        let end = self.placeholder_offset.saturating_add(self.placeholder_len());
        if self.pre_range.1 != self.placeholder_offset || self.post_range.0 != end {
            return Err(Error::MalformedDocument(format!(
                "byte range {} does not exclude exactly the placeholder at {}..{}",
                self.byte_range().to_pdf_array(),
                self.placeholder_offset,
                end
            )));
        }
        match (data.get(self.placeholder_offset), end.checked_sub(1).and_then(|i| data.get(i))) {
            (Some(b'<'), Some(b'>')) => Ok(()),
            _ => Err(Error::MalformedDocument(format!(
                "no placeholder delimiters at {}..{}",
                self.placeholder_offset, end
            ))),
        }
    }
}

/// Calculator for PDF signature byte ranges.
#[derive(Debug)]
pub struct ByteRangeCalculator {
    /// Reserved signature size in bytes, before hex encoding
    max_signature_bytes: usize,
}

impl ByteRangeCalculator {
    /// Create a calculator for a placeholder holding `max_signature_bytes`.
    pub fn new(max_signature_bytes: usize) -> Self {
        Self {
            max_signature_bytes,
        }
    }

    /// Size of the `/Contents` value in the file (hex digits plus brackets).
    pub fn placeholder_size(&self) -> usize {
        self.max_signature_bytes * 2 + 2
    }

    /// Placeholder text for the `/Contents` value: `<000…000>`.
    pub fn generate_placeholder(&self) -> String {
        format!("<{}>", "0".repeat(self.max_signature_bytes * 2))
    }

    /// Fixed-width `/ByteRange` value reserved before the final offsets are known.
    pub fn byte_range_placeholder() -> String {
        let zeros = "0".repeat(BYTE_RANGE_DIGITS);
        format!("[0 {z} {z} {z}]", z = zeros)
    }

    /// Layout for a file of `file_size` bytes with the placeholder at `contents_offset`.
    pub fn layout(&self, file_size: usize, contents_offset: usize) -> Result<PlaceholderLayout> {
        let after = contents_offset.saturating_add(self.placeholder_size());
        if after > file_size {
            return Err(Error::MalformedDocument(format!(
                "placeholder at {} ends past the document end {}",
                contents_offset, file_size
            )));
        }

        Ok(PlaceholderLayout {
            pre_range: (0, contents_offset),
            post_range: (after, file_size - after),
            placeholder_offset: contents_offset,
            max_length: self.max_signature_bytes,
        })
    }

    /// ByteRange text padded with spaces to exactly the reserved width.
    pub fn format_byte_range_fixed(byte_range: &ByteRange) -> Result<String> {
        let width = Self::byte_range_placeholder().len();
        let text = byte_range.to_pdf_array();
        if text.len() > width {
            return Err(Error::UnsupportedFeature(format!(
                "byte range {} does not fit the reserved {} characters",
                text, width
            )));
        }
        Ok(format!("{:<width$}", text, width = width))
    }

    /// Check that a ByteRange covers the entire document except one gap.
    pub fn validate_byte_range(byte_range: &ByteRange, file_size: usize) -> Result<()> {
        let [offset1, length1, offset2, length2] = byte_range.0;

        if offset1 != 0 {
            return Err(Error::MalformedDocument(format!(
                "ByteRange must start at 0, got {}",
                offset1
            )));
        }

        let actual_end = offset2.saturating_add(length2);
        if actual_end != file_size {
            return Err(Error::MalformedDocument(format!(
                "ByteRange must end at file size {}, got {}",
                file_size, actual_end
            )));
        }

        if length1 > offset2 {
            return Err(Error::MalformedDocument(format!(
                "ByteRange first range ({}) overlaps with second range start ({})",
                length1, offset2
            )));
        }

        Ok(())
    }
}
