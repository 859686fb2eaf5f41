//! Visible signature appearance.
//!
//! [`AppearanceBuilder`] turns the signing options, the signer's common name
//! and the signing time into [`SignatureMetadata`]: the values written into
//! the signature dictionary plus the text and Form XObject shown in the
//! widget rectangle.

use super::types::SignOptions;
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::object::{Dictionary, Object};
use crate::writer::ObjectSerializer;
use chrono::{DateTime, FixedOffset};

/// Largest font size used in the appearance.
const MAX_FONT_SIZE: f64 = 12.0;
/// Smallest font size used in the appearance.
const MIN_FONT_SIZE: f64 = 4.0;
/// Inner padding of the text block, in points.
const PADDING: f64 = 2.0;
/// Line height as a multiple of the font size.
const LEADING: f64 = 1.2;
/// Resource name of the appearance font.
const FONT_RESOURCE: &str = "Helv";

/// Everything about the signature that is fixed before reservation.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureMetadata {
    /// Name shown as the signer (certificate CN unless overridden)
    pub signer_name: String,
    /// `/Reason`
    pub reason: String,
    /// `/Location`
    pub location: String,
    /// `/ContactInfo`
    pub contact_info: Option<String>,
    /// Signing time used for `/M`, the CMS signingTime and the visible text
    pub signing_time: DateTime<FixedOffset>,
    /// Normalised widget rectangle
    pub rect: Rect,
    /// Target page (1-based)
    pub page: usize,
    /// Requested field name, if any
    pub field_name: Option<String>,
}

impl SignatureMetadata {
    /// The four lines shown inside the widget.
    pub fn display_lines(&self) -> Vec<String> {
        vec![
            format!("Signed by {}", self.signer_name),
            format!("Reason: {}", self.reason),
            format!("Location: {}", self.location),
            format!("Date: {}", format_display_date(&self.signing_time)),
        ]
    }

    /// Display lines joined with newlines.
    pub fn display_text(&self) -> String {
        self.display_lines().join("\n")
    }

    /// `/M` value.
    pub fn pdf_date(&self) -> String {
        format_pdf_date(&self.signing_time)
    }

    /// Font size that fits every display line into the rectangle.
    pub fn font_size(&self) -> f64 {
        let lines = self.display_lines();
        let inner_width = (self.rect.width() - 2.0 * PADDING).max(1.0);
        let inner_height = (self.rect.height() - 2.0 * PADDING).max(1.0);

        let widest = lines
            .iter()
            .map(|l| helvetica_units(&to_winansi(l)))
            .fold(0.0_f64, f64::max);
        let by_width = if widest > 0.0 {
            inner_width * 1000.0 / widest
        } else {
            MAX_FONT_SIZE
        };
        let by_height = inner_height / (lines.len() as f64 * LEADING);

        by_width.min(by_height).clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
    }

    /// Content stream of the appearance Form XObject.
    pub fn appearance_content(&self) -> Vec<u8> {
        let size = self.font_size();
        let leading = size * LEADING;
        let (w, h) = (self.rect.width(), self.rect.height());

        let mut content = Vec::new();
        content.extend_from_slice(b"q\n");
        content.extend_from_slice(format!("0 0 {} {} re W n\n", num(w), num(h)).as_bytes());
        content.extend_from_slice(b"0.5 w 0 0 0 RG\n");
        content.extend_from_slice(
            format!("0.25 0.25 {} {} re S\n", num(w - 0.5), num(h - 0.5)).as_bytes(),
        );
        content.extend_from_slice(b"BT\n0 g\n");
        content.extend_from_slice(format!("/{} {} Tf\n", FONT_RESOURCE, num(size)).as_bytes());
        content.extend_from_slice(format!("{} TL\n", num(leading)).as_bytes());
        content.extend_from_slice(
            format!("{} {} Td\n", num(PADDING), num(h - PADDING - size)).as_bytes(),
        );
        for (i, line) in self.display_lines().iter().enumerate() {
            if i > 0 {
                content.extend_from_slice(b"T*\n");
            }
            write_literal(&mut content, &to_winansi(line));
            content.extend_from_slice(b" Tj\n");
        }
        content.extend_from_slice(b"ET\nQ");
        content
    }

    /// The appearance as a Form XObject stream.
    pub fn appearance_stream(&self) -> Object {
        let font = ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Font")),
            ("Subtype", ObjectSerializer::name("Type1")),
            ("BaseFont", ObjectSerializer::name("Helvetica")),
            ("Encoding", ObjectSerializer::name("WinAnsiEncoding")),
        ]);
        let mut fonts = Dictionary::new();
        fonts.insert(FONT_RESOURCE.to_string(), font);
        let resources = ObjectSerializer::dict(vec![("Font", Object::Dictionary(fonts))]);

        let bbox = Rect::new(0.0, 0.0, self.rect.width(), self.rect.height());
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), ObjectSerializer::name("XObject"));
        dict.insert("Subtype".to_string(), ObjectSerializer::name("Form"));
        dict.insert("BBox".to_string(), bbox.to_object());
        dict.insert("Resources".to_string(), resources);

        Object::Stream {
            dict,
            data: bytes::Bytes::from(self.appearance_content()),
        }
    }
}

/// Builds [`SignatureMetadata`] from options and certificate data.
#[derive(Debug)]
pub struct AppearanceBuilder<'o> {
    options: &'o SignOptions,
    common_name: String,
    signing_time: DateTime<FixedOffset>,
}

impl<'o> AppearanceBuilder<'o> {
    /// Create a builder for one signing operation.
    pub fn new(
        options: &'o SignOptions,
        common_name: impl Into<String>,
        signing_time: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            options,
            common_name: common_name.into(),
            signing_time,
        }
    }

    /// Produce the metadata, rejecting a rectangle with no area.
    pub fn build(self) -> Result<SignatureMetadata> {
        let rect = self.options.rect.normalized();
        if rect.is_degenerate() {
            return Err(Error::InvalidConfig(format!(
                "signature rectangle {:?} encloses no area",
                self.options.rect
            )));
        }

        Ok(SignatureMetadata {
            signer_name: self.options.name.clone().unwrap_or(self.common_name),
            reason: self.options.reason.clone(),
            location: self.options.location.clone(),
            contact_info: self.options.contact_info.clone(),
            signing_time: self.signing_time,
            rect,
            page: self.options.page,
            field_name: self.options.field_name.clone(),
        })
    }
}

/// PDF date string: `D:YYYYMMDDHHmmSS+HH'mm'`.
pub fn format_pdf_date(time: &DateTime<FixedOffset>) -> String {
    let offset = time.offset().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let offset = offset.abs();
    format!(
        "D:{}{}{:02}'{:02}'",
        time.format("%Y%m%d%H%M%S"),
        sign,
        offset / 3600,
        (offset % 3600) / 60
    )
}

/// Date shown in the appearance: `dd/MM/yyyy HH:mm:ss +zzzz`.
pub fn format_display_date(time: &DateTime<FixedOffset>) -> String {
    time.format("%d/%m/%Y %H:%M:%S %z").to_string()
}

/// Map a string to WinAnsi bytes, replacing unmappable characters with `?`.
pub fn to_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| unicode_to_winansi(c as u32).unwrap_or(b'?'))
        .collect()
}

fn unicode_to_winansi(codepoint: u32) -> Option<u8> {
    if (0x20..0x7F).contains(&codepoint) || (0xA0..=0xFF).contains(&codepoint) {
        return Some(codepoint as u8);
    }

    match codepoint {
        0x20AC => Some(0x80), // Euro sign
        0x201A => Some(0x82),
        0x0192 => Some(0x83),
        0x201E => Some(0x84),
        0x2026 => Some(0x85), // Horizontal ellipsis
        0x2020 => Some(0x86),
        0x2021 => Some(0x87),
        0x02C6 => Some(0x88),
        0x2030 => Some(0x89),
        0x0160 => Some(0x8A),
        0x2039 => Some(0x8B),
        0x0152 => Some(0x8C),
        0x017D => Some(0x8E),
        0x2018 => Some(0x91),
        0x2019 => Some(0x92),
        0x201C => Some(0x93),
        0x201D => Some(0x94),
        0x2022 => Some(0x95), // Bullet
        0x2013 => Some(0x96), // En dash
        0x2014 => Some(0x97),
        0x02DC => Some(0x98),
        0x2122 => Some(0x99), // Trade mark sign
        0x0161 => Some(0x9A),
        0x203A => Some(0x9B),
        0x0153 => Some(0x9C),
        0x017E => Some(0x9E),
        0x0178 => Some(0x9F),
        _ => None,
    }
}

/// Width of WinAnsi text in Helvetica, in 1/1000 em.
fn helvetica_units(text: &[u8]) -> f64 {
    text.iter().map(|&b| helvetica_width(b)).sum()
}

fn helvetica_width(b: u8) -> f64 {
    match b {
        b' ' | b'.' | b',' | b':' | b';' | b'/' | b'\\' | b'f' | b't' => 278.0,
        b'!' | b'(' | b')' | b'[' | b']' | b'-' | b'`' | b'r' => 333.0,
        b'{' | b'}' => 334.0,
        b'\'' | b'i' | b'j' | b'l' => 222.0,
        b'"' => 355.0,
        b'|' => 260.0,
        b'*' => 389.0,
        b'+' | b'=' | b'<' | b'>' | b'~' => 584.0,
        b'@' => 1015.0,
        b'%' => 889.0,
        b'&' => 667.0,
        b'^' => 469.0,
        b'0'..=b'9' | b'#' | b'$' | b'_' => 556.0,
        b'?' | b'c' | b'k' | b's' | b'v' | b'x' | b'y' | b'z' => 500.0,
        b'm' => 833.0,
        b'w' => 722.0,
        b'a'..=b'z' => 556.0,
        b'I' => 278.0,
        b'J' => 500.0,
        b'E' | b'P' | b'S' | b'V' | b'X' | b'Y' | b'K' => 667.0,
        b'F' | b'L' | b'T' | b'Z' => 611.0,
        b'G' | b'O' | b'Q' => 778.0,
        b'M' => 833.0,
        b'W' => 944.0,
        b'A'..=b'Z' => 722.0,
        _ => 556.0,
    }
}

/// Literal string with escapes, octal for bytes outside printable ASCII.
fn write_literal(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            },
            0x20..=0x7E => out.push(b),
            _ => out.extend_from_slice(format!("\\{:03o}", b).as_bytes()),
        }
    }
    out.push(b')');
}

/// Number with at most two decimals.
fn num(value: f64) -> String {
    let formatted = format!("{:.2}", value);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}
