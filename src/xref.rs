//! Cross-reference parsing.
//!
//! The xref maps object numbers to byte offsets (or to a slot in an object
//! stream), enabling random access to the objects a signing update rewrites.
//! Both traditional tables (PDF 1.0-1.4) and cross-reference streams
//! (PDF 1.5+) are supported, and `/Prev` chains from earlier incremental
//! updates are followed so the newest entry for each object wins.

use crate::error::{Error, Result};
use crate::lexer::is_whitespace;
use crate::object::{Dictionary, Object};
use crate::parser::{parse_indirect_object, parse_object};
use std::collections::{HashMap, HashSet};

/// Maximum number of chained xref sections followed through /Prev.
const MAX_PREV_DEPTH: usize = 100;

/// How far from the end of the file `startxref` is searched for.
const STARTXREF_WINDOW: usize = 2048;

/// Cross-reference table entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryType {
    /// Entry for a free object
    Free,
    /// Entry for an uncompressed object at a byte offset
    Uncompressed,
    /// Entry for an object stored in an object stream (PDF 1.5+)
    Compressed,
}

/// Cross-reference table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XRefEntry {
    /// Type of entry
    pub entry_type: XRefEntryType,
    /// Byte offset (uncompressed) or object stream number (compressed)
    pub offset: u64,
    /// Generation number (uncompressed) or index within the object stream (compressed)
    pub generation: u16,
}

impl XRefEntry {
    /// Create a new uncompressed entry.
    pub fn uncompressed(offset: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Uncompressed,
            offset,
            generation,
        }
    }

    /// Create a new compressed entry (object in an object stream).
    pub fn compressed(stream_obj_num: u64, index_in_stream: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Compressed,
            offset: stream_obj_num,
            generation: index_in_stream,
        }
    }

    /// Create a new free entry.
    pub fn free(next_free: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Free,
            offset: next_free,
            generation,
        }
    }

    /// Whether the entry points at a live object.
    pub fn in_use(&self) -> bool {
        self.entry_type != XRefEntryType::Free
    }
}

/// Flavour of a cross-reference section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefKind {
    /// `xref` keyword, fixed-width text entries and a `trailer` dictionary
    Table,
    /// `/Type /XRef` stream whose dictionary doubles as the trailer
    Stream,
}

/// Cross-reference table that maps object numbers to their locations.
#[derive(Debug, Clone)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Dictionary,
    kind: XRefKind,
}

impl CrossRefTable {
    fn new(kind: XRefKind) -> Self {
        Self {
            entries: HashMap::new(),
            trailer: Dictionary::new(),
            kind,
        }
    }

    /// Trailer of the newest section.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Flavour of the newest section.
    pub fn kind(&self) -> XRefKind {
        self.kind
    }

    /// Add an entry to the cross-reference table.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Get an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Highest object number with an entry.
    pub fn max_object_number(&self) -> Option<u32> {
        self.entries.keys().copied().max()
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge the entries of a hybrid file's `/XRefStm` stream into the table
    /// section that references it. In-use table entries win; free or missing
    /// ones are taken from the stream.
    fn merge_hidden(&mut self, hidden: CrossRefTable) {
        for (obj_num, entry) in hidden.entries {
            match self.entries.get(&obj_num) {
                Some(existing) if existing.in_use() => {},
                _ => {
                    self.entries.insert(obj_num, entry);
                },
            }
        }
    }

    /// Merge an older section into this one. Entries already present win,
    /// and the newest trailer is kept.
    fn merge_from(&mut self, older: CrossRefTable) {
        for (obj_num, entry) in older.entries {
            self.entries.entry(obj_num).or_insert(entry);
        }
    }
}

/// Find the offset recorded after the last `startxref` keyword.
pub fn find_xref_offset(data: &[u8]) -> Result<u64> {
    let window_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let window = &data[window_start..];
    let keyword = b"startxref";

    let pos = window
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or_else(|| Error::MalformedDocument("startxref not found".to_string()))?;

    let mut cursor = ByteCursor::new(window, pos + keyword.len());
    cursor.skip_ws();
    cursor
        .read_uint()
        .ok_or_else(|| Error::MalformedDocument("startxref is not followed by an offset".to_string()))
}

/// Parse the cross-reference section at `offset` and every older section
/// reachable through `/Prev`.
pub fn parse_xref(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    let mut table = parse_section(data, offset)?;
    visited.insert(offset);

    let mut prev = prev_offset(&table.trailer);
    while let Some(older_offset) = prev {
        if !visited.insert(older_offset) {
            log::warn!("Circular /Prev chain at offset {}, stopping", older_offset);
            break;
        }
        if visited.len() > MAX_PREV_DEPTH {
            return Err(Error::MalformedDocument(format!(
                "xref /Prev chain exceeds {} sections",
                MAX_PREV_DEPTH
            )));
        }

        log::debug!("Following /Prev to xref section at offset {}", older_offset);
        let older = parse_section(data, older_offset)?;
        prev = prev_offset(older.trailer());
        table.merge_from(older);
    }

    Ok(table)
}

fn prev_offset(trailer: &Dictionary) -> Option<u64> {
    trailer
        .get("Prev")
        .and_then(|p| p.as_integer())
        .filter(|p| *p >= 0)
        .map(|p| p as u64)
}

/// Parse a single section, detecting its flavour.
fn parse_section(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    let start = section_start(data, offset)?;
    if data[start..].starts_with(b"xref") {
        log::debug!("Traditional xref table at offset {}", offset);
        let mut table = parse_traditional_xref(data, start)?;
        if let Some(stm_offset) = xref_stm_offset(&table.trailer) {
            match section_start(data, stm_offset).and_then(|s| parse_xref_stream(data, s)) {
                Ok(hidden) => {
                    log::debug!(
                        "Hybrid file: {} entries from /XRefStm at offset {}",
                        hidden.len(),
                        stm_offset
                    );
                    table.merge_hidden(hidden);
                },
                Err(e) => log::warn!("Ignoring /XRefStm at offset {}: {}", stm_offset, e),
            }
        }
        Ok(table)
    } else {
        log::debug!("Cross-reference stream at offset {}", offset);
        parse_xref_stream(data, start)
    }
}

/// Validate a section offset and skip leading whitespace.
fn section_start(data: &[u8], offset: u64) -> Result<usize> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|s| *s < data.len())
        .ok_or_else(|| {
            Error::MalformedDocument(format!("xref offset {} is outside the file", offset))
        })?;
    let mut cursor = ByteCursor::new(data, start);
    cursor.skip_ws();
    Ok(cursor.pos)
}

fn xref_stm_offset(trailer: &Dictionary) -> Option<u64> {
    trailer
        .get("XRefStm")
        .and_then(|p| p.as_integer())
        .filter(|p| *p >= 0)
        .map(|p| p as u64)
}

/// Parse a traditional cross-reference table.
///
/// ```text
/// xref
/// 0 6
/// 0000000000 65535 f
/// 0000000018 00000 n
/// ...
/// trailer
/// << /Size 6 /Root 1 0 R >>
/// ```
fn parse_traditional_xref(data: &[u8], start: usize) -> Result<CrossRefTable> {
    let malformed = |what: &str, at: usize| {
        Error::MalformedDocument(format!("{} in xref table at byte {}", what, at))
    };

    let mut table = CrossRefTable::new(XRefKind::Table);
    let mut cursor = ByteCursor::new(data, start + 4);

    loop {
        cursor.skip_ws();
        if cursor.starts_with(b"trailer") {
            let trailer_start = cursor.pos + b"trailer".len();
            let (_, trailer) = parse_object(&data[trailer_start..])
                .map_err(|_| malformed("unparseable trailer", trailer_start))?;
            match trailer {
                Object::Dictionary(dict) => table.trailer = dict,
                _ => return Err(malformed("trailer is not a dictionary", trailer_start)),
            }
            return Ok(table);
        }

        let first = cursor
            .read_uint()
            .ok_or_else(|| malformed("expected subsection header", cursor.pos))?;
        cursor.skip_ws();
        let count = cursor
            .read_uint()
            .ok_or_else(|| malformed("expected subsection count", cursor.pos))?;
        if count > 10_000_000 {
            return Err(malformed("subsection count exceeds limit", cursor.pos));
        }

        for i in 0..count {
            cursor.skip_ws();
            let offset = cursor
                .read_uint()
                .ok_or_else(|| malformed("expected entry offset", cursor.pos))?;
            cursor.skip_ws();
            let generation = cursor
                .read_uint()
                .ok_or_else(|| malformed("expected entry generation", cursor.pos))?;
            cursor.skip_ws();
            let flag = cursor.next_byte();

            let object_number = u32::try_from(first + i)
                .map_err(|_| malformed("object number out of range", cursor.pos))?;
            let generation = generation.min(u64::from(u16::MAX)) as u16;
            let entry = match flag {
                Some(b'n') => XRefEntry::uncompressed(offset, generation),
                Some(b'f') => XRefEntry::free(offset, generation),
                _ => return Err(malformed("entry type must be 'n' or 'f'", cursor.pos)),
            };
            table.add_entry(object_number, entry);
        }
    }
}

/// Parse a cross-reference stream (`/Type /XRef`).
///
/// Each entry has three big-endian fields whose widths come from `/W`:
/// type (0 free, 1 uncompressed, 2 compressed), then offset or object stream
/// number, then generation or index within the object stream.
fn parse_xref_stream(data: &[u8], start: usize) -> Result<CrossRefTable> {
    let malformed =
        |what: &str| Error::MalformedDocument(format!("{} in xref stream at byte {}", what, start));

    let (_, stream) = parse_indirect_object(&data[start..], start)?;
    let dict = match &stream {
        Object::Stream { dict, .. } => dict,
        _ => return Err(malformed("object is not a stream")),
    };
    if dict.get("Type").and_then(|t| t.as_name()) != Some("XRef") {
        return Err(malformed("missing /Type /XRef"));
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|w| w.as_array())
        .map(|w| w.iter().filter_map(|v| v.as_integer()).map(|v| v.max(0) as usize).collect())
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|w| *w > 8) {
        return Err(malformed("invalid /W array"));
    }
    let (w1, w2, w3) = (widths[0], widths[1], widths[2]);
    let entry_size = w1 + w2 + w3;

    let size = dict
        .get("Size")
        .and_then(|s| s.as_integer())
        .ok_or_else(|| malformed("missing /Size"))?;

    let ranges: Vec<(u64, u64)> = match dict.get("Index").and_then(|i| i.as_array()) {
        Some(index) => index
            .chunks(2)
            .filter_map(|pair| match pair {
                [first, count] => Some((first.as_integer()?.max(0) as u64, count.as_integer()?.max(0) as u64)),
                _ => None,
            })
            .collect(),
        None => vec![(0, size.max(0) as u64)],
    };

    let decoded = stream.decode_stream_data()?;
    let mut table = CrossRefTable::new(XRefKind::Stream);
    let mut rows = decoded.chunks_exact(entry_size.max(1));

    for (first, count) in ranges {
        for i in 0..count {
            let row = rows.next().ok_or_else(|| malformed("truncated entry data"))?;
            let entry_type = if w1 > 0 { read_int(&row[..w1]) } else { 1 };
            let field2 = read_int(&row[w1..w1 + w2]);
            let field3 = read_int(&row[w1 + w2..]);

            let entry = match entry_type {
                0 => XRefEntry::free(field2, field3 as u16),
                1 => XRefEntry::uncompressed(field2, field3 as u16),
                2 => XRefEntry::compressed(field2, field3 as u16),
                other => {
                    log::debug!("Ignoring xref stream entry of unknown type {}", other);
                    continue;
                },
            };
            let object_number =
                u32::try_from(first + i).map_err(|_| malformed("object number out of range"))?;
            table.add_entry(object_number, entry);
        }
    }

    table.trailer = dict.clone();
    Ok(table)
}

/// Read a big-endian unsigned integer.
fn read_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Minimal forward cursor over the file bytes.
struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.data.len() && is_whitespace(self.data[self.pos]) {
            self.pos += 1;
        }
    }

    fn starts_with(&self, keyword: &[u8]) -> bool {
        self.data
            .get(self.pos..)
            .is_some_and(|rest| rest.starts_with(keyword))
    }

    fn read_uint(&mut self) -> Option<u64> {
        let start = self.pos;
        while self.pos < self.data.len() && self.data[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }

    fn next_byte(&mut self) -> Option<u8> {
        let byte = self.data.get(self.pos).copied();
        self.pos += 1;
        byte
    }
}
