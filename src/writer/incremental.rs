//! Incremental updates.
//!
//! An update appends new or replaced objects after the original bytes,
//! followed by a cross-reference section of the same flavour as the
//! document's newest one and a trailer linking back through `/Prev`. The
//! original bytes are never touched, so byte offsets inside them stay valid.

use super::object_serializer::ObjectSerializer;
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::xref::XRefKind;
use std::collections::HashMap;

/// Trailer keys carried over from the previous trailer.
const CARRIED_TRAILER_KEYS: [&str; 3] = ["Root", "Info", "ID"];

/// Pending incremental update for one document.
#[derive(Debug)]
pub struct IncrementalUpdate<'d, 'a> {
    doc: &'d PdfDocument<'a>,
    next_id: u32,
    /// Object bodies in write order
    objects: Vec<(ObjectRef, Vec<u8>)>,
}

/// Result of writing an update.
#[derive(Debug, Clone)]
pub struct WrittenUpdate {
    /// Original bytes followed by the update
    pub bytes: Vec<u8>,
    /// Offset of each written object's body (just past `N G obj\n`)
    pub body_offsets: HashMap<ObjectRef, usize>,
    /// Offset of the new cross-reference section
    pub startxref: usize,
}

impl WrittenUpdate {
    /// Offset of an object's body within [`WrittenUpdate::bytes`].
    pub fn body_offset(&self, obj_ref: ObjectRef) -> Result<usize> {
        self.body_offsets.get(&obj_ref).copied().ok_or_else(|| {
            Error::MalformedDocument(format!("object {} was not part of the update", obj_ref))
        })
    }
}

impl<'d, 'a> IncrementalUpdate<'d, 'a> {
    /// Start an update on top of `doc`.
    pub fn new(doc: &'d PdfDocument<'a>) -> Self {
        Self {
            doc,
            next_id: doc.size().max(1),
            objects: Vec::new(),
        }
    }

    /// Allocate a fresh object number.
    ///
    /// Fails once the object number space is exhausted, which only happens
    /// when the trailer declares an absurd `/Size`.
    pub fn allocate(&mut self) -> Result<ObjectRef> {
        let next = self.next_id.checked_add(1).ok_or_else(|| {
            Error::MalformedDocument(format!(
                "cannot allocate an object number above {}",
                self.next_id
            ))
        })?;
        let obj_ref = ObjectRef::new(self.next_id, 0);
        self.next_id = next;
        Ok(obj_ref)
    }

    /// Add (or replace) an object, serialized with [`ObjectSerializer`].
    pub fn add_object(&mut self, obj_ref: ObjectRef, obj: &Object) {
        let body = ObjectSerializer::new().serialize(obj);
        self.add_raw_object(obj_ref, body);
    }

    /// Add (or replace) an object whose body is already serialized.
    ///
    /// Used when the caller needs to control the exact byte layout of the body.
    pub fn add_raw_object(&mut self, obj_ref: ObjectRef, body: Vec<u8>) {
        if let Some(existing) = self.objects.iter_mut().find(|(r, _)| *r == obj_ref) {
            existing.1 = body;
        } else {
            self.objects.push((obj_ref, body));
        }
    }

    /// Number of objects queued.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether nothing has been queued.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Write the original bytes plus the update.
    pub fn write(mut self) -> Result<WrittenUpdate> {
        if self.objects.is_empty() {
            return Err(Error::MalformedDocument("incremental update has no objects".to_string()));
        }

        let original = self.doc.data();
        let mut bytes = Vec::with_capacity(
            original.len() + self.objects.iter().map(|(_, b)| b.len() + 32).sum::<usize>() + 512,
        );
        bytes.extend_from_slice(original);
        if !matches!(bytes.last(), Some(b'\n') | Some(b'\r')) {
            bytes.push(b'\n');
        }

        let mut entries: Vec<(ObjectRef, usize)> = Vec::with_capacity(self.objects.len() + 1);
        let mut body_offsets = HashMap::with_capacity(self.objects.len());
        for (obj_ref, body) in &self.objects {
            entries.push((*obj_ref, bytes.len()));
            bytes.extend_from_slice(format!("{} {} obj\n", obj_ref.id, obj_ref.gen).as_bytes());
            body_offsets.insert(*obj_ref, bytes.len());
            bytes.extend_from_slice(body);
            bytes.extend_from_slice(b"\nendobj\n");
        }

        let startxref = match self.doc.xref_kind() {
            XRefKind::Table => self.write_table(&mut bytes, &mut entries),
            XRefKind::Stream => self.write_stream(&mut bytes, &mut entries)?,
        };
        bytes.extend_from_slice(format!("startxref\n{}\n%%EOF\n", startxref).as_bytes());

        log::debug!(
            "Incremental update: {} object(s), {:?} xref at {}, {} bytes appended",
            self.objects.len(),
            self.doc.xref_kind(),
            startxref,
            bytes.len() - original.len()
        );

        Ok(WrittenUpdate {
            bytes,
            body_offsets,
            startxref,
        })
    }

    /// Trailer entries shared by both flavours.
    fn base_trailer(&self, size: u32) -> Dictionary {
        let mut trailer = Dictionary::new();
        trailer.insert("Size".to_string(), Object::Integer(i64::from(size)));
        trailer.insert("Prev".to_string(), Object::Integer(self.doc.startxref() as i64));
        for key in CARRIED_TRAILER_KEYS {
            if let Some(value) = self.doc.trailer().get(key) {
                trailer.insert(key.to_string(), value.clone());
            }
        }
        trailer
    }

    fn size(&self, entries: &[(ObjectRef, usize)]) -> u32 {
        let highest = entries.iter().map(|(r, _)| r.id.saturating_add(1)).max().unwrap_or(0);
        self.doc.size().max(highest)
    }

    fn write_table(&self, bytes: &mut Vec<u8>, entries: &mut [(ObjectRef, usize)]) -> usize {
        let startxref = bytes.len();
        entries.sort_by_key(|(r, _)| r.id);

        bytes.extend_from_slice(b"xref\n");
        for run in subsections(entries) {
            bytes.extend_from_slice(format!("{} {}\n", run[0].0.id, run.len()).as_bytes());
            for (obj_ref, offset) in run {
                bytes.extend_from_slice(format!("{:010} {:05} n\r\n", offset, obj_ref.gen).as_bytes());
            }
        }

        let trailer = Object::Dictionary(self.base_trailer(self.size(entries)));
        bytes.extend_from_slice(b"trailer\n");
        ObjectSerializer::new().write_to(bytes, &trailer);
        bytes.push(b'\n');
        startxref
    }

    fn write_stream(&mut self, bytes: &mut Vec<u8>, entries: &mut Vec<(ObjectRef, usize)>) -> Result<usize> {
        let xref_ref = self.allocate()?;
        let startxref = bytes.len();
        entries.push((xref_ref, startxref));
        entries.sort_by_key(|(r, _)| r.id);

        let offset_width = byte_width(startxref as u64);
        let mut data = Vec::with_capacity(entries.len() * (3 + offset_width));
        let mut index = Vec::new();
        for run in subsections(entries) {
            index.push(Object::Integer(i64::from(run[0].0.id)));
            index.push(Object::Integer(run.len() as i64));
            for (obj_ref, offset) in run {
                data.push(1);
                data.extend_from_slice(&(*offset as u64).to_be_bytes()[8 - offset_width..]);
                data.extend_from_slice(&obj_ref.gen.to_be_bytes());
            }
        }

        let mut dict = self.base_trailer(self.size(entries));
        dict.insert("Type".to_string(), Object::Name("XRef".to_string()));
        dict.insert("Index".to_string(), Object::Array(index));
        dict.insert(
            "W".to_string(),
            Object::Array(vec![
                Object::Integer(1),
                Object::Integer(offset_width as i64),
                Object::Integer(2),
            ]),
        );

        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from(data),
        };
        bytes.extend_from_slice(&ObjectSerializer::new().serialize_indirect(xref_ref, &stream));
        Ok(startxref)
    }
}

/// Split entries sorted by object number into runs of consecutive numbers.
fn subsections(entries: &[(ObjectRef, usize)]) -> Vec<&[(ObjectRef, usize)]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=entries.len() {
        if i == entries.len() || entries[i].0.id != entries[i - 1].0.id + 1 {
            if start < i {
                runs.push(&entries[start..i]);
            }
            start = i;
        }
    }
    runs
}

/// Bytes needed to hold `value` big-endian (at least one).
fn byte_width(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}
