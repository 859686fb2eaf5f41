//! Read-only view of an existing PDF, sufficient for an incremental update.
//!
//! The document is opened from a borrowed byte buffer: header, newest
//! cross-reference section (plus its `/Prev` chain) and trailer are parsed
//! eagerly, objects are loaded lazily by reference. Nothing here mutates the
//! input; rewritten objects are emitted by [`crate::writer::IncrementalUpdate`].

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::parse_indirect_object;
use crate::xref::{find_xref_offset, parse_xref, CrossRefTable, XRefEntryType, XRefKind};

/// How far into the file the `%PDF-` marker may appear.
const HEADER_WINDOW: usize = 1024;

/// Maximum depth of the page tree.
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// An opened PDF document borrowing its bytes.
#[derive(Debug)]
pub struct PdfDocument<'a> {
    data: &'a [u8],
    version: (u8, u8),
    xref: CrossRefTable,
    startxref: u64,
}

impl<'a> PdfDocument<'a> {
    /// Open a document from its raw bytes.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedDocument`] if the header, `startxref`, cross-reference
    /// data or trailer cannot be parsed, [`Error::UnsupportedFeature`] for a
    /// PDF major version above 2.
    pub fn from_bytes(data: &'a [u8]) -> Result<Self> {
        let version = parse_header(data)?;
        let startxref = find_xref_offset(data)?;
        let xref = parse_xref(data, startxref)?;

        if xref.trailer().get("Root").and_then(|r| r.as_reference()).is_none() {
            return Err(Error::MalformedDocument("trailer has no /Root reference".to_string()));
        }

        log::debug!(
            "Opened PDF {}.{}: {} xref entries, newest section is {:?} at {}",
            version.0,
            version.1,
            xref.len(),
            xref.kind(),
            startxref
        );

        Ok(Self {
            data,
            version,
            xref,
            startxref,
        })
    }

    /// The raw document bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// PDF version from the header, e.g. `(1, 7)`.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Byte offset of the newest cross-reference section.
    pub fn startxref(&self) -> u64 {
        self.startxref
    }

    /// Flavour of the newest cross-reference section.
    pub fn xref_kind(&self) -> XRefKind {
        self.xref.kind()
    }

    /// Trailer dictionary of the newest section.
    pub fn trailer(&self) -> &Dictionary {
        self.xref.trailer()
    }

    /// Whether the trailer names an `/Encrypt` dictionary.
    pub fn is_encrypted(&self) -> bool {
        self.trailer().contains_key("Encrypt")
    }

    /// Next free object number: the larger of the trailer `/Size` and the
    /// highest numbered xref entry plus one.
    pub fn size(&self) -> u32 {
        let declared = self
            .trailer()
            .get("Size")
            .and_then(|s| s.as_integer())
            .and_then(|s| u32::try_from(s).ok())
            .unwrap_or(0);
        let observed = self.xref.max_object_number().map_or(0, |n| n.saturating_add(1));
        declared.max(observed)
    }

    /// Highest object number present in any cross-reference section.
    pub fn max_object_number(&self) -> Option<u32> {
        self.xref.max_object_number()
    }

    /// Reference to the document catalog.
    pub fn root_ref(&self) -> Result<ObjectRef> {
        self.trailer()
            .get("Root")
            .and_then(|r| r.as_reference())
            .ok_or_else(|| Error::MalformedDocument("trailer has no /Root reference".to_string()))
    }

    /// Load the catalog dictionary.
    pub fn catalog(&self) -> Result<Dictionary> {
        let root = self.root_ref()?;
        self.load_dict(root)
    }

    /// Load an indirect object.
    ///
    /// Free or missing entries are an error: everything the signer loads is
    /// expected to exist.
    pub fn load_object(&self, obj_ref: ObjectRef) -> Result<Object> {
        let entry = self
            .xref
            .get(obj_ref.id)
            .filter(|e| e.in_use())
            .ok_or_else(|| Error::MalformedDocument(format!("object {} not found", obj_ref)))?;

        match entry.entry_type {
            XRefEntryType::Uncompressed => self.load_uncompressed(obj_ref, entry.offset),
            XRefEntryType::Compressed => {
                let stream_num = u32::try_from(entry.offset).map_err(|_| {
                    Error::MalformedDocument(format!("object {} has a bad object stream", obj_ref))
                })?;
                let stream_ref = ObjectRef::new(stream_num, 0);
                // Object streams must sit directly in the file.
                let stream_offset = self
                    .xref
                    .get(stream_num)
                    .filter(|e| e.entry_type == XRefEntryType::Uncompressed)
                    .map(|e| e.offset)
                    .ok_or_else(|| {
                        Error::MalformedDocument(format!(
                            "object stream {} of object {} is not an uncompressed object",
                            stream_ref, obj_ref
                        ))
                    })?;
                let stream = self.load_uncompressed(stream_ref, stream_offset)?;
                let mut objects = parse_object_stream(&stream)?;
                objects.remove(&obj_ref.id).ok_or_else(|| {
                    Error::MalformedDocument(format!(
                        "object {} missing from object stream {}",
                        obj_ref, stream_num
                    ))
                })
            },
            XRefEntryType::Free => {
                Err(Error::MalformedDocument(format!("object {} is free", obj_ref)))
            },
        }
    }

    fn load_uncompressed(&self, obj_ref: ObjectRef, offset: u64) -> Result<Object> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|o| *o < self.data.len())
            .ok_or_else(|| {
                Error::MalformedDocument(format!(
                    "object {} offset {} is outside the file",
                    obj_ref, offset
                ))
            })?;
        let (found, object) = parse_indirect_object(&self.data[start..], start)?;
        if found.id != obj_ref.id {
            return Err(Error::MalformedDocument(format!(
                "xref points object {} at byte {}, found {}",
                obj_ref, start, found
            )));
        }
        Ok(object)
    }

    /// Follow a reference (if `obj` is one) to its target.
    pub fn resolve(&self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(r) => self.load_object(*r),
            other => Ok(other.clone()),
        }
    }

    /// Load an indirect object that must be a dictionary.
    pub fn load_dict(&self, obj_ref: ObjectRef) -> Result<Dictionary> {
        match self.load_object(obj_ref)? {
            Object::Dictionary(dict) => Ok(dict),
            other => Err(Error::MalformedDocument(format!(
                "object {} is a {}, expected a dictionary",
                obj_ref,
                other.type_name()
            ))),
        }
    }

    /// Number of pages, counted by walking the page tree.
    pub fn page_count(&self) -> Result<usize> {
        let mut pages = Vec::new();
        self.collect_pages(self.pages_root()?, 0, &mut pages, usize::MAX)?;
        Ok(pages.len())
    }

    /// Reference to a page by 1-based page number.
    pub fn page_ref(&self, page_number: usize) -> Result<ObjectRef> {
        if page_number == 0 {
            return Err(Error::MalformedDocument("page numbers start at 1".to_string()));
        }

        let mut pages = Vec::new();
        self.collect_pages(self.pages_root()?, 0, &mut pages, page_number)?;
        pages.get(page_number - 1).copied().ok_or_else(|| {
            Error::MalformedDocument(format!(
                "page {} requested, document has {} page(s)",
                page_number,
                pages.len()
            ))
        })
    }

    fn pages_root(&self) -> Result<ObjectRef> {
        self.catalog()?
            .get("Pages")
            .and_then(|p| p.as_reference())
            .ok_or_else(|| Error::MalformedDocument("catalog has no /Pages reference".to_string()))
    }

    /// Depth-first walk collecting page references until `limit` are found.
    fn collect_pages(
        &self,
        node_ref: ObjectRef,
        depth: usize,
        pages: &mut Vec<ObjectRef>,
        limit: usize,
    ) -> Result<()> {
        if depth > MAX_PAGE_TREE_DEPTH {
            return Err(Error::MalformedDocument("page tree is too deep".to_string()));
        }

        let node = self.load_dict(node_ref)?;
        match node.get("Type").and_then(|t| t.as_name()) {
            Some("Page") => pages.push(node_ref),
            Some("Pages") => {
                let kids = self.resolve(node.get("Kids").unwrap_or(&Object::Null))?;
                let kids = kids.as_array().ok_or_else(|| {
                    Error::MalformedDocument(format!("pages node {} has no /Kids", node_ref))
                })?;
                for kid in kids.iter().filter_map(|k| k.as_reference()) {
                    if pages.len() >= limit {
                        break;
                    }
                    self.collect_pages(kid, depth + 1, pages, limit)?;
                }
            },
            other => {
                return Err(Error::MalformedDocument(format!(
                    "page tree node {} has type {:?}",
                    node_ref, other
                )));
            },
        }
        Ok(())
    }
}

/// Parse the `%PDF-M.m` header, allowing leading junk within the first KiB.
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(HEADER_WINDOW)];
    let marker = b"%PDF-";
    let pos = window
        .windows(marker.len())
        .position(|w| w == marker)
        .ok_or_else(|| Error::MalformedDocument("missing %PDF- header".to_string()))?;

    let version = &data[pos + marker.len()..];
    match version {
        [major, b'.', minor, ..] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            let (major, minor) = (major - b'0', minor - b'0');
            if major > 2 {
                return Err(Error::UnsupportedFeature(format!("PDF version {}.{}", major, minor)));
            }
            Ok((major, minor))
        },
        _ => Err(Error::MalformedDocument("malformed PDF version in header".to_string())),
    }
}
