//! Placeholder reservation.
//!
//! Appends, as one incremental update, the signature dictionary with an empty
//! `/Contents` placeholder, the signature field's widget annotation and its
//! appearance, and rewrites the page and form objects that must reference
//! them. The returned [`PlaceholderLayout`] locates the placeholder in the
//! new bytes; the `/ByteRange` entry is already patched to match it.

use super::appearance::SignatureMetadata;
use super::byterange::{ByteRangeCalculator, PlaceholderLayout};
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::writer::{IncrementalUpdate, ObjectSerializer};
use std::collections::HashSet;

/// Annotation flags: Print (4) and Locked (128).
const WIDGET_FLAGS: i64 = 132;

/// `/SigFlags`: SignaturesExist (1) and AppendOnly (2).
const SIG_FLAGS: i64 = 3;

/// Depth limit when collecting field names from the field tree.
const MAX_FIELD_DEPTH: usize = 32;

/// A document skeleton with a reserved, still empty, signature placeholder.
#[derive(Debug, Clone)]
pub struct ReservedDocument {
    /// Original bytes plus the incremental update
    pub bytes: Vec<u8>,
    /// Location of the placeholder within `bytes`
    pub layout: PlaceholderLayout,
    /// The signature dictionary object
    pub signature_ref: ObjectRef,
    /// Name of the new signature field
    pub field_name: String,
}

/// Reserve a signature placeholder of `max_signature_bytes` in `doc`.
///
/// # Errors
///
/// - [`Error::UnsupportedFeature`] if the document is encrypted
/// - [`Error::MalformedDocument`] if the page, page tree, catalog or form
///   objects cannot be read
/// - [`Error::InvalidConfig`] if the requested field name is already taken
pub fn reserve(
    doc: &PdfDocument<'_>,
    max_signature_bytes: usize,
    metadata: &SignatureMetadata,
) -> Result<ReservedDocument> {
    if doc.is_encrypted() {
        return Err(Error::UnsupportedFeature("encrypted documents cannot be signed".to_string()));
    }

    let root_ref = doc.root_ref()?;
    let mut catalog = doc.catalog()?;
    let page_ref = doc.page_ref(metadata.page)?;
    let mut page = doc.load_dict(page_ref)?;

    let field_name = choose_field_name(doc, &catalog, metadata.field_name.as_deref())?;

    let mut update = IncrementalUpdate::new(doc);
    let sig_ref = update.allocate()?;
    let widget_ref = update.allocate()?;
    let ap_ref = update.allocate()?;

    let calc = ByteRangeCalculator::new(max_signature_bytes);
    let sig_body = SignatureDictionaryBody::build(metadata, &calc);

    update.add_object(widget_ref, &widget(metadata, &field_name, sig_ref, ap_ref, page_ref));
    update.add_object(ap_ref, &metadata.appearance_stream());

    // Page /Annots: inline arrays live in the page, indirect ones are rewritten alone.
    match page.get("Annots") {
        Some(Object::Reference(annots_ref)) => {
            let annots_ref = *annots_ref;
            let annots = push_to_array(doc.load_object(annots_ref)?, widget_ref, "/Annots")?;
            update.add_object(annots_ref, &annots);
        },
        existing => {
            let annots = push_to_array(existing.cloned().unwrap_or(Object::Null), widget_ref, "/Annots")?;
            page.insert("Annots".to_string(), annots);
            update.add_object(page_ref, &Object::Dictionary(page));
        },
    }

    match catalog.get("AcroForm") {
        Some(Object::Reference(form_ref)) => {
            let form_ref = *form_ref;
            let form = doc.load_dict(form_ref)?;
            let form = add_field(doc, &mut update, form, widget_ref)?;
            update.add_object(form_ref, &Object::Dictionary(form));
        },
        existing => {
            let form = match existing {
                Some(Object::Dictionary(d)) => d.clone(),
                Some(Object::Null) | None => Dictionary::new(),
                Some(other) => {
                    return Err(Error::MalformedDocument(format!(
                        "/AcroForm is a {}, expected a dictionary",
                        other.type_name()
                    )));
                },
            };
            let form = add_field(doc, &mut update, form, widget_ref)?;
            catalog.insert("AcroForm".to_string(), Object::Dictionary(form));
            update.add_object(root_ref, &Object::Dictionary(catalog));
        },
    }

    update.add_raw_object(sig_ref, sig_body.bytes);
    let written = update.write()?;
    let body_offset = written.body_offset(sig_ref)?;
    let mut bytes = written.bytes;
    let layout = calc.layout(bytes.len(), body_offset + sig_body.contents_pos)?;

    let byte_range = ByteRangeCalculator::format_byte_range_fixed(&layout.byte_range())?;
    let br_start = body_offset + sig_body.byte_range_pos;
    bytes[br_start..br_start + byte_range.len()].copy_from_slice(byte_range.as_bytes());
    layout.check_against(&bytes)?;

    log::info!(
        "Reserved {}-byte signature placeholder at {} (field {:?}, page {}), document {} -> {} bytes",
        max_signature_bytes,
        layout.placeholder_offset,
        field_name,
        metadata.page,
        doc.data().len(),
        bytes.len()
    );

    Ok(ReservedDocument {
        bytes,
        layout,
        signature_ref: sig_ref,
        field_name,
    })
}

/// Serialized signature dictionary with the offsets of its two patch points.
struct SignatureDictionaryBody {
    bytes: Vec<u8>,
    /// Offset of the `/ByteRange` array within `bytes`
    byte_range_pos: usize,
    /// Offset of the `/Contents` placeholder's `<` within `bytes`
    contents_pos: usize,
}

impl SignatureDictionaryBody {
    fn build(metadata: &SignatureMetadata, calc: &ByteRangeCalculator) -> Self {
        let serializer = ObjectSerializer::new();
        let mut bytes = Vec::with_capacity(calc.placeholder_size() + 512);

        bytes.extend_from_slice(b"<</Type /Sig/Filter /Adobe.PPKLite/SubFilter /adbe.pkcs7.detached");
        bytes.extend_from_slice(b"/ByteRange ");
        let byte_range_pos = bytes.len();
        bytes.extend_from_slice(ByteRangeCalculator::byte_range_placeholder().as_bytes());
        bytes.extend_from_slice(b"/Contents ");
        let contents_pos = bytes.len();
        bytes.extend_from_slice(calc.generate_placeholder().as_bytes());

        let mut entries = vec![
            ("M", Object::String(metadata.pdf_date().into_bytes())),
            ("Name", ObjectSerializer::text_string(&metadata.signer_name)),
            ("Reason", ObjectSerializer::text_string(&metadata.reason)),
            ("Location", ObjectSerializer::text_string(&metadata.location)),
        ];
        if let Some(contact) = &metadata.contact_info {
            entries.push(("ContactInfo", ObjectSerializer::text_string(contact)));
        }
        for (key, value) in entries {
            serializer.write_to(&mut bytes, &Object::Name(key.to_string()));
            bytes.push(b' ');
            serializer.write_to(&mut bytes, &value);
        }
        bytes.extend_from_slice(b">>");

        Self {
            bytes,
            byte_range_pos,
            contents_pos,
        }
    }
}

/// Merged signature field and widget annotation.
fn widget(
    metadata: &SignatureMetadata,
    field_name: &str,
    sig_ref: ObjectRef,
    ap_ref: ObjectRef,
    page_ref: ObjectRef,
) -> Object {
    ObjectSerializer::dict(vec![
        ("Type", ObjectSerializer::name("Annot")),
        ("Subtype", ObjectSerializer::name("Widget")),
        ("FT", ObjectSerializer::name("Sig")),
        ("T", ObjectSerializer::text_string(field_name)),
        ("V", ObjectSerializer::reference(sig_ref)),
        ("F", ObjectSerializer::integer(WIDGET_FLAGS)),
        ("P", ObjectSerializer::reference(page_ref)),
        ("Rect", metadata.rect.to_object()),
        ("AP", ObjectSerializer::dict(vec![("N", ObjectSerializer::reference(ap_ref))])),
    ])
}

/// Append a reference to an array object; a missing array starts empty.
fn push_to_array(existing: Object, item: ObjectRef, what: &str) -> Result<Object> {
    match existing {
        Object::Array(mut items) => {
            items.push(Object::Reference(item));
            Ok(Object::Array(items))
        },
        Object::Null => Ok(Object::Array(vec![Object::Reference(item)])),
        other => Err(Error::MalformedDocument(format!(
            "{} is a {}, expected an array",
            what,
            other.type_name()
        ))),
    }
}

/// Register the field in an AcroForm dictionary and set `/SigFlags`.
fn add_field(
    doc: &PdfDocument<'_>,
    update: &mut IncrementalUpdate<'_, '_>,
    mut form: Dictionary,
    field_ref: ObjectRef,
) -> Result<Dictionary> {
    match form.get("Fields") {
        Some(Object::Reference(fields_ref)) => {
            let fields_ref = *fields_ref;
            let fields = push_to_array(doc.load_object(fields_ref)?, field_ref, "/Fields")?;
            update.add_object(fields_ref, &fields);
        },
        existing => {
            let fields = push_to_array(existing.cloned().unwrap_or(Object::Null), field_ref, "/Fields")?;
            form.insert("Fields".to_string(), fields);
        },
    }

    let flags = form.get("SigFlags").and_then(|f| f.as_integer()).unwrap_or(0);
    form.insert("SigFlags".to_string(), Object::Integer(flags | SIG_FLAGS));
    Ok(form)
}

/// Pick the requested name, or the first free `SignatureN`.
fn choose_field_name(
    doc: &PdfDocument<'_>,
    catalog: &Dictionary,
    requested: Option<&str>,
) -> Result<String> {
    let existing = existing_field_names(doc, catalog)?;

    if let Some(name) = requested {
        if existing.contains(name) {
            return Err(Error::InvalidConfig(format!("field {:?} already exists", name)));
        }
        return Ok(name.to_string());
    }

    let mut n = 1usize;
    loop {
        let candidate = format!("Signature{}", n);
        if !existing.contains(&candidate) {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Fully qualified names of the fields already in the form.
fn existing_field_names(doc: &PdfDocument<'_>, catalog: &Dictionary) -> Result<HashSet<String>> {
    let mut names = HashSet::new();
    let Some(form) = catalog.get("AcroForm") else {
        return Ok(names);
    };
    let form = doc.resolve(form)?;
    let Some(fields) = form.as_dict().and_then(|f| f.get("Fields")) else {
        return Ok(names);
    };
    let fields = doc.resolve(fields)?;
    let mut visited = HashSet::new();
    for field in fields.as_array().map(Vec::as_slice).unwrap_or_default() {
        collect_field_names(doc, field, "", 0, &mut visited, &mut names)?;
    }
    Ok(names)
}

fn collect_field_names(
    doc: &PdfDocument<'_>,
    field: &Object,
    parent: &str,
    depth: usize,
    visited: &mut HashSet<ObjectRef>,
    names: &mut HashSet<String>,
) -> Result<()> {
    if depth > MAX_FIELD_DEPTH {
        return Ok(());
    }
    if let Object::Reference(r) = field {
        if !visited.insert(*r) {
            return Ok(());
        }
    }

    let field = doc.resolve(field)?;
    let Some(dict) = field.as_dict() else {
        return Ok(());
    };

    let qualified = match dict.get("T").and_then(|t| t.as_string()) {
        Some(partial) => {
            let partial = decode_text_string(partial);
            let name = if parent.is_empty() {
                partial
            } else {
                format!("{}.{}", parent, partial)
            };
            names.insert(name.clone());
            name
        },
        None => parent.to_string(),
    };

    if let Some(kids) = dict.get("Kids") {
        let kids = doc.resolve(kids)?;
        for kid in kids.as_array().map(Vec::as_slice).unwrap_or_default() {
            collect_field_names(doc, kid, &qualified, depth + 1, visited, names)?;
        }
    }
    Ok(())
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise byte-per-char).
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::appearance::AppearanceBuilder;
    use crate::signatures::types::SignOptions;
    use chrono::{FixedOffset, TimeZone};

    const SAMPLE_PDF: &[u8] = include_bytes!("../../tests/fixtures/sample.pdf");

    fn metadata(options: &SignOptions) -> SignatureMetadata {
        let time = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .unwrap();
        AppearanceBuilder::new(options, "Test Signer", time).build().unwrap()
    }

    /// Minimal one-page PDF whose trailer and catalog come from `catalog_extra`.
    fn pdf_with(catalog_extra: &str, page_extra: &str, extra_objects: &[&str]) -> Vec<u8> {
        let mut objects = vec![
            format!("<< /Type /Catalog /Pages 2 0 R {} >>", catalog_extra),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            format!("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] {} >>", page_extra),
        ];
        objects.extend(extra_objects.iter().map(|s| s.to_string()));

        let mut pdf = b"%PDF-1.7\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f\r\n", objects.len() + 1).as_bytes());
        for off in offsets {
            pdf.extend_from_slice(format!("{:010} 00000 n\r\n", off).as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF",
                objects.len() + 1,
                xref
            )
            .as_bytes(),
        );
        pdf
    }

    #[test]
    fn test_reserve_sample() {
        let doc = PdfDocument::from_bytes(SAMPLE_PDF).unwrap();
        let reserved = reserve(&doc, 4096, &metadata(&SignOptions::default())).unwrap();
        let layout = reserved.layout;

        assert!(reserved.bytes.starts_with(SAMPLE_PDF));
        assert_eq!(layout.max_length, 4096);
        assert_eq!(layout.placeholder_len(), 8194);
        assert_eq!(layout.file_len(), reserved.bytes.len());
        assert_eq!(reserved.field_name, "Signature1");

        let placeholder = &reserved.bytes[layout.placeholder_offset..][..layout.placeholder_len()];
        assert_eq!(placeholder[0], b'<');
        assert!(placeholder[1..placeholder.len() - 1].iter().all(|&b| b == b'0'));
        assert_eq!(placeholder[placeholder.len() - 1], b'>');

        let text = String::from_utf8_lossy(&reserved.bytes[SAMPLE_PDF.len()..]).into_owned();
        let expected = format!("/ByteRange {}", layout.byte_range().to_pdf_array());
        assert!(text.contains(&expected), "missing {}", expected);
        assert!(text.contains("/SubFilter /adbe.pkcs7.detached"));
        assert!(text.contains("/M (D:20240102030405+01'00')"));
    }

    #[test]
    fn test_reserved_document_reparses() {
        let doc = PdfDocument::from_bytes(SAMPLE_PDF).unwrap();
        let reserved = reserve(&doc, 1024, &metadata(&SignOptions::default())).unwrap();
        let reopened = PdfDocument::from_bytes(&reserved.bytes).unwrap();

        let sig = reopened.load_dict(reserved.signature_ref).unwrap();
        assert_eq!(sig.get("Type").and_then(|t| t.as_name()), Some("Sig"));
        assert_eq!(sig.get("Contents").and_then(|c| c.as_string()).map(|c| c.len()), Some(1024));
        let br: Vec<i64> = sig
            .get("ByteRange")
            .and_then(|b| b.as_array())
            .unwrap()
            .iter()
            .filter_map(|v| v.as_integer())
            .collect();
        let expected = reserved.layout.byte_range().0.map(|v| v as i64);
        assert_eq!(br, expected);

        let catalog = reopened.catalog().unwrap();
        let form = reopened.resolve(catalog.get("AcroForm").unwrap()).unwrap();
        let form = form.as_dict().unwrap();
        assert_eq!(form.get("SigFlags").and_then(|f| f.as_integer()), Some(3));

        let page = reopened.load_dict(reopened.page_ref(1).unwrap()).unwrap();
        let annots = reopened.resolve(page.get("Annots").unwrap()).unwrap();
        let widget_ref = annots.as_array().unwrap().last().unwrap().as_reference().unwrap();
        let widget = reopened.load_dict(widget_ref).unwrap();
        assert_eq!(widget.get("FT").and_then(|f| f.as_name()), Some("Sig"));
        assert_eq!(widget.get("V").and_then(|v| v.as_reference()), Some(reserved.signature_ref));
        assert_eq!(widget.get("F").and_then(|f| f.as_integer()), Some(132));
    }

    #[test]
    fn test_rewritten_page_keeps_names_and_reals() {
        let pdf = pdf_with(
            "",
            "/CropBox [0 0 595.27559 841.88976] /Resources << /Font << /F#E91 4 0 R /F#E81 5 0 R >> >>",
            &[
                "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>",
                "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>",
            ],
        );
        let doc = PdfDocument::from_bytes(&pdf).unwrap();
        let reserved = reserve(&doc, 512, &metadata(&SignOptions::default())).unwrap();

        let appended = String::from_utf8_lossy(&reserved.bytes[pdf.len()..]).into_owned();
        assert!(appended.contains("/F#E91 4 0 R"));
        assert!(appended.contains("/F#E81 5 0 R"));
        assert!(appended.contains("[0 0 595.27559 841.88976]"));

        let reopened = PdfDocument::from_bytes(&reserved.bytes).unwrap();
        let page = reopened.load_dict(ObjectRef::new(3, 0)).unwrap();
        assert!(page.contains_key("Annots"));
        let resources = page.get("Resources").and_then(|r| r.as_dict()).unwrap();
        let fonts = resources.get("Font").and_then(|f| f.as_dict()).unwrap();
        assert_eq!(fonts.len(), 2);
        assert_eq!(doc.load_dict(ObjectRef::new(3, 0)).unwrap().get("Resources"), page.get("Resources"));
        assert_eq!(doc.load_dict(ObjectRef::new(3, 0)).unwrap().get("CropBox"), page.get("CropBox"));
    }

    #[test]
    fn test_indirect_annots_and_fields_are_rewritten_in_place() {
        let pdf = pdf_with(
            "/AcroForm 5 0 R",
            "/Annots 4 0 R",
            &["[]", "<< /Fields 6 0 R /SigFlags 1 >>", "[]"],
        );
        let doc = PdfDocument::from_bytes(&pdf).unwrap();
        let reserved = reserve(&doc, 512, &metadata(&SignOptions::default())).unwrap();
        let reopened = PdfDocument::from_bytes(&reserved.bytes).unwrap();

        let annots = reopened.load_object(ObjectRef::new(4, 0)).unwrap();
        assert_eq!(annots.as_array().unwrap().len(), 1);
        let fields = reopened.load_object(ObjectRef::new(6, 0)).unwrap();
        assert_eq!(fields.as_array().unwrap().len(), 1);
        let form = reopened.load_dict(ObjectRef::new(5, 0)).unwrap();
        assert_eq!(form.get("SigFlags").and_then(|f| f.as_integer()), Some(3));

        // page and catalog untouched: still the original objects
        let page = reopened.load_dict(ObjectRef::new(3, 0)).unwrap();
        assert_eq!(page.get("Annots").and_then(|a| a.as_reference()), Some(ObjectRef::new(4, 0)));
    }

    #[test]
    fn test_inline_acroform_and_unique_name() {
        let pdf = pdf_with(
            "/AcroForm << /Fields [4 0 R] >>",
            "/Annots [4 0 R]",
            &["<< /FT /Sig /T (Signature1) /Subtype /Widget /Rect [0 0 0 0] >>"],
        );
        let doc = PdfDocument::from_bytes(&pdf).unwrap();
        let reserved = reserve(&doc, 512, &metadata(&SignOptions::default())).unwrap();
        assert_eq!(reserved.field_name, "Signature2");

        let reopened = PdfDocument::from_bytes(&reserved.bytes).unwrap();
        let catalog = reopened.catalog().unwrap();
        let form = catalog.get("AcroForm").and_then(|f| f.as_dict()).unwrap();
        assert_eq!(form.get("Fields").and_then(|f| f.as_array()).map(|f| f.len()), Some(2));
    }

    #[test]
    fn test_requested_field_name_collision() {
        let pdf = pdf_with(
            "/AcroForm << /Fields [4 0 R] >>",
            "",
            &["<< /FT /Sig /T (Approval) >>"],
        );
        let doc = PdfDocument::from_bytes(&pdf).unwrap();
        let opts = SignOptions::default().with_field_name("Approval");
        assert!(matches!(
            reserve(&doc, 512, &metadata(&opts)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_no_trailing_newline_gets_one() {
        let pdf = pdf_with("", "", &[]);
        assert!(!pdf.ends_with(b"\n"));
        let doc = PdfDocument::from_bytes(&pdf).unwrap();
        let reserved = reserve(&doc, 256, &metadata(&SignOptions::default())).unwrap();
        assert!(reserved.bytes.starts_with(&pdf));
        assert_eq!(reserved.bytes[pdf.len()], b'\n');
    }

    #[test]
    fn test_missing_page_is_malformed() {
        let doc = PdfDocument::from_bytes(SAMPLE_PDF).unwrap();
        let opts = SignOptions::default().with_page(9);
        assert!(matches!(
            reserve(&doc, 512, &metadata(&opts)),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_encrypted_is_rejected() {
        let pdf = include_bytes!("../../tests/fixtures/encrypted.pdf");
        let doc = PdfDocument::from_bytes(pdf).unwrap();
        assert!(matches!(
            reserve(&doc, 512, &metadata(&SignOptions::default())),
            Err(Error::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn test_decode_text_string() {
        assert_eq!(decode_text_string(b"Signature1"), "Signature1");
        assert_eq!(decode_text_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE9]), "Aé");
    }
}
