//! End-to-end signing tests.
//!
//! The produced CMS is decoded with the RustCrypto `cms` crate and the RSA
//! signature is verified independently of the encoder. The signed ranges are
//! read back from the `/ByteRange` written into the output and hashed with
//! `sha2` directly.

use chrono::{FixedOffset, TimeZone};
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier};
use der::{Decode, Encode, SliceReader};
use pdf_seal::signatures::{CertificateInfo, RangeDigest};
use pdf_seal::object::ObjectRef;
use pdf_seal::xref::XRefKind;
use pdf_seal::{
    sign, DigestAlgorithm, Error, PdfDocument, PdfSigner, SignOptions, SignedDocument,
    SigningCredentials, SigningRequest,
};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256, Sha384, Sha512};
use signature::Verifier;
use std::io::Cursor;

const SAMPLE: &[u8] = include_bytes!("fixtures/sample.pdf");
const XREF_STREAM: &[u8] = include_bytes!("fixtures/xref_stream.pdf");
const ENCRYPTED: &[u8] = include_bytes!("fixtures/encrypted.pdf");

const SIGNER_CERT: &[u8] = include_bytes!("fixtures/signing/signer_cert.der");
const SIGNER_KEY: &[u8] = include_bytes!("fixtures/signing/signer_key.der");
const SIGNER_CERT_PEM: &str = include_str!("fixtures/signing/signer_cert.pem");
const SIGNER_KEY_PEM: &str = include_str!("fixtures/signing/signer_key.pem");
const OTHER_KEY: &[u8] = include_bytes!("fixtures/signing/other_key.der");
const NO_CN_CERT: &[u8] = include_bytes!("fixtures/signing/no_cn_cert.der");
const CA_CERT: &[u8] = include_bytes!("fixtures/signing/ca_cert.der");
const LEAF_CERT: &[u8] = include_bytes!("fixtures/signing/leaf_cert.der");
const LEAF_KEY: &[u8] = include_bytes!("fixtures/signing/leaf_key.der");
const EC_CERT: &[u8] = include_bytes!("fixtures/signing/ec_cert.der");
const EC_KEY: &[u8] = include_bytes!("fixtures/signing/ec_key.der");

const OID_MESSAGE_DIGEST: &str = "1.2.840.113549.1.9.4";
const OID_SIGNING_CERTIFICATE_V2: &str = "1.2.840.113549.1.9.16.2.47";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn credentials() -> SigningCredentials {
    SigningCredentials::new(SIGNER_CERT.to_vec(), SIGNER_KEY.to_vec())
}

fn options() -> SignOptions {
    let when = FixedOffset::east_opt(2 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 3, 5, 14, 7, 9)
        .unwrap();
    SignOptions::default()
        .with_max_signature_bytes(8192)
        .with_signing_time(when)
}

fn hex_decode(hex: &[u8]) -> Vec<u8> {
    hex.chunks(2)
        .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).unwrap(), 16).unwrap())
        .collect()
}

/// The newest `/ByteRange` array written into `bytes`.
fn written_byte_range(bytes: &[u8]) -> [usize; 4] {
    let key = b"/ByteRange [";
    let start = bytes.windows(key.len()).rposition(|w| w == key).unwrap() + key.len();
    let end = start + bytes[start..].iter().position(|&b| b == b']').unwrap();
    let values: Vec<usize> = std::str::from_utf8(&bytes[start..end])
        .unwrap()
        .split_whitespace()
        .map(|v| v.parse().unwrap())
        .collect();
    values.try_into().unwrap()
}

fn hash_ranges<D: Digest>(bytes: &[u8], [o1, l1, o2, l2]: [usize; 4]) -> Vec<u8> {
    let mut hasher = D::new();
    hasher.update(&bytes[o1..o1 + l1]);
    hasher.update(&bytes[o2..o2 + l2]);
    hasher.finalize().to_vec()
}

/// SignedData from the filled placeholder, ignoring the zero padding.
fn signed_data(signed: &SignedDocument) -> SignedData {
    let [_, l1, o2, _] = written_byte_range(signed.as_bytes());
    let raw = hex_decode(&signed.as_bytes()[l1 + 1..o2 - 1]);
    let mut reader = SliceReader::new(&raw).unwrap();
    let content_info = ContentInfo::decode(&mut reader).unwrap();
    assert_eq!(content_info.content_type.to_string(), "1.2.840.113549.1.7.2");
    content_info.content.decode_as::<SignedData>().unwrap()
}

/// Check the CMS signature of `signed` against `cert` and the document bytes.
fn verify(signed: &SignedDocument, cert: &[u8], algorithm: DigestAlgorithm) {
    let data = signed_data(signed);
    assert_eq!(data.encap_content_info.econtent_type.to_string(), "1.2.840.113549.1.7.1");
    assert!(data.encap_content_info.econtent.is_none());

    let signer = data.signer_infos.0.iter().next().unwrap();
    let info = CertificateInfo::parse(cert).unwrap();
    match &signer.sid {
        SignerIdentifier::IssuerAndSerialNumber(isn) => {
            assert_eq!(isn.serial_number.as_bytes(), info.serial());
            assert_eq!(isn.issuer.to_der().unwrap(), info.issuer_der());
        },
        other => panic!("unexpected signer identifier {:?}", other),
    }

    let attrs = signer.signed_attrs.as_ref().unwrap();
    let message_digest = attrs
        .iter()
        .find(|a| a.oid.to_string() == OID_MESSAGE_DIGEST)
        .and_then(|a| a.values.iter().next())
        .unwrap();
    let bytes = signed.as_bytes();
    let byte_range = written_byte_range(bytes);
    assert_eq!(byte_range[0], 0);
    assert_eq!(byte_range[2] + byte_range[3], bytes.len());
    assert_eq!(bytes[byte_range[1]], b'<');
    assert_eq!(bytes[byte_range[2] - 1], b'>');
    let expected = match algorithm {
        DigestAlgorithm::Sha256 => hash_ranges::<Sha256>(bytes, byte_range),
        DigestAlgorithm::Sha384 => hash_ranges::<Sha384>(bytes, byte_range),
        DigestAlgorithm::Sha512 => hash_ranges::<Sha512>(bytes, byte_range),
    };
    assert_eq!(message_digest.value(), expected.as_slice());
    assert!(attrs.iter().any(|a| a.oid.to_string() == OID_SIGNING_CERTIFICATE_V2));

    let signed_attrs_der = attrs.to_der().unwrap();
    assert_eq!(signed_attrs_der[0], 0x31);
    let public = RsaPublicKey::from_public_key_der(info.spki_der()).unwrap();
    let sig = Signature::try_from(signer.signature.as_bytes()).unwrap();
    match algorithm {
        DigestAlgorithm::Sha256 => VerifyingKey::<Sha256>::new(public).verify(&signed_attrs_der, &sig),
        DigestAlgorithm::Sha384 => VerifyingKey::<Sha384>::new(public).verify(&signed_attrs_der, &sig),
        DigestAlgorithm::Sha512 => VerifyingKey::<Sha512>::new(public).verify(&signed_attrs_der, &sig),
    }
    .unwrap();
}

#[test]
fn test_sign_table_xref_document() {
    init_logging();
    let signed = PdfSigner::new(credentials(), options()).sign(SAMPLE).unwrap();

    assert!(signed.as_bytes().starts_with(SAMPLE));
    verify(&signed, SIGNER_CERT, DigestAlgorithm::Sha256);

    let doc = PdfDocument::from_bytes(signed.as_bytes()).unwrap();
    assert_eq!(doc.xref_kind(), XRefKind::Table);
    assert_eq!(doc.page_count().unwrap(), 1);
    assert!(doc.trailer().get("Prev").is_some());
    assert!(doc.trailer().get("ID").is_some());
}

#[test]
fn test_sign_xref_stream_document() {
    init_logging();
    let signed = PdfSigner::new(credentials(), options()).sign(XREF_STREAM).unwrap();

    assert!(signed.as_bytes().starts_with(XREF_STREAM));
    verify(&signed, SIGNER_CERT, DigestAlgorithm::Sha256);

    let doc = PdfDocument::from_bytes(signed.as_bytes()).unwrap();
    assert_eq!(doc.xref_kind(), XRefKind::Stream);
    assert_eq!(doc.page_count().unwrap(), 1);
}

/// PDF 1.5 hybrid-reference file: the page tree lives in an object stream
/// listed only by the `/XRefStm` of a classic table section.
fn hybrid_reference_pdf() -> Vec<u8> {
    let pages = "<< /Type /Pages /Kids [3 0 R] /Count 1 >>";
    let page = "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>";
    let header = format!("2 0 3 {} ", pages.len() + 1);
    let packed = format!("{}{} {}", header, pages, page);

    let mut pdf = b"%PDF-1.5\n".to_vec();
    let catalog = pdf.len();
    pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    let objstm = pdf.len();
    pdf.extend_from_slice(
        format!(
            "4 0 obj\n<< /Type /ObjStm /N 2 /First {} /Length {} >>\nstream\n{}\nendstream\nendobj\n",
            header.len(),
            packed.len(),
            packed
        )
        .as_bytes(),
    );
    let xref_stm = pdf.len();
    pdf.extend_from_slice(b"5 0 obj\n<< /Type /XRef /Size 6 /W [1 2 1] /Index [2 2] /Length 8 >>\nstream\n");
    pdf.extend_from_slice(&[2, 0, 4, 0, 2, 0, 4, 1]);
    pdf.extend_from_slice(b"\nendstream\nendobj\n");

    let xref = pdf.len();
    pdf.extend_from_slice(b"xref\n0 6\n0000000000 65535 f\r\n");
    pdf.extend_from_slice(format!("{:010} 00000 n\r\n", catalog).as_bytes());
    pdf.extend_from_slice(b"0000000000 00001 f\r\n0000000000 00001 f\r\n");
    pdf.extend_from_slice(format!("{:010} 00000 n\r\n", objstm).as_bytes());
    pdf.extend_from_slice(format!("{:010} 00000 n\r\n", xref_stm).as_bytes());
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size 6 /Root 1 0 R /XRefStm {} >>\nstartxref\n{}\n%%EOF\n",
            xref_stm, xref
        )
        .as_bytes(),
    );
    pdf
}

#[test]
fn test_sign_hybrid_reference_document() {
    init_logging();
    let hybrid = hybrid_reference_pdf();
    let original = PdfDocument::from_bytes(&hybrid).unwrap();
    assert_eq!(original.page_count().unwrap(), 1);

    let signed = PdfSigner::new(credentials(), options()).sign(&hybrid).unwrap();
    assert!(signed.as_bytes().starts_with(&hybrid));
    verify(&signed, SIGNER_CERT, DigestAlgorithm::Sha256);

    let doc = PdfDocument::from_bytes(signed.as_bytes()).unwrap();
    assert_eq!(doc.xref_kind(), XRefKind::Table);
    assert_eq!(doc.page_count().unwrap(), 1);
    let pages = doc.load_dict(ObjectRef::new(2, 0)).unwrap();
    assert_eq!(pages.get("Count").and_then(|c| c.as_integer()), Some(1));
}

#[test]
fn test_signing_time_changes_output() {
    let later = FixedOffset::east_opt(2 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 3, 5, 14, 7, 10)
        .unwrap();
    let first = PdfSigner::new(credentials(), options()).sign(SAMPLE).unwrap();
    let again = PdfSigner::new(credentials(), options()).sign(SAMPLE).unwrap();
    let second = PdfSigner::new(credentials(), options().with_signing_time(later))
        .sign(SAMPLE)
        .unwrap();

    assert_eq!(first.as_bytes(), again.as_bytes());
    assert_ne!(first.as_bytes(), second.as_bytes());
    assert_ne!(signed_data(&first), signed_data(&second));
    verify(&first, SIGNER_CERT, DigestAlgorithm::Sha256);
    verify(&second, SIGNER_CERT, DigestAlgorithm::Sha256);
}

#[test]
fn test_sign_with_sha384_and_sha512() {
    for algorithm in [DigestAlgorithm::Sha384, DigestAlgorithm::Sha512] {
        let signed = PdfSigner::new(credentials(), options().with_digest_algorithm(algorithm))
            .sign(SAMPLE)
            .unwrap();
        verify(&signed, SIGNER_CERT, algorithm);
    }
}

#[test]
fn test_signature_dictionary_contents() {
    let signed = PdfSigner::new(credentials(), options().with_contact_info("signer@example.com"))
        .sign(SAMPLE)
        .unwrap();
    let appended = String::from_utf8_lossy(&signed.as_bytes()[SAMPLE.len()..]).into_owned();

    assert!(appended.contains("/Type /Sig"));
    assert!(appended.contains("/Filter /Adobe.PPKLite"));
    assert!(appended.contains("/SubFilter /adbe.pkcs7.detached"));
    assert!(appended.contains("/M (D:20240305140709+02'00')"));
    assert!(appended.contains("/Name (Test Signer)"));
    assert!(appended.contains("/Location (Madrid)"));
    assert!(appended.contains("/ContactInfo (signer@example.com)"));
    assert!(appended.contains("/FT /Sig"));
    assert!(appended.contains("/SigFlags 3"));
    assert!(appended.contains("(Signed by Test Signer) Tj"));
    assert!(appended.contains("(Date: 05/03/2024 14:07:09 +0200) Tj"));
}

#[test]
fn test_sign_twice_adds_second_revision() {
    let signer = PdfSigner::new(credentials(), options());
    let first = signer.sign(SAMPLE).unwrap();
    let second = signer.sign(first.as_bytes()).unwrap();

    assert_eq!(first.field_name(), "Signature1");
    assert_eq!(second.field_name(), "Signature2");
    assert!(second.as_bytes().starts_with(first.as_bytes()));

    // The first signature still covers exactly its own revision.
    let [_, _, o2, l2] = first.byte_range().0;
    assert_eq!(o2 + l2, first.as_bytes().len());
    verify(&second, SIGNER_CERT, DigestAlgorithm::Sha256);
}

#[test]
fn test_certificate_chain_is_embedded() {
    let creds = SigningCredentials::new(LEAF_CERT.to_vec(), LEAF_KEY.to_vec())
        .with_chain(vec![CA_CERT.to_vec()]);
    let signed = PdfSigner::new(creds, options()).sign(SAMPLE).unwrap();

    verify(&signed, LEAF_CERT, DigestAlgorithm::Sha256);
    let certificates = signed_data(&signed).certificates.unwrap();
    assert_eq!(certificates.0.len(), 2);
}

#[test]
fn test_pem_credentials() {
    let creds = SigningCredentials::from_pem(SIGNER_CERT_PEM, SIGNER_KEY_PEM).unwrap();
    let signed = sign(SigningRequest {
        document: SAMPLE,
        credentials: &creds,
        options: options(),
    })
    .unwrap();
    verify(&signed, SIGNER_CERT, DigestAlgorithm::Sha256);
}

#[test]
fn test_placeholder_boundary() {
    let fitted = PdfSigner::new(credentials(), options()).sign(SAMPLE).unwrap();
    let len = fitted.signature_len();

    let exact = PdfSigner::new(credentials(), options().with_max_signature_bytes(len))
        .sign(SAMPLE)
        .unwrap();
    assert_eq!(exact.layout().max_length, len);
    verify(&exact, SIGNER_CERT, DigestAlgorithm::Sha256);

    let short = PdfSigner::new(credentials(), options().with_max_signature_bytes(len - 1)).sign(SAMPLE);
    match short {
        Err(Error::PlaceholderOverflow { actual, max }) => {
            assert_eq!(actual, len);
            assert_eq!(max, len - 1);
        },
        other => panic!("expected PlaceholderOverflow, got {:?}", other.map(|s| s.signature_len())),
    }
}

#[test]
fn test_encrypted_document_rejected() {
    let result = PdfSigner::new(credentials(), options()).sign(ENCRYPTED);
    assert!(matches!(result, Err(Error::UnsupportedFeature(_))));
}

#[test]
fn test_certificate_without_common_name() {
    let creds = SigningCredentials::new(NO_CN_CERT.to_vec(), SIGNER_KEY.to_vec());
    let result = PdfSigner::new(creds, options()).sign(SAMPLE);
    assert!(matches!(result, Err(Error::CertificateFieldMissing { field: "CN" })));
}

#[test]
fn test_key_not_matching_certificate() {
    let creds = SigningCredentials::new(SIGNER_CERT.to_vec(), OTHER_KEY.to_vec());
    let result = PdfSigner::new(creds, options()).sign(SAMPLE);
    assert!(matches!(result, Err(Error::SigningKeyMismatch(_))));
}

#[test]
fn test_non_rsa_credentials() {
    let ec = SigningCredentials::new(EC_CERT.to_vec(), EC_KEY.to_vec());
    assert!(matches!(
        PdfSigner::new(ec, options()).sign(SAMPLE),
        Err(Error::UnsupportedAlgorithm(_))
    ));

    let mixed = SigningCredentials::new(SIGNER_CERT.to_vec(), EC_KEY.to_vec());
    assert!(matches!(
        PdfSigner::new(mixed, options()).sign(SAMPLE),
        Err(Error::UnsupportedAlgorithm(_))
    ));
}

#[test]
fn test_options_from_json() {
    let options = SignOptions::from_json(
        r#"{"digest_algorithm": "SHA-512", "reason": "Approved", "page": 1,
            "rect": {"x0": 10.0, "y0": 10.0, "x1": 210.0, "y1": 60.0}}"#,
    )
    .unwrap()
    .with_signing_time(options().signing_time.unwrap());
    let signed = PdfSigner::new(credentials(), options).sign(SAMPLE).unwrap();

    verify(&signed, SIGNER_CERT, DigestAlgorithm::Sha512);
    let appended = String::from_utf8_lossy(&signed.as_bytes()[SAMPLE.len()..]).into_owned();
    assert!(appended.contains("/Reason (Approved)"));
    assert!(appended.contains("/Rect [10 10 210 60]"));
}

#[test]
fn test_streamed_digest_matches_in_memory() {
    let signed = PdfSigner::new(credentials(), options()).sign(SAMPLE).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signed.pdf");
    std::fs::write(&path, signed.as_bytes()).unwrap();

    let mut file = std::fs::File::open(&path).unwrap();
    let streamed = RangeDigest::compute_reader(&mut file, signed.layout(), DigestAlgorithm::Sha256).unwrap();
    let mut cursor = Cursor::new(signed.as_bytes());
    let in_memory = RangeDigest::compute_reader(&mut cursor, signed.layout(), DigestAlgorithm::Sha256).unwrap();
    assert_eq!(streamed, in_memory);

    let reread = std::fs::read(&path).unwrap();
    assert_eq!(reread, signed.into_bytes());
}
