//! PDF digital signatures.
//!
//! Signs documents with a detached CMS signature (`adbe.pkcs7.detached`,
//! CAdES-BES signed attributes) appended as an incremental update, so every
//! byte of the input stays in place and earlier signatures remain valid.
//!
//! ## Pipeline
//!
//! - **Appearance**: signer name, reason, location and date rendered into
//!   the widget rectangle ([`AppearanceBuilder`])
//! - **Placeholder reservation**: signature dictionary, field and widget
//!   written with a zero-filled `/Contents` ([`placeholder::reserve`])
//! - **Range digest**: hash of everything but the placeholder ([`RangeDigest`])
//! - **CMS encoding**: SignedData over the digest ([`cms::encode`])
//! - **Placeholder fill**: hex signature written in place ([`fill()`])
//!
//! ## Example
//!
//! ```ignore
//! use pdf_seal::signatures::{PdfSigner, SignOptions, SigningCredentials};
//!
//! let credentials = SigningCredentials::from_pem(&cert_pem, &key_pem)?;
//! let options = SignOptions::default().with_reason("Approved");
//! let signed = PdfSigner::new(credentials, options).sign(&pdf_bytes)?;
//! std::fs::write("signed.pdf", signed.as_bytes())?;
//! ```
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - RFC 5652 - Cryptographic Message Syntax
//! - RFC 5035 - ESS Update: SigningCertificateV2

mod appearance;
pub mod asn1;
mod byterange;
pub mod certificate;
pub mod cms;
mod digest;
mod fill;
pub mod placeholder;
mod signer;
mod types;

pub use appearance::{
    format_display_date, format_pdf_date, AppearanceBuilder, SignatureMetadata,
};
pub use byterange::{ByteRange, ByteRangeCalculator, PlaceholderLayout};
pub use certificate::CertificateInfo;
pub use cms::CmsSignature;
pub use digest::{digest, RangeDigest, RangeHasher, CHUNK_SIZE};
pub use fill::fill;
pub use placeholder::ReservedDocument;
pub use signer::{sign, PdfSigner, SignedDocument, SigningRequest};
pub use types::{
    CertificateProvider, DigestAlgorithm, SignOptions, SigningCredentials, DEFAULT_LOCATION,
    DEFAULT_MAX_SIGNATURE_BYTES, DEFAULT_REASON, MAX_SIGNATURE_BYTES_LIMIT,
};
