//! PDF signing pipeline.
//!
//! [`PdfSigner::sign`] runs the stages in order and aborts on the first
//! failure; no partial output is ever returned.
//!
//! 1. Leaf certificate checks (chain present, CN present, RSA key)
//! 2. Appearance and signature metadata
//! 3. Document parsing and placeholder reservation
//! 4. Range digest
//! 5. CMS encoding
//! 6. Placeholder fill

use super::appearance::AppearanceBuilder;
use super::byterange::{ByteRange, PlaceholderLayout};
use super::certificate::CertificateInfo;
use super::cms;
use super::digest::RangeDigest;
use super::fill::fill;
use super::placeholder;
use super::types::{CertificateProvider, SignOptions};
use crate::document::PdfDocument;
use crate::error::Result;
use chrono::Local;

/// A signed document and where its signature lives.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    bytes: Vec<u8>,
    layout: PlaceholderLayout,
    field_name: String,
    signature_len: usize,
}

impl SignedDocument {
    /// The final document bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into the final document bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Placeholder layout used for this signature.
    pub fn layout(&self) -> &PlaceholderLayout {
        &self.layout
    }

    /// `/ByteRange` of the new signature.
    pub fn byte_range(&self) -> ByteRange {
        self.layout.byte_range()
    }

    /// Name of the signature field that was added.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Length of the embedded CMS signature, before padding.
    pub fn signature_len(&self) -> usize {
        self.signature_len
    }
}

/// PDF signer that appends a signature revision to a document.
pub struct PdfSigner<P: CertificateProvider> {
    provider: P,
    options: SignOptions,
}

impl<P: CertificateProvider> PdfSigner<P> {
    /// Create a new PDF signer with the given credentials and options.
    pub fn new(provider: P, options: SignOptions) -> Self {
        Self { provider, options }
    }

    /// The options this signer was created with.
    pub fn options(&self) -> &SignOptions {
        &self.options
    }

    /// Sign `document` and return the original bytes plus the signature revision.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`](crate::Error::InvalidConfig) for invalid options
    /// - [`Error::InvalidCredentials`](crate::Error::InvalidCredentials),
    ///   [`Error::CertificateFieldMissing`](crate::Error::CertificateFieldMissing),
    ///   [`Error::UnsupportedAlgorithm`](crate::Error::UnsupportedAlgorithm) or
    ///   [`Error::SigningKeyMismatch`](crate::Error::SigningKeyMismatch) for
    ///   unusable credentials
    /// - [`Error::MalformedDocument`](crate::Error::MalformedDocument) or
    ///   [`Error::UnsupportedFeature`](crate::Error::UnsupportedFeature) for
    ///   documents that cannot be read or are encrypted
    /// - [`Error::PlaceholderOverflow`](crate::Error::PlaceholderOverflow) when
    ///   the CMS signature does not fit `max_signature_bytes`
    pub fn sign(&self, document: &[u8]) -> Result<SignedDocument> {
        let options = &self.options;
        options.validate()?;

        let leaf = CertificateInfo::parse(self.provider.public_certificate()?)?;
        let common_name = leaf.common_name()?.to_string();
        leaf.require_rsa()?;

        let signing_time = options
            .signing_time
            .unwrap_or_else(|| Local::now().fixed_offset());
        let metadata = AppearanceBuilder::new(options, common_name, signing_time).build()?;

        let doc = PdfDocument::from_bytes(document)?;
        let reserved = placeholder::reserve(&doc, options.max_signature_bytes, &metadata)?;
        let layout = reserved.layout;

        let digest = RangeDigest::compute(&reserved.bytes, &layout, options.digest_algorithm)?;
        let signature = cms::encode(
            &digest,
            options.digest_algorithm,
            self.provider.private_key(),
            self.provider.certificate_chain(),
            &signing_time,
        )?;
        log::debug!(
            "CMS signature uses {} of {} reserved bytes",
            signature.len(),
            layout.max_length
        );

        let signature_len = signature.len();
        let bytes = fill(reserved.bytes, &layout, &signature)?;

        log::info!(
            "Signed document as {:?} for {:?}: {} -> {} bytes, ByteRange {}",
            reserved.field_name,
            metadata.signer_name,
            document.len(),
            bytes.len(),
            layout.byte_range().to_pdf_array()
        );

        Ok(SignedDocument {
            bytes,
            layout,
            field_name: reserved.field_name,
            signature_len,
        })
    }
}

/// One signing operation: a document, the credentials and the options.
pub struct SigningRequest<'a> {
    /// Document to sign
    pub document: &'a [u8],
    /// Key and certificate chain
    pub credentials: &'a dyn CertificateProvider,
    /// Signing options
    pub options: SignOptions,
}

/// Sign a document in one call.
pub fn sign(request: SigningRequest<'_>) -> Result<SignedDocument> {
    PdfSigner::new(request.credentials, request.options).sign(request.document)
}
