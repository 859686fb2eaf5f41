// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::should_implement_trait)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # PDF Seal
//!
//! Incremental-update PDF signing in Rust.
//!
//! ## Core Features
//!
//! - **Append-only signing**: the input bytes are kept verbatim and the
//!   signature is added as a new revision, so earlier signatures stay valid
//! - **Both xref flavours**: classic cross-reference tables and
//!   cross-reference streams, including compressed object streams
//! - **CAdES-BES CMS**: detached SignedData with contentType, signingTime,
//!   messageDigest and signingCertificateV2 signed attributes
//! - **RSA PKCS#1 v1.5** with SHA-256, SHA-384 or SHA-512
//! - **Visible signature**: widget with a Helvetica appearance showing the
//!   signer, reason, location and date
//!
//! ## Architecture
//!
//! - [`document`], [`parser`], [`lexer`], [`xref`], [`objstm`], [`decoders`]:
//!   a minimal read-only PDF object model
//! - [`writer`]: object serialization and the incremental-update writer
//! - [`signatures`]: placeholder reservation, range digest, CMS encoding,
//!   placeholder fill and the [`PdfSigner`] pipeline
//!
//! ## Quick Start
//!
//! ```ignore
//! use pdf_seal::{PdfSigner, SignOptions, SigningCredentials};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = SigningCredentials::from_pem(
//!     &std::fs::read_to_string("cert.pem")?,
//!     &std::fs::read_to_string("key.pem")?,
//! )?;
//! let options = SignOptions::default()
//!     .with_reason("Approved")
//!     .with_location("Madrid");
//!
//! let input = std::fs::read("document.pdf")?;
//! let signed = PdfSigner::new(credentials, options).sign(&input)?;
//! std::fs::write("document-signed.pdf", signed.as_bytes())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 (<http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license (<http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Core PDF parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;

// Stream decoders
pub mod decoders;

// Page geometry
pub mod geometry;

// Incremental updates
pub mod writer;

// Digital signatures
pub mod signatures;

// Re-exports
pub use document::PdfDocument;
pub use error::{Error, Result};
pub use geometry::Rect;
pub use signatures::{
    sign, CertificateProvider, DigestAlgorithm, PdfSigner, SignOptions, SignedDocument,
    SigningCredentials, SigningRequest,
};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
