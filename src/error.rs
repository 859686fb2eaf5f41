//! Error types for the signing pipeline.
//!
//! Every failure is terminal for a signing operation: no partially written
//! document is ever handed back to the caller.

/// Result type alias for signing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while preparing, signing or filling a PDF.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Header, cross-reference data, trailer or object syntax could not be parsed
    #[error("Malformed PDF document: {0}")]
    MalformedDocument(String),

    /// The document uses a feature the signer does not handle (encryption, PDF version)
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// The private key does not produce signatures the leaf certificate verifies
    #[error("Signing key does not match the signer certificate: {0}")]
    SigningKeyMismatch(String),

    /// Unknown digest name or a non-RSA key/certificate
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A required certificate field is absent
    #[error("Certificate field missing: {field}")]
    CertificateFieldMissing {
        /// Name of the missing field (e.g. "CN")
        field: &'static str,
    },

    /// The encoded CMS structure does not fit the reserved placeholder
    #[error("Signature of {actual} bytes exceeds the reserved placeholder of {max} bytes")]
    PlaceholderOverflow {
        /// Length of the DER-encoded signature
        actual: usize,
        /// Reserved placeholder capacity (bytes before hex encoding)
        max: usize,
    },

    /// Certificate or key material could not be decoded
    #[error("Invalid signing credentials: {0}")]
    InvalidCredentials(String),

    /// Signing options are out of range or could not be deserialized
    #[error("Invalid signing options: {0}")]
    InvalidConfig(String),

    /// IO error from a caller-supplied reader
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
