//! Digital signature types and data structures.
//!
//! Signing options, the digest algorithm selection and the credentials
//! handed to the signer.

use crate::error::{Error, Result};
use crate::geometry::Rect;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_parser::pem::Pem;
use zeroize::Zeroizing;

/// Default `/Reason` text.
pub const DEFAULT_REASON: &str =
    "Digital Signature to ensure authentication, integrity and non-repudiation";

/// Default `/Location` text.
pub const DEFAULT_LOCATION: &str = "Madrid";

/// Default reserved size for the DER signature, before hex encoding.
pub const DEFAULT_MAX_SIGNATURE_BYTES: usize = 32768;

/// Upper bound for the reserved signature size (16 MiB before hex encoding).
pub const MAX_SIGNATURE_BYTES_LIMIT: usize = 16 * 1024 * 1024;

/// Digest algorithm used for signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-256 (default)
    #[default]
    #[serde(rename = "SHA-256", alias = "SHA256")]
    Sha256,
    /// SHA-384
    #[serde(rename = "SHA-384", alias = "SHA384")]
    Sha384,
    /// SHA-512
    #[serde(rename = "SHA-512", alias = "SHA512")]
    Sha512,
}

impl DigestAlgorithm {
    /// DER content bytes of the digest algorithm OID.
    pub fn oid(&self) -> &'static [u8] {
        match self {
            DigestAlgorithm::Sha256 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01], // 2.16.840.1.101.3.4.2.1
            DigestAlgorithm::Sha384 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02], // 2.16.840.1.101.3.4.2.2
            DigestAlgorithm::Sha512 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03], // 2.16.840.1.101.3.4.2.3
        }
    }

    /// DER content bytes of the matching `sha*WithRSAEncryption` OID.
    pub fn rsa_signature_oid(&self) -> &'static [u8] {
        match self {
            DigestAlgorithm::Sha256 => &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B], // 1.2.840.113549.1.1.11
            DigestAlgorithm::Sha384 => &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0C], // 1.2.840.113549.1.1.12
            DigestAlgorithm::Sha512 => &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0D], // 1.2.840.113549.1.1.13
        }
    }

    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Parse an algorithm name such as `SHA-256`, `sha384` or `SHA512`.
    pub fn from_name(name: &str) -> Result<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "SHA256" => Ok(DigestAlgorithm::Sha256),
            "SHA384" => Ok(DigestAlgorithm::Sha384),
            "SHA512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(Error::UnsupportedAlgorithm(format!("digest algorithm {}", name))),
        }
    }

    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// One-shot digest of `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Source of the signing key and certificate chain.
pub trait CertificateProvider {
    /// PKCS#8 DER private key matching the leaf certificate.
    fn private_key(&self) -> &[u8];

    /// DER certificates, leaf first.
    fn certificate_chain(&self) -> &[Vec<u8>];

    /// The leaf certificate.
    fn public_certificate(&self) -> Result<&[u8]> {
        self.certificate_chain()
            .first()
            .map(Vec::as_slice)
            .ok_or_else(|| Error::InvalidCredentials("certificate chain is empty".to_string()))
    }
}

impl<T: CertificateProvider + ?Sized> CertificateProvider for &T {
    fn private_key(&self) -> &[u8] {
        (**self).private_key()
    }

    fn certificate_chain(&self) -> &[Vec<u8>] {
        (**self).certificate_chain()
    }
}

/// Signing credentials containing certificate chain and private key.
#[derive(Clone)]
pub struct SigningCredentials {
    /// DER-encoded X.509 certificates, leaf first
    chain: Vec<Vec<u8>>,
    /// DER-encoded private key (PKCS#8), wiped on drop
    private_key: Zeroizing<Vec<u8>>,
}

impl SigningCredentials {
    /// Create new signing credentials from a leaf certificate and its key.
    pub fn new(certificate: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self {
            chain: vec![certificate],
            private_key: Zeroizing::new(private_key),
        }
    }

    /// Append intermediate or root certificates after the leaf.
    pub fn with_chain(mut self, chain: Vec<Vec<u8>>) -> Self {
        self.chain.extend(chain);
        self
    }

    /// Load credentials from PEM text.
    ///
    /// `cert_pem` holds one or more `CERTIFICATE` blocks, leaf first.
    /// `key_pem` holds a `PRIVATE KEY` (PKCS#8) or `RSA PRIVATE KEY` (PKCS#1)
    /// block.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let mut chain = Vec::new();
        for pem in Pem::iter_from_buffer(cert_pem.as_bytes()) {
            let pem = pem.map_err(|e| Error::InvalidCredentials(format!("certificate PEM: {}", e)))?;
            if pem.label == "CERTIFICATE" {
                chain.push(pem.contents);
            }
        }
        if chain.is_empty() {
            return Err(Error::InvalidCredentials("no CERTIFICATE block found".to_string()));
        }

        let key_block = Pem::iter_from_buffer(key_pem.as_bytes())
            .next()
            .ok_or_else(|| Error::InvalidCredentials("no private key block found".to_string()))?
            .map_err(|e| Error::InvalidCredentials(format!("private key PEM: {}", e)))?;

        let private_key = match key_block.label.as_str() {
            "PRIVATE KEY" => Zeroizing::new(key_block.contents),
            "RSA PRIVATE KEY" => {
                use rsa::pkcs1::DecodeRsaPrivateKey;
                use rsa::pkcs8::EncodePrivateKey;

                let pkcs1 = Zeroizing::new(key_block.contents);
                let key = rsa::RsaPrivateKey::from_pkcs1_der(&pkcs1)
                    .map_err(|e| Error::InvalidCredentials(format!("PKCS#1 key: {}", e)))?;
                let document = key
                    .to_pkcs8_der()
                    .map_err(|e| Error::InvalidCredentials(format!("PKCS#8 conversion: {}", e)))?;
                Zeroizing::new(document.as_bytes().to_vec())
            },
            "ENCRYPTED PRIVATE KEY" => {
                return Err(Error::InvalidCredentials(
                    "encrypted private keys must be decrypted by the caller".to_string(),
                ));
            },
            other => {
                return Err(Error::UnsupportedAlgorithm(format!("private key type {}", other)));
            },
        };

        Ok(Self { chain, private_key })
    }
}

impl CertificateProvider for SigningCredentials {
    fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    fn certificate_chain(&self) -> &[Vec<u8>] {
        &self.chain
    }
}

impl std::fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("chain", &format!("{} certificates", self.chain.len()))
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Options for signing a PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignOptions {
    /// Digest algorithm to use
    pub digest_algorithm: DigestAlgorithm,
    /// Reason for signing
    pub reason: String,
    /// Location where the document was signed
    pub location: String,
    /// Contact information
    pub contact_info: Option<String>,
    /// Name of the signer (if different from certificate CN)
    pub name: Option<String>,
    /// Visible rectangle in page user space
    pub rect: Rect,
    /// Page receiving the visible signature (1-based)
    pub page: usize,
    /// Bytes reserved for the DER signature, before hex encoding
    pub max_signature_bytes: usize,
    /// Signing time; the current local time when unset
    pub signing_time: Option<DateTime<FixedOffset>>,
    /// Field name; `SignatureN` (first unused N) when unset
    pub field_name: Option<String>,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            digest_algorithm: DigestAlgorithm::Sha256,
            reason: DEFAULT_REASON.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            contact_info: None,
            name: None,
            rect: Rect::default(),
            page: 1,
            max_signature_bytes: DEFAULT_MAX_SIGNATURE_BYTES,
            signing_time: None,
            field_name: None,
        }
    }
}

impl SignOptions {
    /// Load options from JSON; absent keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidConfig(format!("sign options: {}", e)))
    }

    /// Set the digest algorithm.
    pub fn with_digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the contact information.
    pub fn with_contact_info(mut self, contact_info: impl Into<String>) -> Self {
        self.contact_info = Some(contact_info.into());
        self
    }

    /// Override the signer name shown in the signature.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the visible rectangle.
    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    /// Set the page (1-based).
    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    /// Set the reserved signature size in bytes.
    pub fn with_max_signature_bytes(mut self, max: usize) -> Self {
        self.max_signature_bytes = max;
        self
    }

    /// Fix the signing time instead of using the current time.
    pub fn with_signing_time(mut self, time: DateTime<FixedOffset>) -> Self {
        self.signing_time = Some(time);
        self
    }

    /// Set the signature field name.
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = Some(name.into());
        self
    }

    /// Check option values that can be rejected without looking at the document.
    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(Error::InvalidConfig("page numbers start at 1".to_string()));
        }
        if self.max_signature_bytes == 0 || self.max_signature_bytes > MAX_SIGNATURE_BYTES_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "max_signature_bytes must be between 1 and {}, got {}",
                MAX_SIGNATURE_BYTES_LIMIT, self.max_signature_bytes
            )));
        }
        if self.rect.is_degenerate() {
            return Err(Error::InvalidConfig(format!(
                "signature rectangle {:?} encloses no area",
                self.rect
            )));
        }
        if let Some(name) = &self.field_name {
            if name.is_empty() || name.contains('.') {
                return Err(Error::InvalidConfig(format!(
                    "field name {:?} must be non-empty and contain no '.'",
                    name
                )));
            }
        }
        Ok(())
    }
}
