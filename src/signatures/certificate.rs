//! Leaf certificate fields needed by the signer.

use crate::error::{Error, Result};
use x509_parser::der_parser::asn1_rs::{Any, Tag};
use x509_parser::prelude::*;

/// rsaEncryption, 1.2.840.113549.1.1.1
const RSA_ENCRYPTION_OID: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];

/// Parsed view of an X.509 certificate.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    common_name: Option<String>,
    issuer_der: Vec<u8>,
    serial: Vec<u8>,
    spki_der: Vec<u8>,
    key_algorithm_oid: Vec<u8>,
    key_algorithm: String,
}

impl CertificateInfo {
    /// Parse a DER certificate.
    pub fn parse(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::InvalidCredentials(format!("certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| directory_string(cn.attr_value()));

        let spki = cert.public_key();
        Ok(Self {
            common_name,
            issuer_der: cert.tbs_certificate.issuer.as_raw().to_vec(),
            serial: cert.tbs_certificate.raw_serial().to_vec(),
            spki_der: spki.raw.to_vec(),
            key_algorithm_oid: spki.algorithm.algorithm.as_bytes().to_vec(),
            key_algorithm: spki.algorithm.algorithm.to_id_string(),
        })
    }

    /// Subject common name.
    ///
    /// # Errors
    ///
    /// [`Error::CertificateFieldMissing`] when the subject has no CN.
    pub fn common_name(&self) -> Result<&str> {
        self.common_name
            .as_deref()
            .ok_or(Error::CertificateFieldMissing { field: "CN" })
    }

    /// DER encoding of the issuer Name.
    pub fn issuer_der(&self) -> &[u8] {
        &self.issuer_der
    }

    /// Serial number as INTEGER content octets.
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    /// DER SubjectPublicKeyInfo.
    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }

    /// Dotted OID of the public key algorithm.
    pub fn key_algorithm(&self) -> &str {
        &self.key_algorithm
    }

    /// Whether the certificate carries an RSA key.
    pub fn is_rsa(&self) -> bool {
        self.key_algorithm_oid == RSA_ENCRYPTION_OID
    }

    /// Fail with [`Error::UnsupportedAlgorithm`] unless the key is RSA.
    pub fn require_rsa(&self) -> Result<()> {
        if self.is_rsa() {
            Ok(())
        } else {
            Err(Error::UnsupportedAlgorithm(format!(
                "certificate key algorithm {} (only RSA is supported)",
                self.key_algorithm
            )))
        }
    }
}

/// Decode a DirectoryString-like attribute value.
///
/// BMPString is UTF-16BE and UniversalString is UTF-32BE. TeletexString is
/// read as UTF-8 when valid, otherwise one char per byte.
fn directory_string(value: &Any<'_>) -> Option<String> {
    let data = value.data;
    match value.tag() {
        Tag::BmpString => {
            if data.len() % 2 != 0 {
                return None;
            }
            let units = data.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]]));
            char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
        },
        Tag::UniversalString => {
            if data.len() % 4 != 0 {
                return None;
            }
            data.chunks_exact(4)
                .map(|c| char::from_u32(u32::from_be_bytes([c[0], c[1], c[2], c[3]])))
                .collect()
        },
        Tag::TeletexString => Some(match std::str::from_utf8(data) {
            Ok(s) => s.to_string(),
            Err(_) => data.iter().copied().map(char::from).collect(),
        }),
        _ => std::str::from_utf8(data).ok().map(str::to_string),
    }
}

/// Whether a PKCS#8 private key is an RSA key.
pub fn is_rsa_private_key(pkcs8_der: &[u8]) -> Result<bool> {
    let info = pkcs8::PrivateKeyInfo::try_from(pkcs8_der)
        .map_err(|e| Error::InvalidCredentials(format!("PKCS#8 private key: {}", e)))?;
    Ok(info.algorithm.oid.as_bytes() == RSA_ENCRYPTION_OID)
}
