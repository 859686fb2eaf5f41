//! CMS SignedData encoder (CAdES-BES, detached).
//!
//! ```text
//! ContentInfo { signedData, [0] SignedData {
//!     version 1, digestAlgorithms, encapContentInfo { id-data },
//!     [0] certificates, signerInfos { SignerInfo {
//!         version 1, issuerAndSerialNumber, digestAlgorithm,
//!         [0] signedAttrs { contentType, signingTime, messageDigest,
//!                           signingCertificateV2 },
//!         signatureAlgorithm, signature } } } }
//! ```

use super::asn1::{self, tag};
use super::certificate::{is_rsa_private_key, CertificateInfo};
use super::types::DigestAlgorithm;
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, Utc};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};

/// 1.2.840.113549.1.7.1
const OID_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];
/// 1.2.840.113549.1.7.2
const OID_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];
/// 1.2.840.113549.1.9.3
const OID_CONTENT_TYPE: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x03];
/// 1.2.840.113549.1.9.4
const OID_MESSAGE_DIGEST: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04];
/// 1.2.840.113549.1.9.5
const OID_SIGNING_TIME: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x05];
/// 1.2.840.113549.1.9.16.2.47
const OID_SIGNING_CERTIFICATE_V2: &[u8] =
    &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x10, 0x02, 0x2F];

/// DER-encoded detached SignedData, ready for the placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmsSignature {
    der: Vec<u8>,
}

impl CmsSignature {
    /// Wrap already encoded SignedData.
    pub fn from_der(der: Vec<u8>) -> Self {
        Self { der }
    }

    /// The DER bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.der
    }

    /// Consume into the DER bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.der
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.der.len()
    }

    /// True only for a signature wrapped from empty bytes.
    pub fn is_empty(&self) -> bool {
        self.der.is_empty()
    }
}

/// Build the CMS signature over a document digest.
///
/// `private_key` is PKCS#8 DER; `certificate_chain` is DER, leaf first. The
/// decoded key lives only for the duration of this call.
///
/// # Errors
///
/// - [`Error::UnsupportedAlgorithm`] for non-RSA keys or certificates, or a
///   digest whose length does not match `algorithm`
/// - [`Error::SigningKeyMismatch`] when the key does not belong to the leaf
///   certificate or the produced signature fails verification against it
/// - [`Error::InvalidCredentials`] for an empty chain or undecodable key
pub fn encode(
    digest: &[u8],
    algorithm: DigestAlgorithm,
    private_key: &[u8],
    certificate_chain: &[Vec<u8>],
    signing_time: &DateTime<FixedOffset>,
) -> Result<CmsSignature> {
    let leaf_der = certificate_chain
        .first()
        .ok_or_else(|| Error::InvalidCredentials("certificate chain is empty".to_string()))?;
    let leaf = CertificateInfo::parse(leaf_der)?;
    leaf.require_rsa()?;

    if digest.len() != algorithm.output_len() {
        return Err(Error::UnsupportedAlgorithm(format!(
            "{}-byte digest does not match {}",
            digest.len(),
            algorithm
        )));
    }

    let signed_attrs = signed_attributes(digest, algorithm, leaf_der, &leaf, signing_time);
    let signature = sign_rsa(&asn1::tlv(tag::SET, &signed_attrs), algorithm, private_key, &leaf)?;

    let signer_info = asn1::sequence(&[
        &asn1::integer(1),
        &issuer_and_serial(&leaf),
        &asn1::algorithm_identifier(algorithm.oid()),
        &asn1::context(tag::CONTEXT_0, &signed_attrs),
        &asn1::algorithm_identifier(algorithm.rsa_signature_oid()),
        &asn1::octet_string(&signature),
    ]);

    let mut certificates = certificate_chain.to_vec();
    certificates.sort();

    let signed_data = asn1::sequence(&[
        &asn1::integer(1),
        &asn1::set_of(vec![asn1::algorithm_identifier(algorithm.oid())]),
        &asn1::sequence(&[&asn1::oid(OID_DATA)]),
        &asn1::context(tag::CONTEXT_0, &certificates.concat()),
        &asn1::set_of(vec![signer_info]),
    ]);

    let der = asn1::sequence(&[
        &asn1::oid(OID_SIGNED_DATA),
        &asn1::context(tag::CONTEXT_0, &signed_data),
    ]);

    log::debug!(
        "Encoded CMS SignedData: {} bytes, {} certificate(s), {}withRSA",
        der.len(),
        certificate_chain.len(),
        algorithm
    );

    Ok(CmsSignature { der })
}

/// Content octets of the signedAttrs SET.
///
/// The signature covers them under the universal SET tag; the SignerInfo
/// carries the same octets under `[0]`.
fn signed_attributes(
    digest: &[u8],
    algorithm: DigestAlgorithm,
    leaf_der: &[u8],
    leaf: &CertificateInfo,
    signing_time: &DateTime<FixedOffset>,
) -> Vec<u8> {
    let attribute = |oid: &[u8], value: Vec<u8>| {
        asn1::sequence(&[&asn1::oid(oid), &asn1::set_of(vec![value])])
    };

    asn1::set_of_content(vec![
        attribute(OID_CONTENT_TYPE, asn1::oid(OID_DATA)),
        attribute(OID_SIGNING_TIME, asn1::time(&signing_time.with_timezone(&Utc))),
        attribute(OID_MESSAGE_DIGEST, asn1::octet_string(digest)),
        attribute(OID_SIGNING_CERTIFICATE_V2, signing_certificate_v2(algorithm, leaf_der, leaf)),
    ])
}

/// `SigningCertificateV2 { certs { ESSCertIDv2 } }` for the leaf.
///
/// hashAlgorithm is left out for SHA-256, its DEFAULT value.
fn signing_certificate_v2(algorithm: DigestAlgorithm, leaf_der: &[u8], leaf: &CertificateInfo) -> Vec<u8> {
    let general_names = asn1::sequence(&[&asn1::context(tag::CONTEXT_4, leaf.issuer_der())]);
    let issuer_serial = asn1::sequence(&[&general_names, &asn1::tlv(tag::INTEGER, leaf.serial())]);
    let cert_hash = asn1::octet_string(&algorithm.digest(leaf_der));

    let ess_cert_id = if algorithm == DigestAlgorithm::Sha256 {
        asn1::sequence(&[&cert_hash, &issuer_serial])
    } else {
        asn1::sequence(&[&asn1::algorithm_identifier(algorithm.oid()), &cert_hash, &issuer_serial])
    };

    asn1::sequence(&[&asn1::sequence(&[&ess_cert_id])])
}

fn issuer_and_serial(leaf: &CertificateInfo) -> Vec<u8> {
    asn1::sequence(&[leaf.issuer_der(), &asn1::tlv(tag::INTEGER, leaf.serial())])
}

fn pkcs1v15(algorithm: DigestAlgorithm) -> Pkcs1v15Sign {
    match algorithm {
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    }
}

/// RSASSA-PKCS1-v1_5 over the signed attributes, verified against the leaf key.
fn sign_rsa(
    signed_attrs: &[u8],
    algorithm: DigestAlgorithm,
    private_key: &[u8],
    leaf: &CertificateInfo,
) -> Result<Vec<u8>> {
    if !is_rsa_private_key(private_key)? {
        return Err(Error::UnsupportedAlgorithm("private key is not an RSA key".to_string()));
    }

    let public = RsaPublicKey::from_public_key_der(leaf.spki_der())
        .map_err(|e| Error::InvalidCredentials(format!("certificate public key: {}", e)))?;
    let key = RsaPrivateKey::from_pkcs8_der(private_key)
        .map_err(|e| Error::InvalidCredentials(format!("RSA private key: {}", e)))?;

    if RsaPublicKey::from(&key) != public {
        return Err(Error::SigningKeyMismatch(
            "private key does not match the leaf certificate".to_string(),
        ));
    }

    let hashed = algorithm.digest(signed_attrs);
    let signature = key
        .sign(pkcs1v15(algorithm), &hashed)
        .map_err(|e| Error::SigningKeyMismatch(format!("RSA signing failed: {}", e)))?;
    drop(key);

    public
        .verify(pkcs1v15(algorithm), &hashed, &signature)
        .map_err(|e| Error::SigningKeyMismatch(format!("signature self-check failed: {}", e)))?;

    Ok(signature)
}
