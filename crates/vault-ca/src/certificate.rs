//! X.509 certificate handling.
//!
//! This module provides a small owned certificate type with accessors for the
//! fields the issuance workflow inspects: validity, subject, basic constraints
//! and the subject public key.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::{GeneralName, ParsedExtension};

/// An X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// DER-encoded certificate data.
    der: Vec<u8>,
    /// PEM representation (cached).
    pem: String,
}

impl Certificate {
    /// Creates a certificate from DER-encoded bytes.
    pub fn from_der(der: Vec<u8>) -> Self {
        let pem = der_to_pem(&der, "CERTIFICATE");
        Self { der, pem }
    }

    /// Creates a certificate from PEM-encoded data.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let der = pem_to_der(pem)?;
        Ok(Self {
            der,
            pem: pem.to_string(),
        })
    }

    /// Returns the DER-encoded certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the PEM-encoded certificate.
    pub fn to_pem(&self) -> &str {
        &self.pem
    }

    fn parse(&self) -> Result<X509Certificate<'_>> {
        let (_, cert) = x509_parser::parse_x509_certificate(&self.der)
            .map_err(|e| Error::Certificate(format!("failed to parse certificate: {e}")))?;
        Ok(cert)
    }

    /// Returns the certificate's not-after (expiry) time.
    pub fn not_after(&self) -> Result<DateTime<Utc>> {
        let cert = self.parse()?;
        DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| Error::Certificate("invalid not_after timestamp".to_string()))
    }

    /// Returns the certificate's not-before time.
    pub fn not_before(&self) -> Result<DateTime<Utc>> {
        let cert = self.parse()?;
        DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
            .ok_or_else(|| Error::Certificate("invalid not_before timestamp".to_string()))
    }

    /// Returns the certificate's subject as a string.
    pub fn subject(&self) -> Result<String> {
        Ok(self.parse()?.subject().to_string())
    }

    /// Returns the certificate's issuer as a string.
    pub fn issuer(&self) -> Result<String> {
        Ok(self.parse()?.issuer().to_string())
    }

    /// Returns the serial number as lowercase hex.
    pub fn serial_hex(&self) -> Result<String> {
        let cert = self.parse()?;
        Ok(cert
            .raw_serial()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect())
    }

    /// Checks if this certificate is a CA certificate.
    pub fn is_ca(&self) -> Result<bool> {
        Ok(self.parse()?.is_ca())
    }

    /// Returns the basic constraints path length, if one is set.
    pub fn path_length(&self) -> Result<Option<u32>> {
        let cert = self.parse()?;
        let constraints = cert
            .basic_constraints()
            .map_err(|e| Error::Certificate(format!("invalid basic constraints: {e}")))?;
        Ok(constraints.and_then(|bc| bc.value.path_len_constraint))
    }

    /// Returns the DNS names from the subject alternative name extension.
    pub fn dns_names(&self) -> Result<Vec<String>> {
        let cert = self.parse()?;
        let mut names = Vec::new();
        for ext in cert.extensions() {
            if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
                for name in &san.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        names.push(dns.to_string());
                    }
                }
            }
        }
        Ok(names)
    }

    /// Returns the DER-encoded SubjectPublicKeyInfo.
    pub fn public_key_info(&self) -> Result<Vec<u8>> {
        Ok(self.parse()?.public_key().raw.to_vec())
    }

    /// Verifies this certificate's signature with the issuer's public key.
    ///
    /// Passing the certificate itself checks a self-signature.
    pub fn verify_signed_by(&self, issuer: &Certificate) -> Result<()> {
        let cert = self.parse()?;
        let issuer = issuer.parse()?;
        cert.verify_signature(Some(issuer.public_key()))
            .map_err(|e| Error::Certificate(format!("signature verification failed: {e}")))
    }
}

/// Parses a PEM-encoded certificate chain.
pub fn parse_cert_chain_pem(pem: &str) -> Result<Vec<Certificate>> {
    let blocks = pem::parse_many(pem)
        .map_err(|e| Error::Certificate(format!("failed to parse PEM: {e}")))?;
    Ok(blocks
        .into_iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .map(|p| Certificate::from_der(p.into_contents()))
        .collect())
}

/// Converts DER bytes to PEM format.
pub(crate) fn der_to_pem(der: &[u8], label: &str) -> String {
    let p = pem::Pem::new(label, der);
    pem::encode(&p)
}

/// Converts PEM to DER bytes.
pub(crate) fn pem_to_der(pem_str: &str) -> Result<Vec<u8>> {
    let parsed =
        pem::parse(pem_str).map_err(|e| Error::Certificate(format!("failed to parse PEM: {e}")))?;
    Ok(parsed.into_contents())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

    fn self_signed_ca() -> Certificate {
        let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let mut params = CertificateParams::new(vec!["ca.example".to_string()]).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(2));
        let cert = params.self_signed(&key).unwrap();
        Certificate::from_der(cert.der().to_vec())
    }

    #[test]
    fn test_der_to_pem_roundtrip() {
        let original = vec![0x30, 0x82, 0x01, 0x22];
        let pem = der_to_pem(&original, "CERTIFICATE");
        assert_eq!(pem_to_der(&pem).unwrap(), original);
    }

    #[test]
    fn test_accessors() {
        let cert = self_signed_ca();
        assert!(cert.is_ca().unwrap());
        assert_eq!(cert.path_length().unwrap(), Some(2));
        assert_eq!(cert.dns_names().unwrap(), vec!["ca.example".to_string()]);
        assert!(cert.not_before().unwrap() < cert.not_after().unwrap());
        assert!(!cert.serial_hex().unwrap().is_empty());
        assert_eq!(cert.public_key_info().unwrap()[0], 0x30);
        cert.verify_signed_by(&cert).unwrap();
    }

    #[test]
    fn test_from_pem_matches_der() {
        let cert = self_signed_ca();
        let parsed = Certificate::from_pem(cert.to_pem()).unwrap();
        assert_eq!(parsed.der(), cert.der());
    }

    #[test]
    fn test_parse_chain() {
        let a = self_signed_ca();
        let b = self_signed_ca();
        let chain = format!("{}{}", a.to_pem(), b.to_pem());
        let parsed = parse_cert_chain_pem(&chain).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].der(), a.der());
        assert_eq!(parsed[1].der(), b.der());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let cert = Certificate::from_der(vec![0x30, 0x00]);
        assert!(matches!(cert.subject(), Err(Error::Certificate(_))));
    }
}
