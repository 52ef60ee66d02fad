//! Certificate Signing Request (CSR) handling.
//!
//! The vault hands back a PKCS#10 request for every pending certificate. Before
//! anything is signed, the request is decoded and its self-signature verified
//! (proof that the vault holds the matching private key). The decoded public
//! key is what ends up in the issued certificate.
//!
//! [`CsrOptions`] covers the other direction and is what key custodians that
//! hold keys in process (such as [`MemoryKeyVault`](crate::MemoryKeyVault))
//! use to build requests.

use crate::subject::SubjectName;
use crate::{Error, Result};
use rcgen::{KeyPair, SanType};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::FromDer;

/// A CSR whose signature has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCsr {
    /// Subject as written in the request.
    pub subject: String,
    /// DER-encoded SubjectPublicKeyInfo.
    pub public_key_info: Vec<u8>,
    /// DNS names requested through the extension request attribute.
    pub dns_names: Vec<String>,
}

/// Decodes a CSR (DER, or PEM with a `CERTIFICATE REQUEST` label) and verifies its signature.
///
/// The returned error string describes the failure; callers classify it.
pub fn decode_and_verify(csr: &[u8]) -> std::result::Result<VerifiedCsr, String> {
    if csr.is_empty() {
        return Err("CSR is empty".to_string());
    }

    let der = if csr.starts_with(b"-----BEGIN") {
        let parsed = pem::parse(csr).map_err(|e| format!("failed to parse PEM: {e}"))?;
        if parsed.tag() != "CERTIFICATE REQUEST" && parsed.tag() != "NEW CERTIFICATE REQUEST" {
            return Err(format!("unexpected PEM label: {}", parsed.tag()));
        }
        parsed.into_contents()
    } else {
        csr.to_vec()
    };

    let (rest, request) = X509CertificationRequest::from_der(&der)
        .map_err(|e| format!("failed to parse CSR: {e}"))?;
    if !rest.is_empty() {
        return Err("trailing data after CSR".to_string());
    }

    // The signature is checked against the request's own public key, which
    // binds the key in the request to the key that produced it.
    request
        .verify_signature()
        .map_err(|e| format!("CSR signature verification failed: {e}"))?;

    let info = &request.certification_request_info;
    let mut dns_names = Vec::new();
    if let Some(extensions) = request.requested_extensions() {
        for ext in extensions {
            if let ParsedExtension::SubjectAlternativeName(san) = ext {
                for name in &san.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        dns_names.push(dns.to_string());
                    }
                }
            }
        }
    }

    Ok(VerifiedCsr {
        subject: info.subject.to_string(),
        public_key_info: info.subject_pki.raw.to_vec(),
        dns_names,
    })
}

/// Options for generating a Certificate Signing Request.
#[derive(Debug, Clone)]
pub struct CsrOptions {
    subject: SubjectName,
    /// DNS subject alternative names.
    dns_names: Vec<String>,
}

impl CsrOptions {
    pub fn new(subject: SubjectName) -> Self {
        Self {
            subject,
            dns_names: Vec::new(),
        }
    }

    /// Sets the DNS subject alternative names.
    pub fn with_dns_names(mut self, dns_names: Vec<String>) -> Self {
        self.dns_names = dns_names;
        self
    }

    /// Builds the certificate parameters shared by CSRs and vault self-signed certificates.
    pub(crate) fn params(&self) -> Result<rcgen::CertificateParams> {
        let mut params = rcgen::CertificateParams::default();
        params.distinguished_name = self.subject.to_rcgen()?;
        params.subject_alt_names = self
            .dns_names
            .iter()
            .map(|dns| {
                dns.as_str().try_into().map(SanType::DnsName).map_err(|e| {
                    Error::InvalidRequest(format!("invalid DNS name '{dns}': {e}"))
                })
            })
            .collect::<Result<_>>()?;
        Ok(params)
    }

    /// Serializes a DER-encoded CSR signed by `key_pair`.
    pub fn serialize_der(&self, key_pair: &KeyPair) -> Result<Vec<u8>> {
        let csr = self
            .params()?
            .serialize_request(key_pair)
            .map_err(|e| Error::Certificate(format!("CSR serialization failed: {e}")))?;
        Ok(csr.der().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_pair() -> KeyPair {
        KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap()
    }

    fn subject(s: &str) -> SubjectName {
        SubjectName::parse(s).unwrap()
    }

    #[test]
    fn test_generate_and_verify() {
        let key = key_pair();
        let der = CsrOptions::new(subject("CN=tls-1"))
            .with_dns_names(vec!["tls-1.example".to_string()])
            .serialize_der(&key)
            .unwrap();

        let csr = decode_and_verify(&der).unwrap();
        assert_eq!(csr.subject, "CN=tls-1");
        assert_eq!(csr.dns_names, vec!["tls-1.example".to_string()]);
        assert_eq!(csr.public_key_info[0], 0x30);
    }

    #[test]
    fn test_verify_accepts_pem() {
        let key = key_pair();
        let der = CsrOptions::new(subject("CN=ca-root")).serialize_der(&key).unwrap();
        let pem = crate::certificate::der_to_pem(&der, "CERTIFICATE REQUEST");
        assert!(decode_and_verify(pem.as_bytes()).is_ok());
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let key = key_pair();
        let mut der = CsrOptions::new(subject("CN=tls-1")).serialize_der(&key).unwrap();
        let last = der.len() - 1;
        der[last] ^= 0xff;

        let err = decode_and_verify(&der).unwrap_err();
        assert!(err.contains("CSR"), "unexpected error: {err}");
    }

    #[test]
    fn test_malformed_csr_is_rejected() {
        assert!(decode_and_verify(b"bogus data").is_err());
        assert!(decode_and_verify(&[]).is_err());
    }

    #[test]
    fn test_unique_keys_give_unique_public_keys() {
        let a = CsrOptions::new(subject("CN=a")).serialize_der(&key_pair()).unwrap();
        let b = CsrOptions::new(subject("CN=a")).serialize_der(&key_pair()).unwrap();
        assert_ne!(
            decode_and_verify(&a).unwrap().public_key_info,
            decode_and_verify(&b).unwrap().public_key_info
        );
    }

    #[test]
    fn test_subject_order_is_kept() {
        let subject = subject("CN=tls-1, O=Example, C=US");
        let der = CsrOptions::new(subject.clone()).serialize_der(&key_pair()).unwrap();
        assert_eq!(decode_and_verify(&der).unwrap().subject, subject.to_string());
    }

    #[test]
    fn test_numeric_san_stays_a_dns_name() {
        let der = CsrOptions::new(subject("CN=tls-1"))
            .with_dns_names(vec!["10.0.0.1".to_string()])
            .serialize_der(&key_pair())
            .unwrap();
        assert_eq!(decode_and_verify(&der).unwrap().dns_names, vec!["10.0.0.1".to_string()]);
    }
}
