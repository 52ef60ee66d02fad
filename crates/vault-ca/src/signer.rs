//! Certificate assembly with remote signing.
//!
//! The to-be-signed structure is built locally from the CSR's public key and
//! the role. Only its digest leaves the process: the signature itself comes
//! from a [`RemoteSigner`], so the issuer's private key is never materialized
//! here.

use crate::certificate::Certificate;
use crate::role::CertificateRole;
use crate::subject::SubjectName;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use const_oid::db::{rfc5280, rfc5912};
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, GeneralizedTime, Ia5String, OctetString, UtcTime};
use der::{Decode, Encode};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::fmt;
use std::time::Duration;
use x509_cert::certificate::{TbsCertificateInner, Version};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages,
    SubjectAltName, SubjectKeyIdentifier,
};
use x509_cert::ext::{AsExtension, Extension};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};

/// Digest algorithm used for certificate signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Maps a digest size in bits to an algorithm.
    pub fn from_size(bits: u16) -> Option<Self> {
        match bits {
            256 => Some(HashAlgorithm::Sha256),
            384 => Some(HashAlgorithm::Sha384),
            512 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Digest size in bits.
    pub fn bits(self) -> u16 {
        match self {
            HashAlgorithm::Sha256 => 256,
            HashAlgorithm::Sha384 => 384,
            HashAlgorithm::Sha512 => 512,
        }
    }

    /// Hashes `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    /// Signature algorithm for a key of the given SubjectPublicKeyInfo algorithm.
    fn signature_algorithm(self, key_algorithm: ObjectIdentifier) -> Result<AlgorithmIdentifierOwned> {
        let oid = if key_algorithm == rfc5912::ID_EC_PUBLIC_KEY {
            match self {
                HashAlgorithm::Sha256 => rfc5912::ECDSA_WITH_SHA_256,
                HashAlgorithm::Sha384 => rfc5912::ECDSA_WITH_SHA_384,
                HashAlgorithm::Sha512 => rfc5912::ECDSA_WITH_SHA_512,
            }
        } else if key_algorithm == rfc5912::RSA_ENCRYPTION {
            match self {
                HashAlgorithm::Sha256 => rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                HashAlgorithm::Sha384 => rfc5912::SHA_384_WITH_RSA_ENCRYPTION,
                HashAlgorithm::Sha512 => rfc5912::SHA_512_WITH_RSA_ENCRYPTION,
            }
        } else {
            return Err(Error::Certificate(format!(
                "unsupported signing key algorithm: {key_algorithm}"
            )));
        };
        Ok(AlgorithmIdentifierOwned {
            oid,
            parameters: None,
        })
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SHA-{}", self.bits())
    }
}

/// Opaque reference to a private key held by the vault.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyHandle {
    id: String,
}

impl KeyHandle {
    /// Handle for the key behind version `version` of certificate `name`.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            id: format!("{name}/{version}"),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Signing capability backed by keys the caller cannot read.
#[async_trait]
pub trait RemoteSigner: Send + Sync {
    /// Signs a precomputed digest with the key behind `key`.
    ///
    /// Returns the signature in the encoding X.509 expects for the key type
    /// (DER `Ecdsa-Sig-Value` for EC keys, raw PKCS#1 v1.5 for RSA keys).
    async fn remote_sign(&self, key: &KeyHandle, digest: &[u8], hash: HashAlgorithm)
        -> Result<Vec<u8>>;
}

/// Everything about a certificate that does not come from the CSR.
#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    pub subject: SubjectName,
    pub san_dns_names: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub role: CertificateRole,
    /// Basic constraints path length; ignored for leaves.
    pub path_length: u8,
    pub hash: HashAlgorithm,
}

/// Builds, signs and encodes a certificate.
///
/// With `issuer` set to `None` the certificate is self-issued: the issuer name
/// is the subject and `key` must be the subject's own key.
pub async fn sign_certificate(
    subject_public_key_info: &[u8],
    template: &CertificateTemplate,
    issuer: Option<&Certificate>,
    signer: &dyn RemoteSigner,
    key: &KeyHandle,
) -> Result<Certificate> {
    if template.not_before >= template.not_after {
        return Err(Error::Certificate(
            "not_before must be earlier than not_after".to_string(),
        ));
    }

    let subject_spki = SubjectPublicKeyInfoOwned::from_der(subject_public_key_info)?;
    let subject_name = template.subject.to_x509()?;

    let (issuer_name, issuer_spki) = match issuer {
        Some(issuer) => {
            let parsed = x509_cert::Certificate::from_der(issuer.der())?;
            (
                parsed.tbs_certificate.subject,
                parsed.tbs_certificate.subject_public_key_info,
            )
        }
        None => (subject_name.clone(), subject_spki.clone()),
    };

    let signature_alg = template.hash.signature_algorithm(issuer_spki.algorithm.oid)?;
    let extensions = build_extensions(template, &subject_name, &subject_spki, &issuer_spki)?;

    let tbs_certificate = TbsCertificateInner {
        version: Version::V3,
        serial_number: random_serial()?,
        signature: signature_alg.clone(),
        issuer: issuer_name,
        validity: Validity {
            not_before: to_x509_time(template.not_before)?,
            not_after: to_x509_time(template.not_after)?,
        },
        subject: subject_name,
        subject_public_key_info: subject_spki,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(extensions),
    };

    let tbs_der = tbs_certificate.to_der()?;
    let digest = template.hash.digest(&tbs_der);
    let signature = signer.remote_sign(key, &digest, template.hash).await?;

    tracing::debug!(
        subject = %template.subject,
        role = %template.role,
        hash = %template.hash,
        key = %key,
        "signed certificate"
    );

    let certificate = x509_cert::Certificate {
        tbs_certificate,
        signature_algorithm: signature_alg,
        signature: BitString::from_bytes(&signature)?,
    };
    Ok(Certificate::from_der(certificate.to_der()?))
}

fn build_extensions(
    template: &CertificateTemplate,
    subject_name: &Name,
    subject_spki: &SubjectPublicKeyInfoOwned,
    issuer_spki: &SubjectPublicKeyInfoOwned,
) -> Result<Vec<Extension>> {
    let mut extensions = Vec::<Extension>::new();

    let is_ca = template.role.is_ca();
    let bc = BasicConstraints {
        ca: is_ca,
        path_len_constraint: is_ca.then_some(template.path_length),
    };
    let ext = bc.to_extension(subject_name, &extensions)?;
    extensions.push(ext);

    let key_usage = if is_ca {
        KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign | KeyUsages::DigitalSignature)
    } else {
        KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment)
    };
    let ext = key_usage.to_extension(subject_name, &extensions)?;
    extensions.push(ext);

    if !is_ca {
        let eku = ExtendedKeyUsage(vec![rfc5280::ID_KP_SERVER_AUTH, rfc5280::ID_KP_CLIENT_AUTH]);
        let ext = eku.to_extension(subject_name, &extensions)?;
        extensions.push(ext);
    }

    if !template.san_dns_names.is_empty() {
        let names = template
            .san_dns_names
            .iter()
            .map(|dns| {
                Ia5String::new(dns)
                    .map(GeneralName::DnsName)
                    .map_err(|e| Error::InvalidRequest(format!("invalid DNS name '{dns}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let ext = SubjectAltName(names).to_extension(subject_name, &extensions)?;
        extensions.push(ext);
    }

    let ski = SubjectKeyIdentifier(OctetString::new(key_identifier(subject_spki))?);
    let ext = ski.to_extension(subject_name, &extensions)?;
    extensions.push(ext);

    let aki = AuthorityKeyIdentifier {
        key_identifier: Some(OctetString::new(key_identifier(issuer_spki))?),
        authority_cert_issuer: None,
        authority_cert_serial_number: None,
    };
    let ext = aki.to_extension(subject_name, &extensions)?;
    extensions.push(ext);

    Ok(extensions)
}

/// SHA-256 of the subjectPublicKey bits, truncated to 160 bits.
fn key_identifier(spki: &SubjectPublicKeyInfoOwned) -> Vec<u8> {
    let hash = sha2::Sha256::digest(spki.subject_public_key.raw_bytes());
    hash[..20].to_vec()
}

/// 128-bit positive, non-zero serial.
fn random_serial() -> Result<SerialNumber> {
    let mut bytes = [0u8; 16];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| Error::Certificate("failed to generate serial number".to_string()))?;
    bytes[0] &= 0x7F;
    bytes[0] |= 0x01;
    Ok(SerialNumber::new(&bytes)?)
}

/// RFC 5280: UTCTime through 2049, GeneralizedTime from 2050.
fn to_x509_time(at: DateTime<Utc>) -> Result<Time> {
    let secs = u64::try_from(at.timestamp())
        .map_err(|_| Error::Certificate(format!("timestamp before 1970: {at}")))?;
    let since_epoch = Duration::from_secs(secs);
    if at.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_unix_duration(since_epoch)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_unix_duration(
            since_epoch,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Months, TimeZone};
    use p256::ecdsa::signature::hazmat::PrehashSigner;
    use p256::pkcs8::{DecodePrivateKey, EncodePublicKey};

    /// Signer holding a single in-process P-256 key.
    struct LocalSigner {
        key: p256::ecdsa::SigningKey,
    }

    impl LocalSigner {
        fn generate() -> Self {
            let rng = SystemRandom::new();
            let pkcs8 = ring::signature::EcdsaKeyPair::generate_pkcs8(
                &ring::signature::ECDSA_P256_SHA256_ASN1_SIGNING,
                &rng,
            )
            .unwrap();
            Self {
                key: p256::ecdsa::SigningKey::from_pkcs8_der(pkcs8.as_ref()).unwrap(),
            }
        }

        fn spki(&self) -> Vec<u8> {
            self.key
                .verifying_key()
                .to_public_key_der()
                .unwrap()
                .as_bytes()
                .to_vec()
        }
    }

    #[async_trait]
    impl RemoteSigner for LocalSigner {
        async fn remote_sign(
            &self,
            _key: &KeyHandle,
            digest: &[u8],
            _hash: HashAlgorithm,
        ) -> Result<Vec<u8>> {
            let signature: p256::ecdsa::Signature = self
                .key
                .sign_prehash(digest)
                .map_err(|e| Error::Certificate(e.to_string()))?;
            Ok(signature.to_der().as_bytes().to_vec())
        }
    }

    fn template(subject: &str, role: CertificateRole, path_length: u8) -> CertificateTemplate {
        let not_before = Utc::now();
        CertificateTemplate {
            subject: SubjectName::parse(subject).unwrap(),
            san_dns_names: Vec::new(),
            not_before,
            not_after: not_before + Months::new(12),
            role,
            path_length,
            hash: HashAlgorithm::Sha256,
        }
    }

    #[test]
    fn test_hash_from_size() {
        assert_eq!(HashAlgorithm::from_size(256), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::from_size(384), Some(HashAlgorithm::Sha384));
        assert_eq!(HashAlgorithm::from_size(512), Some(HashAlgorithm::Sha512));
        assert_eq!(HashAlgorithm::from_size(1), None);
        assert_eq!(HashAlgorithm::Sha384.digest(b"abc").len(), 48);
    }

    #[test]
    fn test_key_handle_id() {
        let handle = KeyHandle::new("ca-root", "3");
        assert_eq!(handle.id(), "ca-root/3");
        assert_eq!(handle.to_string(), "ca-root/3");
    }

    #[test]
    fn test_time_encoding_switches_at_2050() {
        let before = Utc.with_ymd_and_hms(2049, 12, 31, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2050, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(to_x509_time(before).unwrap(), Time::UtcTime(_)));
        assert!(matches!(to_x509_time(after).unwrap(), Time::GeneralTime(_)));
    }

    #[tokio::test]
    async fn test_self_issued_root() {
        let root = LocalSigner::generate();
        let handle = KeyHandle::new("ca-root", "1");
        let cert = sign_certificate(
            &root.spki(),
            &template("CN=ca-root", CertificateRole::Root, 5),
            None,
            &root,
            &handle,
        )
        .await
        .unwrap();

        assert!(cert.is_ca().unwrap());
        assert_eq!(cert.path_length().unwrap(), Some(5));
        assert_eq!(cert.subject().unwrap(), cert.issuer().unwrap());
        cert.verify_signed_by(&cert).unwrap();
    }

    #[tokio::test]
    async fn test_leaf_signed_by_issuer() {
        let root = LocalSigner::generate();
        let leaf = LocalSigner::generate();
        let handle = KeyHandle::new("ca-root", "1");
        let root_cert = sign_certificate(
            &root.spki(),
            &template("CN=ca-root", CertificateRole::Root, 5),
            None,
            &root,
            &handle,
        )
        .await
        .unwrap();

        let mut leaf_template = template("CN=tls-1", CertificateRole::Leaf, 0);
        leaf_template.san_dns_names = vec!["tls-1.example".to_string()];
        let cert = sign_certificate(&leaf.spki(), &leaf_template, Some(&root_cert), &root, &handle)
            .await
            .unwrap();

        assert!(!cert.is_ca().unwrap());
        assert_eq!(cert.path_length().unwrap(), None);
        assert_eq!(cert.dns_names().unwrap(), vec!["tls-1.example".to_string()]);
        assert_eq!(cert.issuer().unwrap(), root_cert.subject().unwrap());
        assert_eq!(cert.public_key_info().unwrap(), leaf.spki());
        cert.verify_signed_by(&root_cert).unwrap();
        assert!(cert.verify_signed_by(&cert).is_err());
    }

    #[tokio::test]
    async fn test_multi_attribute_subject_keeps_order() {
        let root = LocalSigner::generate();
        let cert = sign_certificate(
            &root.spki(),
            &template("CN=ca-root, O=Example, C=US", CertificateRole::Root, 5),
            None,
            &root,
            &KeyHandle::new("ca-root", "1"),
        )
        .await
        .unwrap();

        assert_eq!(cert.subject().unwrap(), "CN=ca-root, O=Example, C=US");
        assert_eq!(cert.issuer().unwrap(), "CN=ca-root, O=Example, C=US");
    }

    #[tokio::test]
    async fn test_rejects_inverted_validity() {
        let root = LocalSigner::generate();
        let mut t = template("CN=ca-root", CertificateRole::Root, 5);
        std::mem::swap(&mut t.not_before, &mut t.not_after);
        let result =
            sign_certificate(&root.spki(), &t, None, &root, &KeyHandle::new("ca-root", "1")).await;
        assert!(matches!(result, Err(Error::Certificate(_))));
    }
}
