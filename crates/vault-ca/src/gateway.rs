//! Key store gateway.
//!
//! The gateway is the only path to the vault. It generates key pairs and CSRs,
//! stores certificates with their policy and tags, merges externally signed
//! certificates, toggles versions, and signs digests on behalf of callers that
//! never see the private key.
//!
//! Implementations:
//!
//! - [`MemoryKeyVault`](crate::MemoryKeyVault) - In-process vault for development and testing

use crate::certificate::Certificate;
use crate::policy::CertificatePolicy;
use crate::signer::{KeyHandle, RemoteSigner};
use crate::tags::Tags;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a certificate creation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    /// Waiting for a signed certificate to be merged.
    InProgress,
    /// The vault issued the certificate itself.
    Completed,
}

/// Result of starting a certificate creation.
#[derive(Debug, Clone)]
pub struct PendingCertificate {
    pub name: String,
    /// Version the certificate will occupy once completed.
    pub version: String,
    /// DER-encoded PKCS#10 request for the new key.
    pub csr: Vec<u8>,
    /// Handle for the new key.
    pub key: KeyHandle,
    pub status: OperationStatus,
    /// Set when the vault completed the operation on its own (self-issued policy).
    pub certificate: Option<CertificateBundle>,
}

/// A certificate version as stored by the vault, with its policy and tags.
///
/// The private key is only ever reachable through [`CertificateBundle::key`].
#[derive(Debug, Clone)]
pub struct CertificateBundle {
    pub name: String,
    pub version: String,
    pub key: KeyHandle,
    pub certificate: Certificate,
    /// Issuer certificates merged alongside the certificate.
    pub chain: Vec<Certificate>,
    pub policy: CertificatePolicy,
    pub tags: Tags,
    pub enabled: bool,
}

impl CertificateBundle {
    pub fn properties(&self) -> Result<CertificateProperties> {
        Ok(CertificateProperties {
            name: self.name.clone(),
            version: self.version.clone(),
            enabled: self.enabled,
            not_before: self.certificate.not_before()?,
            not_after: self.certificate.not_after()?,
            tags: self.tags.clone(),
        })
    }
}

/// Listing entry for a certificate version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateProperties {
    pub name: String,
    pub version: String,
    pub enabled: bool,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub tags: Tags,
}

/// Remote key custodian.
///
/// Every call may be slow and may fail transiently; callers bound them with a
/// deadline and do not retry internally.
#[async_trait]
pub trait KeyStoreGateway: RemoteSigner {
    /// Starts creating a new version of `name`: a key pair and a CSR under `policy`.
    ///
    /// With a self-issued policy the vault completes the operation itself. When
    /// the policy reuses keys and `name` already has a version, the new version
    /// keeps the existing key.
    async fn create_key_and_csr(
        &self,
        name: &str,
        policy: &CertificatePolicy,
        tags: &Tags,
    ) -> Result<PendingCertificate>;

    /// Discards an incomplete creation operation for `name`.
    async fn delete_pending_operation(&self, name: &str) -> Result<()>;

    /// Returns the latest enabled version of `name`.
    async fn get_certificate(&self, name: &str) -> Result<CertificateBundle>;

    /// Completes the pending operation for `name` with a signed certificate.
    ///
    /// `chain[0]` must certify the pending key; the rest are issuer certificates.
    async fn merge_signed_certificate(
        &self,
        name: &str,
        chain: Vec<Vec<u8>>,
    ) -> Result<CertificateBundle>;

    /// Enables or disables one version of `name`.
    async fn set_enabled(&self, name: &str, version: &str, enabled: bool) -> Result<()>;

    /// Lists the latest version of every certificate.
    async fn list_certificates(&self) -> Result<Vec<CertificateProperties>>;

    /// Lists every version of `name`, oldest first.
    async fn list_versions(&self, name: &str) -> Result<Vec<CertificateProperties>>;
}
