//! In-process key vault for development and testing.
//!
//! `MemoryKeyVault` behaves like a remote vault from the caller's side: keys
//! are generated internally, only CSRs and public certificates come out, and
//! signatures are produced on request through [`RemoteSigner`]. Keys are EC
//! P-256 and signatures are deterministic (RFC 6979), so two handles to the
//! same key sign a message identically.
//!
//! **Warning:** keys are held in process memory and, when a snapshot is saved,
//! written to disk in PEM form. Never use it for real certificates.
//!
//! Every call is recorded in an operation log, and faults can be injected per
//! operation, which is what the issuance tests build on.

use crate::certificate::{der_to_pem, parse_cert_chain_pem, pem_to_der, Certificate};
use crate::csr::CsrOptions;
use crate::gateway::{
    CertificateBundle, CertificateProperties, KeyStoreGateway, OperationStatus,
    PendingCertificate,
};
use crate::policy::{CertificatePolicy, IssuerMode, KeyType};
use crate::signer::{HashAlgorithm, KeyHandle, RemoteSigner};
use crate::subject::SubjectName;
use crate::tags::Tags;
use crate::{Error, Result};
use async_trait::async_trait;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rcgen::KeyPair;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

/// Gateway operations, as recorded in the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateKeyAndCsr,
    DeletePendingOperation,
    GetCertificate,
    MergeSignedCertificate,
    SetEnabled,
    RemoteSign,
    ListCertificates,
    ListVersions,
}

impl Operation {
    /// Returns true for operations that change vault state.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Operation::CreateKeyAndCsr
                | Operation::DeletePendingOperation
                | Operation::MergeSignedCertificate
                | Operation::SetEnabled
        )
    }
}

/// One entry of the operation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    pub operation: Operation,
    /// Certificate name, or key handle for [`Operation::RemoteSign`].
    pub target: String,
}

#[derive(Debug, Clone)]
struct StoredVersion {
    version: String,
    /// PKCS#8 DER of the private key.
    key: Vec<u8>,
    certificate: Certificate,
    chain: Vec<Certificate>,
    policy: CertificatePolicy,
    tags: Tags,
    enabled: bool,
}

#[derive(Debug, Clone)]
struct PendingOperation {
    version: String,
    key: Vec<u8>,
    public_key_info: Vec<u8>,
    policy: CertificatePolicy,
    tags: Tags,
}

#[derive(Debug, Default)]
struct VaultState {
    certificates: BTreeMap<String, Vec<StoredVersion>>,
    pending: HashMap<String, PendingOperation>,
}

impl VaultState {
    fn next_version(&self, name: &str) -> String {
        let issued = self.certificates.get(name).map_or(0, Vec::len);
        (issued + 1).to_string()
    }

    fn latest_enabled(&self, name: &str) -> Option<&StoredVersion> {
        self.certificates
            .get(name)
            .and_then(|versions| versions.iter().rev().find(|v| v.enabled))
    }

    fn bundle(&self, name: &str, stored: &StoredVersion) -> CertificateBundle {
        CertificateBundle {
            name: name.to_string(),
            version: stored.version.clone(),
            key: KeyHandle::new(name, &stored.version),
            certificate: stored.certificate.clone(),
            chain: stored.chain.clone(),
            policy: stored.policy.clone(),
            tags: stored.tags.clone(),
            enabled: stored.enabled,
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail: HashSet<Operation>,
    hang: HashSet<Operation>,
    corrupt_csrs: bool,
}

/// An in-process key vault.
#[derive(Debug, Default)]
pub struct MemoryKeyVault {
    state: Mutex<VaultState>,
    faults: StdMutex<Faults>,
    log: StdMutex<Vec<OperationRecord>>,
}

impl MemoryKeyVault {
    /// Creates an empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call of `operation` fail.
    pub fn fail_on(&self, operation: Operation) {
        self.faults().fail.insert(operation);
    }

    /// Makes every subsequent call of `operation` wait forever.
    pub fn hang_on(&self, operation: Operation) {
        self.faults().hang.insert(operation);
    }

    /// Makes subsequent CSRs carry an invalid signature.
    pub fn corrupt_csrs(&self, corrupt: bool) {
        self.faults().corrupt_csrs = corrupt;
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        *self.faults() = Faults::default();
    }

    /// Returns the operation log.
    pub fn operations(&self) -> Vec<OperationRecord> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Empties the operation log.
    pub fn clear_operations(&self) {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Returns true if a creation operation is pending for `name`.
    pub async fn has_pending_operation(&self, name: &str) -> bool {
        self.state.lock().await.pending.contains_key(name)
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records the call and applies injected faults.
    async fn enter(&self, operation: Operation, target: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(OperationRecord {
                operation,
                target: target.to_string(),
            });

        let (fail, hang) = {
            let faults = self.faults();
            (
                faults.fail.contains(&operation),
                faults.hang.contains(&operation),
            )
        };
        if hang {
            tracing::debug!(?operation, target, "memory vault call hanging");
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(Error::RemoteOperationFailed {
                operation: operation_name(operation),
                name: target.to_string(),
                reason: "injected fault".to_string(),
            });
        }
        Ok(())
    }

    /// Exports the issued certificates and their keys.
    ///
    /// Pending operations are not included.
    pub async fn snapshot(&self) -> VaultSnapshot {
        let state = self.state.lock().await;
        let certificates = state
            .certificates
            .iter()
            .map(|(name, versions)| {
                let versions = versions
                    .iter()
                    .map(|v| SnapshotVersion {
                        version: v.version.clone(),
                        key_pem: der_to_pem(&v.key, "PRIVATE KEY"),
                        certificate_pem: v.certificate.to_pem().to_string(),
                        chain_pem: v.chain.iter().map(Certificate::to_pem).collect(),
                        policy: v.policy.clone(),
                        tags: v.tags.clone(),
                        enabled: v.enabled,
                    })
                    .collect();
                (name.clone(), versions)
            })
            .collect();
        VaultSnapshot { certificates }
    }

    /// Rebuilds a vault from a snapshot.
    pub fn from_snapshot(snapshot: VaultSnapshot) -> Result<Self> {
        let mut state = VaultState::default();
        for (name, versions) in snapshot.certificates {
            let mut stored = Vec::with_capacity(versions.len());
            for v in versions {
                stored.push(StoredVersion {
                    version: v.version,
                    key: pem_to_der(&v.key_pem)?,
                    certificate: Certificate::from_pem(&v.certificate_pem)?,
                    chain: parse_cert_chain_pem(&v.chain_pem)?,
                    policy: v.policy,
                    tags: v.tags,
                    enabled: v.enabled,
                });
            }
            state.certificates.insert(name, stored);
        }
        Ok(Self {
            state: Mutex::new(state),
            ..Self::default()
        })
    }
}

fn operation_name(operation: Operation) -> &'static str {
    match operation {
        Operation::CreateKeyAndCsr => "create_key_and_csr",
        Operation::DeletePendingOperation => "delete_pending_operation",
        Operation::GetCertificate => "get_certificate",
        Operation::MergeSignedCertificate => "merge_signed_certificate",
        Operation::SetEnabled => "set_enabled",
        Operation::RemoteSign => "remote_sign",
        Operation::ListCertificates => "list_certificates",
        Operation::ListVersions => "list_versions",
    }
}

fn generate_key(policy: &CertificatePolicy) -> Result<Vec<u8>> {
    if policy.key.key_type != KeyType::Ec || policy.key.key_size != 256 {
        return Err(Error::InvalidRequest(format!(
            "memory vault only supports EC P-256 keys, got {:?} {}",
            policy.key.key_type, policy.key.key_size
        )));
    }
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
        .map_err(|_| Error::Certificate("key generation failed".to_string()))?;
    Ok(pkcs8.as_ref().to_vec())
}

fn signing_key(pkcs8: &[u8]) -> Result<p256::ecdsa::SigningKey> {
    p256::ecdsa::SigningKey::from_pkcs8_der(pkcs8)
        .map_err(|e| Error::Certificate(format!("invalid stored key: {e}")))
}

fn rcgen_key(pkcs8: &[u8]) -> Result<KeyPair> {
    KeyPair::from_pem(&der_to_pem(pkcs8, "PRIVATE KEY"))
        .map_err(|e| Error::Certificate(format!("invalid stored key: {e}")))
}

fn public_key_info(pkcs8: &[u8]) -> Result<Vec<u8>> {
    let der = signing_key(pkcs8)?
        .verifying_key()
        .to_public_key_der()
        .map_err(|e| Error::Certificate(format!("public key encoding failed: {e}")))?;
    Ok(der.as_bytes().to_vec())
}

fn csr_options(policy: &CertificatePolicy) -> Result<CsrOptions> {
    Ok(CsrOptions::new(SubjectName::parse(&policy.subject)?)
        .with_dns_names(policy.san_dns_names.clone()))
}

/// Issues the certificate a self-issued policy asks for.
fn self_sign(policy: &CertificatePolicy, pkcs8: &[u8]) -> Result<Certificate> {
    let key_pair = rcgen_key(pkcs8)?;
    let mut params = csr_options(policy)?.params()?;
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(30 * i64::from(policy.validity_months));
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| Error::Certificate(format!("self-signed certificate failed: {e}")))?;
    Ok(Certificate::from_der(cert.der().to_vec()))
}

#[async_trait]
impl RemoteSigner for MemoryKeyVault {
    async fn remote_sign(
        &self,
        key: &KeyHandle,
        digest: &[u8],
        hash: HashAlgorithm,
    ) -> Result<Vec<u8>> {
        self.enter(Operation::RemoteSign, key.id()).await?;

        if digest.len() * 8 != usize::from(hash.bits()) {
            return Err(Error::InvalidRequest(format!(
                "digest length {} does not match {hash}",
                digest.len()
            )));
        }

        let (name, version) = key
            .id()
            .rsplit_once('/')
            .ok_or_else(|| Error::NotFound(format!("key {key}")))?;
        let pkcs8 = {
            let state = self.state.lock().await;
            let stored = state
                .certificates
                .get(name)
                .and_then(|versions| versions.iter().find(|v| v.version == version))
                .ok_or_else(|| Error::NotFound(format!("key {key}")))?;
            if !stored.enabled {
                return Err(Error::InvalidRequest(format!("key {key} is disabled")));
            }
            stored.key.clone()
        };

        let signature: p256::ecdsa::Signature = signing_key(&pkcs8)?
            .sign_prehash(digest)
            .map_err(|e| Error::Certificate(format!("signing failed: {e}")))?;
        tracing::debug!(key = %key, %hash, "memory vault signed digest");
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

#[async_trait]
impl KeyStoreGateway for MemoryKeyVault {
    async fn create_key_and_csr(
        &self,
        name: &str,
        policy: &CertificatePolicy,
        tags: &Tags,
    ) -> Result<PendingCertificate> {
        self.enter(Operation::CreateKeyAndCsr, name).await?;

        let mut state = self.state.lock().await;
        if state.pending.contains_key(name) {
            return Err(Error::InvalidRequest(format!(
                "a creation operation is already pending for {name}"
            )));
        }

        let reused = if policy.reuse_key {
            state.latest_enabled(name).map(|v| v.key.clone())
        } else {
            None
        };
        let key = match reused {
            Some(key) => key,
            None => generate_key(policy)?,
        };

        let mut csr = csr_options(policy)?.serialize_der(&rcgen_key(&key)?)?;
        if self.faults().corrupt_csrs {
            if let Some(last) = csr.last_mut() {
                *last ^= 0xff;
            }
        }

        let version = state.next_version(name);
        let handle = KeyHandle::new(name, &version);

        if policy.issuer_mode == IssuerMode::SelfSigned {
            let stored = StoredVersion {
                version: version.clone(),
                key: key.clone(),
                certificate: self_sign(policy, &key)?,
                chain: Vec::new(),
                policy: policy.clone(),
                tags: tags.clone(),
                enabled: true,
            };
            let bundle = state.bundle(name, &stored);
            state
                .certificates
                .entry(name.to_string())
                .or_default()
                .push(stored);
            tracing::debug!(name, version = %version, "memory vault issued self-signed certificate");
            return Ok(PendingCertificate {
                name: name.to_string(),
                version,
                csr,
                key: handle,
                status: OperationStatus::Completed,
                certificate: Some(bundle),
            });
        }

        state.pending.insert(
            name.to_string(),
            PendingOperation {
                version: version.clone(),
                public_key_info: public_key_info(&key)?,
                key,
                policy: policy.clone(),
                tags: tags.clone(),
            },
        );
        tracing::debug!(name, version = %version, "memory vault created pending certificate");
        Ok(PendingCertificate {
            name: name.to_string(),
            version,
            csr,
            key: handle,
            status: OperationStatus::InProgress,
            certificate: None,
        })
    }

    async fn delete_pending_operation(&self, name: &str) -> Result<()> {
        self.enter(Operation::DeletePendingOperation, name).await?;
        self.state
            .lock()
            .await
            .pending
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("pending operation for {name}")))
    }

    async fn get_certificate(&self, name: &str) -> Result<CertificateBundle> {
        self.enter(Operation::GetCertificate, name).await?;
        let state = self.state.lock().await;
        state
            .latest_enabled(name)
            .map(|stored| state.bundle(name, stored))
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    async fn merge_signed_certificate(
        &self,
        name: &str,
        chain: Vec<Vec<u8>>,
    ) -> Result<CertificateBundle> {
        self.enter(Operation::MergeSignedCertificate, name).await?;

        let mut certificates = chain.into_iter().map(Certificate::from_der);
        let certificate = certificates
            .next()
            .ok_or_else(|| Error::InvalidRequest("empty certificate chain".to_string()))?;
        let chain: Vec<Certificate> = certificates.collect();

        let mut state = self.state.lock().await;
        let pending = state
            .pending
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("pending operation for {name}")))?;
        if certificate.public_key_info()? != pending.public_key_info {
            return Err(Error::InvalidRequest(format!(
                "merged certificate does not match the pending key for {name}"
            )));
        }

        let Some(pending) = state.pending.remove(name) else {
            return Err(Error::NotFound(format!("pending operation for {name}")));
        };
        let stored = StoredVersion {
            version: pending.version,
            key: pending.key,
            certificate,
            chain,
            policy: pending.policy,
            tags: pending.tags,
            enabled: true,
        };
        let bundle = state.bundle(name, &stored);
        state
            .certificates
            .entry(name.to_string())
            .or_default()
            .push(stored);
        tracing::debug!(name, version = %bundle.version, "memory vault merged certificate");
        Ok(bundle)
    }

    async fn set_enabled(&self, name: &str, version: &str, enabled: bool) -> Result<()> {
        self.enter(Operation::SetEnabled, name).await?;
        let mut state = self.state.lock().await;
        let stored = state
            .certificates
            .get_mut(name)
            .and_then(|versions| versions.iter_mut().find(|v| v.version == version))
            .ok_or_else(|| Error::NotFound(format!("{name}/{version}")))?;
        stored.enabled = enabled;
        tracing::debug!(name, version, enabled, "memory vault updated version");
        Ok(())
    }

    async fn list_certificates(&self) -> Result<Vec<CertificateProperties>> {
        self.enter(Operation::ListCertificates, "*").await?;
        let state = self.state.lock().await;
        state
            .certificates
            .keys()
            .filter_map(|name| state.latest_enabled(name).map(|v| state.bundle(name, v)))
            .map(|bundle| bundle.properties())
            .collect()
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<CertificateProperties>> {
        self.enter(Operation::ListVersions, name).await?;
        let state = self.state.lock().await;
        let versions = state
            .certificates
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        versions
            .iter()
            .map(|v| state.bundle(name, v).properties())
            .collect()
    }
}

/// Serializable form of a [`MemoryKeyVault`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub certificates: BTreeMap<String, Vec<SnapshotVersion>>,
}

/// One stored certificate version, PEM encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotVersion {
    pub version: String,
    pub key_pem: String,
    pub certificate_pem: String,
    /// Concatenated PEM blocks, leaf first.
    #[serde(default)]
    pub chain_pem: String,
    pub policy: CertificatePolicy,
    #[serde(default)]
    pub tags: Tags,
    pub enabled: bool,
}

impl VaultSnapshot {
    /// Loads a snapshot; a missing file yields an empty vault.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid vault state {}: {e}", path.display())))
    }

    /// Writes the snapshot as JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to encode vault state: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
