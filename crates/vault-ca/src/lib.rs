//! Split-key certificate authority for vault-held private keys.
//!
//! This crate issues and renews X.509 certificates whose private keys never
//! leave a remote key vault. Key pairs and CSRs are generated inside the vault,
//! the CSR is verified locally, the certificate is assembled locally and signed
//! through the vault with the issuer's key, and the result is merged back into
//! the vault under the requested name.
//!
//! # Components
//!
//! - [`role`] - Certificate roles (root, intermediate, leaf) and their defaults
//! - [`policy`] - Vault-native certificate policy construction
//! - [`tags`] - Issuer linkage stored as certificate tags
//! - [`subject`] - Subject distinguished names
//! - [`csr`] - PKCS#10 decoding and signature verification
//! - [`signer`] - Certificate assembly with remote signing
//! - [`certificate`] - X.509 certificate handling
//! - [`gateway`] - Key store gateway trait and artifact types
//! - [`memory`] - In-process key vault for development and testing
//! - [`provider`] - Issuance and renewal orchestration
//! - [`hierarchy`] - Issuer tree built from certificate tags
//! - [`request`] - Certificate requests and input validation
//! - [`config`] - Issuance defaults

pub mod certificate;
pub mod config;
pub mod csr;
pub mod gateway;
pub mod hierarchy;
pub mod memory;
pub mod policy;
pub mod provider;
pub mod request;
pub mod role;
pub mod signer;
pub mod subject;
pub mod tags;

pub use certificate::Certificate;
pub use config::{CaDefaults, RoleDefaults};
pub use gateway::{
    CertificateBundle, CertificateProperties, KeyStoreGateway, OperationStatus,
    PendingCertificate,
};
pub use hierarchy::CertificateNode;
pub use memory::MemoryKeyVault;
pub use policy::{build_policy, CertificatePolicy, IssuerMode, KeySpec, KeyType};
pub use provider::{CertificateProvider, IssuanceState};
pub use request::CertificateRequest;
pub use role::CertificateRole;
pub use signer::{HashAlgorithm, KeyHandle, RemoteSigner};
pub use subject::SubjectName;
pub use tags::{IssuerLinkage, TagError, Tags};

/// Errors that can occur in vault-ca operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The CSR could not be decoded or its signature did not verify.
    #[error("invalid CSR for certificate {name}: {reason}")]
    InvalidCsr { name: String, reason: String },

    /// The issuer certificate is missing, or the issuer linkage tags are absent.
    #[error("issuer not found for certificate {name}: {reason}")]
    IssuerNotFound { name: String, reason: String },

    /// A call to the key store gateway failed.
    #[error("{operation} failed for certificate {name}: {reason}")]
    RemoteOperationFailed {
        operation: &'static str,
        name: String,
        reason: String,
    },

    /// A temporary bootstrap key could not be disabled.
    #[error("temporary key {name}/{version} is still enabled: {reason}")]
    TemporaryKeyLeak {
        name: String,
        version: String,
        reason: String,
    },

    /// The gateway has no certificate under this name.
    #[error("certificate not found: {0}")]
    NotFound(String),

    /// Request parameters failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Certificate encoding or parsing error.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for vault-ca operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<der::Error> for Error {
    fn from(e: der::Error) -> Self {
        Error::Certificate(format!("DER encoding failed: {e}"))
    }
}
