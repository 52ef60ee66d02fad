//! Vault-native certificate policy.
//!
//! The policy tells the vault how to generate the key and CSR for a pending
//! certificate. It is derived purely from the role and request parameters.

use crate::role::CertificateRole;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who the vault should treat as the issuer of a pending certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssuerMode {
    /// The vault self-signs the certificate itself.
    #[serde(rename = "Self")]
    SelfSigned,
    /// Signing happens outside the vault and the result is merged back.
    Unknown,
}

impl fmt::Display for IssuerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssuerMode::SelfSigned => f.write_str("Self"),
            IssuerMode::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Key algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyType {
    Rsa,
    Ec,
}

/// Key parameters requested from the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub key_type: KeyType,
    /// Modulus size for RSA, curve size for EC.
    pub key_size: u32,
}

/// Format in which the vault stores the secret bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "application/x-pkcs12")]
    Pkcs12,
    #[serde(rename = "application/x-pem-file")]
    Pem,
}

/// Policy the vault applies when generating a certificate version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePolicy {
    pub issuer_mode: IssuerMode,
    /// Subject distinguished name, e.g. `CN=ca-root`.
    pub subject: String,
    /// DNS subject alternative names.
    pub san_dns_names: Vec<String>,
    pub validity_months: u32,
    pub key: KeySpec,
    pub exportable: bool,
    pub reuse_key: bool,
    pub content_type: ContentType,
}

/// Builds the policy for a certificate request.
///
/// `initial_self_signed` is set only for the root bootstrap step, where the
/// vault must self-sign to hand out a usable signing key.
pub fn build_policy(
    subject: &str,
    san: &[String],
    role: CertificateRole,
    validity_months: u32,
    key: KeySpec,
    initial_self_signed: bool,
) -> CertificatePolicy {
    let issuer_mode = if initial_self_signed {
        IssuerMode::SelfSigned
    } else {
        IssuerMode::Unknown
    };

    let policy = CertificatePolicy {
        issuer_mode,
        subject: subject.to_string(),
        san_dns_names: san.to_vec(),
        validity_months,
        key,
        exportable: role.exportable(),
        reuse_key: role.reuse_key(),
        content_type: ContentType::Pkcs12,
    };

    tracing::debug!(
        issuer_mode = %policy.issuer_mode,
        role = %role,
        reuse_key = policy.reuse_key,
        exportable = policy.exportable,
        "built certificate policy"
    );
    policy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ec256() -> KeySpec {
        KeySpec {
            key_type: KeyType::Ec,
            key_size: 256,
        }
    }

    #[test]
    fn test_bootstrap_policy_is_self_issued() {
        let policy = build_policy("CN=ca-root", &[], CertificateRole::Root, 48, ec256(), true);
        assert_eq!(policy.issuer_mode, IssuerMode::SelfSigned);
        assert!(policy.reuse_key);
        assert!(!policy.exportable);
    }

    #[test]
    fn test_external_policy_has_unknown_issuer() {
        for role in CertificateRole::ALL {
            let policy = build_policy("CN=x", &[], role, 12, ec256(), false);
            assert_eq!(policy.issuer_mode, IssuerMode::Unknown);
        }
    }

    #[test]
    fn test_leaf_policy() {
        let san = vec!["tls-1.example".to_string()];
        let policy = build_policy("CN=tls-1", &san, CertificateRole::Leaf, 12, ec256(), false);
        assert!(policy.exportable);
        assert!(!policy.reuse_key);
        assert_eq!(policy.san_dns_names, san);
        assert_eq!(policy.content_type, ContentType::Pkcs12);
        assert_eq!(policy.validity_months, 12);
    }

    #[test]
    fn test_policy_serializes_vault_spellings() {
        let policy = build_policy("CN=ca-root", &[], CertificateRole::Root, 48, ec256(), true);
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["issuer_mode"], "Self");
        assert_eq!(json["key"]["key_type"], "EC");
        assert_eq!(json["content_type"], "application/x-pkcs12");
    }
}
