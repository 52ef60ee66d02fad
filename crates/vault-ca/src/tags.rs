//! Issuer linkage stored as certificate tags.
//!
//! The vault keeps no relational data about who signed whom. Each certificate
//! carries three string tags instead, and this module is the only place that
//! reads or writes them:
//!
//! | Tag               | Value                                        |
//! |-------------------|----------------------------------------------|
//! | `IssuerId`        | Identifier of the key that signed the cert   |
//! | `IssuerName`      | Logical name of the issuing certificate      |
//! | `CertificateType` | Role: `Root`, `Intermediate` or `Leaf`       |
//!
//! A root names itself as its issuer.

use crate::role::CertificateRole;
use std::collections::BTreeMap;

/// Tag map attached to a certificate version.
pub type Tags = BTreeMap<String, String>;

/// Tag holding the signing key identifier.
pub const ISSUER_ID_TAG: &str = "IssuerId";
/// Tag holding the issuer's logical name.
pub const ISSUER_NAME_TAG: &str = "IssuerName";
/// Tag holding the certificate role.
pub const CERTIFICATE_TYPE_TAG: &str = "CertificateType";

/// Why linkage tags could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("tag 'IssuerName' is missing")]
    MissingIssuerName,

    #[error("tag 'CertificateType' is missing")]
    MissingRole,

    #[error("tag 'CertificateType' has unknown value '{0}'")]
    UnknownRole(String),
}

/// The issuer relationship of one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerLinkage {
    /// Identifier of the signing key; informational only and never required on decode.
    pub issuer_key_id: Option<String>,
    pub issuer_name: String,
    pub role: CertificateRole,
}

impl IssuerLinkage {
    pub fn new(
        issuer_key_id: impl Into<String>,
        issuer_name: impl Into<String>,
        role: CertificateRole,
    ) -> Self {
        Self {
            issuer_key_id: Some(issuer_key_id.into()),
            issuer_name: issuer_name.into(),
            role,
        }
    }

    /// Encodes the linkage as a tag map.
    pub fn encode(&self) -> Tags {
        let mut tags = Tags::new();
        if let Some(id) = &self.issuer_key_id {
            tags.insert(ISSUER_ID_TAG.to_string(), id.clone());
        }
        tags.insert(ISSUER_NAME_TAG.to_string(), self.issuer_name.clone());
        tags.insert(CERTIFICATE_TYPE_TAG.to_string(), self.role.to_string());
        tags
    }

    /// Decodes the linkage from a certificate's tags.
    ///
    /// An empty issuer name counts as missing.
    pub fn decode(tags: &Tags) -> Result<Self, TagError> {
        let issuer_name = tags
            .get(ISSUER_NAME_TAG)
            .filter(|v| !v.trim().is_empty())
            .ok_or(TagError::MissingIssuerName)?;
        let role = tags
            .get(CERTIFICATE_TYPE_TAG)
            .ok_or(TagError::MissingRole)?;
        let role = role
            .parse::<CertificateRole>()
            .map_err(|_| TagError::UnknownRole(role.clone()))?;

        Ok(Self {
            issuer_key_id: tags.get(ISSUER_ID_TAG).cloned(),
            issuer_name: issuer_name.clone(),
            role,
        })
    }

    /// Returns true if the certificate names itself as issuer.
    pub fn is_self_issued(&self, name: &str) -> bool {
        self.issuer_name == name
    }
}
