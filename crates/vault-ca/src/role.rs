//! Certificate roles.
//!
//! A role decides where a certificate sits in the hierarchy and drives every
//! policy default: validity, path length, key usage, exportability and key reuse.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of a certificate in the CA hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateRole {
    /// Self-issued trust anchor.
    Root,
    /// CA issued by a root or another intermediate.
    Intermediate,
    /// End-entity (TLS) certificate.
    Leaf,
}

impl CertificateRole {
    /// All roles, in hierarchy order.
    pub const ALL: [CertificateRole; 3] = [
        CertificateRole::Root,
        CertificateRole::Intermediate,
        CertificateRole::Leaf,
    ];

    /// Returns true for roles that may sign other certificates.
    pub fn is_ca(self) -> bool {
        !matches!(self, CertificateRole::Leaf)
    }

    /// Leaf keys may be exported; CA keys stay in the vault.
    pub fn exportable(self) -> bool {
        matches!(self, CertificateRole::Leaf)
    }

    /// CA keys are reused across renewals so issued chains stay valid.
    pub fn reuse_key(self) -> bool {
        self.is_ca()
    }

    /// Canonical tag value for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            CertificateRole::Root => "Root",
            CertificateRole::Intermediate => "Intermediate",
            CertificateRole::Leaf => "Leaf",
        }
    }

    /// Derives the role the way request front ends do.
    ///
    /// A CA whose issuer is empty or equal to its own name is a root; any
    /// other CA is an intermediate; everything else is a leaf.
    pub fn infer(is_ca: bool, issuer: Option<&str>, name: &str) -> Self {
        if !is_ca {
            return CertificateRole::Leaf;
        }
        match issuer {
            None => CertificateRole::Root,
            Some(issuer) if issuer.is_empty() || issuer == name => CertificateRole::Root,
            Some(_) => CertificateRole::Intermediate,
        }
    }
}

impl fmt::Display for CertificateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateRole {
    type Err = Error;

    /// Parses a role tag, case-insensitively.
    ///
    /// `CA` and `Tls` are older spellings of `Root` and `Leaf` still found on
    /// certificates issued before the role names were settled.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "root" | "ca" => Ok(CertificateRole::Root),
            "intermediate" => Ok(CertificateRole::Intermediate),
            "leaf" | "tls" => Ok(CertificateRole::Leaf),
            _ => Err(Error::InvalidRequest(format!("unknown certificate role: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exportable_only_for_leaf() {
        assert!(!CertificateRole::Root.exportable());
        assert!(!CertificateRole::Intermediate.exportable());
        assert!(CertificateRole::Leaf.exportable());
    }

    #[test]
    fn test_reuse_key_for_ca_roles() {
        assert!(CertificateRole::Root.reuse_key());
        assert!(CertificateRole::Intermediate.reuse_key());
        assert!(!CertificateRole::Leaf.reuse_key());
    }

    #[test]
    fn test_parse_round_trips_display() {
        for role in CertificateRole::ALL {
            assert_eq!(role.to_string().parse::<CertificateRole>().unwrap(), role);
        }
    }

    #[test]
    fn test_parse_legacy_spellings() {
        assert_eq!("CA".parse::<CertificateRole>().unwrap(), CertificateRole::Root);
        assert_eq!("tls".parse::<CertificateRole>().unwrap(), CertificateRole::Leaf);
        assert_eq!(
            "INTERMEDIATE".parse::<CertificateRole>().unwrap(),
            CertificateRole::Intermediate
        );
    }

    #[test]
    fn test_parse_unknown_role() {
        assert!(matches!(
            "device".parse::<CertificateRole>(),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_infer() {
        assert_eq!(
            CertificateRole::infer(true, None, "ca-root"),
            CertificateRole::Root
        );
        assert_eq!(
            CertificateRole::infer(true, Some(""), "ca-root"),
            CertificateRole::Root
        );
        assert_eq!(
            CertificateRole::infer(true, Some("ca-root"), "ca-root"),
            CertificateRole::Root
        );
        assert_eq!(
            CertificateRole::infer(true, Some("ca-root"), "ca-int"),
            CertificateRole::Intermediate
        );
        assert_eq!(
            CertificateRole::infer(false, Some("ca-int"), "tls-1"),
            CertificateRole::Leaf
        );
    }
}
