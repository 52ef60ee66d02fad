//! Issuance defaults.
//!
//! `CaDefaults` holds the per-role validity and path length used by
//! `create_with_defaults` and by renewals, plus the key parameters applied to
//! every request. It deserializes from TOML with every field optional.

use crate::policy::KeyType;
use crate::role::CertificateRole;
use crate::signer::HashAlgorithm;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Validity and path length for one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefaults {
    /// Validity in months.
    pub validity_months: u32,
    /// Basic constraints path length.
    pub path_length: u8,
}

/// Defaults applied when a request does not spell everything out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaDefaults {
    #[serde(default = "default_root")]
    pub root: RoleDefaults,

    #[serde(default = "default_intermediate")]
    pub intermediate: RoleDefaults,

    #[serde(default = "default_leaf")]
    pub leaf: RoleDefaults,

    /// Key type requested from the vault.
    #[serde(default = "default_key_type")]
    pub key_type: KeyType,

    /// Key size in bits (curve size for EC keys).
    #[serde(default = "default_key_size")]
    pub key_size: u32,

    /// Signature hash size in bits.
    #[serde(default = "default_hash_size")]
    pub hash_size: u16,

    /// Deadline for each remote call, in seconds. Zero disables the deadline.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
}

impl Default for CaDefaults {
    fn default() -> Self {
        Self {
            root: default_root(),
            intermediate: default_intermediate(),
            leaf: default_leaf(),
            key_type: default_key_type(),
            key_size: default_key_size(),
            hash_size: default_hash_size(),
            operation_timeout_secs: default_operation_timeout(),
        }
    }
}

fn default_root() -> RoleDefaults {
    RoleDefaults {
        validity_months: 48,
        path_length: 5,
    }
}
fn default_intermediate() -> RoleDefaults {
    RoleDefaults {
        validity_months: 36,
        path_length: 3,
    }
}
fn default_leaf() -> RoleDefaults {
    RoleDefaults {
        validity_months: 12,
        path_length: 0,
    }
}
fn default_key_type() -> KeyType {
    KeyType::Ec
}
fn default_key_size() -> u32 {
    256
}
fn default_hash_size() -> u16 {
    256
}
fn default_operation_timeout() -> u64 {
    30
}

impl CaDefaults {
    /// Returns the defaults for a role.
    pub fn for_role(&self, role: CertificateRole) -> RoleDefaults {
        match role {
            CertificateRole::Root => self.root,
            CertificateRole::Intermediate => self.intermediate,
            CertificateRole::Leaf => self.leaf,
        }
    }

    /// Returns the configured hash algorithm.
    pub fn hash_algorithm(&self) -> Result<HashAlgorithm> {
        HashAlgorithm::from_size(self.hash_size)
            .ok_or_else(|| Error::Config(format!("unsupported hash size: {}", self.hash_size)))
    }

    /// Returns the per-call deadline, if one is configured.
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_secs > 0).then(|| Duration::from_secs(self.operation_timeout_secs))
    }

    /// Checks that the defaults describe a usable hierarchy.
    pub fn validate(&self) -> Result<()> {
        self.hash_algorithm()?;
        for role in CertificateRole::ALL {
            if self.for_role(role).validity_months == 0 {
                return Err(Error::Config(format!("{role} validity must be at least one month")));
            }
        }
        if self.leaf.path_length != 0 {
            return Err(Error::Config("leaf path length must be 0".to_string()));
        }
        if self.intermediate.path_length >= self.root.path_length {
            return Err(Error::Config(
                "intermediate path length must be below the root path length".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses defaults from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let defaults: CaDefaults =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        defaults.validate()?;
        Ok(defaults)
    }

    /// Loads defaults from a TOML file; a missing file yields the built-in defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
