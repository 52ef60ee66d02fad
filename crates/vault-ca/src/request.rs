//! Certificate requests and input validation.
//!
//! Front ends (the CLI, an HTTP trigger) collect loosely typed input. This
//! module turns it into a [`CertificateRequest`] and applies the character
//! rules the vault imposes on names.

use crate::role::CertificateRole;
use crate::subject::SubjectName;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A request to issue one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequest {
    /// Logical name the certificate is stored under.
    pub name: String,
    /// Common name, or a full distinguished name such as `CN=tls-1, O=Example`.
    pub subject: String,
    #[serde(default)]
    pub san_dns_names: Vec<String>,
    pub role: CertificateRole,
    /// Issuer's logical name; unused for roots.
    #[serde(default)]
    pub issuer_name: Option<String>,
    #[serde(default)]
    pub validity_months: Option<u32>,
    #[serde(default)]
    pub path_length: Option<u8>,
}

impl CertificateRequest {
    pub fn new(name: impl Into<String>, subject: impl Into<String>, role: CertificateRole) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            san_dns_names: Vec::new(),
            role,
            issuer_name: None,
            validity_months: None,
            path_length: None,
        }
    }

    /// Builds a request from front-end flags, inferring the role.
    pub fn from_flags(
        name: impl Into<String>,
        subject: impl Into<String>,
        is_ca: bool,
        issuer_name: Option<String>,
    ) -> Self {
        let name = name.into();
        let role = CertificateRole::infer(is_ca, issuer_name.as_deref(), &name);
        let mut request = Self::new(name, subject, role);
        request.issuer_name = issuer_name.filter(|issuer| !issuer.is_empty());
        request
    }

    pub fn with_san(mut self, san_dns_names: Vec<String>) -> Self {
        self.san_dns_names = san_dns_names;
        self
    }

    pub fn with_issuer(mut self, issuer_name: impl Into<String>) -> Self {
        self.issuer_name = Some(issuer_name.into());
        self
    }

    pub fn with_validity_months(mut self, months: u32) -> Self {
        self.validity_months = Some(months);
        self
    }

    pub fn with_path_length(mut self, path_length: u8) -> Self {
        self.path_length = Some(path_length);
        self
    }

    /// Checks names, subject and SAN entries.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if self.subject.contains('=') {
            SubjectName::parse(&self.subject)?;
        } else {
            validate_dns_value("subject", &self.subject)?;
        }
        for dns in &self.san_dns_names {
            validate_dns_value("subject alternative name", dns)?;
        }

        match (&self.issuer_name, self.role) {
            (Some(issuer), _) => validate_name(issuer)?,
            (None, CertificateRole::Root) => {}
            (None, role) => {
                return Err(Error::InvalidRequest(format!(
                    "{role} certificate {} needs an issuer",
                    self.name
                )))
            }
        }
        if self.validity_months == Some(0) {
            return Err(Error::InvalidRequest(
                "validity must be at least one month".to_string(),
            ));
        }
        Ok(())
    }

    /// Subject as a distinguished name; a bare value becomes the common name.
    pub fn distinguished_name(&self) -> String {
        if self.subject.contains('=') {
            self.subject.clone()
        } else {
            subject_from_cn(&self.subject)
        }
    }
}

/// Certificate names: ASCII letters, digits and hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidRequest("certificate name is empty".to_string()));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
    {
        return Err(Error::InvalidRequest(format!(
            "certificate name '{name}' contains invalid character '{c}'"
        )));
    }
    Ok(())
}

/// Subject and SAN values: ASCII letters, digits, hyphens, dots and wildcards.
pub fn validate_dns_value(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidRequest(format!("{field} is empty")));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '*' | '.')))
    {
        return Err(Error::InvalidRequest(format!(
            "{field} '{value}' contains invalid character '{c}'"
        )));
    }
    Ok(())
}

/// `CN=<value>`.
pub fn subject_from_cn(common_name: &str) -> String {
    format!("CN={common_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("ca-root").is_ok());
        assert!(validate_name("Tls01").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("tls_1").is_err());
        assert!(validate_name("tls.1").is_err());
    }

    #[test]
    fn test_validate_dns_value() {
        assert!(validate_dns_value("san", "tls-1.example").is_ok());
        assert!(validate_dns_value("san", "*.example").is_ok());
        assert!(validate_dns_value("san", "tls 1").is_err());
        assert!(validate_dns_value("san", "").is_err());
    }

    #[test]
    fn test_from_flags_infers_role() {
        let root = CertificateRequest::from_flags("ca-root", "ca-root", true, None);
        assert_eq!(root.role, CertificateRole::Root);
        assert_eq!(root.issuer_name, None);

        let int = CertificateRequest::from_flags("ca-int", "ca-int", true, Some("ca-root".into()));
        assert_eq!(int.role, CertificateRole::Intermediate);

        let leaf = CertificateRequest::from_flags("tls-1", "tls-1", false, Some("ca-int".into()));
        assert_eq!(leaf.role, CertificateRole::Leaf);
    }

    #[test]
    fn test_validate_requires_issuer_below_root() {
        let leaf = CertificateRequest::new("tls-1", "tls-1", CertificateRole::Leaf);
        assert!(matches!(leaf.validate(), Err(Error::InvalidRequest(_))));
        assert!(leaf.with_issuer("ca-int").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_san_and_validity() {
        let request = CertificateRequest::new("ca-root", "ca-root", CertificateRole::Root)
            .with_san(vec!["bad name".to_string()]);
        assert!(request.validate().is_err());

        let request = CertificateRequest::new("ca-root", "ca-root", CertificateRole::Root)
            .with_validity_months(0);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_distinguished_name() {
        let request = CertificateRequest::new("tls-1", "tls-1.example", CertificateRole::Leaf);
        assert_eq!(request.distinguished_name(), "CN=tls-1.example");

        let request = CertificateRequest::new("tls-1", "CN=tls-1, O=Example", CertificateRole::Leaf);
        assert_eq!(request.distinguished_name(), "CN=tls-1, O=Example");
    }

    #[test]
    fn test_validate_multi_attribute_subject() {
        let request =
            CertificateRequest::new("ca-root", "CN=ca-root, O=Example, C=US", CertificateRole::Root);
        assert!(request.validate().is_ok());

        let request = CertificateRequest::new("ca-root", "CN=ca-root, XX=1", CertificateRole::Root);
        assert!(matches!(request.validate(), Err(Error::InvalidRequest(_))));
    }
}
