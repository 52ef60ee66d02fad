//! Subject distinguished names.
//!
//! Subjects are written as comma separated `TYPE=value` pairs in the order
//! they are encoded, e.g. `CN=tls-1, O=Example, C=US`. The vault's CSRs and
//! the signer's certificates are both built from one [`SubjectName`], so an
//! issued certificate carries exactly the name its request asked for.

use crate::{Error, Result};
use const_oid::db::rfc4519;
use const_oid::ObjectIdentifier;
use der::asn1::{Any, SetOfVec};
use der::Tag;
use rcgen::{DistinguishedName, DnType, DnValue};
use std::fmt;
use std::str::FromStr;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

/// Attribute types accepted in a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectAttribute {
    CommonName,
    Organization,
    OrganizationalUnit,
    Country,
    State,
    Locality,
}

impl SubjectAttribute {
    /// Short label, as written in subjects and rendered by x509-parser.
    pub fn label(self) -> &'static str {
        match self {
            Self::CommonName => "CN",
            Self::Organization => "O",
            Self::OrganizationalUnit => "OU",
            Self::Country => "C",
            Self::State => "ST",
            Self::Locality => "L",
        }
    }

    fn oid(self) -> ObjectIdentifier {
        match self {
            Self::CommonName => rfc4519::CN,
            Self::Organization => rfc4519::O,
            Self::OrganizationalUnit => rfc4519::OU,
            Self::Country => rfc4519::C,
            Self::State => rfc4519::ST,
            Self::Locality => rfc4519::L,
        }
    }

    fn dn_type(self) -> DnType {
        match self {
            Self::CommonName => DnType::CommonName,
            Self::Organization => DnType::OrganizationName,
            Self::OrganizationalUnit => DnType::OrganizationalUnitName,
            Self::Country => DnType::CountryName,
            Self::State => DnType::StateOrProvinceName,
            Self::Locality => DnType::LocalityName,
        }
    }
}

impl FromStr for SubjectAttribute {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CN" => Ok(Self::CommonName),
            "O" => Ok(Self::Organization),
            "OU" => Ok(Self::OrganizationalUnit),
            "C" => Ok(Self::Country),
            "ST" => Ok(Self::State),
            "L" => Ok(Self::Locality),
            other => Err(Error::InvalidRequest(format!(
                "unsupported subject attribute: {other}"
            ))),
        }
    }
}

/// A parsed subject, one attribute per RDN, in written order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectName {
    attributes: Vec<(SubjectAttribute, String)>,
}

impl SubjectName {
    /// Parses `TYPE=value` pairs separated by commas.
    ///
    /// Each attribute type may appear once; `C` must be a two-letter code.
    pub fn parse(subject: &str) -> Result<Self> {
        let mut attributes: Vec<(SubjectAttribute, String)> = Vec::new();
        for part in subject.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (attr, value) = part.split_once('=').ok_or_else(|| {
                Error::InvalidRequest(format!("malformed subject component: {part}"))
            })?;
            let attr: SubjectAttribute = attr.trim().parse()?;
            let value = value.trim();
            if value.is_empty() {
                return Err(Error::InvalidRequest(format!(
                    "subject attribute {} has no value",
                    attr.label()
                )));
            }
            if attributes.iter().any(|(seen, _)| *seen == attr) {
                return Err(Error::InvalidRequest(format!(
                    "subject attribute {} appears more than once",
                    attr.label()
                )));
            }
            if attr == SubjectAttribute::Country
                && !(value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic()))
            {
                return Err(Error::InvalidRequest(format!(
                    "country must be a two-letter code, got '{value}'"
                )));
            }
            attributes.push((attr, value.to_string()));
        }
        if attributes.is_empty() {
            return Err(Error::InvalidRequest("subject is empty".to_string()));
        }
        Ok(Self { attributes })
    }

    /// rcgen form, used for vault CSRs and self-signed certificates.
    pub(crate) fn to_rcgen(&self) -> Result<DistinguishedName> {
        let mut dn = DistinguishedName::new();
        for (attr, value) in &self.attributes {
            let value = match attr {
                SubjectAttribute::Country => DnValue::PrintableString(
                    value.as_str().try_into().map_err(|e| {
                        Error::InvalidRequest(format!("invalid country '{value}': {e}"))
                    })?,
                ),
                _ => DnValue::Utf8String(value.clone()),
            };
            dn.push(attr.dn_type(), value);
        }
        Ok(dn)
    }

    /// x509-cert form, used for certificates assembled by the signer.
    pub(crate) fn to_x509(&self) -> Result<Name> {
        let mut rdns = Vec::with_capacity(self.attributes.len());
        for (attr, value) in &self.attributes {
            let tag = match attr {
                SubjectAttribute::Country => Tag::PrintableString,
                _ => Tag::Utf8String,
            };
            let atv = AttributeTypeAndValue {
                oid: attr.oid(),
                value: Any::new(tag, value.as_bytes())?,
            };
            rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?));
        }
        Ok(RdnSequence(rdns))
    }
}

impl FromStr for SubjectName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SubjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (attr, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", attr.label(), value)?;
        }
        Ok(())
    }
}
