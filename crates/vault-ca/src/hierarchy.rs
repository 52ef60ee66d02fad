//! Issuer tree built from certificate tags.

use crate::gateway::CertificateProperties;
use crate::role::CertificateRole;
use crate::tags::IssuerLinkage;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// One certificate in the issuer tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateNode {
    pub name: String,
    /// Issuer name from the tags; `None` when the linkage tags are unusable.
    pub issuer: Option<String>,
    pub role: Option<CertificateRole>,
    pub children: Vec<CertificateNode>,
}

/// Arranges certificates under their issuers.
///
/// Self-issued certificates, certificates without usable tags, and
/// certificates whose issuer is not in `certificates` become top-level nodes.
/// Children are sorted by name.
pub fn build_tree(certificates: &[CertificateProperties]) -> Vec<CertificateNode> {
    let mut issuers: BTreeMap<&str, (Option<String>, Option<CertificateRole>)> = BTreeMap::new();
    for cert in certificates {
        let entry = match IssuerLinkage::decode(&cert.tags) {
            Ok(linkage) => (Some(linkage.issuer_name), Some(linkage.role)),
            Err(e) => {
                tracing::debug!(name = %cert.name, error = %e, "certificate has no issuer linkage");
                (None, None)
            }
        };
        issuers.insert(cert.name.as_str(), entry);
    }

    let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut tops = Vec::new();
    for (&name, (issuer, _)) in &issuers {
        match issuer.as_deref() {
            Some(issuer) if issuer != name && issuers.contains_key(issuer) => {
                children.entry(issuer).or_default().push(name);
            }
            _ => tops.push(name),
        }
    }

    let mut visited = HashSet::new();
    let mut tree: Vec<CertificateNode> = tops
        .into_iter()
        .map(|name| node(name, &issuers, &children, &mut visited))
        .collect();

    // Names never reached from a top-level node sit on an issuer cycle.
    for &name in issuers.keys() {
        if !visited.contains(name) {
            tracing::warn!(name, "certificate is part of an issuer cycle");
            tree.push(node(name, &issuers, &children, &mut visited));
        }
    }
    tree
}

fn node<'a>(
    name: &'a str,
    issuers: &BTreeMap<&'a str, (Option<String>, Option<CertificateRole>)>,
    children: &BTreeMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
) -> CertificateNode {
    visited.insert(name);
    let (issuer, role) = issuers.get(name).cloned().unwrap_or_default();
    let mut kids = Vec::new();
    for &child in children.get(name).map(Vec::as_slice).unwrap_or_default() {
        // A sibling subtree may already have reached it.
        if !visited.contains(child) {
            kids.push(node(child, issuers, children, visited));
        }
    }

    CertificateNode {
        name: name.to_string(),
        issuer,
        role,
        children: kids,
    }
}
