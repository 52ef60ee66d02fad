//! Issuance and renewal orchestration.
//!
//! [`CertificateProvider`] sequences one issuance against a
//! [`KeyStoreGateway`]:
//!
//! ```text
//! Start -> PendingOpsCleared -> KeyGenerated (root bootstrap)
//!                            -> IssuerFetched (everything else)
//!       -> CsrIssued -> CsrVerified -> Signed -> Merged -> Done
//! ```
//!
//! Any step can end in `Failed`. The merge is the only commit point: nothing
//! is returned to the caller unless it succeeded.
//!
//! A first root issuance has no issuer to sign with, so the vault is first
//! asked for a throwaway self-signed certificate. Its key (reused by the real
//! root through the key-reuse policy) signs the real root. If the flow does
//! not finish, that temporary version is disabled again, including when the
//! issuance future is dropped.

use crate::certificate::Certificate;
use crate::config::CaDefaults;
use crate::csr::{self, VerifiedCsr};
use crate::gateway::{CertificateBundle, CertificateProperties, KeyStoreGateway};
use crate::hierarchy::{build_tree, CertificateNode};
use crate::policy::{build_policy, KeySpec};
use crate::request::CertificateRequest;
use crate::role::CertificateRole;
use crate::signer::{sign_certificate, CertificateTemplate, KeyHandle};
use crate::subject::SubjectName;
use crate::tags::{IssuerLinkage, Tags};
use crate::{Error, Result};
use chrono::{DateTime, Months, Utc};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Steps of one issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceState {
    Start,
    PendingOpsCleared,
    KeyGenerated,
    IssuerFetched,
    CsrIssued,
    CsrVerified,
    Signed,
    Merged,
    Done,
    Failed,
}

impl fmt::Display for IssuanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-call work value.
struct Issuance<'a> {
    name: &'a str,
    role: CertificateRole,
    state: IssuanceState,
}

impl<'a> Issuance<'a> {
    fn new(name: &'a str, role: CertificateRole) -> Self {
        Self {
            name,
            role,
            state: IssuanceState::Start,
        }
    }

    fn advance(&mut self, next: IssuanceState) {
        debug!(
            name = self.name,
            role = %self.role,
            from = %self.state,
            to = %next,
            "issuance state"
        );
        self.state = next;
    }
}

/// Everything one issuance needs, whether it is a create or a renewal.
struct IssueParams<'a> {
    role: CertificateRole,
    issuer_name: &'a str,
    name: &'a str,
    subject: &'a str,
    san: &'a [String],
    validity_months: u32,
    path_length: u8,
    /// Certificate being renewed.
    previous: Option<&'a Certificate>,
}

/// The temporary self-signed version created by a root bootstrap.
///
/// While armed it is disabled on release, or on drop if the issuance future
/// goes away first.
struct TemporaryKey<G: KeyStoreGateway + 'static> {
    gateway: Arc<G>,
    name: String,
    version: String,
    timeout: Option<Duration>,
    armed: bool,
}

impl<G: KeyStoreGateway + 'static> TemporaryKey<G> {
    fn new(gateway: Arc<G>, name: &str, version: &str, timeout: Option<Duration>) -> Self {
        Self {
            gateway,
            name: name.to_string(),
            version: version.to_string(),
            timeout,
            armed: true,
        }
    }

    /// The issuance committed; keep the version.
    fn disarm(mut self) {
        self.armed = false;
    }

    /// Disables the version.
    ///
    /// Stays armed until the vault confirms, so a release interrupted by
    /// cancellation, or one that failed, is retried from `Drop`.
    async fn release(mut self) -> Result<()> {
        disable_version(self.gateway.as_ref(), &self.name, &self.version, self.timeout).await?;
        self.armed = false;
        info!(name = %self.name, version = %self.version, "disabled temporary bootstrap key");
        Ok(())
    }
}

async fn disable_version<G: KeyStoreGateway>(
    gateway: &G,
    name: &str,
    version: &str,
    timeout: Option<Duration>,
) -> Result<()> {
    let disable = gateway.set_enabled(name, version, false);
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, disable).await {
            Ok(result) => result,
            Err(_) => Err(Error::Certificate(format!("timed out after {limit:?}"))),
        },
        None => disable.await,
    };
    outcome.map_err(|e| Error::TemporaryKeyLeak {
        name: name.to_string(),
        version: version.to_string(),
        reason: e.to_string(),
    })
}

impl<G: KeyStoreGateway + 'static> Drop for TemporaryKey<G> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(
                name = %self.name,
                version = %self.version,
                "no runtime to disable temporary bootstrap key"
            );
            return;
        };
        let gateway = Arc::clone(&self.gateway);
        let name = self.name.clone();
        let version = self.version.clone();
        let timeout = self.timeout;
        warn!(name = %name, version = %version, "temporary bootstrap key still enabled; disabling in background");
        runtime.spawn(async move {
            match disable_version(gateway.as_ref(), &name, &version, timeout).await {
                Ok(()) => info!(name = %name, version = %version, "disabled temporary bootstrap key"),
                Err(leak) => error!(error = %leak, "failed to disable temporary bootstrap key"),
            }
        });
    }
}

/// Issues and renews certificates through a key store gateway.
pub struct CertificateProvider<G: KeyStoreGateway + 'static> {
    gateway: Arc<G>,
    defaults: CaDefaults,
}

impl<G: KeyStoreGateway + 'static> CertificateProvider<G> {
    pub fn new(gateway: Arc<G>, defaults: CaDefaults) -> Self {
        Self { gateway, defaults }
    }

    /// Issues a certificate with the role's default validity and path length.
    pub async fn create_with_defaults(
        &self,
        role: CertificateRole,
        issuer_name: &str,
        name: &str,
        subject: &str,
        san: &[String],
    ) -> Result<CertificateBundle> {
        let defaults = self.defaults.for_role(role);
        self.create(
            role,
            issuer_name,
            name,
            subject,
            defaults.validity_months,
            san,
            defaults.path_length,
        )
        .await
    }

    /// Issues a new certificate.
    ///
    /// `issuer_name` is ignored for roots, which always name themselves.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        role: CertificateRole,
        issuer_name: &str,
        name: &str,
        subject: &str,
        duration_months: u32,
        san: &[String],
        path_length: u8,
    ) -> Result<CertificateBundle> {
        let issuer_name = if role == CertificateRole::Root {
            if !issuer_name.is_empty() && issuer_name != name {
                return Err(Error::InvalidRequest(format!(
                    "root certificate {name} cannot be issued by {issuer_name}"
                )));
            }
            name
        } else {
            issuer_name
        };

        self.issue(IssueParams {
            role,
            issuer_name,
            name,
            subject,
            san,
            validity_months: duration_months,
            path_length,
            previous: None,
        })
        .await
    }

    /// Validates a request and issues it, filling gaps from the defaults.
    pub async fn create_from_request(
        &self,
        request: &CertificateRequest,
    ) -> Result<CertificateBundle> {
        request.validate()?;
        let defaults = self.defaults.for_role(request.role);
        self.create(
            request.role,
            request.issuer_name.as_deref().unwrap_or_default(),
            &request.name,
            &request.distinguished_name(),
            request.validity_months.unwrap_or(defaults.validity_months),
            &request.san_dns_names,
            request.path_length.unwrap_or(defaults.path_length),
        )
        .await
    }

    /// Renews a certificate with the role and issuer recorded in its tags.
    ///
    /// CA renewals keep the existing key; leaf renewals get a new one.
    pub async fn renew(&self, existing: &CertificateBundle) -> Result<CertificateBundle> {
        let name = existing.name.as_str();
        let linkage = IssuerLinkage::decode(&existing.tags).map_err(|e| {
            warn!(name, error = %e, "certificate has no usable issuer linkage");
            Error::IssuerNotFound {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        let defaults = self.defaults.for_role(linkage.role);
        let validity_months = match existing.policy.validity_months {
            0 => defaults.validity_months,
            months => months,
        };
        let path_length =
            renewal_path_length(name, existing.certificate.path_length()?, defaults.path_length);
        let issuer_name = match linkage.role {
            CertificateRole::Root => name,
            role if linkage.is_self_issued(name) => {
                warn!(name, %role, "certificate names itself as issuer");
                return Err(Error::IssuerNotFound {
                    name: name.to_string(),
                    reason: format!("{role} certificate cannot be its own issuer"),
                });
            }
            _ => linkage.issuer_name.as_str(),
        };

        info!(name, role = %linkage.role, issuer = issuer_name, "renewing certificate");
        self.issue(IssueParams {
            role: linkage.role,
            issuer_name,
            name,
            subject: &existing.policy.subject,
            san: &existing.policy.san_dns_names,
            validity_months,
            path_length,
            previous: Some(&existing.certificate),
        })
        .await
    }

    /// Returns the current version of a certificate.
    pub async fn get_certificate(&self, name: &str) -> Result<CertificateBundle> {
        self.deadline("get_certificate", name, self.gateway.get_certificate(name))
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => e,
                other => remote_failure("get_certificate", name, other),
            })
    }

    /// Returns the public certificates for `names`, in order.
    pub async fn get_public_certificates(&self, names: &[String]) -> Result<Vec<Certificate>> {
        let mut certificates = Vec::with_capacity(names.len());
        for name in names {
            certificates.push(self.get_certificate(name).await?.certificate);
        }
        Ok(certificates)
    }

    /// Lists every version of a certificate.
    pub async fn certificate_versions(&self, name: &str) -> Result<Vec<CertificateProperties>> {
        self.deadline("list_versions", name, self.gateway.list_versions(name))
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => e,
                other => remote_failure("list_versions", name, other),
            })
    }

    /// Builds the issuer tree from the tags of every certificate.
    pub async fn certificate_tree(&self) -> Result<Vec<CertificateNode>> {
        let certificates = self
            .call("list_certificates", "*", self.gateway.list_certificates())
            .await?;
        Ok(build_tree(&certificates))
    }

    #[instrument(skip_all, fields(name = params.name, role = %params.role, issuer = params.issuer_name))]
    async fn issue(&self, params: IssueParams<'_>) -> Result<CertificateBundle> {
        let mut run = Issuance::new(params.name, params.role);
        let mut bootstrap: Option<TemporaryKey<G>> = None;

        match self.run(&params, &mut run, &mut bootstrap).await {
            Ok(bundle) => {
                if let Some(temporary) = bootstrap.take() {
                    temporary.disarm();
                }
                run.advance(IssuanceState::Done);
                info!(version = %bundle.version, "certificate issued");
                Ok(bundle)
            }
            Err(e) => {
                error!(state = %run.state, error = %e, "issuance failed");
                run.advance(IssuanceState::Failed);
                if let Some(temporary) = bootstrap.take() {
                    if let Err(leak) = temporary.release().await {
                        error!(error = %leak, "temporary bootstrap key left enabled");
                    }
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        params: &IssueParams<'_>,
        run: &mut Issuance<'_>,
        bootstrap: &mut Option<TemporaryKey<G>>,
    ) -> Result<CertificateBundle> {
        let name = params.name;
        if params.validity_months == 0 {
            return Err(Error::InvalidRequest(format!(
                "validity for {name} must be at least one month"
            )));
        }
        let subject = SubjectName::parse(params.subject)?;
        let hash = self.defaults.hash_algorithm()?;
        let key_spec = KeySpec {
            key_type: self.defaults.key_type,
            key_size: self.defaults.key_size,
        };

        if let Err(e) = self
            .deadline(
                "delete_pending_operation",
                name,
                self.gateway.delete_pending_operation(name),
            )
            .await
        {
            debug!(error = %e, "ignoring pending operation cleanup failure");
        }
        run.advance(IssuanceState::PendingOpsCleared);

        let bootstrapping = params.role == CertificateRole::Root && params.previous.is_none();
        let (issuer_certificate, signing_key, expected_key) = if bootstrapping {
            let policy = build_policy(
                params.subject,
                params.san,
                params.role,
                params.validity_months,
                key_spec,
                true,
            );
            let pending = self
                .call(
                    "create_key_and_csr",
                    name,
                    self.gateway.create_key_and_csr(name, &policy, &Tags::new()),
                )
                .await?;
            let temporary = pending.certificate.ok_or_else(|| Error::RemoteOperationFailed {
                operation: "create_key_and_csr",
                name: name.to_string(),
                reason: "vault did not complete the self-signed certificate".to_string(),
            })?;
            *bootstrap = Some(TemporaryKey::new(
                Arc::clone(&self.gateway),
                name,
                &temporary.version,
                self.defaults.operation_timeout(),
            ));
            run.advance(IssuanceState::KeyGenerated);
            let expected = temporary.certificate.public_key_info()?;
            (None, temporary.key, Some(expected))
        } else {
            let issuer = self.fetch_issuer(name, params.issuer_name).await?;
            check_issuer(params, &issuer.certificate)?;
            run.advance(IssuanceState::IssuerFetched);
            let expected = match params.previous {
                Some(previous) if params.role.is_ca() => Some(previous.public_key_info()?),
                _ => None,
            };
            (Some(issuer.certificate), issuer.key, expected)
        };

        let linkage = IssuerLinkage::new(signing_key.id(), params.issuer_name, params.role);
        let policy = build_policy(
            params.subject,
            params.san,
            params.role,
            params.validity_months,
            key_spec,
            false,
        );
        let pending = self
            .call(
                "create_key_and_csr",
                name,
                self.gateway
                    .create_key_and_csr(name, &policy, &linkage.encode()),
            )
            .await?;
        run.advance(IssuanceState::CsrIssued);

        let request = csr::decode_and_verify(&pending.csr).map_err(|reason| Error::InvalidCsr {
            name: name.to_string(),
            reason,
        })?;
        check_csr(name, &request, &subject, params.san, expected_key.as_deref())?;
        run.advance(IssuanceState::CsrVerified);

        let not_before = now_seconds();
        let not_after = not_before
            .checked_add_months(Months::new(params.validity_months))
            .ok_or_else(|| {
                Error::InvalidRequest(format!(
                    "validity of {} months is out of range",
                    params.validity_months
                ))
            })?;
        let template = CertificateTemplate {
            subject,
            san_dns_names: params.san.to_vec(),
            not_before,
            not_after,
            role: params.role,
            path_length: if params.role.is_ca() {
                params.path_length
            } else {
                0
            },
            hash,
        };
        let signed = self
            .sign(name, &request.public_key_info, &template, issuer_certificate.as_ref(), &signing_key)
            .await?;
        run.advance(IssuanceState::Signed);

        let mut chain = vec![signed.der().to_vec()];
        if let Some(issuer) = &issuer_certificate {
            chain.push(issuer.der().to_vec());
        }
        let bundle = self
            .call(
                "merge_signed_certificate",
                name,
                self.gateway.merge_signed_certificate(name, chain),
            )
            .await?;
        run.advance(IssuanceState::Merged);
        Ok(bundle)
    }

    async fn fetch_issuer(&self, name: &str, issuer_name: &str) -> Result<CertificateBundle> {
        if issuer_name.is_empty() {
            return Err(Error::IssuerNotFound {
                name: name.to_string(),
                reason: "no issuer name given".to_string(),
            });
        }
        self.deadline(
            "get_certificate",
            issuer_name,
            self.gateway.get_certificate(issuer_name),
        )
        .await
        .map_err(|e| match e {
            Error::NotFound(_) => Error::IssuerNotFound {
                name: name.to_string(),
                reason: format!("issuer {issuer_name} does not exist"),
            },
            other => remote_failure("get_certificate", issuer_name, other),
        })
    }

    async fn sign(
        &self,
        name: &str,
        public_key_info: &[u8],
        template: &CertificateTemplate,
        issuer: Option<&Certificate>,
        key: &KeyHandle,
    ) -> Result<Certificate> {
        let signing = sign_certificate(public_key_info, template, issuer, self.gateway.as_ref(), key);
        self.deadline("remote_sign", name, signing)
            .await
            .map_err(|e| match e {
                Error::Certificate(_) | Error::InvalidRequest(_) => e,
                other => remote_failure("remote_sign", name, other),
            })
    }

    /// Runs a gateway call under the configured deadline.
    async fn deadline<T>(
        &self,
        operation: &'static str,
        name: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match self.defaults.operation_timeout() {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                Err(Error::RemoteOperationFailed {
                    operation,
                    name: name.to_string(),
                    reason: format!("timed out after {limit:?}"),
                })
            }),
            None => call.await,
        }
    }

    /// Runs a gateway call under the deadline; every failure is a remote failure.
    async fn call<T>(
        &self,
        operation: &'static str,
        name: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.deadline(operation, name, call)
            .await
            .map_err(|e| remote_failure(operation, name, e))
    }
}

fn remote_failure(operation: &'static str, name: &str, error: Error) -> Error {
    match error {
        e @ Error::RemoteOperationFailed { .. } => e,
        other => Error::RemoteOperationFailed {
            operation,
            name: name.to_string(),
            reason: other.to_string(),
        },
    }
}

/// The CSR must carry the requested subject and names, and for CA renewals the existing key.
fn check_csr(
    name: &str,
    request: &VerifiedCsr,
    subject: &SubjectName,
    san: &[String],
    expected_key: Option<&[u8]>,
) -> Result<()> {
    let invalid = |reason: String| Error::InvalidCsr {
        name: name.to_string(),
        reason,
    };
    if request.subject != subject.to_string() {
        return Err(invalid(format!(
            "CSR subject '{}' differs from requested '{subject}'",
            request.subject
        )));
    }
    let mut requested = san.to_vec();
    let mut present = request.dns_names.clone();
    requested.sort();
    present.sort();
    if requested != present {
        return Err(invalid(format!(
            "CSR names {present:?} differ from requested {requested:?}"
        )));
    }
    if let Some(expected) = expected_key {
        if request.public_key_info != expected {
            return Err(invalid("CSR key differs from the existing CA key".to_string()));
        }
    }
    Ok(())
}

/// The issuer must be a CA with room for the new certificate below it.
fn check_issuer(params: &IssueParams<'_>, issuer: &Certificate) -> Result<()> {
    if !issuer.is_ca()? {
        return Err(Error::InvalidRequest(format!(
            "issuer {} of {} is not a CA",
            params.issuer_name, params.name
        )));
    }
    let self_issued = params.issuer_name == params.name;
    if params.role.is_ca() && !self_issued {
        if let Some(limit) = issuer.path_length()? {
            if u32::from(params.path_length) >= limit {
                return Err(Error::InvalidRequest(format!(
                    "path length {} of {} must be below issuer {}'s path length {limit}",
                    params.path_length, params.name, params.issuer_name
                )));
            }
        }
    }
    Ok(())
}

/// Path length to carry into a renewal; out-of-range values fall back to the default.
fn renewal_path_length(name: &str, current: Option<u32>, default: u8) -> u8 {
    match current.map(u8::try_from) {
        Some(Ok(len)) => len,
        Some(Err(_)) => {
            warn!(
                name,
                path_length = ?current,
                default,
                "path length out of range; renewing with the role default"
            );
            default
        }
        None => default,
    }
}

fn now_seconds() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryKeyVault, Operation};
    use crate::tags::{CERTIFICATE_TYPE_TAG, ISSUER_NAME_TAG};

    fn provider() -> (Arc<MemoryKeyVault>, CertificateProvider<MemoryKeyVault>) {
        let vault = Arc::new(MemoryKeyVault::new());
        let provider = CertificateProvider::new(Arc::clone(&vault), CaDefaults::default());
        (vault, provider)
    }

    #[tokio::test]
    async fn test_root_bootstrap_walks_states() {
        let (vault, provider) = provider();
        let root = provider
            .create_with_defaults(CertificateRole::Root, "", "ca-root", "CN=ca-root", &[])
            .await
            .unwrap();

        assert_eq!(root.version, "2");
        assert_eq!(root.tags[ISSUER_NAME_TAG], "ca-root");
        assert_eq!(root.tags[CERTIFICATE_TYPE_TAG], "Root");
        root.certificate.verify_signed_by(&root.certificate).unwrap();

        let ops: Vec<Operation> = vault.operations().iter().map(|r| r.operation).collect();
        assert_eq!(
            ops,
            vec![
                Operation::DeletePendingOperation,
                Operation::CreateKeyAndCsr,
                Operation::CreateKeyAndCsr,
                Operation::RemoteSign,
                Operation::MergeSignedCertificate,
            ]
        );
    }

    #[tokio::test]
    async fn test_root_rejects_foreign_issuer() {
        let (vault, provider) = provider();
        let result = provider
            .create_with_defaults(CertificateRole::Root, "other", "ca-root", "CN=ca-root", &[])
            .await;
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
        assert!(vault.operations().is_empty());
    }

    #[tokio::test]
    async fn test_issuer_path_length_is_enforced() {
        let (_vault, provider) = provider();
        provider
            .create_with_defaults(CertificateRole::Root, "", "ca-root", "CN=ca-root", &[])
            .await
            .unwrap();

        let result = provider
            .create(CertificateRole::Intermediate, "ca-root", "ca-int", "CN=ca-int", 12, &[], 5)
            .await;
        assert!(matches!(result, Err(Error::InvalidRequest(msg)) if msg.contains("path length")));
    }

    #[tokio::test]
    async fn test_leaf_cannot_issue() {
        let (_vault, provider) = provider();
        provider
            .create_with_defaults(CertificateRole::Root, "", "ca-root", "CN=ca-root", &[])
            .await
            .unwrap();
        provider
            .create_with_defaults(CertificateRole::Leaf, "ca-root", "tls-1", "CN=tls-1", &[])
            .await
            .unwrap();

        let result = provider
            .create_with_defaults(CertificateRole::Leaf, "tls-1", "tls-2", "CN=tls-2", &[])
            .await;
        assert!(matches!(result, Err(Error::InvalidRequest(msg)) if msg.contains("not a CA")));
    }

    #[tokio::test]
    async fn test_missing_issuer() {
        let (_vault, provider) = provider();
        let result = provider
            .create_with_defaults(CertificateRole::Leaf, "ca-missing", "tls-1", "CN=tls-1", &[])
            .await;
        assert!(matches!(result, Err(Error::IssuerNotFound { .. })));
    }

    #[tokio::test]
    async fn test_zero_validity_is_rejected() {
        let (_vault, provider) = provider();
        let result = provider
            .create(CertificateRole::Root, "", "ca-root", "CN=ca-root", 0, &[], 5)
            .await;
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_remote_failure_keeps_original_operation() {
        let inner = Error::RemoteOperationFailed {
            operation: "merge_signed_certificate",
            name: "tls-1".to_string(),
            reason: "boom".to_string(),
        };
        let wrapped = remote_failure("get_certificate", "tls-1", inner);
        assert!(matches!(
            wrapped,
            Error::RemoteOperationFailed { operation: "merge_signed_certificate", .. }
        ));

        let wrapped = remote_failure("get_certificate", "tls-1", Error::NotFound("x".into()));
        assert!(matches!(
            wrapped,
            Error::RemoteOperationFailed { operation: "get_certificate", .. }
        ));
    }

    fn verified(subject: &str, dns_names: &[&str], key: &[u8]) -> VerifiedCsr {
        VerifiedCsr {
            subject: subject.to_string(),
            public_key_info: key.to_vec(),
            dns_names: dns_names.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_check_csr() {
        let subject = SubjectName::parse("CN=tls-1,O=Example").unwrap();
        let san = vec!["b.example".to_string(), "a.example".to_string()];
        let csr = verified("CN=tls-1, O=Example", &["a.example", "b.example"], b"key");
        assert!(check_csr("tls-1", &csr, &subject, &san, Some(&b"key"[..])).is_ok());

        let reordered = verified("O=Example, CN=tls-1", &["a.example", "b.example"], b"key");
        assert!(matches!(
            check_csr("tls-1", &reordered, &subject, &san, None),
            Err(Error::InvalidCsr { .. })
        ));

        let missing_name = verified("CN=tls-1, O=Example", &["a.example"], b"key");
        assert!(matches!(
            check_csr("tls-1", &missing_name, &subject, &san, None),
            Err(Error::InvalidCsr { .. })
        ));

        assert!(matches!(
            check_csr("tls-1", &csr, &subject, &san, Some(&b"other"[..])),
            Err(Error::InvalidCsr { .. })
        ));
    }

    #[test]
    fn test_renewal_path_length() {
        assert_eq!(renewal_path_length("ca-int", Some(2), 3), 2);
        assert_eq!(renewal_path_length("ca-int", None, 3), 3);
        assert_eq!(renewal_path_length("ca-int", Some(300), 3), 3);
    }

    #[test]
    fn test_now_has_whole_seconds() {
        assert_eq!(now_seconds().timestamp_subsec_nanos(), 0);
    }
}
