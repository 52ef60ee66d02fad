//! Property tests for role policy, tags and input validation.

use proptest::prelude::*;
use vault_ca::policy::ContentType;
use vault_ca::request::{validate_dns_value, validate_name};
use vault_ca::{build_policy, CertificateRole, IssuerLinkage, IssuerMode, KeySpec, KeyType};

fn any_role() -> impl Strategy<Value = CertificateRole> {
    prop_oneof![
        Just(CertificateRole::Root),
        Just(CertificateRole::Intermediate),
        Just(CertificateRole::Leaf),
    ]
}

fn any_key() -> impl Strategy<Value = KeySpec> {
    prop_oneof![
        Just(KeySpec { key_type: KeyType::Ec, key_size: 256 }),
        Just(KeySpec { key_type: KeyType::Ec, key_size: 384 }),
        Just(KeySpec { key_type: KeyType::Rsa, key_size: 2048 }),
        Just(KeySpec { key_type: KeyType::Rsa, key_size: 4096 }),
    ]
}

proptest! {
    /// Only leaf keys are exportable and only CA keys are reused.
    #[test]
    fn role_drives_exportable_and_reuse(
        role in any_role(),
        key in any_key(),
        months in 1u32..120,
        bootstrap in any::<bool>(),
        subject in "CN=[a-z0-9-]{1,20}",
        san in proptest::collection::vec("[a-z0-9-]{1,10}\\.example", 0..4),
    ) {
        let policy = build_policy(&subject, &san, role, months, key, bootstrap);
        prop_assert_eq!(policy.exportable, role == CertificateRole::Leaf);
        prop_assert_eq!(policy.reuse_key, role != CertificateRole::Leaf);
        prop_assert_eq!(policy.issuer_mode == IssuerMode::SelfSigned, bootstrap);
        prop_assert_eq!(policy.validity_months, months);
        prop_assert_eq!(policy.key, key);
        prop_assert_eq!(policy.content_type, ContentType::Pkcs12);
        prop_assert_eq!(policy.san_dns_names, san);
    }

    /// Encoded linkage decodes to the same issuer and role.
    #[test]
    fn linkage_survives_tags(
        role in any_role(),
        issuer in "[a-zA-Z0-9-]{1,30}",
        version in 1u32..1000,
    ) {
        let linkage = IssuerLinkage::new(format!("{issuer}/{version}"), issuer.clone(), role);
        let decoded = IssuerLinkage::decode(&linkage.encode()).unwrap();
        prop_assert_eq!(decoded.issuer_name, issuer);
        prop_assert_eq!(decoded.role, role);
    }

    /// Names made of letters, digits and hyphens are accepted.
    #[test]
    fn valid_names_accepted(name in "[a-zA-Z0-9-]{1,64}") {
        prop_assert!(validate_name(&name).is_ok());
    }

    /// Any other character is rejected.
    #[test]
    fn invalid_names_rejected(
        prefix in "[a-z]{0,8}",
        bad in "[^a-zA-Z0-9-]",
        suffix in "[a-z]{0,8}",
    ) {
        let name = format!("{prefix}{bad}{suffix}");
        prop_assert!(validate_name(&name).is_err());
    }

    /// DNS values never panic the validator.
    #[test]
    fn dns_validation_total(value in ".*") {
        let _ = validate_dns_value("subject", &value);
    }
}
