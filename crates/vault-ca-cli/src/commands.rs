//! Certificate commands against the development vault

use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use vault_ca::hierarchy::CertificateNode;
use vault_ca::memory::VaultSnapshot;
use vault_ca::{CertificateBundle, CertificateProvider, CertificateRequest, MemoryKeyVault};

type Provider = CertificateProvider<MemoryKeyVault>;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Logical certificate name (letters, digits, hyphens)
    #[arg(long)]
    pub name: String,

    /// Common name, or a full distinguished name
    #[arg(long)]
    pub subject: String,

    /// DNS subject alternative names
    #[arg(long, value_delimiter = ',')]
    pub san: Vec<String>,

    /// Issue a CA certificate
    #[arg(long)]
    pub ca: bool,

    /// Issuer certificate name; omit for a root
    #[arg(long)]
    pub issuer: Option<String>,

    /// Validity in months (role default if omitted)
    #[arg(long)]
    pub months: Option<u32>,

    /// Basic constraints path length (role default if omitted)
    #[arg(long)]
    pub path_length: Option<u8>,
}

#[derive(Args, Debug)]
pub struct RenewArgs {
    /// Certificate to renew
    pub name: String,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Certificates to print
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Print PEM instead of a summary
    #[arg(long)]
    pub pem: bool,
}

#[derive(Args, Debug)]
pub struct VersionsArgs {
    /// Certificate name
    pub name: String,
}

/// Opens the development vault persisted at `path`.
fn open(config: &Config, path: &Path) -> Result<(Arc<MemoryKeyVault>, Provider)> {
    let snapshot = VaultSnapshot::load(path)
        .with_context(|| format!("failed to load vault state from {}", path.display()))?;
    let vault = Arc::new(MemoryKeyVault::from_snapshot(snapshot)?);
    let provider = CertificateProvider::new(Arc::clone(&vault), config.defaults.clone());
    Ok((vault, provider))
}

async fn persist(vault: &MemoryKeyVault, path: &Path) -> Result<()> {
    vault
        .snapshot()
        .await
        .save(path)
        .with_context(|| format!("failed to save vault state to {}", path.display()))
}

pub async fn create(args: CreateArgs, config: &Config) -> Result<()> {
    let path = config.state_path();
    let (vault, provider) = open(config, &path)?;

    let mut request = CertificateRequest::from_flags(args.name, args.subject, args.ca, args.issuer)
        .with_san(args.san);
    request.validity_months = args.months;
    request.path_length = args.path_length;
    info!(name = %request.name, role = %request.role, "creating certificate");

    let bundle = provider.create_from_request(&request).await?;
    persist(&vault, &path).await?;
    print_summary(&bundle)
}

pub async fn renew(args: RenewArgs, config: &Config) -> Result<()> {
    let path = config.state_path();
    let (vault, provider) = open(config, &path)?;

    let existing = provider.get_certificate(&args.name).await?;
    let bundle = provider.renew(&existing).await?;
    persist(&vault, &path).await?;
    print_summary(&bundle)
}

pub async fn get(args: GetArgs, config: &Config) -> Result<()> {
    let (_, provider) = open(config, &config.state_path())?;
    if args.pem {
        for cert in provider.get_public_certificates(&args.names).await? {
            print!("{}", cert.to_pem());
        }
        return Ok(());
    }
    for name in &args.names {
        print_summary(&provider.get_certificate(name).await?)?;
    }
    Ok(())
}

pub async fn tree(config: &Config) -> Result<()> {
    let (_, provider) = open(config, &config.state_path())?;
    let roots = provider.certificate_tree().await?;
    if roots.is_empty() {
        println!("No certificates.");
    }
    for root in &roots {
        print_node(root, 0);
    }
    Ok(())
}

pub async fn versions(args: VersionsArgs, config: &Config) -> Result<()> {
    let (_, provider) = open(config, &config.state_path())?;
    let versions = provider.certificate_versions(&args.name).await?;
    println!("{}: {} version(s)", args.name, versions.len());
    for v in versions {
        println!(
            "  {:>4}  {:<8}  {} .. {}",
            v.version,
            if v.enabled { "enabled" } else { "disabled" },
            v.not_before.format("%Y-%m-%d"),
            v.not_after.format("%Y-%m-%d"),
        );
    }
    Ok(())
}

fn print_summary(bundle: &CertificateBundle) -> Result<()> {
    let cert = &bundle.certificate;
    println!("{} (version {})", bundle.name, bundle.version);
    println!("  Subject:    {}", cert.subject()?);
    println!("  Issuer:     {}", cert.issuer()?);
    println!("  Serial:     {}", cert.serial_hex()?);
    println!(
        "  Valid:      {} .. {}",
        cert.not_before()?.format("%Y-%m-%d %H:%M:%S"),
        cert.not_after()?.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(len) = cert.path_length()? {
        println!("  Path len:   {len}");
    }
    let dns = cert.dns_names()?;
    if !dns.is_empty() {
        println!("  DNS names:  {}", dns.join(", "));
    }
    println!("  Exportable: {}", bundle.policy.exportable);
    for (key, value) in &bundle.tags {
        println!("  {key}: {value}");
    }
    Ok(())
}

fn print_node(node: &CertificateNode, depth: usize) {
    let role = node
        .role
        .map(|r| r.to_string())
        .unwrap_or_else(|| "untagged".to_string());
    println!("{}{} [{}]", "  ".repeat(depth), node.name, role);
    for child in &node.children {
        print_node(child, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_ca::KeyStoreGateway;

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.vault.state_file = dir.join("vault.json").to_string_lossy().to_string();
        config
    }

    fn create_args(name: &str, ca: bool, issuer: Option<&str>) -> CreateArgs {
        CreateArgs {
            name: name.to_string(),
            subject: name.to_string(),
            san: Vec::new(),
            ca,
            issuer: issuer.map(str::to_string),
            months: None,
            path_length: None,
        }
    }

    #[tokio::test]
    async fn test_state_persists_between_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        create(create_args("ca-root", true, None), &config).await.unwrap();
        create(create_args("tls-1", false, Some("ca-root")), &config)
            .await
            .unwrap();
        renew(
            RenewArgs {
                name: "tls-1".to_string(),
            },
            &config,
        )
        .await
        .unwrap();

        let (vault, provider) = open(&config, &config.state_path()).unwrap();
        let versions = vault.list_versions("tls-1").await.unwrap();
        assert_eq!(versions.len(), 2);
        let root = vault.get_certificate("ca-root").await.unwrap();
        let leaf = vault.get_certificate("tls-1").await.unwrap();
        assert_eq!(leaf.chain, vec![root.certificate]);
        let tree = provider.certificate_tree().await.unwrap();
        assert_eq!(tree[0].name, "ca-root");
        assert_eq!(tree[0].children[0].name, "tls-1");
    }

    #[tokio::test]
    async fn test_create_rejects_bad_name() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let result = create(create_args("bad name", true, None), &config).await;
        assert!(result.is_err());
        assert!(!config.state_path().exists());
    }
}
