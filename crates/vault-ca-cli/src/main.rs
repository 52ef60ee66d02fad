//! vault-ca CLI - issue and renew certificates whose keys stay in the vault
//!
//! Runs the issuance workflow against the development vault, whose state is
//! kept in a JSON file between invocations.
//!
//! # Examples
//!
//! ```bash
//! # Root, intermediate and leaf
//! vault-ca create --ca --name ca-root --subject ca-root
//! vault-ca create --ca --issuer ca-root --name ca-int --subject ca-int
//! vault-ca create --issuer ca-int --name tls-1 --subject tls-1.example --san tls-1.example
//!
//! # Renew with the issuer recorded on the certificate
//! vault-ca renew tls-1
//!
//! # Show the hierarchy
//! vault-ca tree
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

/// vault-ca - split-key certificate authority
#[derive(Parser)]
#[command(name = "vault-ca")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "VAULT_CA_CONFIG")]
    #[arg(default_value = "~/.config/vault-ca/config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a new certificate
    Create(commands::CreateArgs),

    /// Renew a certificate under its recorded issuer
    Renew(commands::RenewArgs),

    /// Print certificates
    Get(commands::GetArgs),

    /// Show the issuer hierarchy
    Tree,

    /// List the versions of a certificate
    Versions(commands::VersionsArgs),

    /// Show current configuration
    Config,
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vault_ca=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vault_ca=info,warn"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let config_path = shellexpand::tilde(&cli.config).to_string();
    info!(config_path = %config_path, "Starting vault-ca");
    let config = config::Config::load(&config_path)?;

    match cli.command {
        Commands::Create(args) => commands::create(args, &config).await,
        Commands::Renew(args) => commands::renew(args, &config).await,
        Commands::Get(args) => commands::get(args, &config).await,
        Commands::Tree => commands::tree(&config).await,
        Commands::Versions(args) => commands::versions(args, &config).await,
        Commands::Config => config::show(&config, &config_path),
    }
}
