//! Configuration handling

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vault_ca::CaDefaults;

/// Main configuration file
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    /// Issuance defaults
    #[serde(default)]
    pub defaults: CaDefaults,

    /// Development vault settings
    #[serde(default)]
    pub vault: VaultConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Where the development vault keeps its state
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

fn default_state_file() -> String {
    "~/.local/share/vault-ca/vault.json".to_string()
}

impl Config {
    /// Load config from a file path
    pub fn load(path: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(path).to_string();
        let path = Path::new(&expanded);

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.defaults.validate()?;
        Ok(config)
    }

    /// Absolute path of the vault state file
    pub fn state_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.vault.state_file).to_string())
    }
}

/// Print the effective configuration
pub fn show(config: &Config, config_path: &str) -> Result<()> {
    println!("# {config_path}");
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
