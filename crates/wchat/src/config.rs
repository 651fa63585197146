use crate::wallet::WalletKey;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use wallet_chat::{Environment, Identity};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Wallet key (hex encoded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_key: Option<String>,

    /// Network deployment tier
    #[serde(default)]
    pub environment: Environment,

    /// Fixed peer address to chat with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,

    /// Relay overrides; empty means the environment defaults
    #[serde(default)]
    pub relays: Vec<String>,

    /// Path to the config file
    #[serde(skip)]
    pub path: PathBuf,
}

fn default_relays(environment: Environment) -> Vec<String> {
    match environment {
        Environment::Local => vec!["ws://127.0.0.1:7777".to_string()],
        Environment::Dev => vec![
            "wss://relay.damus.io".to_string(),
            "wss://nos.lol".to_string(),
        ],
        Environment::Production => vec![
            "wss://relay.damus.io".to_string(),
            "wss://relay.primal.net".to_string(),
            "wss://relay.snort.social".to_string(),
        ],
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wallet_key: None,
            environment: Environment::default(),
            peer: None,
            relays: Vec::new(),
            path: PathBuf::new(),
        }
    }
}

impl Config {
    /// Load config from the data directory
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("config.json");

        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                serde_json::from_str(&content).context("Failed to parse config file")?;
            config.path = config_path;
            Ok(config)
        } else {
            Ok(Config {
                path: config_path,
                ..Default::default()
            })
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&self.path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn set_wallet_key(&mut self, key: &str) -> Result<()> {
        self.wallet_key = Some(key.to_string());
        self.save()
    }

    pub fn clear_wallet_key(&mut self) -> Result<()> {
        self.wallet_key = None;
        self.save()
    }

    pub fn set_peer(&mut self, address: &str) -> Result<()> {
        let identity = Identity::new(address).context("Invalid peer address")?;
        self.peer = Some(identity.to_string());
        self.save()
    }

    pub fn set_environment(&mut self, environment: Environment) -> Result<()> {
        self.environment = environment;
        self.save()
    }

    pub fn is_logged_in(&self) -> bool {
        self.wallet_key.is_some()
    }

    /// The stored wallet key
    pub fn wallet(&self) -> Result<WalletKey> {
        let key = self.wallet_key.as_ref().context("Not logged in")?;
        WalletKey::from_hex(key)
    }

    /// The stored wallet, generating one on first use
    pub fn ensure_wallet(&mut self) -> Result<(WalletKey, bool)> {
        if let Some(key) = &self.wallet_key {
            return Ok((WalletKey::from_hex(key)?, false));
        }
        let wallet = WalletKey::generate();
        self.set_wallet_key(&wallet.secret_hex())?;
        Ok((wallet, true))
    }

    pub fn peer_identity(&self) -> Result<Identity> {
        let peer = self
            .peer
            .as_ref()
            .context("No peer configured. Use 'wchat peer <address>' first.")?;
        Identity::new(peer).context("Invalid peer address in config")
    }

    pub fn resolved_relays(&self) -> Vec<String> {
        if self.relays.is_empty() {
            default_relays(self.environment)
        } else {
            self.relays.clone()
        }
    }
}
