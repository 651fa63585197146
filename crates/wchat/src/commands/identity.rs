use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use wallet_chat::{FileStorageAdapter, KeyStore};

use crate::config::Config;
use crate::output::Output;
use crate::wallet::WalletKey;

#[derive(Serialize)]
struct LoginResult {
    address: String,
    generated: bool,
}

#[derive(Serialize)]
struct WhoamiResult {
    address: String,
    environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer: Option<String>,
    logged_in: bool,
}

/// Login with a wallet key (hex), generating one when none is given
pub fn login(key: Option<&str>, config: &Config, output: &Output) -> Result<()> {
    let (wallet, generated) = match key {
        Some(key) => (WalletKey::from_hex(key)?, false),
        None => (WalletKey::generate(), true),
    };

    let mut config = config.clone();
    config.set_wallet_key(&wallet.secret_hex())?;

    output.success(
        "login",
        LoginResult {
            address: wallet.address().to_string(),
            generated,
        },
    );
    Ok(())
}

/// Logout and forget the cached key bundles along with the wallet
pub fn logout(data_dir: &Path, output: &Output) -> Result<()> {
    let mut config = Config::load(data_dir)?;
    config.clear_wallet_key()?;

    let key_store = KeyStore::new(Arc::new(FileStorageAdapter::new(data_dir.join("keys"))?));
    key_store.clear()?;

    output.success_message("logout", "Logged out and cleared cached keys");
    Ok(())
}

/// Show current identity
pub fn whoami(config: &Config, output: &Output) -> Result<()> {
    if !config.is_logged_in() {
        output.success(
            "whoami",
            WhoamiResult {
                address: String::new(),
                environment: config.environment.to_string(),
                peer: config.peer.clone(),
                logged_in: false,
            },
        );
        return Ok(());
    }

    let wallet = config.wallet()?;
    output.success(
        "whoami",
        WhoamiResult {
            address: wallet.address().to_string(),
            environment: config.environment.to_string(),
            peer: config.peer.clone(),
            logged_in: true,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Config) {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path()).unwrap();
        (temp, config)
    }

    #[test]
    fn test_login_with_hex_key() {
        let (temp, config) = setup();
        let output = Output::new(true);

        let wallet = WalletKey::generate();
        login(Some(&wallet.secret_hex()), &config, &output).unwrap();

        let loaded = Config::load(temp.path()).unwrap();
        assert!(loaded.is_logged_in());
        assert_eq!(loaded.wallet().unwrap().address(), wallet.address());
    }

    #[test]
    fn test_login_generates_key_when_absent() {
        let (temp, config) = setup();
        let output = Output::new(true);

        login(None, &config, &output).unwrap();
        assert!(Config::load(temp.path()).unwrap().is_logged_in());
    }

    #[test]
    fn test_login_rejects_bad_key() {
        let (_temp, config) = setup();
        let output = Output::new(true);
        assert!(login(Some("nonsense"), &config, &output).is_err());
    }

    #[test]
    fn test_logout_clears_wallet_and_key_bundles() {
        let (temp, mut config) = setup();
        let output = Output::new(true);

        let wallet = WalletKey::generate();
        config.set_wallet_key(&wallet.secret_hex()).unwrap();

        // a cached bundle exists
        let key_store = KeyStore::new(Arc::new(
            FileStorageAdapter::new(temp.path().join("keys")).unwrap(),
        ));
        let bundle = wallet_chat::derive_key_bundle(&wallet).unwrap();
        key_store.save(wallet.address(), &bundle).unwrap();

        logout(temp.path(), &output).unwrap();

        let loaded = Config::load(temp.path()).unwrap();
        assert!(!loaded.is_logged_in());
        assert!(key_store.load(wallet.address()).unwrap().is_none());
    }

    #[test]
    fn test_whoami_logged_out() {
        let (_temp, config) = setup();
        let output = Output::new(true);
        whoami(&config, &output).unwrap();
    }

    #[test]
    fn test_whoami_logged_in() {
        let (temp, mut config) = setup();
        let output = Output::new(true);

        config
            .set_wallet_key(&WalletKey::generate().secret_hex())
            .unwrap();
        let config = Config::load(temp.path()).unwrap();
        whoami(&config, &output).unwrap();
    }
}
