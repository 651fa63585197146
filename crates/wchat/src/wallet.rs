use anyhow::{Context, Result};
use nostr::{EventBuilder, Keys, Kind, Timestamp};
use sha2::{Digest, Sha256};
use wallet_chat::{Error, Identity, WalletSigner};

/// Locally held wallet key. Stands in for the wallet-connect flow: the CLI
/// owns the key, so the derivation signature needs no interaction.
pub struct WalletKey {
    keys: Keys,
    address: Identity,
}

impl WalletKey {
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        if hex_key.len() != 64 {
            anyhow::bail!("Invalid key length. Expected 64 hex characters.");
        }
        let bytes = hex::decode(hex_key).context("Invalid hex key")?;
        let secret = nostr::SecretKey::from_slice(&bytes).context("Invalid secret key")?;
        Ok(Self::from_keys(Keys::new(secret)))
    }

    pub fn generate() -> Self {
        Self::from_keys(Keys::generate())
    }

    fn from_keys(keys: Keys) -> Self {
        let address = derive_address(&keys);
        Self { keys, address }
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.keys.secret_key().to_secret_bytes())
    }

    pub fn address(&self) -> &Identity {
        &self.address
    }
}

/// 20-byte address derived from the public key, rendered as 0x-hex. Only an
/// opaque identifier as far as the messaging core is concerned.
fn derive_address(keys: &Keys) -> Identity {
    let digest = Sha256::digest(keys.public_key().to_bytes());
    let tail = &digest[digest.len() - 20..];
    Identity::new(&format!("0x{}", hex::encode(tail))).expect("hex address is valid")
}

impl WalletSigner for WalletKey {
    fn address(&self) -> Identity {
        self.address.clone()
    }

    fn sign_message(&self, message: &str) -> wallet_chat::Result<Vec<u8>> {
        let unsigned = EventBuilder::new(Kind::TextNote, message)
            .custom_created_at(Timestamp::from(0u64))
            .build(self.keys.public_key());
        let event = unsigned
            .sign_with_keys(&self.keys)
            .map_err(|e| Error::KeyResolution(e.to_string()))?;
        Ok(event.sig.to_string().into_bytes())
    }
}
