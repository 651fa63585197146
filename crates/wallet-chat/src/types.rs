use crate::codec::EncodedContent;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wallet address used as the network's addressing and authentication key.
///
/// Treated as an opaque identifier everywhere past construction; validation
/// only checks it is a plausible `0x`-prefixed hex string. Addresses compare
/// case-insensitively (stored lowercased).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(address: &str) -> Result<Self> {
        let trimmed = address.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .ok_or_else(|| Error::InvalidAddress(trimmed.to_string()))?;
        if hex_part.is_empty() || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidAddress(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Deployment tier of the messaging network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    #[default]
    Dev,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Local => "local",
            Environment::Dev => "dev",
            Environment::Production => "production",
        };
        f.write_str(name)
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "dev" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(Error::UnknownEnvironment(other.to_string())),
        }
    }
}

/// Secret keypair material granting messaging authority for one identity.
///
/// Derived once per identity and cached; a bundle read back from storage must
/// be reused, since a regenerated one would orphan the conversation state
/// bound to the old key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    pub address: Identity,
    #[serde(with = "serde_bytes_array")]
    pub secret_key: [u8; 32],
    pub created_at: u64,
}

/// Channel between the session's identity and one fixed peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub local_address: Identity,
    pub peer_address: Identity,
}

impl Conversation {
    /// Deterministic id for the unordered address pair, so lookup-or-create
    /// converges on the same conversation from either side.
    pub fn derive_id(a: &Identity, b: &Identity) -> String {
        let (lo, hi) = if a.as_str() <= b.as_str() { (a, b) } else { (b, a) };
        let mut hasher = Sha256::new();
        hasher.update(lo.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(hi.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn between(local: &Identity, peer: &Identity) -> Self {
        Self {
            id: Self::derive_id(local, peer),
            local_address: local.clone(),
            peer_address: peer.clone(),
        }
    }
}

/// An immutable record received from (or published to) the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender: Identity,
    /// UNIX timestamp in milliseconds.
    pub sent_at: u64,
    pub content: EncodedContent,
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

mod serde_bytes_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}
