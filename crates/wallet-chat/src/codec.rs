use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifies a payload encoding, e.g. `wallet-chat/text:1.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentTypeId {
    pub authority: String,
    pub type_name: String,
    pub version_major: u32,
    pub version_minor: u32,
}

impl ContentTypeId {
    pub fn new(authority: &str, type_name: &str, version_major: u32, version_minor: u32) -> Self {
        Self {
            authority: authority.to_string(),
            type_name: type_name.to_string(),
            version_major,
            version_minor,
        }
    }
}

impl fmt::Display for ContentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}.{}",
            self.authority, self.type_name, self.version_major, self.version_minor
        )
    }
}

/// Wire form of a message payload: a content type, codec parameters, and the
/// encoded bytes (base64 in JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedContent {
    pub type_id: ContentTypeId,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, String>,
    #[serde(with = "serde_base64")]
    pub content: Vec<u8>,
}

/// Pluggable encoder/decoder for one content type. Codecs work on
/// `serde_json::Value` so a heterogeneous set can be registered behind one
/// trait object.
pub trait ContentCodec: Send + Sync {
    fn content_type(&self) -> ContentTypeId;
    fn encode(&self, value: &serde_json::Value) -> Result<EncodedContent>;
    fn decode(&self, encoded: &EncodedContent) -> Result<serde_json::Value>;
}

/// Plain UTF-8 text. Always registered.
pub struct TextCodec;

impl TextCodec {
    pub fn content_type_id() -> ContentTypeId {
        ContentTypeId::new("wallet-chat", "text", 1, 0)
    }
}

impl ContentCodec for TextCodec {
    fn content_type(&self) -> ContentTypeId {
        Self::content_type_id()
    }

    fn encode(&self, value: &serde_json::Value) -> Result<EncodedContent> {
        let text = value
            .as_str()
            .ok_or_else(|| Error::Codec("text codec expects a string value".to_string()))?;
        Ok(EncodedContent {
            type_id: self.content_type(),
            parameters: HashMap::new(),
            content: text.as_bytes().to_vec(),
        })
    }

    fn decode(&self, encoded: &EncodedContent) -> Result<serde_json::Value> {
        let text = String::from_utf8(encoded.content.clone())
            .map_err(|e| Error::Codec(format!("invalid utf-8 text payload: {e}")))?;
        Ok(serde_json::Value::String(text))
    }
}

/// The codec set of one session. Built during bootstrap and sealed into the
/// session before any message traffic, so registration can never race a
/// payload that needs it.
pub struct CodecRegistry {
    codecs: HashMap<ContentTypeId, Arc<dyn ContentCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            codecs: HashMap::new(),
        };
        registry.register(Arc::new(TextCodec));
        registry
    }

    pub fn register(&mut self, codec: Arc<dyn ContentCodec>) {
        self.codecs.insert(codec.content_type(), codec);
    }

    pub fn contains(&self, type_id: &ContentTypeId) -> bool {
        self.codecs.contains_key(type_id)
    }

    pub fn encode_text(&self, text: &str) -> Result<EncodedContent> {
        TextCodec.encode(&serde_json::Value::String(text.to_string()))
    }

    pub fn decode(&self, encoded: &EncodedContent) -> Result<serde_json::Value> {
        let codec = self
            .codecs
            .get(&encoded.type_id)
            .ok_or_else(|| Error::Codec(format!("no codec registered for {}", encoded.type_id)))?;
        codec.decode(encoded)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

mod serde_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_round_trip() {
        let encoded = TextCodec.encode(&serde_json::json!("gm")).unwrap();
        assert_eq!(encoded.type_id, TextCodec::content_type_id());
        assert_eq!(TextCodec.decode(&encoded).unwrap(), serde_json::json!("gm"));
    }

    #[test]
    fn test_text_codec_rejects_non_string() {
        assert!(TextCodec.encode(&serde_json::json!(42)).is_err());
    }

    #[test]
    fn test_registry_rejects_unknown_type() {
        let registry = CodecRegistry::new();
        let encoded = EncodedContent {
            type_id: ContentTypeId::new("example", "mystery", 1, 0),
            parameters: HashMap::new(),
            content: vec![1, 2, 3],
        };
        assert!(matches!(registry.decode(&encoded), Err(Error::Codec(_))));
    }

    #[test]
    fn test_encoded_content_survives_json() {
        let encoded = TextCodec.encode(&serde_json::json!("hello")).unwrap();
        let json = serde_json::to_string(&encoded).unwrap();
        let parsed: EncodedContent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, encoded);
    }
}
