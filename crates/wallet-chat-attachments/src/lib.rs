//! Attachment content codecs for wallet-chat sessions.
//!
//! Two codecs cover the two transport shapes: [`AttachmentCodec`] carries
//! small payloads inline in the message, [`RemoteAttachmentCodec`] carries a
//! reference to an encrypted payload hosted elsewhere. Both are registered
//! with the session at bootstrap; neither crate nor session re-implements
//! the hosting or encryption of remote content.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use wallet_chat::{ContentCodec, ContentTypeId, EncodedContent, Error, Result};

/// Payloads above this size must travel as remote attachments.
pub const MAX_INLINE_ATTACHMENT_BYTES: usize = 1024 * 1024;

/// An attachment small enough to travel inline in the message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    #[serde(with = "serde_base64")]
    pub data: Vec<u8>,
}

pub struct AttachmentCodec;

impl AttachmentCodec {
    pub fn content_type_id() -> ContentTypeId {
        ContentTypeId::new("wallet-chat", "attachment", 1, 0)
    }
}

impl ContentCodec for AttachmentCodec {
    fn content_type(&self) -> ContentTypeId {
        Self::content_type_id()
    }

    fn encode(&self, value: &serde_json::Value) -> Result<EncodedContent> {
        let attachment: Attachment = serde_json::from_value(value.clone())?;
        if attachment.data.is_empty() {
            return Err(Error::Codec("attachment has no data".to_string()));
        }
        if attachment.data.len() > MAX_INLINE_ATTACHMENT_BYTES {
            return Err(Error::Codec(format!(
                "attachment of {} bytes exceeds the inline limit, use a remote attachment",
                attachment.data.len()
            )));
        }

        let mut parameters = HashMap::new();
        parameters.insert("filename".to_string(), attachment.filename);
        parameters.insert("mime_type".to_string(), attachment.mime_type);
        Ok(EncodedContent {
            type_id: self.content_type(),
            parameters,
            content: attachment.data,
        })
    }

    fn decode(&self, encoded: &EncodedContent) -> Result<serde_json::Value> {
        let filename = encoded
            .parameters
            .get("filename")
            .ok_or_else(|| Error::Codec("attachment missing filename parameter".to_string()))?;
        let mime_type = encoded
            .parameters
            .get("mime_type")
            .ok_or_else(|| Error::Codec("attachment missing mime_type parameter".to_string()))?;
        let attachment = Attachment {
            filename: filename.clone(),
            mime_type: mime_type.clone(),
            data: encoded.content.clone(),
        };
        Ok(serde_json::to_value(attachment)?)
    }
}

/// Reference to an encrypted payload hosted outside the message, for
/// content above the inline limit. The decryption material travels with the
/// reference; fetching and decrypting is the consumer's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAttachment {
    pub url: String,
    /// Hex digest of the encrypted payload, checked by the consumer after
    /// download.
    pub content_digest: String,
    #[serde(with = "hex::serde")]
    pub secret: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub salt: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
    pub scheme: String,
    pub content_length: u64,
    pub filename: String,
}

pub struct RemoteAttachmentCodec;

impl RemoteAttachmentCodec {
    pub fn content_type_id() -> ContentTypeId {
        ContentTypeId::new("wallet-chat", "remote-attachment", 1, 0)
    }

    fn validate(remote: &RemoteAttachment) -> Result<()> {
        if remote.scheme != "https://" {
            return Err(Error::Codec(format!(
                "unsupported remote attachment scheme: {}",
                remote.scheme
            )));
        }
        if !remote.url.starts_with("https://") {
            return Err(Error::Codec("remote attachment url must be https".to_string()));
        }
        if remote.content_digest.is_empty() {
            return Err(Error::Codec("remote attachment missing content digest".to_string()));
        }
        if remote.content_length == 0 {
            return Err(Error::Codec("remote attachment declares no content".to_string()));
        }
        Ok(())
    }
}

impl ContentCodec for RemoteAttachmentCodec {
    fn content_type(&self) -> ContentTypeId {
        Self::content_type_id()
    }

    fn encode(&self, value: &serde_json::Value) -> Result<EncodedContent> {
        let remote: RemoteAttachment = serde_json::from_value(value.clone())?;
        Self::validate(&remote)?;
        Ok(EncodedContent {
            type_id: self.content_type(),
            parameters: HashMap::new(),
            content: serde_json::to_vec(&remote)?,
        })
    }

    fn decode(&self, encoded: &EncodedContent) -> Result<serde_json::Value> {
        let remote: RemoteAttachment = serde_json::from_slice(&encoded.content)?;
        Self::validate(&remote)?;
        Ok(serde_json::to_value(remote)?)
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
