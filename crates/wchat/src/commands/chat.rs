use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wallet_chat::{
    conversation, sync, ContentCodec, FileStorageAdapter, IdentitySession, KeyStore, Message,
    Session, SyncUpdate,
};
use wallet_chat_attachments::{AttachmentCodec, RemoteAttachmentCodec};

use crate::config::Config;
use crate::output::Output;
use crate::relay_gateway::RelayGateway;
use crate::wallet::WalletKey;

#[derive(Serialize)]
struct MessageView {
    id: String,
    sender: String,
    sent_at: u64,
    content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

fn message_view(session: &Session, message: &Message) -> MessageView {
    let text = session
        .decode(message)
        .ok()
        .and_then(|v| v.as_str().map(|s| s.to_string()));
    MessageView {
        id: message.id.clone(),
        sender: message.sender.to_string(),
        sent_at: message.sent_at,
        content_type: message.content.type_id.to_string(),
        text,
    }
}

fn registered_codecs() -> Vec<Arc<dyn ContentCodec>> {
    vec![Arc::new(AttachmentCodec), Arc::new(RemoteAttachmentCodec)]
}

fn open_session(config: &Config, data_dir: &Path) -> Result<(IdentitySession, WalletKey)> {
    let wallet = config
        .wallet()
        .context("Not logged in. Use 'wchat login' first.")?;
    let storage = Arc::new(FileStorageAdapter::new(data_dir.join("keys"))?);
    let gateway = Arc::new(RelayGateway::new(config.resolved_relays())?);
    Ok((IdentitySession::new(KeyStore::new(storage), gateway), wallet))
}

#[derive(Serialize)]
struct ConnectResult {
    address: String,
    peer: String,
    conversation_id: String,
    history: Vec<MessageView>,
}

/// Bootstrap the session, bind the fixed peer and print its history
pub fn connect(config: &Config, data_dir: &Path, output: &Output) -> Result<()> {
    let peer = config.peer_identity()?;
    let (identity_session, wallet) = open_session(config, data_dir)?;

    let session = identity_session.bootstrap(&wallet, config.environment, registered_codecs())?;
    let (bound, history) = conversation::bind(&session, &peer)?;

    let history: Vec<MessageView> = history
        .messages()
        .iter()
        .map(|m| message_view(&session, m))
        .collect();
    output.success(
        "connect",
        ConnectResult {
            address: session.identity().to_string(),
            peer: peer.to_string(),
            conversation_id: bound.id,
            history,
        },
    );
    Ok(())
}

#[derive(Serialize)]
struct SendResult {
    message_id: String,
    conversation_id: String,
}

/// Send a text message to the fixed peer
pub fn send(message: &str, config: &Config, data_dir: &Path, output: &Output) -> Result<()> {
    let peer = config.peer_identity()?;
    let (identity_session, wallet) = open_session(config, data_dir)?;

    let session = identity_session.bootstrap(&wallet, config.environment, registered_codecs())?;
    let (bound, _history) = conversation::bind(&session, &peer)?;

    let message_id = session.send_text(&bound, message)?;
    output.success(
        "send",
        SendResult {
            message_id,
            conversation_id: bound.id,
        },
    );
    Ok(())
}

/// Listen for new messages, merging them into the history baseline
pub fn listen(
    duration_secs: Option<u64>,
    config: &Config,
    data_dir: &Path,
    output: &Output,
) -> Result<()> {
    let peer = config.peer_identity()?;
    let (identity_session, wallet) = open_session(config, data_dir)?;

    let session = identity_session.bootstrap(&wallet, config.environment, registered_codecs())?;
    let (bound, history) = conversation::bind(&session, &peer)?;

    output.success_message(
        "listen",
        &format!(
            "Listening for messages from {} ({} in history)... (Ctrl+C to stop)",
            peer,
            history.len()
        ),
    );

    let handle = sync::start(&session, &bound, history)?;
    let updates = handle.updates();
    let deadline = duration_secs.map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        match updates.recv_timeout(Duration::from_millis(250)) {
            Ok(SyncUpdate::Snapshot(snapshot)) => {
                if let Some(message) = snapshot.last() {
                    output.event("message", message_view(&session, message));
                }
            }
            Ok(SyncUpdate::Interrupted) => {
                output.event(
                    "interrupted",
                    serde_json::json!({ "reason": "message stream closed" }),
                );
                break;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
    }

    let merged = handle.cancel();
    output.success(
        "listen",
        serde_json::json!({ "messages": merged.len(), "conversation_id": bound.id }),
    );
    identity_session.dispose()?;
    Ok(())
}
