use crossbeam_channel::Sender;
use nostr::types::filter::{Alphabet, SingleLetterTag};
use nostr::{EventBuilder, Keys, Kind, Tag};
use nostr_sdk::{Client, Filter, RelayPoolNotification};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;
use wallet_chat::{
    Conversation, EncodedContent, Environment, Error, Identity, KeyBundle, Message,
    MessagingGateway, Result, Subscription,
};

/// Parameterized-replaceable contact bundle, d-tagged with the wallet
/// address. A published bundle is what makes an address reachable.
const CONTACT_BUNDLE_KIND: u16 = 30078;
/// Chat message events, h-tagged with the conversation id and p-tagged with
/// the recipient's messaging key.
const CHAT_MESSAGE_KIND: u16 = 1060;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Published once per connect so peers can resolve the wallet address to a
/// messaging key.
#[derive(Debug, Serialize, Deserialize)]
struct ContactBundle {
    address: Identity,
    messaging_key: String,
}

/// Content of a chat message event.
#[derive(Debug, Serialize, Deserialize)]
struct ChatPayload {
    conversation_id: String,
    sender: Identity,
    content: EncodedContent,
}

struct ConnectedState {
    identity: Identity,
    keys: Keys,
    /// address -> messaging key, filled by reachability checks
    contacts: HashMap<String, nostr::PublicKey>,
}

/// Messaging gateway backed by relays. Blocking facade over the async relay
/// client: the gateway owns its runtime and the core stays synchronous.
pub struct RelayGateway {
    runtime: Runtime,
    client: Client,
    relays: Vec<String>,
    state: Mutex<Option<ConnectedState>>,
    subscriptions: Arc<Mutex<HashMap<u64, tokio::task::AbortHandle>>>,
    next_subscription: Mutex<u64>,
}

impl RelayGateway {
    pub fn new(relays: Vec<String>) -> Result<Self> {
        let runtime = Runtime::new().map_err(|e| Error::NetworkConnect(e.to_string()))?;
        Ok(Self {
            runtime,
            client: Client::default(),
            relays,
            state: Mutex::new(None),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_subscription: Mutex::new(0),
        })
    }

    fn connected_keys(&self) -> Result<(Identity, Keys)> {
        let state = self.state.lock().unwrap();
        let connected = state
            .as_ref()
            .ok_or_else(|| Error::NetworkConnect("not connected".to_string()))?;
        Ok((connected.identity.clone(), connected.keys.clone()))
    }

    fn cached_contact(&self, address: &Identity) -> Option<nostr::PublicKey> {
        let state = self.state.lock().unwrap();
        state
            .as_ref()
            .and_then(|s| s.contacts.get(address.as_str()).copied())
    }

    fn cache_contact(&self, address: &Identity, key: nostr::PublicKey) {
        let mut state = self.state.lock().unwrap();
        if let Some(connected) = state.as_mut() {
            connected.contacts.insert(address.as_str().to_string(), key);
        }
    }

    /// Fetch a peer's contact bundle and cache its messaging key.
    fn lookup_contact(&self, address: &Identity) -> Result<Option<nostr::PublicKey>> {
        if let Some(key) = self.cached_contact(address) {
            return Ok(Some(key));
        }

        let filter = Filter::new()
            .kind(Kind::from(CONTACT_BUNDLE_KIND))
            .custom_tag(SingleLetterTag::lowercase(Alphabet::D), [address.as_str()])
            .limit(1);

        let events = self
            .runtime
            .block_on(self.client.fetch_events(vec![filter], Some(FETCH_TIMEOUT)))
            .map_err(|e| Error::NetworkConnect(format!("contact lookup failed: {e}")))?;

        for event in events.iter() {
            let Ok(bundle) = serde_json::from_str::<ContactBundle>(&event.content) else {
                continue;
            };
            if bundle.address != *address {
                continue;
            }
            let Ok(key) = nostr::PublicKey::from_hex(&bundle.messaging_key) else {
                continue;
            };
            self.cache_contact(address, key);
            return Ok(Some(key));
        }
        Ok(None)
    }

    fn chat_message_from_event(event: &nostr::Event) -> Option<Message> {
        if event.kind != Kind::from(CHAT_MESSAGE_KIND) {
            return None;
        }
        let payload: ChatPayload = serde_json::from_str(&event.content).ok()?;
        Some(Message {
            id: event.id.to_hex(),
            conversation_id: payload.conversation_id,
            sender: payload.sender,
            sent_at: event.created_at.as_u64() * 1000,
            content: payload.content,
        })
    }
}

impl MessagingGateway for RelayGateway {
    fn connect(
        &self,
        identity: &Identity,
        keys: &KeyBundle,
        _environment: Environment,
    ) -> Result<()> {
        let secret = nostr::SecretKey::from_slice(&keys.secret_key)
            .map_err(|e| Error::NetworkConnect(e.to_string()))?;
        let messaging_keys = Keys::new(secret);

        let bundle = ContactBundle {
            address: identity.clone(),
            messaging_key: messaging_keys.public_key().to_hex(),
        };
        let content = serde_json::to_string(&bundle)?;
        let d_tag = Tag::parse(&["d".to_string(), identity.to_string()])
            .map_err(|e| Error::NetworkConnect(e.to_string()))?;

        self.runtime.block_on(async {
            for relay in &self.relays {
                self.client
                    .add_relay(relay)
                    .await
                    .map_err(|e| Error::NetworkConnect(e.to_string()))?;
            }
            self.client.connect().await;

            // contact publishing happens here, not during key derivation
            let unsigned = EventBuilder::new(Kind::from(CONTACT_BUNDLE_KIND), &content)
                .tags(vec![d_tag])
                .build(messaging_keys.public_key());
            let event = unsigned
                .sign_with_keys(&messaging_keys)
                .map_err(|e| Error::NetworkConnect(e.to_string()))?;
            self.client
                .send_event(event)
                .await
                .map_err(|e| Error::NetworkConnect(e.to_string()))?;
            Ok::<(), Error>(())
        })?;

        *self.state.lock().unwrap() = Some(ConnectedState {
            identity: identity.clone(),
            keys: messaging_keys,
            contacts: HashMap::new(),
        });
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        // tear down live subscription forwarders first so their channels
        // disconnect deterministically
        for (_, handle) in self.subscriptions.lock().unwrap().drain() {
            handle.abort();
        }
        self.runtime.block_on(async {
            self.client.unsubscribe_all().await;
            self.client.disconnect().await;
        });
        *self.state.lock().unwrap() = None;
        Ok(())
    }

    fn can_message(&self, peer: &Identity) -> Result<bool> {
        Ok(self.lookup_contact(peer)?.is_some())
    }

    fn find_or_create_conversation(
        &self,
        local: &Identity,
        peer: &Identity,
    ) -> Result<Conversation> {
        // the id is a digest of the unordered pair, so lookup-or-create is
        // idempotent with no network mutation; the first message
        // materializes the conversation on the relays
        Ok(Conversation::between(local, peer))
    }

    fn load_history(&self, conversation: &Conversation) -> Result<Vec<Message>> {
        let filter = Filter::new()
            .kind(Kind::from(CHAT_MESSAGE_KIND))
            .custom_tag(
                SingleLetterTag::lowercase(Alphabet::H),
                [conversation.id.as_str()],
            );

        let events = self
            .runtime
            .block_on(self.client.fetch_events(vec![filter], Some(FETCH_TIMEOUT)))
            .map_err(|e| Error::HistoryLoad(e.to_string()))?;

        let mut messages: Vec<Message> = events
            .iter()
            .filter_map(Self::chat_message_from_event)
            .filter(|m| m.conversation_id == conversation.id)
            .collect();
        messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)));
        Ok(messages)
    }

    fn subscribe_all(&self) -> Result<Subscription> {
        let (_, keys) = self.connected_keys()?;
        let pubkey = keys.public_key();

        let (tx, rx): (Sender<Message>, _) = crossbeam_channel::unbounded();
        let incoming = Filter::new()
            .kind(Kind::from(CHAT_MESSAGE_KIND))
            .pubkeys(vec![pubkey]);
        let own = Filter::new()
            .kind(Kind::from(CHAT_MESSAGE_KIND))
            .authors(vec![pubkey]);

        let client = self.client.clone();
        let task = self.runtime.spawn(async move {
            if client.subscribe(vec![incoming, own], None).await.is_err() {
                return;
            }
            let mut notifications = client.notifications();
            while let Ok(notification) = notifications.recv().await {
                if let RelayPoolNotification::Event { event, .. } = notification {
                    if let Some(message) = Self::chat_message_from_event(&event) {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                }
            }
            // notification channel closed: dropping tx disconnects the
            // consumer, which surfaces the interruption
        });

        let id = {
            let mut next = self.next_subscription.lock().unwrap();
            *next += 1;
            *next
        };
        self.subscriptions
            .lock()
            .unwrap()
            .insert(id, task.abort_handle());

        let subscriptions = self.subscriptions.clone();
        let client = self.client.clone();
        let runtime_handle = self.runtime.handle().clone();
        Ok(Subscription {
            receiver: rx,
            unsubscribe: Box::new(move || {
                if let Some(handle) = subscriptions.lock().unwrap().remove(&id) {
                    handle.abort();
                }
                // one live subscription per gateway, so a blanket
                // unsubscribe is exact
                runtime_handle.spawn(async move {
                    client.unsubscribe_all().await;
                });
            }),
        })
    }

    fn send(&self, conversation: &Conversation, content: EncodedContent) -> Result<String> {
        let (identity, keys) = self.connected_keys()?;
        let recipient = self
            .lookup_contact(&conversation.peer_address)?
            .ok_or_else(|| Error::PeerUnreachable(conversation.peer_address.to_string()))?;

        let payload = ChatPayload {
            conversation_id: conversation.id.clone(),
            sender: identity,
            content,
        };
        let payload_json = serde_json::to_string(&payload)?;

        let h_tag = Tag::parse(&["h".to_string(), conversation.id.clone()])
            .map_err(|e| Error::NetworkConnect(e.to_string()))?;
        let p_tag = Tag::parse(&["p".to_string(), recipient.to_hex()])
            .map_err(|e| Error::NetworkConnect(e.to_string()))?;

        let unsigned = EventBuilder::new(Kind::from(CHAT_MESSAGE_KIND), &payload_json)
            .tags(vec![h_tag, p_tag])
            .build(keys.public_key());
        let event = unsigned
            .sign_with_keys(&keys)
            .map_err(|e| Error::NetworkConnect(e.to_string()))?;
        let id = event.id.to_hex();

        self.runtime
            .block_on(self.client.send_event(event))
            .map_err(|e| Error::NetworkConnect(e.to_string()))?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_round_trips_through_event_content() {
        let alice = Identity::new("0x01").unwrap();
        let bob = Identity::new("0x02").unwrap();
        let conversation = Conversation::between(&alice, &bob);

        let payload = ChatPayload {
            conversation_id: conversation.id.clone(),
            sender: alice.clone(),
            content: wallet_chat::CodecRegistry::new().encode_text("gm").unwrap(),
        };
        let keys = Keys::generate();
        let unsigned = EventBuilder::new(
            Kind::from(CHAT_MESSAGE_KIND),
            &serde_json::to_string(&payload).unwrap(),
        )
        .build(keys.public_key());
        let event = unsigned.sign_with_keys(&keys).unwrap();

        let message = RelayGateway::chat_message_from_event(&event).unwrap();
        assert_eq!(message.conversation_id, conversation.id);
        assert_eq!(message.sender, alice);
        assert_eq!(message.id, event.id.to_hex());
    }

    #[test]
    fn test_non_chat_events_are_ignored() {
        let keys = Keys::generate();
        let unsigned = EventBuilder::new(Kind::TextNote, "hello").build(keys.public_key());
        let event = unsigned.sign_with_keys(&keys).unwrap();
        assert!(RelayGateway::chat_message_from_event(&event).is_none());
    }

    #[test]
    fn test_operations_require_connection() {
        let gateway = RelayGateway::new(vec![]).unwrap();
        let alice = Identity::new("0x01").unwrap();
        let bob = Identity::new("0x02").unwrap();
        let conversation = Conversation::between(&alice, &bob);

        assert!(gateway.subscribe_all().is_err());
        let content = wallet_chat::CodecRegistry::new().encode_text("gm").unwrap();
        assert!(gateway.send(&conversation, content).is_err());
    }
}
